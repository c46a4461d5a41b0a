use ringsonic_shared::config::ToyConfig;
use std::net::SocketAddr;

/// Process-level configuration: endpoints, seed and the toy parameters.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Console control port, receives outbound messages
    pub remote_addr: String,
    /// Local port for inbound status
    pub listen_addr: String,
    /// Local address the outbound socket binds to
    pub send_bind_addr: String,
    pub rng_seed: u64,
    /// Log outbound messages instead of sending them
    pub dry_run: bool,
    pub toy: ToyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            remote_addr: "127.0.0.1:8000".to_string(),
            listen_addr: "0.0.0.0:9000".to_string(),
            send_bind_addr: "0.0.0.0:0".to_string(),
            rng_seed: 42,
            dry_run: false,
            toy: ToyConfig::default(),
        }
    }
}

impl AppConfig {
    /// Build from command-line arguments (without the program name).
    pub fn from_args<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--remote" => config.remote_addr = value_for(&arg, args.next())?,
                "--listen" => config.listen_addr = value_for(&arg, args.next())?,
                "--seed" => {
                    let raw = value_for(&arg, args.next())?;
                    config.rng_seed = raw
                        .parse()
                        .map_err(|_| format!("--seed expects an integer, got {:?}", raw))?;
                }
                "--config" => {
                    let path = value_for(&arg, args.next())?;
                    let text = std::fs::read_to_string(&path)
                        .map_err(|e| format!("Cannot read {}: {}", path, e))?;
                    config.toy = ToyConfig::from_json(&text)?;
                }
                "--dry-run" => config.dry_run = true,
                other => return Err(format!("Unknown argument: {}", other)),
            }
        }

        Ok(config)
    }

    /// Validate configuration values. Returns an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.remote_socket_addr()?;
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|_| format!("listen address {:?} is not host:port", self.listen_addr))?;
        self.toy.validate()
    }

    pub fn remote_socket_addr(&self) -> Result<SocketAddr, String> {
        self.remote_addr
            .parse()
            .map_err(|_| format!("remote address {:?} is not host:port", self.remote_addr))
    }
}

fn value_for(flag: &str, value: Option<String>) -> Result<String, String> {
    value.ok_or_else(|| format!("{} needs a value", flag))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn parses_flags() {
        let config = AppConfig::from_args(args(&[
            "--remote",
            "10.0.0.2:8000",
            "--listen",
            "127.0.0.1:9100",
            "--seed",
            "7",
            "--dry-run",
        ]))
        .unwrap();
        assert_eq!(config.remote_addr, "10.0.0.2:8000");
        assert_eq!(config.listen_addr, "127.0.0.1:9100");
        assert_eq!(config.rng_seed, 7);
        assert!(config.dry_run);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_value_is_an_error() {
        let err = AppConfig::from_args(args(&["--remote"])).unwrap_err();
        assert!(err.contains("--remote"));
    }

    #[test]
    fn bad_seed_is_an_error() {
        assert!(AppConfig::from_args(args(&["--seed", "many"])).is_err());
    }

    #[test]
    fn unknown_flag_is_an_error() {
        assert!(AppConfig::from_args(args(&["--fast"])).is_err());
    }

    #[test]
    fn unreadable_config_file_is_an_error() {
        let err = AppConfig::from_args(args(&["--config", "/nonexistent/toy.json"])).unwrap_err();
        assert!(err.contains("/nonexistent/toy.json"));
    }

    #[test]
    fn bad_remote_fails_validation() {
        let config = AppConfig {
            remote_addr: "console".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn toy_errors_fail_validation() {
        let mut config = AppConfig::default();
        config.toy.physics.dt = 0.0;
        assert!(config.validate().is_err());
    }
}
