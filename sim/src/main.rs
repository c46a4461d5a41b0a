use ringsonic_sim::config::AppConfig;
use ringsonic_sim::feedback::TraceRenderer;
use ringsonic_sim::game_loop::{run_sim_loop, SimCommand};
use ringsonic_sim::listener::StatusListener;
use ringsonic_sim::sender::{ControlTransport, LogTransport, UdpTransport};
use ringsonic_sim::state::Simulation;
use ringsonic_sim::status::{StatusCell, StatusEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = match AppConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    // Validate configuration before starting
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let transport: Box<dyn ControlTransport> = if config.dry_run {
        tracing::info!("Dry run, outbound messages are only logged");
        Box::new(LogTransport)
    } else {
        let target = match config.remote_socket_addr() {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };
        match UdpTransport::bind(&config.send_bind_addr, target).await {
            Ok(transport) => Box::new(transport),
            Err(e) => {
                eprintln!("Cannot open control socket: {}", e);
                std::process::exit(1);
            }
        }
    };

    let listener = match StatusListener::bind(&config.listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Cannot listen on {}: {}", config.listen_addr, e);
            std::process::exit(1);
        }
    };

    let status = StatusCell::new();
    let (cmd_tx, cmd_rx) = mpsc::channel::<SimCommand>(64);
    let (status_tx, status_rx) = mpsc::channel::<StatusEvent>(64);

    listener.spawn(status.clone(), status_tx);
    tokio::spawn(read_keys(cmd_tx));

    let sim = Simulation::new(config.toy.clone(), config.rng_seed, transport, status);

    tracing::info!(
        "Sending to {} and listening on {}",
        config.remote_addr,
        config.listen_addr
    );
    println!("Keys: a add ball, c clear, r release, p play, s stop, f faders, t attraction");
    println!("      drag <ring> <x> <z> moves a ring");

    run_sim_loop(cmd_rx, status_rx, sim, Box::new(TraceRenderer::new())).await;
}

/// Forward stdin lines as commands until stdin closes.
async fn read_keys(cmd_tx: mpsc::Sender<SimCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match SimCommand::parse_line(&line) {
                Some(cmd) => {
                    if cmd_tx.send(cmd).await.is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => tracing::warn!("Unknown command: {}", line.trim()),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Reading stdin failed: {}", e);
                break;
            }
        }
    }
    tracing::info!("Keyboard input closed");
}
