//! Control-protocol address space shared by the toy and the mock console.
//!
//! Outbound messages are float-valued controls addressed at console tracks.
//! Inbound messages report the console's transport and fader state.

use std::fmt;

/// FX slot hosting the spatializer on every zone track
pub const SPATIAL_FX_SLOT: u32 = 2;
pub const AZIMUTH_PARAM: u32 = 8;
pub const ELEVATION_PARAM: u32 = 9;
/// Master track FX slot/param driven by the release envelope
pub const MASTER_FX_SLOT: u32 = 1;
pub const MASTER_FX_PARAM: u32 = 12;

// === Toy -> Console ===

/// One outbound control. Also the key of a rate-limited channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlAddress {
    TrackVolume(u32),
    TrackPan(u32),
    Azimuth(u32),
    Elevation(u32),
    ReverbDryWet(u32),
    MasterFx(u32),
    Marker(u32),
    Play,
    Stop,
}

impl ControlAddress {
    pub fn to_path(&self) -> String {
        match *self {
            ControlAddress::TrackVolume(track) => format!("/track/{}/volume", track),
            ControlAddress::TrackPan(track) => format!("/track/{}/pan", track),
            ControlAddress::Azimuth(track) => format!(
                "/track/{}/fx/{}/fxparam/{}/value",
                track, SPATIAL_FX_SLOT, AZIMUTH_PARAM
            ),
            ControlAddress::Elevation(track) => format!(
                "/track/{}/fx/{}/fxparam/{}/value",
                track, SPATIAL_FX_SLOT, ELEVATION_PARAM
            ),
            ControlAddress::ReverbDryWet(track) => format!("/track/{}/reverb/drywet", track),
            ControlAddress::MasterFx(track) => format!(
                "/track/{}/fx/{}/fxparam/{}/value",
                track, MASTER_FX_SLOT, MASTER_FX_PARAM
            ),
            ControlAddress::Marker(n) => format!("/marker/{}/play", n),
            ControlAddress::Play => "/play".to_string(),
            ControlAddress::Stop => "/stop".to_string(),
        }
    }

    /// Whether sends on this address go through the delta/interval gate.
    pub fn is_rate_limited(&self) -> bool {
        !matches!(
            self,
            ControlAddress::TrackPan(_)
                | ControlAddress::Marker(_)
                | ControlAddress::Play
                | ControlAddress::Stop
        )
    }

    /// Value that must always reach the console once, even below threshold.
    pub fn rest_floor(&self) -> Option<f32> {
        match self {
            ControlAddress::TrackVolume(_)
            | ControlAddress::ReverbDryWet(_)
            | ControlAddress::MasterFx(_) => Some(0.0),
            _ => None,
        }
    }

    /// Inverse of [`ControlAddress::to_path`].
    pub fn parse(path: &str) -> Option<ControlAddress> {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["play"] => Some(ControlAddress::Play),
            ["stop"] => Some(ControlAddress::Stop),
            ["marker", n, "play"] => n.parse().ok().map(ControlAddress::Marker),
            ["track", t, "volume"] => t.parse().ok().map(ControlAddress::TrackVolume),
            ["track", t, "pan"] => t.parse().ok().map(ControlAddress::TrackPan),
            ["track", t, "reverb", "drywet"] => t.parse().ok().map(ControlAddress::ReverbDryWet),
            ["track", t, "fx", slot, "fxparam", param, "value"] => {
                let track: u32 = t.parse().ok()?;
                match (slot.parse::<u32>().ok()?, param.parse::<u32>().ok()?) {
                    (SPATIAL_FX_SLOT, AZIMUTH_PARAM) => Some(ControlAddress::Azimuth(track)),
                    (SPATIAL_FX_SLOT, ELEVATION_PARAM) => Some(ControlAddress::Elevation(track)),
                    (MASTER_FX_SLOT, MASTER_FX_PARAM) => Some(ControlAddress::MasterFx(track)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for ControlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_path())
    }
}

// === Console -> Toy ===

/// Decoded inbound status report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatusMessage {
    /// `/play` or `/stop`, normalized to "is the console playing".
    Playing(bool),
    MasterVolume(f32),
    TrackVolume { track: u32, volume: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatusParseError {
    UnknownAddress(String),
    BadTrackId(String),
}

impl fmt::Display for StatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusParseError::UnknownAddress(path) => write!(f, "unknown status address {}", path),
            StatusParseError::BadTrackId(path) => write!(f, "bad track id in {}", path),
        }
    }
}

impl std::error::Error for StatusParseError {}

impl StatusMessage {
    /// Decode a status address and its numeric payload.
    /// `/stop 1` means stopped; `/play 1` means playing.
    pub fn parse(path: &str, value: f32) -> Result<StatusMessage, StatusParseError> {
        let on = value > 0.5;
        match path {
            "/play" => return Ok(StatusMessage::Playing(on)),
            "/stop" => return Ok(StatusMessage::Playing(!on)),
            "/master/volume" => return Ok(StatusMessage::MasterVolume(value.clamp(0.0, 1.0))),
            _ => {}
        }

        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        match segments.as_slice() {
            ["track", id, "volume"] => id
                .parse::<u32>()
                .map(|track| StatusMessage::TrackVolume {
                    track,
                    volume: value.clamp(0.0, 1.0),
                })
                .map_err(|_| StatusParseError::BadTrackId(path.to_string())),
            _ => Err(StatusParseError::UnknownAddress(path.to_string())),
        }
    }

    /// Wire address and payload, as a console would send it.
    pub fn to_wire(&self) -> (String, f32) {
        match *self {
            StatusMessage::Playing(true) => ("/play".to_string(), 1.0),
            StatusMessage::Playing(false) => ("/stop".to_string(), 1.0),
            StatusMessage::MasterVolume(v) => ("/master/volume".to_string(), v),
            StatusMessage::TrackVolume { track, volume } => {
                (format!("/track/{}/volume", track), volume)
            }
        }
    }
}
