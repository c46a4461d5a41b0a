//! OSC datagram codec for single-float control messages.

use rosc::{OscError, OscMessage, OscPacket, OscType};

/// Encode one message carrying a single float32 argument.
pub fn encode_float(path: &str, value: f32) -> Result<Vec<u8>, OscError> {
    rosc::encoder::encode(&OscPacket::Message(OscMessage {
        addr: path.to_string(),
        args: vec![OscType::Float(value)],
    }))
}

/// A decoded message whose first argument was usable as a number.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatMessage {
    pub path: String,
    pub value: f32,
}

/// Decode a datagram into its numeric messages, flattening bundles.
/// Messages without a numeric first argument come back in the second list
/// so the caller can log them.
pub fn decode_floats(buf: &[u8]) -> Result<(Vec<FloatMessage>, Vec<String>), OscError> {
    let (_, packet) = rosc::decoder::decode_udp(buf)?;
    let mut messages = Vec::new();
    let mut rejected = Vec::new();
    flatten(packet, &mut messages, &mut rejected);
    Ok((messages, rejected))
}

fn flatten(packet: OscPacket, out: &mut Vec<FloatMessage>, rejected: &mut Vec<String>) {
    match packet {
        OscPacket::Message(msg) => match msg.args.first().and_then(numeric) {
            Some(value) => out.push(FloatMessage {
                path: msg.addr,
                value,
            }),
            None => rejected.push(msg.addr),
        },
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out, rejected);
            }
        }
    }
}

fn numeric(arg: &OscType) -> Option<f32> {
    match *arg {
        OscType::Float(v) => Some(v),
        OscType::Double(v) => Some(v as f32),
        OscType::Int(v) => Some(v as f32),
        OscType::Long(v) => Some(v as f32),
        OscType::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
