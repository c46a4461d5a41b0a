//! Ring-field sound toy.
//!
//! Balls bounce inside spinning rings on a tilting plane; every ring hit
//! drives a track on an external mixing console over OSC, and the console's
//! reported state is fed back into the scene.

pub mod collision;
pub mod config;
pub mod effects;
pub mod engine;
pub mod entity;
pub mod feedback;
pub mod game_loop;
pub mod listener;
pub mod osc;
pub mod phase;
pub mod sender;
pub mod state;
pub mod status;
pub mod zones;
