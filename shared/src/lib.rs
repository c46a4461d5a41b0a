//! Types shared by the ring-field simulation and the mock console.

pub mod config;
pub mod protocol;
pub mod vec3;
