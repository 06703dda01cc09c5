//! Simulated sensors for running a node without hardware
//!
//! Used by the `tracker-link` binary to exercise a server end to end.

mod imu;
mod noise;

pub use imu::SimulatedImu;
pub use noise::NoiseGenerator;
