//! tracker-link - Session and wire-protocol engine for motion-tracking nodes
//!
//! A sensor node finds a tracking server by broadcast, keeps the session
//! alive, negotiates optional protocol features, and streams sensor state and
//! motion over UDP. All work happens inside [`Session::update`], called from
//! the host's polling loop; nothing blocks and nothing spawns threads.
//!
//! ## Features
//!
//! - `inspection`: raw-IMU inspection packets for sensor debugging

pub mod clock;
pub mod config;
pub mod error;
pub mod protocol;
pub mod sensor;
pub mod session;
pub mod sim;
pub mod transport;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::LinkConfig;
pub use error::{Error, Result};
pub use sensor::{Sensor, SensorSnapshot, SensorStatus};
pub use session::{ConnectionState, LinkStats, ServerEvent, Session};
pub use transport::{MockTransport, Transport, UdpTransport};
