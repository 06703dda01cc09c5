//! Configuration for a tracker-link node
//!
//! Loads configuration from a TOML file. Every section is optional and falls
//! back to the defaults below, so an empty file is a valid configuration.
//!
//! The default server address and port can be baked in at build time with the
//! `TRACKER_SERVER_IP` and `TRACKER_SERVER_PORT` environment variables.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::Path;

/// Default server UDP port
pub const DEFAULT_SERVER_PORT: u16 = 6969;

/// Top-level node configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LinkConfig {
    pub server: ServerConfig,
    pub timing: TimingConfig,
    pub device: DeviceConfig,
    pub simulation: SimulationConfig,
    pub logging: LoggingConfig,
}

/// Where discovery broadcasts go before a server answers
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server IPv4 address; all-ones broadcasts discovery to the whole subnet
    pub address: Ipv4Addr,
    /// Server UDP port
    pub port: u16,
}

impl ServerConfig {
    /// Socket address discovery is sent to
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.address, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let address = option_env!("TRACKER_SERVER_IP")
            .and_then(|s| s.parse().ok())
            .unwrap_or(Ipv4Addr::BROADCAST);
        let port = option_env!("TRACKER_SERVER_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SERVER_PORT);
        Self { address, port }
    }
}

/// Session timing, all values in milliseconds unless noted
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Minimum gap between discovery broadcasts
    pub connection_retry_ms: u64,
    /// Silence after which the server is considered gone
    pub liveness_timeout_ms: u64,
    /// Heartbeat cadence while connected
    pub heartbeat_interval_ms: u64,
    /// Gap between feature-flag requests
    pub feature_retry_interval_ms: u64,
    /// Feature-flag requests sent before giving up (count)
    pub feature_max_attempts: u8,
    /// Minimum gap between sensor-info packets for one sensor
    pub sensor_info_interval_ms: u64,
    /// How long a server config request waits for the sensor to apply it
    pub config_ack_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            connection_retry_ms: 1000,
            liveness_timeout_ms: 3000,
            heartbeat_interval_ms: 1000,
            feature_retry_interval_ms: 500,
            feature_max_attempts: 15,
            sensor_info_interval_ms: 1000,
            config_ack_timeout_ms: 5000,
        }
    }
}

/// Identity reported in the discovery handshake
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Board type id
    pub board: u32,
    /// MCU type id
    pub mcu: u32,
    /// IMU type id of the primary sensor
    pub imu: u32,
    /// Firmware build number
    pub firmware_build: u32,
    /// Firmware version string (at most 255 bytes)
    pub firmware_version: String,
    /// Hardware MAC address
    pub mac: [u8; 6],
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            board: 0,
            mcu: 0,
            imu: 0,
            firmware_build: 1,
            firmware_version: env!("CARGO_PKG_VERSION").to_string(),
            mac: [0; 6],
        }
    }
}

/// Simulated sensors driven by the `tracker-link` binary
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of simulated IMUs
    pub sensors: u8,
    /// Polling loop period
    pub tick_ms: u64,
    /// RNG seed, 0 for entropy
    pub seed: u64,
    /// Yaw rate of the slow rotation (rad/s)
    pub yaw_rate: f32,
    /// Orientation noise per axis (rad, 1 sigma)
    pub rotation_noise: f32,
    /// Acceleration noise per axis (m/s^2, 1 sigma)
    pub accel_noise: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sensors: 1,
            tick_ms: 10,
            seed: 0,
            yaw_rate: 0.2,
            rotation_noise: 0.002,
            accel_noise: 0.05,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl LinkConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use tracker_link::config::LinkConfig;
    ///
    /// let config = LinkConfig::from_file("tracker.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: LinkConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.device.firmware_version.len() > u8::MAX as usize {
            return Err(Error::Config(format!(
                "firmware_version is {} bytes, max 255",
                self.device.firmware_version.len()
            )));
        }
        if self.timing.liveness_timeout_ms == 0 {
            return Err(Error::Config("liveness_timeout_ms must be > 0".into()));
        }
        if self.server.port == 0 {
            return Err(Error::Config("server port must be > 0".into()));
        }
        if self.simulation.sensors as usize > crate::sensor::MAX_SENSORS {
            return Err(Error::Config(format!(
                "simulation.sensors is {}, max {}",
                self.simulation.sensors,
                crate::sensor::MAX_SENSORS
            )));
        }
        if self.simulation.tick_ms == 0 {
            return Err(Error::Config("simulation.tick_ms must be > 0".into()));
        }
        Ok(())
    }
}
