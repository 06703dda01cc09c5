//! Error types for tracker-link

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// tracker-link error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport rejected a write or flush
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport accepted fewer bytes than the datagram holds
    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite {
        /// Bytes in the assembled datagram
        expected: usize,
        /// Bytes the transport accepted
        written: usize,
    },

    /// Outgoing buffer cannot hold the value being written
    #[error("Buffer overflow: need {needed} bytes, {available} available")]
    BufferOverflow {
        /// Bytes the write needed
        needed: usize,
        /// Bytes left in the buffer
        available: usize,
    },

    /// `begin_packet` called while another packet is open
    #[error("Packet already in progress")]
    PacketInProgress,

    /// `end_packet` called with no open packet
    #[error("No packet in progress")]
    NoPacketInProgress,

    /// `begin_bundle` called while a bundle is open
    #[error("Bundle already active")]
    BundleActive,

    /// `end_bundle` called with no open bundle
    #[error("No active bundle")]
    NoBundle,

    /// Operation needs an established server session
    #[error("Not connected to a server")]
    NotConnected,

    /// String does not fit its length prefix
    #[error("String too long: {len} bytes (max {max})")]
    StringTooLong {
        /// Length of the string in bytes
        len: usize,
        /// Largest length the prefix can encode
        max: usize,
    },

    /// Malformed or truncated inbound packet
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    /// Transport cannot take a datagram right now
    #[error("Transport not ready for writing")]
    TransportBusy,

    /// Sensor id outside the supported slot range
    #[error("Invalid sensor id: {0}")]
    InvalidSensorId(u8),

    /// Configuration could not be parsed or written
    #[error("Config error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
