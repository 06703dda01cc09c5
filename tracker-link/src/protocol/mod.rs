//! Wire protocol between a tracker node and the tracking server
//!
//! Every datagram is big-endian and starts with a one byte type tag:
//!
//! ```text
//! ┌──────────┬──────────────────────┬─────────────────────┐
//! │ Type (1) │ Sequence (8, u64 BE) │ Payload (variable)  │
//! └──────────┴──────────────────────┴─────────────────────┘
//! ```
//!
//! A bundle packs several packets behind one header:
//!
//! ```text
//! ┌─────┬──────────┬───────────┬──────────┬──────────┬─────────┬─────
//! │ 100 │ Sequence │ Count u16 │ Len u16  │ Type u8  │ Payload │ ...
//! └─────┴──────────┴───────────┴──────────┴──────────┴─────────┴─────
//! ```
//!
//! Sub-frames carry no sequence number of their own. The length covers the
//! type byte and the payload.
//!
//! The discovery reply is the only inbound packet without a sequence number:
//! type 3 followed by the server greeting.

pub mod codec;
pub mod features;

pub use codec::{RxReader, TxBuffer};
pub use features::{FirmwareFeatures, ServerFeatures};

/// Outgoing buffer size (bytes)
pub const TX_BUFFER_SIZE: usize = 512;

/// Inbound buffer size (bytes)
pub const RX_BUFFER_SIZE: usize = 128;

/// Sensor id used by packets that describe the node rather than a sensor
pub const NODE_SENSOR_ID: u8 = 255;

/// Greeting prefix a server puts after the handshake type byte
pub const HANDSHAKE_REPLY_PREFIX: &[u8] = b"Hey OVR =D";

/// Packet types sent by the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Heartbeat = 0,
    Handshake = 3,
    Acceleration = 4,
    BatteryLevel = 12,
    Tap = 13,
    SensorError = 14,
    SensorInfo = 15,
    RotationData = 17,
    MagnetometerAccuracy = 18,
    SignalStrength = 19,
    Temperature = 20,
    FeatureFlags = 22,
    AckConfigChange = 24,
    FlexData = 26,
    Bundle = 100,
    #[cfg(feature = "inspection")]
    Inspection = 105,
}

impl PacketType {
    /// Wire id
    #[inline]
    pub const fn id(self) -> u8 {
        self as u8
    }
}

/// Packet types sent by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerPacketType {
    Heartbeat = 1,
    Vibrate = 2,
    Handshake = 3,
    Command = 4,
    Config = 8,
    PingPong = 10,
    SensorInfo = 15,
    FeatureFlags = 22,
    SetConfigFlag = 25,
}

impl ServerPacketType {
    /// Map a wire id to a known server packet type
    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Self::Heartbeat),
            2 => Some(Self::Vibrate),
            3 => Some(Self::Handshake),
            4 => Some(Self::Command),
            8 => Some(Self::Config),
            10 => Some(Self::PingPong),
            15 => Some(Self::SensorInfo),
            22 => Some(Self::FeatureFlags),
            25 => Some(Self::SetConfigFlag),
            _ => None,
        }
    }
}

/// Inspection sub-packet kinds and number formats
#[cfg(feature = "inspection")]
pub mod inspection {
    /// Raw IMU sample
    pub const KIND_RAW_IMU: u8 = 1;
    /// Values sent as i32
    pub const FORMAT_INT: u8 = 1;
    /// Values sent as f32
    pub const FORMAT_FLOAT: u8 = 2;
}

/// True if `datagram` is a discovery reply from a server
pub fn is_handshake_reply(datagram: &[u8]) -> bool {
    datagram.len() > HANDSHAKE_REPLY_PREFIX.len()
        && datagram[0] == ServerPacketType::Handshake as u8
        && datagram[1..].starts_with(HANDSHAKE_REPLY_PREFIX)
}
