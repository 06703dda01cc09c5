//! Feature flag bitsets exchanged during negotiation
//!
//! On the wire a bitset is a run of bytes, bit `n` at byte `n / 8`,
//! position `n % 8` (LSB first). Bits past the end of a short payload read as
//! unset; bytes past the known bits are ignored.

/// Capabilities the server advertised
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerFeatures {
    bits: u32,
}

impl ServerFeatures {
    /// Server accepts bundled packets
    pub const PROTOCOL_BUNDLE_SUPPORT: u8 = 0;
    /// Server accepts the compact bundle encoding
    pub const PROTOCOL_BUNDLE_COMPACT_SUPPORT: u8 = 1;

    /// Empty set, used until negotiation completes or after it gives up
    pub const fn none() -> Self {
        Self { bits: 0 }
    }

    /// Decode from a feature-flags payload
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bits: decode_bits(bytes),
        }
    }

    #[inline]
    pub const fn has(&self, feature: u8) -> bool {
        feature < 32 && self.bits & (1 << feature) != 0
    }

    pub const fn bits(&self) -> u32 {
        self.bits
    }
}

/// Capabilities this node advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareFeatures {
    bits: u32,
}

impl FirmwareFeatures {
    /// Server may push remote commands
    pub const REMOTE_COMMAND: u8 = 0;
    /// Wi-Fi scan results are base64 encoded
    pub const B64_WIFI_SCANNING: u8 = 1;
    /// Node accepts sensor config toggles and acknowledges them
    pub const SENSOR_CONFIG: u8 = 2;

    const BITS_TOTAL: u8 = 3;

    /// Features implemented by this engine
    pub const fn present() -> Self {
        Self {
            bits: 1 << Self::SENSOR_CONFIG,
        }
    }

    #[inline]
    pub const fn has(&self, feature: u8) -> bool {
        feature < 32 && self.bits & (1 << feature) != 0
    }

    /// Encode for the feature-flags packet
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_bits(self.bits, Self::BITS_TOTAL)
    }
}

impl Default for FirmwareFeatures {
    fn default() -> Self {
        Self::present()
    }
}

fn decode_bits(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .enumerate()
        .fold(0u32, |acc, (i, &b)| acc | (u32::from(b) << (i * 8)))
}

fn encode_bits(bits: u32, total: u8) -> Vec<u8> {
    let len = usize::from(total).div_ceil(8);
    (0..len).map(|i| (bits >> (i * 8)) as u8).collect()
}
