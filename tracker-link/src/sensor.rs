//! Read-only view of the sensors attached to a node
//!
//! Sensors are owned by the host. The session only reads them through the
//! [`Sensor`] trait to report state changes and motion samples.

/// Number of sensor slots a node supports
pub const MAX_SENSORS: usize = 16;

/// Sensor health as reported to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SensorStatus {
    #[default]
    Offline = 0,
    Ok = 1,
    Error = 2,
}

/// Server-togglable sensor options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SensorToggle {
    MagEnabled = 1,
    CalibrationEnabled = 2,
    TempGradientCalibrationEnabled = 3,
}

impl SensorToggle {
    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::MagEnabled),
            2 => Some(Self::CalibrationEnabled),
            3 => Some(Self::TempGradientCalibrationEnabled),
            _ => None,
        }
    }

    pub const fn id(self) -> u16 {
        self as u16
    }
}

/// Packed sensor configuration (u16 on the wire)
///
/// Each option has an "enabled" bit and a "supported" bit next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct ConfigBits(pub u16);

impl ConfigBits {
    pub const MAG_ENABLED: u16 = 1 << 0;
    pub const MAG_SUPPORTED: u16 = 1 << 1;
    pub const CALIBRATION_ENABLED: u16 = 1 << 2;
    pub const CALIBRATION_SUPPORTED: u16 = 1 << 3;
    pub const TEMP_GRADIENT_CALIBRATION_ENABLED: u16 = 1 << 4;
    pub const TEMP_GRADIENT_CALIBRATION_SUPPORTED: u16 = 1 << 5;

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether the option behind `toggle` is switched on
    pub const fn is_enabled(self, toggle: SensorToggle) -> bool {
        self.0 & Self::enabled_mask(toggle) != 0
    }

    /// Copy with the option behind `toggle` switched on or off
    pub const fn with(self, toggle: SensorToggle, enabled: bool) -> Self {
        let mask = Self::enabled_mask(toggle);
        if enabled {
            Self(self.0 | mask)
        } else {
            Self(self.0 & !mask)
        }
    }

    const fn enabled_mask(toggle: SensorToggle) -> u16 {
        match toggle {
            SensorToggle::MagEnabled => Self::MAG_ENABLED,
            SensorToggle::CalibrationEnabled => Self::CALIBRATION_ENABLED,
            SensorToggle::TempGradientCalibrationEnabled => {
                Self::TEMP_GRADIENT_CALIBRATION_ENABLED
            }
        }
    }
}

/// Orientation quaternion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// What a rotation packet carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RotationDataType {
    #[default]
    Normal = 1,
    Correction = 2,
}

/// Latest fused motion output of one sensor
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSample {
    pub rotation: Quaternion,
    pub data_type: RotationDataType,
    pub accuracy: u8,
    /// Linear acceleration, when the sensor reports it
    pub acceleration: Option<Vector3>,
}

/// Read interface the session uses for each attached sensor
pub trait Sensor {
    /// Stable slot id, `0..MAX_SENSORS`
    fn id(&self) -> u8;

    fn status(&self) -> SensorStatus;

    /// IMU type id reported in sensor info
    fn kind(&self) -> u8;

    fn config_bits(&self) -> ConfigBits;

    /// Whether the sensor finished its rest calibration
    fn has_completed_rest_calibration(&self) -> bool;

    /// Body position id, 0 when unassigned
    fn position(&self) -> u8 {
        0
    }

    /// Motion sample produced since the last tick, if any
    fn motion(&self) -> Option<MotionSample> {
        None
    }
}

impl<S: Sensor + ?Sized> Sensor for &S {
    fn id(&self) -> u8 {
        (**self).id()
    }
    fn status(&self) -> SensorStatus {
        (**self).status()
    }
    fn kind(&self) -> u8 {
        (**self).kind()
    }
    fn config_bits(&self) -> ConfigBits {
        (**self).config_bits()
    }
    fn has_completed_rest_calibration(&self) -> bool {
        (**self).has_completed_rest_calibration()
    }
    fn position(&self) -> u8 {
        (**self).position()
    }
    fn motion(&self) -> Option<MotionSample> {
        (**self).motion()
    }
}

/// Plain-data sensor, for hosts that copy their state each tick
#[derive(Debug, Clone, Default)]
pub struct SensorSnapshot {
    pub id: u8,
    pub status: SensorStatus,
    pub kind: u8,
    pub config: ConfigBits,
    pub rest_calibrated: bool,
    pub position: u8,
    pub motion: Option<MotionSample>,
}

impl SensorSnapshot {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

impl Sensor for SensorSnapshot {
    fn id(&self) -> u8 {
        self.id
    }
    fn status(&self) -> SensorStatus {
        self.status
    }
    fn kind(&self) -> u8 {
        self.kind
    }
    fn config_bits(&self) -> ConfigBits {
        self.config
    }
    fn has_completed_rest_calibration(&self) -> bool {
        self.rest_calibrated
    }
    fn position(&self) -> u8 {
        self.position
    }
    fn motion(&self) -> Option<MotionSample> {
        self.motion
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_toggles() {
        let bits = ConfigBits(ConfigBits::MAG_SUPPORTED);
        assert!(!bits.is_enabled(SensorToggle::MagEnabled));

        let bits = bits.with(SensorToggle::MagEnabled, true);
        assert_eq!(bits.bits(), 0b0011);
        assert!(bits.is_enabled(SensorToggle::MagEnabled));

        let bits = bits
            .with(SensorToggle::CalibrationEnabled, true)
            .with(SensorToggle::MagEnabled, false);
        assert_eq!(bits.bits(), 0b0110);
    }

    #[test]
    fn test_toggle_ids() {
        assert_eq!(SensorToggle::from_id(1), Some(SensorToggle::MagEnabled));
        assert_eq!(
            SensorToggle::from_id(3),
            Some(SensorToggle::TempGradientCalibrationEnabled)
        );
        assert_eq!(SensorToggle::from_id(0), None);
        assert_eq!(SensorToggle::CalibrationEnabled.id(), 2);
    }
}
