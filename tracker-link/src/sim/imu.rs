//! Simulated IMU
//!
//! Spins slowly around the vertical axis with Gaussian jitter on every axis.
//! Reports OK from the first step and finishes rest calibration after a few
//! seconds, so a server sees the usual status and calibration transitions.

use super::noise::NoiseGenerator;
use crate::config::SimulationConfig;
use crate::sensor::{
    ConfigBits, MotionSample, Quaternion, RotationDataType, Sensor, SensorStatus, SensorToggle,
    Vector3,
};
use std::f32::consts::TAU;

/// Time at rest before calibration completes
const REST_CALIBRATION_MS: u64 = 3000;

/// IMU type id reported for simulated sensors
const SIMULATED_IMU_KIND: u8 = 0;

pub struct SimulatedImu {
    id: u8,
    noise: NoiseGenerator,
    status: SensorStatus,
    config: ConfigBits,
    elapsed_ms: u64,
    yaw: f32,
    yaw_rate: f32,
    rotation_noise: f32,
    accel_noise: f32,
    sample: Option<MotionSample>,
}

impl SimulatedImu {
    pub fn new(id: u8, config: &SimulationConfig, noise: NoiseGenerator) -> Self {
        Self {
            id,
            noise,
            status: SensorStatus::Offline,
            config: ConfigBits(
                ConfigBits::MAG_SUPPORTED
                    | ConfigBits::CALIBRATION_SUPPORTED
                    | ConfigBits::CALIBRATION_ENABLED,
            ),
            elapsed_ms: 0,
            // Spread sensors around the circle
            yaw: f32::from(id) * 0.5,
            yaw_rate: config.yaw_rate,
            rotation_noise: config.rotation_noise,
            accel_noise: config.accel_noise,
            sample: None,
        }
    }

    /// Advance the simulation by `dt_ms`
    pub fn step(&mut self, dt_ms: u64) {
        self.status = SensorStatus::Ok;
        self.elapsed_ms = self.elapsed_ms.saturating_add(dt_ms);

        let dt = dt_ms as f32 / 1000.0;
        self.yaw = (self.yaw + self.yaw_rate * dt) % TAU;

        let [roll, pitch, yaw_jitter] = self.noise.gaussian3(self.rotation_noise);
        let [ax, ay, az] = self.noise.gaussian3(self.accel_noise);

        self.sample = Some(MotionSample {
            rotation: from_euler(roll, pitch, self.yaw + yaw_jitter),
            data_type: RotationDataType::Normal,
            accuracy: 0,
            acceleration: Some(Vector3::new(ax, ay, az)),
        });
    }

    /// Apply a server config request, false if the option is unsupported
    pub fn apply_config(&mut self, toggle: SensorToggle, enabled: bool) -> bool {
        let supported = match toggle {
            SensorToggle::MagEnabled => ConfigBits::MAG_SUPPORTED,
            SensorToggle::CalibrationEnabled => ConfigBits::CALIBRATION_SUPPORTED,
            SensorToggle::TempGradientCalibrationEnabled => {
                ConfigBits::TEMP_GRADIENT_CALIBRATION_SUPPORTED
            }
        };
        if self.config.bits() & supported == 0 {
            return false;
        }
        self.config = self.config.with(toggle, enabled);
        true
    }
}

impl Sensor for SimulatedImu {
    fn id(&self) -> u8 {
        self.id
    }

    fn status(&self) -> SensorStatus {
        self.status
    }

    fn kind(&self) -> u8 {
        SIMULATED_IMU_KIND
    }

    fn config_bits(&self) -> ConfigBits {
        self.config
    }

    fn has_completed_rest_calibration(&self) -> bool {
        self.elapsed_ms >= REST_CALIBRATION_MS
    }

    fn motion(&self) -> Option<MotionSample> {
        self.sample
    }
}

/// Roll/pitch/yaw (ZYX order) to quaternion
fn from_euler(roll: f32, pitch: f32, yaw: f32) -> Quaternion {
    let (sr, cr) = (roll * 0.5).sin_cos();
    let (sp, cp) = (pitch * 0.5).sin_cos();
    let (sy, cy) = (yaw * 0.5).sin_cos();
    Quaternion::new(
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
        cr * cp * cy + sr * sp * sy,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig {
            rotation_noise: 0.0,
            accel_noise: 0.0,
            yaw_rate: 1.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_offline_until_first_step() {
        let mut imu = SimulatedImu::new(0, &quiet_config(), NoiseGenerator::new(1));
        assert_eq!(imu.status(), SensorStatus::Offline);
        assert!(imu.motion().is_none());

        imu.step(10);
        assert_eq!(imu.status(), SensorStatus::Ok);
        assert!(imu.motion().is_some());
    }

    #[test]
    fn test_rest_calibration_completes() {
        let mut imu = SimulatedImu::new(0, &quiet_config(), NoiseGenerator::new(1));
        imu.step(2999);
        assert!(!imu.has_completed_rest_calibration());
        imu.step(1);
        assert!(imu.has_completed_rest_calibration());
    }

    #[test]
    fn test_rotation_is_unit_yaw() {
        let mut imu = SimulatedImu::new(0, &quiet_config(), NoiseGenerator::new(1));
        imu.step(500);
        let q = imu.motion().unwrap().rotation;

        let norm = (q.x * q.x + q.y * q.y + q.z * q.z + q.w * q.w).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        // 0.5 rad around Z
        assert!((q.z - 0.25f32.sin()).abs() < 1e-5);
        assert!(q.x.abs() < 1e-6 && q.y.abs() < 1e-6);
    }

    #[test]
    fn test_apply_config_respects_support() {
        let mut imu = SimulatedImu::new(0, &quiet_config(), NoiseGenerator::new(1));
        assert!(imu.apply_config(SensorToggle::MagEnabled, true));
        assert!(imu.config_bits().is_enabled(SensorToggle::MagEnabled));

        assert!(!imu.apply_config(SensorToggle::TempGradientCalibrationEnabled, true));
        assert!(
            !imu.config_bits()
                .is_enabled(SensorToggle::TempGradientCalibrationEnabled)
        );
    }
}
