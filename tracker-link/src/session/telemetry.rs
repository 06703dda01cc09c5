//! Outgoing telemetry packets
//!
//! One method per packet kind. Each writes its payload through
//! [`Session::send_packet`] so framing, sequence numbers and bundling are
//! handled in one place. Public senders fail with `NotConnected` until a
//! server has answered discovery. Failed sends are not retried; the next tick
//! carries fresh data.

use super::Session;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::protocol::{FirmwareFeatures, NODE_SENSOR_ID, PacketType, ServerFeatures};
use crate::sensor::{Quaternion, RotationDataType, Sensor, SensorToggle, Vector3};
use crate::transport::Transport;

use super::PacketBuffer;

/// Values the raw-IMU inspection packet can carry
#[cfg(feature = "inspection")]
pub trait InspectionValue: Copy {
    /// Number format tag written before the values
    const FORMAT: u8;

    fn write_to(self, tx: &mut PacketBuffer) -> Result<()>;
}

#[cfg(feature = "inspection")]
impl InspectionValue for i32 {
    const FORMAT: u8 = crate::protocol::inspection::FORMAT_INT;

    fn write_to(self, tx: &mut PacketBuffer) -> Result<()> {
        tx.write_i32(self)
    }
}

#[cfg(feature = "inspection")]
impl InspectionValue for f32 {
    const FORMAT: u8 = crate::protocol::inspection::FORMAT_FLOAT;

    fn write_to(self, tx: &mut PacketBuffer) -> Result<()> {
        tx.write_f32(self)
    }
}

/// Unfused IMU readings for debugging a sensor
#[cfg(feature = "inspection")]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RawImuSample<T> {
    pub rotation: [T; 3],
    pub rotation_accuracy: u8,
    pub acceleration: [T; 3],
    pub acceleration_accuracy: u8,
    pub magnetometer: [T; 3],
    pub magnetometer_accuracy: u8,
}

impl<T: Transport, C: Clock> Session<T, C> {
    /// Connected-only send with a fresh sequence number
    fn send_telemetry<F>(&mut self, kind: PacketType, body: F) -> Result<()>
    where
        F: FnOnce(&mut PacketBuffer) -> Result<()>,
    {
        self.ensure_connected()?;
        self.send_packet(kind, None, body)
    }

    pub fn send_acceleration(&mut self, sensor_id: u8, acceleration: Vector3) -> Result<()> {
        self.send_telemetry(PacketType::Acceleration, |tx| {
            tx.write_f32(acceleration.x)?;
            tx.write_f32(acceleration.y)?;
            tx.write_f32(acceleration.z)?;
            tx.write_u8(sensor_id)
        })
    }

    /// Battery voltage and charge fraction (0.0 to 1.0)
    pub fn send_battery_level(&mut self, voltage: f32, percentage: f32) -> Result<()> {
        self.send_telemetry(PacketType::BatteryLevel, |tx| {
            tx.write_f32(voltage)?;
            tx.write_f32(percentage)
        })
    }

    pub fn send_sensor_tap(&mut self, sensor_id: u8, value: u8) -> Result<()> {
        self.send_telemetry(PacketType::Tap, |tx| {
            tx.write_u8(sensor_id)?;
            tx.write_u8(value)
        })
    }

    pub fn send_sensor_error(&mut self, sensor_id: u8, error: u8) -> Result<()> {
        self.send_telemetry(PacketType::SensorError, |tx| {
            tx.write_u8(sensor_id)?;
            tx.write_u8(error)
        })
    }

    pub fn send_rotation_data(
        &mut self,
        sensor_id: u8,
        rotation: &Quaternion,
        data_type: RotationDataType,
        accuracy: u8,
    ) -> Result<()> {
        let q = *rotation;
        self.send_telemetry(PacketType::RotationData, |tx| {
            tx.write_u8(sensor_id)?;
            tx.write_u8(data_type as u8)?;
            tx.write_f32(q.x)?;
            tx.write_f32(q.y)?;
            tx.write_f32(q.z)?;
            tx.write_f32(q.w)?;
            tx.write_u8(accuracy)
        })
    }

    pub fn send_magnetometer_accuracy(&mut self, sensor_id: u8, accuracy: f32) -> Result<()> {
        self.send_telemetry(PacketType::MagnetometerAccuracy, |tx| {
            tx.write_u8(sensor_id)?;
            tx.write_f32(accuracy)
        })
    }

    /// Wi-Fi RSSI in dBm, reported for the whole node
    pub fn send_signal_strength(&mut self, strength: i8) -> Result<()> {
        self.send_telemetry(PacketType::SignalStrength, |tx| {
            tx.write_u8(NODE_SENSOR_ID)?;
            tx.write_i8(strength)
        })
    }

    pub fn send_temperature(&mut self, sensor_id: u8, temperature: f32) -> Result<()> {
        self.send_telemetry(PacketType::Temperature, |tx| {
            tx.write_u8(sensor_id)?;
            tx.write_f32(temperature)
        })
    }

    /// Announce node features, also serves as the negotiation request
    pub fn send_feature_flags(&mut self, features: &FirmwareFeatures) -> Result<()> {
        let bytes = features.to_bytes();
        self.send_telemetry(PacketType::FeatureFlags, |tx| tx.write_bytes(&bytes))
    }

    pub fn send_flex_data(&mut self, sensor_id: u8, level: f32) -> Result<()> {
        self.send_telemetry(PacketType::FlexData, |tx| {
            tx.write_u8(sensor_id)?;
            tx.write_f32(level)
        })
    }

    /// Raw IMU readings as i32 or f32
    #[cfg(feature = "inspection")]
    pub fn send_inspection_raw_imu<V: InspectionValue>(
        &mut self,
        sensor_id: u8,
        sample: &RawImuSample<V>,
    ) -> Result<()> {
        use crate::protocol::inspection::KIND_RAW_IMU;

        let sample = *sample;
        self.send_telemetry(PacketType::Inspection, |tx| {
            tx.write_u8(KIND_RAW_IMU)?;
            tx.write_u8(sensor_id)?;
            tx.write_u8(V::FORMAT)?;
            for (values, accuracy) in [
                (sample.rotation, sample.rotation_accuracy),
                (sample.acceleration, sample.acceleration_accuracy),
                (sample.magnetometer, sample.magnetometer_accuracy),
            ] {
                for v in values {
                    v.write_to(tx)?;
                }
                tx.write_u8(accuracy)?;
            }
            Ok(())
        })
    }

    /// Send each sensor's latest motion sample
    ///
    /// Packs everything into bundles when the server supports them and there
    /// is more than one packet to send. Returns the number of packets that
    /// went out.
    pub fn publish_motion<S: Sensor>(&mut self, sensors: &[S]) -> Result<usize> {
        self.ensure_connected()?;

        let samples: Vec<_> = sensors
            .iter()
            .filter_map(|s| s.motion().map(|m| (s.id(), m)))
            .collect();
        let pending: usize = samples
            .iter()
            .map(|(_, m)| 1 + usize::from(m.acceleration.is_some()))
            .sum();
        if pending == 0 {
            return Ok(0);
        }

        let bundled = pending > 1
            && self
                .server_features()
                .has(ServerFeatures::PROTOCOL_BUNDLE_SUPPORT);

        if !bundled {
            let mut sent = 0;
            for (id, m) in &samples {
                match self.send_rotation_data(*id, &m.rotation, m.data_type, m.accuracy) {
                    Ok(()) => sent += 1,
                    Err(e) => log::debug!("Rotation for sensor {} not sent: {}", id, e),
                }
                if let Some(accel) = m.acceleration {
                    match self.send_acceleration(*id, accel) {
                        Ok(()) => sent += 1,
                        Err(e) => log::debug!("Acceleration for sensor {} not sent: {}", id, e),
                    }
                }
            }
            return Ok(sent);
        }

        self.begin_bundle()?;
        let result = samples.iter().try_for_each(|(id, m)| {
            self.send_in_bundle(|s| s.send_rotation_data(*id, &m.rotation, m.data_type, m.accuracy))?;
            match m.acceleration {
                Some(accel) => self.send_in_bundle(|s| s.send_acceleration(*id, accel)),
                None => Ok(()),
            }
        });
        if let Err(e) = result {
            self.abort_bundle();
            return Err(e);
        }
        self.end_bundle()?;
        Ok(pending)
    }

    /// Append to the open bundle, starting a new one if it is full
    fn send_in_bundle<F>(&mut self, mut send: F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<()>,
    {
        match send(self) {
            Err(Error::BufferOverflow { .. }) => {
                log::trace!("Bundle full, flushing and starting another");
                self.end_bundle()?;
                self.begin_bundle()?;
                send(self)
            }
            other => other,
        }
    }

    pub(crate) fn send_heartbeat(&mut self) -> Result<()> {
        self.send_telemetry(PacketType::Heartbeat, |_| Ok(()))
    }

    /// Discovery handshake, always sent with sequence 0
    pub(crate) fn send_tracker_discovery(&mut self) -> Result<()> {
        let device = self.device.clone();
        self.send_packet(PacketType::Handshake, Some(0), |tx| {
            tx.write_u32(device.board)?;
            tx.write_u32(device.imu)?;
            tx.write_u32(device.mcu)?;
            // Reserved IMU info
            tx.write_u32(0)?;
            tx.write_u32(0)?;
            tx.write_u32(0)?;
            tx.write_u32(device.firmware_build)?;
            tx.write_short_string(&device.firmware_version)?;
            tx.write_bytes(&device.mac)
        })
    }

    pub(crate) fn send_sensor_info<S: Sensor + ?Sized>(&mut self, sensor: &S) -> Result<()> {
        let id = sensor.id();
        let status = sensor.status() as u8;
        let kind = sensor.kind();
        let config = sensor.config_bits().bits();
        let calibrated = sensor.has_completed_rest_calibration();
        let position = sensor.position();

        self.send_telemetry(PacketType::SensorInfo, |tx| {
            tx.write_u8(id)?;
            tx.write_u8(status)?;
            tx.write_u8(kind)?;
            tx.write_u16(config)?;
            tx.write_bool(calibrated)?;
            tx.write_u8(position)
        })
    }

    pub(crate) fn send_acknowledge_config_change(
        &mut self,
        sensor_id: u8,
        toggle: SensorToggle,
    ) -> Result<()> {
        self.send_telemetry(PacketType::AckConfigChange, |tx| {
            tx.write_u8(sensor_id)?;
            tx.write_u16(toggle.id())
        })
    }
}
