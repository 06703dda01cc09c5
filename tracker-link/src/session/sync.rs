//! Sensor state sync cache
//!
//! Holds, per sensor slot, the status/config/calibration last *sent* to the
//! server. Each tick the live sensor state is compared with it and a
//! sensor-info packet goes out only on a difference. Non-status changes are
//! rate limited per sensor; a status change always goes out at once.
//!
//! Also tracks server config requests waiting for the sensor to apply them.

use crate::sensor::{ConfigBits, MAX_SENSORS, Sensor, SensorStatus, SensorToggle};

/// Maximum outstanding config requests
const MAX_PENDING_ACKS: usize = 8;

/// Last state sent for one sensor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorAckRecord {
    /// `None` until the first sensor-info of the session went out
    pub status: Option<SensorStatus>,
    pub config_bits: ConfigBits,
    pub calibration_acked: bool,
    pub last_info_sent_at: Option<u64>,
}

impl SensorAckRecord {
    pub const UNSET: Self = Self {
        status: None,
        config_bits: ConfigBits(0),
        calibration_acked: false,
        last_info_sent_at: None,
    };

    pub fn is_unset(&self) -> bool {
        self.status.is_none()
    }

    fn matches(&self, live: &LiveState) -> bool {
        self.status == Some(live.status)
            && self.config_bits == live.config_bits
            && self.calibration_acked == live.calibrated
    }
}

impl Default for SensorAckRecord {
    fn default() -> Self {
        Self::UNSET
    }
}

/// The part of a sensor the cache compares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveState {
    pub status: SensorStatus,
    pub config_bits: ConfigBits,
    pub calibrated: bool,
}

impl LiveState {
    pub fn of<S: Sensor + ?Sized>(sensor: &S) -> Self {
        Self {
            status: sensor.status(),
            config_bits: sensor.config_bits(),
            calibrated: sensor.has_completed_rest_calibration(),
        }
    }
}

/// Outcome of comparing a sensor with its record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// Server already has this state
    UpToDate,
    /// Changed, but the last info went out too recently
    Deferred,
    /// Send sensor info now
    Send,
}

/// Server request to flip a sensor toggle, awaiting the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConfigAck {
    /// Sensor slot, or 255 for every sensor
    pub sensor_id: u8,
    pub toggle: SensorToggle,
    pub enabled: bool,
    pub requested_at: u64,
}

/// Per-slot sync records plus pending config acknowledgments
#[derive(Debug, Clone)]
pub struct SensorSyncCache {
    records: [SensorAckRecord; MAX_SENSORS],
    pending_acks: Vec<PendingConfigAck>,
    min_interval_ms: u64,
}

impl SensorSyncCache {
    pub fn new(min_interval_ms: u64) -> Self {
        Self {
            records: [SensorAckRecord::UNSET; MAX_SENSORS],
            pending_acks: Vec::with_capacity(MAX_PENDING_ACKS),
            min_interval_ms,
        }
    }

    /// Set every slot back to unset and drop pending requests
    pub fn reset(&mut self) {
        self.records = [SensorAckRecord::UNSET; MAX_SENSORS];
        self.pending_acks.clear();
    }

    pub fn record(&self, slot: usize) -> Option<&SensorAckRecord> {
        self.records.get(slot)
    }

    pub fn records(&self) -> &[SensorAckRecord] {
        &self.records
    }

    /// Decide what to do about `slot` at `now`
    pub fn evaluate(&self, slot: usize, live: &LiveState, now: u64) -> SyncAction {
        let Some(record) = self.records.get(slot) else {
            return SyncAction::UpToDate;
        };
        if record.matches(live) {
            return SyncAction::UpToDate;
        }
        if record.status != Some(live.status) {
            return SyncAction::Send;
        }
        match record.last_info_sent_at {
            Some(at) if now.saturating_sub(at) < self.min_interval_ms => SyncAction::Deferred,
            _ => SyncAction::Send,
        }
    }

    /// Remember what was just sent for `slot`
    pub fn record_sent(&mut self, slot: usize, live: &LiveState, now: u64) {
        if let Some(record) = self.records.get_mut(slot) {
            *record = SensorAckRecord {
                status: Some(live.status),
                config_bits: live.config_bits,
                calibration_acked: live.calibrated,
                last_info_sent_at: Some(now),
            };
        }
    }

    /// Queue a config request, replacing an older one for the same toggle
    ///
    /// Returns false if the queue was full and the oldest request was dropped.
    pub fn add_pending_ack(&mut self, ack: PendingConfigAck) -> bool {
        self.pending_acks
            .retain(|p| !(p.sensor_id == ack.sensor_id && p.toggle == ack.toggle));
        let mut room = true;
        if self.pending_acks.len() >= MAX_PENDING_ACKS {
            self.pending_acks.remove(0);
            room = false;
        }
        self.pending_acks.push(ack);
        room
    }

    pub fn pending_acks(&self) -> &[PendingConfigAck] {
        &self.pending_acks
    }

    pub fn remove_pending_ack(&mut self, index: usize) -> Option<PendingConfigAck> {
        (index < self.pending_acks.len()).then(|| self.pending_acks.remove(index))
    }
}
