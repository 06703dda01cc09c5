//! Client session with a tracking server
//!
//! [`Session`] owns everything the node knows about its server: connection
//! state, sequence counter, negotiated features, the per-sensor sync cache and
//! the outgoing packet buffer. It does no I/O on its own; the host calls
//! [`Session::update`] from its polling loop and the session does all of its
//! work inside that call.
//!
//! ```text
//!                 retry interval
//!  Disconnected ─────────────────▶ Discovering
//!       ▲                              │ handshake reply
//!       │ silence > liveness timeout   ▼
//!       └─────────────────────────  Connected
//! ```

mod framing;
mod negotiation;
mod sync;
mod telemetry;

pub use framing::{BundleState, PacketBuffer};
pub use negotiation::FeatureNegotiation;
pub use sync::{LiveState, PendingConfigAck, SensorAckRecord, SensorSyncCache, SyncAction};
#[cfg(feature = "inspection")]
pub use telemetry::{InspectionValue, RawImuSample};

use crate::clock::Clock;
use crate::config::{DeviceConfig, LinkConfig, TimingConfig};
use crate::error::{Error, Result};
use crate::protocol::{
    FirmwareFeatures, RX_BUFFER_SIZE, RxReader, ServerFeatures, ServerPacketType,
    is_handshake_reply,
};
use crate::sensor::{MAX_SENSORS, Sensor, SensorToggle};
use crate::transport::Transport;
use std::collections::{BTreeSet, VecDeque};
use std::net::SocketAddr;

/// Datagrams read from the transport per `update` call
pub const MAX_INBOUND_PER_UPDATE: usize = 16;

/// Server events kept until the host polls them
pub const MAX_PENDING_EVENTS: usize = 8;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No server, nothing sent yet or the server went silent
    #[default]
    Disconnected,
    /// Discovery handshake broadcast, waiting for a reply
    Discovering,
    /// Server replied and is still talking to us
    Connected,
}

/// Server request the session cannot act on by itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    /// Server asked the node to vibrate
    Vibrate,
    /// Server asked to switch a sensor option; `sensor_id` 255 means all
    SetConfigFlag {
        sensor_id: u8,
        toggle: SensorToggle,
        enabled: bool,
    },
}

/// Link counters, read with [`Session::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStats {
    pub packets_sent: u64,
    pub send_failures: u64,
    pub packets_received: u64,
    pub malformed_packets: u64,
    pub connects: u64,
    pub timeouts: u64,
}

/// Session with one tracking server
pub struct Session<T: Transport, C: Clock> {
    transport: T,
    clock: C,
    timing: TimingConfig,
    device: DeviceConfig,

    /// Address from configuration, restored by `reset`
    configured_server: SocketAddr,
    /// Where packets go: configured address or the last server that replied
    server: SocketAddr,

    state: ConnectionState,
    last_connection_attempt_at: Option<u64>,
    discovery_started_at: Option<u64>,
    last_packet_received_at: u64,
    last_heartbeat_at: Option<u64>,

    /// Last sequence number used, 0 before the first packet
    sequence: u64,
    tx: PacketBuffer,
    in_flight: bool,
    bundle: Option<BundleState>,

    negotiation: FeatureNegotiation,
    sync: SensorSyncCache,
    events: VecDeque<ServerEvent>,
    stats: LinkStats,
    /// Out-of-range sensor ids already warned about
    skipped_sensor_ids: BTreeSet<u8>,
}

impl<T: Transport, C: Clock> Session<T, C> {
    /// Create a disconnected session
    pub fn new(transport: T, clock: C, config: &LinkConfig) -> Self {
        let configured_server = config.server.socket_addr();
        let timing = config.timing.clone();
        Self {
            transport,
            clock,
            negotiation: FeatureNegotiation::new(
                timing.feature_max_attempts,
                timing.feature_retry_interval_ms,
            ),
            sync: SensorSyncCache::new(timing.sensor_info_interval_ms),
            timing,
            device: config.device.clone(),
            configured_server,
            server: configured_server,
            state: ConnectionState::Disconnected,
            last_connection_attempt_at: None,
            discovery_started_at: None,
            last_packet_received_at: 0,
            last_heartbeat_at: None,
            sequence: 0,
            tx: PacketBuffer::new(),
            in_flight: false,
            bundle: None,
            events: VecDeque::with_capacity(MAX_PENDING_EVENTS),
            stats: LinkStats::default(),
            skipped_sensor_ids: BTreeSet::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Last sequence number sent
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Current packet destination
    pub fn server_address(&self) -> SocketAddr {
        self.server
    }

    /// Features the server reported, empty until negotiated or after giving up
    pub fn server_features(&self) -> ServerFeatures {
        self.negotiation.features()
    }

    /// Feature negotiation progress for this connection
    pub fn negotiation(&self) -> &FeatureNegotiation {
        &self.negotiation
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Last state sent to the server for a sensor slot
    pub fn sync_record(&self, slot: usize) -> Option<SensorAckRecord> {
        self.sync.record(slot).copied()
    }

    /// Server config requests still waiting for the sensor
    pub fn pending_config_acks(&self) -> &[PendingConfigAck] {
        self.sync.pending_acks()
    }

    /// Oldest unhandled server event
    pub fn poll_event(&mut self) -> Option<ServerEvent> {
        self.events.pop_front()
    }

    /// Platform error code of the last transport failure
    pub fn last_transport_error(&self) -> Option<i32> {
        self.transport.last_error()
    }

    /// Run one tick of the session
    ///
    /// Reads pending datagrams, drives discovery or liveness, and sends
    /// heartbeats, feature requests, sensor info and config acks as they
    /// come due.
    pub fn update<S: Sensor>(&mut self, sensors: &[S]) {
        let now = self.clock.now_ms();

        if self.bundle.is_some() {
            log::warn!("Bundle left open across update, flushing");
            if let Err(e) = self.end_bundle() {
                log::debug!("Flushing stale bundle failed: {}", e);
            }
        }

        self.drain_inbound(now);

        match self.state {
            ConnectionState::Disconnected => self.search_for_server(now),
            ConnectionState::Discovering => {
                let started = self.discovery_started_at.unwrap_or(now);
                if now.saturating_sub(started) > self.timing.liveness_timeout_ms {
                    log::info!("No reply from {}, discovery timed out", self.server);
                    self.state = ConnectionState::Disconnected;
                    self.discovery_started_at = None;
                } else {
                    self.search_for_server(now);
                }
            }
            ConnectionState::Connected => {
                let silence = now.saturating_sub(self.last_packet_received_at);
                if silence > self.timing.liveness_timeout_ms {
                    log::warn!(
                        "Server {} silent for {} ms, disconnecting",
                        self.server,
                        silence
                    );
                    self.stats.timeouts += 1;
                    self.clear_session();
                    return;
                }
                self.maybe_send_heartbeat(now);
                self.maybe_request_feature_flags(now);
                self.update_sensor_state(sensors, now);
                self.flush_config_acks(sensors, now);
            }
        }
    }

    /// Drop the connection and forget the discovered server
    pub fn reset(&mut self) {
        if self.state != ConnectionState::Disconnected {
            log::info!("Session reset, leaving {}", self.server);
        }
        self.clear_session();
        self.server = self.configured_server;
    }

    fn clear_session(&mut self) {
        self.abort_bundle();
        self.in_flight = false;
        self.tx.clear();
        self.state = ConnectionState::Disconnected;
        self.last_connection_attempt_at = None;
        self.discovery_started_at = None;
        self.last_heartbeat_at = None;
        self.negotiation.reset();
        self.sync.reset();
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Broadcast discovery if the retry interval has passed
    fn search_for_server(&mut self, now: u64) {
        let due = match self.last_connection_attempt_at {
            None => true,
            Some(at) => now.saturating_sub(at) >= self.timing.connection_retry_ms,
        };
        if !due {
            return;
        }
        self.last_connection_attempt_at = Some(now);

        match self.send_tracker_discovery() {
            Ok(()) => log::debug!("Discovery sent to {}", self.server),
            Err(e) => log::debug!("Discovery to {} failed: {}", self.server, e),
        }

        if self.state == ConnectionState::Disconnected {
            log::info!("Searching for server at {}", self.server);
            self.state = ConnectionState::Discovering;
            self.discovery_started_at = Some(now);
        }
    }

    fn drain_inbound(&mut self, now: u64) {
        let mut rx = [0u8; RX_BUFFER_SIZE];
        for _ in 0..MAX_INBOUND_PER_UPDATE {
            match self.transport.receive(&mut rx) {
                Ok(Some((len, from))) => {
                    self.stats.packets_received += 1;
                    self.handle_datagram(&rx[..len], from, now);
                }
                Ok(None) => break,
                Err(e) => {
                    log::debug!("Receive failed: {}", e);
                    break;
                }
            }
        }
    }

    fn handle_datagram(&mut self, data: &[u8], from: SocketAddr, now: u64) {
        match self.state {
            ConnectionState::Connected => {}
            ConnectionState::Discovering if is_handshake_reply(data) => {
                self.on_handshake_reply(from, now);
                return;
            }
            state => {
                log::trace!("Ignoring {} bytes from {} while {:?}", data.len(), from, state);
                return;
            }
        }

        if from != self.server {
            log::trace!("Dropping datagram from {} (server is {})", from, self.server);
            return;
        }

        match self.dispatch(data) {
            Ok(()) => self.last_packet_received_at = now,
            Err(e) => {
                self.stats.malformed_packets += 1;
                log::debug!("Malformed packet from {}: {}", from, e);
            }
        }
    }

    fn on_handshake_reply(&mut self, from: SocketAddr, now: u64) {
        log::info!("Handshake with {} complete", from);
        self.server = from;
        self.state = ConnectionState::Connected;
        self.discovery_started_at = None;
        self.last_packet_received_at = now;
        self.last_heartbeat_at = Some(now);
        self.negotiation.reset();
        self.sync.reset();
        self.stats.connects += 1;
    }

    /// Handle one packet from the connected server
    fn dispatch(&mut self, data: &[u8]) -> Result<()> {
        let mut reader = RxReader::new(data);
        let id = reader.read_u8()?;
        let Some(kind) = ServerPacketType::from_id(id) else {
            return Err(Error::InvalidPacket(format!("unknown packet type {}", id)));
        };

        // Late duplicate of the discovery reply, carries no sequence
        if kind == ServerPacketType::Handshake {
            return Ok(());
        }
        let _sequence = reader.read_u64()?;

        match kind {
            ServerPacketType::Heartbeat => {
                if let Err(e) = self.send_heartbeat() {
                    log::debug!("Heartbeat reply failed: {}", e);
                }
            }
            ServerPacketType::Vibrate => self.push_event(ServerEvent::Vibrate),
            ServerPacketType::PingPong => {
                if let Err(e) = self.send_raw(data) {
                    log::debug!("Ping echo failed: {}", e);
                }
            }
            ServerPacketType::FeatureFlags => {
                let features = ServerFeatures::from_bytes(reader.remaining());
                if self.negotiation.on_reply(features) {
                    log::info!("Server features: {:#x}", features.bits());
                }
            }
            ServerPacketType::SetConfigFlag => {
                let sensor_id = reader.read_u8()?;
                let toggle_id = reader.read_u16()?;
                let enabled = reader.read_bool()?;
                let toggle = SensorToggle::from_id(toggle_id).ok_or_else(|| {
                    Error::InvalidPacket(format!("unknown sensor toggle {}", toggle_id))
                })?;

                log::info!(
                    "Server set {:?}={} on sensor {}",
                    toggle,
                    enabled,
                    sensor_id
                );
                self.push_event(ServerEvent::SetConfigFlag {
                    sensor_id,
                    toggle,
                    enabled,
                });
                let requested_at = self.clock.now_ms();
                if !self.sync.add_pending_ack(PendingConfigAck {
                    sensor_id,
                    toggle,
                    enabled,
                    requested_at,
                }) {
                    log::warn!("Too many pending config requests, dropped the oldest");
                }
            }
            ServerPacketType::Command | ServerPacketType::Config | ServerPacketType::SensorInfo => {
                log::debug!("Ignoring {:?} packet ({} bytes)", kind, data.len());
            }
            ServerPacketType::Handshake => {}
        }
        Ok(())
    }

    fn push_event(&mut self, event: ServerEvent) {
        if self.events.len() >= MAX_PENDING_EVENTS {
            if let Some(dropped) = self.events.pop_front() {
                log::warn!("Event queue full, dropping {:?}", dropped);
            }
        }
        self.events.push_back(event);
    }

    fn maybe_send_heartbeat(&mut self, now: u64) {
        let due = match self.last_heartbeat_at {
            None => true,
            Some(at) => now.saturating_sub(at) >= self.timing.heartbeat_interval_ms,
        };
        if !due {
            return;
        }
        self.last_heartbeat_at = Some(now);
        if let Err(e) = self.send_heartbeat() {
            log::debug!("Heartbeat failed: {}", e);
        }
    }

    fn maybe_request_feature_flags(&mut self, now: u64) {
        if self.negotiation.should_request(now) {
            // Counts even when the send fails
            self.negotiation.record_request(now);
            if let Err(e) = self.send_feature_flags(&FirmwareFeatures::present()) {
                log::debug!(
                    "Feature flag request {} failed: {}",
                    self.negotiation.attempts(),
                    e
                );
            }
        }
        if self.negotiation.take_gave_up() {
            log::warn!(
                "Server sent no feature flags after {} requests, assuming none",
                self.negotiation.attempts()
            );
        }
    }

    /// Send sensor info for every sensor whose state differs from what the
    /// server last heard
    fn update_sensor_state<S: Sensor>(&mut self, sensors: &[S], now: u64) {
        for sensor in sensors {
            let slot = sensor.id() as usize;
            if slot >= MAX_SENSORS {
                if self.skipped_sensor_ids.insert(sensor.id()) {
                    log::warn!(
                        "Skipping sensor: {} (max {})",
                        Error::InvalidSensorId(sensor.id()),
                        MAX_SENSORS - 1
                    );
                }
                continue;
            }

            let live = LiveState::of(sensor);
            if self.sync.evaluate(slot, &live, now) != SyncAction::Send {
                continue;
            }
            match self.send_sensor_info(sensor) {
                Ok(()) => self.sync.record_sent(slot, &live, now),
                Err(e) => log::debug!("Sensor info for {} failed: {}", slot, e),
            }
        }
    }

    /// Acknowledge config requests the sensors have applied, expire the rest
    fn flush_config_acks<S: Sensor>(&mut self, sensors: &[S], now: u64) {
        let mut i = 0;
        while let Some(ack) = self.sync.pending_acks().get(i).copied() {
            if now.saturating_sub(ack.requested_at) >= self.timing.config_ack_timeout_ms {
                log::warn!(
                    "Sensor {} never applied {:?}={}, dropping request",
                    ack.sensor_id,
                    ack.toggle,
                    ack.enabled
                );
                self.sync.remove_pending_ack(i);
                continue;
            }

            if config_applied(sensors, &ack) {
                match self.send_acknowledge_config_change(ack.sensor_id, ack.toggle) {
                    Ok(()) => {
                        self.sync.remove_pending_ack(i);
                        continue;
                    }
                    Err(e) => log::debug!("Config ack for {} failed: {}", ack.sensor_id, e),
                }
            }
            i += 1;
        }
    }
}

/// Whether the sensors' live config bits reflect a server request
fn config_applied<S: Sensor>(sensors: &[S], ack: &PendingConfigAck) -> bool {
    let matches = |s: &S| s.config_bits().is_enabled(ack.toggle) == ack.enabled;
    if ack.sensor_id == crate::protocol::NODE_SENSOR_ID {
        !sensors.is_empty() && sensors.iter().all(matches)
    } else {
        sensors
            .iter()
            .find(|s| s.id() == ack.sensor_id)
            .is_some_and(matches)
    }
}
