//! Packet framing, sequence numbers and bundling
//!
//! Every outgoing packet goes through [`Session::send_packet`]: open the
//! buffer, write type and sequence, let the caller's closure write the body,
//! hand the datagram to the transport. The first failing write aborts the
//! packet and nothing reaches the wire. The sequence counter only advances
//! once the transport has taken the datagram.
//!
//! While a bundle is open the same call appends a length-prefixed sub-frame to
//! the bundle instead. Sub-frames share the bundle's sequence number.

use super::Session;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::protocol::{PacketType, TX_BUFFER_SIZE, TxBuffer};
use crate::transport::Transport;
use std::net::SocketAddr;

/// Outgoing buffer type used for every packet
pub type PacketBuffer = TxBuffer<TX_BUFFER_SIZE>;

/// Open bundle bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleState {
    /// Sequence number carried by the envelope
    pub sequence: u64,
    /// Offset of the reserved inner-count field
    pub cursor: usize,
    /// Sub-frames appended so far
    pub inner_count: u16,
}

impl<T: Transport, C: Clock> Session<T, C> {
    /// Frame and send one packet
    ///
    /// `sequence_override` replaces the next counter value and leaves the
    /// counter untouched. Inside a bundle the sequence is not written at all.
    pub(crate) fn send_packet<F>(
        &mut self,
        kind: PacketType,
        sequence_override: Option<u64>,
        body: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut PacketBuffer) -> Result<()>,
    {
        if self.bundle.is_some() {
            return self.append_to_bundle(kind, body);
        }

        self.begin_packet()?;
        let sequence = sequence_override.unwrap_or(self.sequence + 1);
        if let Err(e) = write_frame(&mut self.tx, kind, sequence, body) {
            log::debug!("Aborting {:?} packet: {}", kind, e);
            self.abort_packet();
            return Err(e);
        }
        self.end_packet()?;

        if sequence_override.is_none() {
            self.sequence = sequence;
        }
        if log::log_enabled!(log::Level::Trace) {
            log::trace!("TX {:?} seq={} to {}", kind, sequence, self.server);
        }
        Ok(())
    }

    /// Send raw bytes as one datagram, no framing
    pub(crate) fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.begin_packet()?;
        if let Err(e) = self.tx.write_bytes(bytes) {
            self.abort_packet();
            return Err(e);
        }
        self.end_packet()
    }

    /// Start a bundle
    ///
    /// Fails if a bundle is already open (the open one is kept) or the
    /// session is not connected.
    pub fn begin_bundle(&mut self) -> Result<()> {
        if self.bundle.is_some() {
            log::debug!("begin_bundle: bundle already active");
            return Err(Error::BundleActive);
        }
        self.ensure_connected()?;
        self.begin_packet()?;

        let sequence = self.sequence + 1;
        match write_bundle_header(&mut self.tx, sequence) {
            Ok(cursor) => {
                self.bundle = Some(BundleState {
                    sequence,
                    cursor,
                    inner_count: 0,
                });
                Ok(())
            }
            Err(e) => {
                self.abort_packet();
                Err(e)
            }
        }
    }

    /// Close the open bundle and send it
    ///
    /// An empty bundle is still sent as a valid envelope with count 0.
    pub fn end_bundle(&mut self) -> Result<()> {
        let Some(bundle) = self.bundle.take() else {
            log::debug!("end_bundle: no active bundle");
            return Err(Error::NoBundle);
        };

        if let Err(e) = self.tx.patch_u16(bundle.cursor, bundle.inner_count) {
            self.abort_packet();
            return Err(e);
        }
        self.end_packet()?;
        self.sequence = bundle.sequence;

        log::trace!(
            "TX bundle seq={} with {} packets",
            bundle.sequence,
            bundle.inner_count
        );
        Ok(())
    }

    /// Whether a bundle is currently open
    pub fn is_bundling(&self) -> bool {
        self.bundle.is_some()
    }

    /// Sub-frames in the open bundle, if any
    pub fn bundle_state(&self) -> Option<BundleState> {
        self.bundle
    }

    /// Drop an open bundle without sending it
    pub(crate) fn abort_bundle(&mut self) {
        if self.bundle.take().is_some() {
            self.abort_packet();
        }
    }

    /// Claim the outgoing buffer
    pub(crate) fn begin_packet(&mut self) -> Result<()> {
        if self.in_flight {
            log::error!("begin_packet called while another packet is open");
            return Err(Error::PacketInProgress);
        }
        if !self.transport.can_write() {
            return Err(Error::TransportBusy);
        }
        self.tx.clear();
        self.in_flight = true;
        Ok(())
    }

    /// Hand the assembled datagram to the transport and release the buffer
    pub(crate) fn end_packet(&mut self) -> Result<()> {
        if !self.in_flight {
            return Err(Error::NoPacketInProgress);
        }
        self.in_flight = false;

        let result = flush_datagram(&mut self.transport, self.tx.as_bytes(), self.server);
        self.tx.clear();

        match result {
            Ok(()) => {
                self.stats.packets_sent += 1;
                Ok(())
            }
            Err(e) => {
                self.transport.discard();
                self.stats.send_failures += 1;
                log::debug!(
                    "Send to {} failed: {} (transport error {:?})",
                    self.server,
                    e,
                    self.transport.last_error()
                );
                Err(e)
            }
        }
    }

    /// Release the buffer without sending anything
    pub(crate) fn abort_packet(&mut self) {
        self.in_flight = false;
        self.tx.clear();
        self.transport.discard();
    }

    fn append_to_bundle<F>(&mut self, kind: PacketType, body: F) -> Result<()>
    where
        F: FnOnce(&mut PacketBuffer) -> Result<()>,
    {
        let start = self.tx.len();
        if let Err(e) = write_sub_frame(&mut self.tx, kind, body) {
            self.tx.truncate(start);
            return Err(e);
        }
        if let Some(bundle) = self.bundle.as_mut() {
            bundle.inner_count += 1;
        }
        Ok(())
    }
}

fn write_frame<F>(tx: &mut PacketBuffer, kind: PacketType, sequence: u64, body: F) -> Result<()>
where
    F: FnOnce(&mut PacketBuffer) -> Result<()>,
{
    tx.write_u8(kind.id())?;
    tx.write_u64(sequence)?;
    body(tx)
}

fn write_sub_frame<F>(tx: &mut PacketBuffer, kind: PacketType, body: F) -> Result<()>
where
    F: FnOnce(&mut PacketBuffer) -> Result<()>,
{
    let len_at = tx.reserve_u16()?;
    tx.write_u8(kind.id())?;
    body(tx)?;
    // TX_BUFFER_SIZE is well below u16::MAX
    let frame_len = (tx.len() - len_at - 2) as u16;
    tx.patch_u16(len_at, frame_len)
}

fn write_bundle_header(tx: &mut PacketBuffer, sequence: u64) -> Result<usize> {
    tx.write_u8(PacketType::Bundle.id())?;
    tx.write_u64(sequence)?;
    tx.reserve_u16()
}

fn flush_datagram<T: Transport>(transport: &mut T, bytes: &[u8], target: SocketAddr) -> Result<()> {
    let written = transport.write(bytes)?;
    if written != bytes.len() {
        return Err(Error::ShortWrite {
            expected: bytes.len(),
            written,
        });
    }
    transport.flush(target)
}
