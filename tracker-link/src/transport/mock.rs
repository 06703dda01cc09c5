//! Mock transport for testing

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

/// Error code reported by `last_error` after an injected failure
pub const MOCK_WRITE_ERROR: i32 = -1;

/// In-memory transport for unit and integration tests
///
/// Cloning yields another handle to the same state, so a test can keep one
/// handle while the session owns the other.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    inbound: VecDeque<(Vec<u8>, SocketAddr)>,
    staged: Vec<u8>,
    sent: Vec<(Vec<u8>, SocketAddr)>,
    fail_writes: bool,
    fail_flushes: bool,
    busy: bool,
    last_error: Option<i32>,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a datagram to be returned by `receive`
    pub fn inject(&self, data: &[u8], from: SocketAddr) {
        self.inner.lock().inbound.push_back((data.to_vec(), from));
    }

    /// All datagrams flushed so far
    pub fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        self.inner.lock().sent.clone()
    }

    /// Payloads of all datagrams flushed so far
    pub fn sent_datagrams(&self) -> Vec<Vec<u8>> {
        self.inner
            .lock()
            .sent
            .iter()
            .map(|(data, _)| data.clone())
            .collect()
    }

    /// Remove and return everything flushed so far
    pub fn take_sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
        std::mem::take(&mut self.inner.lock().sent)
    }

    /// Bytes staged but not yet flushed
    pub fn staged(&self) -> Vec<u8> {
        self.inner.lock().staged.clone()
    }

    /// Make every `write` fail until cleared
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Make every `flush` fail until cleared
    pub fn set_fail_flushes(&self, fail: bool) {
        self.inner.lock().fail_flushes = fail;
    }

    /// Report the transport as unable to take a write until cleared
    pub fn set_busy(&self, busy: bool) {
        self.inner.lock().busy = busy;
    }
}

impl Transport for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            inner.last_error = Some(MOCK_WRITE_ERROR);
            return Err(Error::Transport("injected write failure".into()));
        }
        inner.staged.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self, target: SocketAddr) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_flushes {
            inner.last_error = Some(MOCK_WRITE_ERROR);
            return Err(Error::Transport("injected flush failure".into()));
        }
        let datagram = std::mem::take(&mut inner.staged);
        inner.sent.push((datagram, target));
        Ok(())
    }

    fn discard(&mut self) {
        self.inner.lock().staged.clear();
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        let mut inner = self.inner.lock();
        let Some((data, from)) = inner.inbound.pop_front() else {
            return Ok(None);
        };
        let len = data.len().min(buffer.len());
        buffer[..len].copy_from_slice(&data[..len]);
        Ok(Some((len, from)))
    }

    fn can_write(&self) -> bool {
        !self.inner.lock().busy
    }

    fn last_error(&self) -> Option<i32> {
        self.inner.lock().last_error
    }
}
