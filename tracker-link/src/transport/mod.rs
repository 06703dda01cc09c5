//! Transport layer for datagram I/O abstraction
//!
//! The session assembles each datagram in its own buffer and hands it over in
//! one `write` followed by `flush`. Every call must return immediately: the
//! session runs on a single polling loop and never waits on I/O.

use crate::error::Result;
use std::net::SocketAddr;

mod mock;
mod udp;
pub use mock::MockTransport;
pub use udp::UdpTransport;

/// Non-blocking datagram transport
pub trait Transport {
    /// Stage bytes for the datagram being assembled, returns bytes accepted
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Send the staged bytes to `target` as one datagram
    fn flush(&mut self, target: SocketAddr) -> Result<()>;

    /// Drop staged bytes without sending them
    fn discard(&mut self);

    /// Receive one pending datagram into `buffer`
    ///
    /// Returns `None` when nothing is waiting. Datagrams longer than `buffer`
    /// are truncated.
    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<(usize, SocketAddr)>>;

    /// Whether a new datagram can be staged right now
    fn can_write(&self) -> bool {
        true
    }

    /// Platform error code of the last failed write or flush, if any
    fn last_error(&self) -> Option<i32> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn flush(&mut self, target: SocketAddr) -> Result<()> {
        (**self).flush(target)
    }

    fn discard(&mut self) {
        (**self).discard()
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        (**self).receive(buffer)
    }

    fn can_write(&self) -> bool {
        (**self).can_write()
    }

    fn last_error(&self) -> Option<i32> {
        (**self).last_error()
    }
}
