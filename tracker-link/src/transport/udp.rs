//! UDP transport for talking to the tracking server
//!
//! Wraps a non-blocking `std::net::UdpSocket` with broadcast enabled, so the
//! same socket serves discovery (sent to 255.255.255.255) and the unicast
//! session that follows.
//!
//! Bytes handed to `write` are staged in a pre-allocated buffer and leave the
//! socket as a single `send_to` on `flush`. A would-block on send is reported
//! as a failure: the caller drops the packet and sends fresh data next tick.

use super::Transport;
use crate::error::{Error, Result};
use crate::protocol::TX_BUFFER_SIZE;
use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};

/// Non-blocking UDP transport
pub struct UdpTransport {
    socket: UdpSocket,
    staged: Vec<u8>,
    last_error: Option<i32>,
}

impl UdpTransport {
    /// Bind a socket on `bind_addr` (e.g. "0.0.0.0:0")
    pub fn bind(bind_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        socket.set_broadcast(true)?;

        log::info!("UDP transport bound to {}", socket.local_addr()?);

        Ok(Self {
            socket,
            staged: Vec::with_capacity(TX_BUFFER_SIZE),
            last_error: None,
        })
    }

    /// Local address the socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    fn record(&mut self, e: std::io::Error) -> Error {
        self.last_error = e.raw_os_error();
        Error::Io(e)
    }
}

impl Transport for UdpTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        self.staged.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self, target: SocketAddr) -> Result<()> {
        let result = self.socket.send_to(&self.staged, target);
        let expected = self.staged.len();
        self.staged.clear();

        match result {
            Ok(written) if written == expected => Ok(()),
            Ok(written) => Err(Error::ShortWrite { expected, written }),
            Err(e) => Err(self.record(e)),
        }
    }

    fn discard(&mut self) {
        self.staged.clear();
    }

    fn receive(&mut self, buffer: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buffer) {
            Ok((len, from)) => Ok(Some((len, from))),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            // ICMP port unreachable from an earlier send surfaces here on some platforms
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                log::debug!("UDP receive: {}", e);
                Ok(None)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn last_error(&self) -> Option<i32> {
        self.last_error
    }
}
