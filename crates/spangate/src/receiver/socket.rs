// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP socket gateway: bind, receive-with-timeout, idempotent close.
//!
//! The socket is shared for reads across all reader threads and is the
//! one resource intentionally closed out from under them: `close()` is
//! the mechanism that unblocks readers parked in `recv_from` at shutdown
//! time, bounded by the [`RECEIVE_TIMEOUT`] as the portable fallback.

use super::pool::PacketBuf;
use super::{Error, Result};
use crate::config::RECEIVE_TIMEOUT;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Outcome of a single receive attempt.
#[derive(Debug)]
pub enum RecvOutcome {
    /// A datagram was received into the buffer (may be zero-length).
    Datagram {
        /// Payload length in bytes.
        len: usize,
        /// Sender address.
        source: SocketAddr,
    },
    /// The receive timeout elapsed with no data. Expected, not an error.
    TimedOut,
    /// The gateway was closed; the caller should stop receiving.
    Closed,
    /// An I/O error occurred while the gateway was open.
    Failed(io::Error),
}

/// Owns the bound UDP socket.
pub struct UdpGateway {
    socket: UdpSocket,
    local_addr: SocketAddr,
    closed: AtomicBool,
}

impl UdpGateway {
    /// Create and bind the receive socket.
    ///
    /// The OS receive-buffer size is a best-effort hint: a clamped value
    /// is logged as a warning and the gateway continues with whatever
    /// the OS assigned. Bind failure is fatal and propagates to the
    /// caller.
    pub fn bind(address: IpAddr, port: u16, receive_buffer_size: usize) -> Result<Self> {
        Self::bind_with_timeout(address, port, receive_buffer_size, RECEIVE_TIMEOUT)
    }

    pub(crate) fn bind_with_timeout(
        address: IpAddr,
        port: u16,
        receive_buffer_size: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let target = SocketAddr::new(address, port);

        let socket = Socket::new(Domain::for_address(target), Type::DGRAM, Some(Protocol::UDP))
            .map_err(Error::SocketSetup)?;
        socket
            .set_recv_buffer_size(receive_buffer_size)
            .map_err(Error::SocketSetup)?;
        let actual = socket.recv_buffer_size().map_err(Error::SocketSetup)?;
        if actual != receive_buffer_size {
            log::warn!(
                "[udp] SO_RCVBUF adjusted by OS: requested {} got {}",
                receive_buffer_size,
                actual
            );
        }
        socket
            .set_read_timeout(Some(timeout))
            .map_err(Error::SocketSetup)?;

        socket.bind(&target.into()).map_err(|source| Error::BindFailed {
            addr: target,
            source,
        })?;

        let socket: UdpSocket = socket.into();
        let local_addr = socket.local_addr().map_err(Error::SocketSetup)?;
        log::debug!("[udp] bound {} (SO_RCVBUF {})", local_addr, actual);

        Ok(Self {
            socket,
            local_addr,
            closed: AtomicBool::new(false),
        })
    }

    /// The address the socket is actually bound to (resolves port 0).
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Block until a datagram arrives, the timeout elapses, or the
    /// gateway is closed.
    ///
    /// The closed flag is re-checked after `recv_from` returns so that
    /// close-induced wakeups (zero-byte reads, address-conversion
    /// artifacts) surface as `Closed` rather than as data or errors.
    pub fn receive(&self, buf: &mut PacketBuf) -> RecvOutcome {
        if self.is_closed() {
            return RecvOutcome::Closed;
        }

        let result = self.socket.recv_from(buf.storage_mut());

        if self.is_closed() {
            return RecvOutcome::Closed;
        }

        match result {
            Ok((len, source)) => {
                buf.record(len, source);
                RecvOutcome::Datagram { len, source }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                RecvOutcome::TimedOut
            }
            Err(err) => RecvOutcome::Failed(err),
        }
    }

    /// Close the gateway. Idempotent and safe to call while other
    /// threads are blocked in [`receive`](Self::receive).
    ///
    /// On Unix this also shuts down the read side of the socket so
    /// parked readers wake immediately instead of waiting out the
    /// receive timeout.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("[udp] closing {}", self.local_addr);
        self.shutdown_read();
    }

    #[cfg(unix)]
    fn shutdown_read(&self) {
        use std::os::unix::io::AsRawFd;
        // SAFETY: shutdown(2) on the fd owned by self.socket; for an
        // unconnected datagram socket the kernel returns ENOTCONN but
        // still sets RCV_SHUTDOWN, which wakes blocked readers.
        let _ = unsafe { libc::shutdown(self.socket.as_raw_fd(), libc::SHUT_RD) };
    }

    #[cfg(not(unix))]
    fn shutdown_read(&self) {
        // Readers fall back to the receive timeout to observe the flag.
    }
}
