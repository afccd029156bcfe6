// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP receiver subsystem: socket gateway, packet pool, reader loops,
//! worker dispatch pool, and lifecycle control.
//!
//! # Architecture
//!
//! ```text
//! UdpSocket --recv_from--> reader loop (xN) --try_send--> worker pool (xM)
//!                              |                              |
//!                         PacketPool <----release------- DispatchTask
//!                              |                              |
//!                         try_acquire                  DispatchHandler
//! ```
//!
//! Every datagram travels in a pooled buffer: a reader acquires it,
//! `recv_from` fills it, a [`DispatchTask`] carries it to a worker, and
//! the task releases it back to the pool on every completion path.
//! A saturated worker queue rejects the submission synchronously; the
//! reader releases the buffer, counts the rejection, and keeps reading.

pub mod dispatch;
pub mod pool;
pub mod socket;
pub mod udp;

mod latch;
mod reader;
mod stats;

pub use dispatch::{DispatchHandler, DispatchTask};
pub use pool::{PacketBuf, PacketPool};
pub use socket::{RecvOutcome, UdpGateway};
pub use stats::StatsSnapshot;
pub use udp::{LifecycleState, UdpReceiver, UdpReceiverBuilder};

use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Errors returned by receiver operations.
#[derive(Debug)]
pub enum Error {
    /// Builder finished without a dispatch handler.
    MissingDispatchHandler,
    /// Builder finished without a metrics sink.
    MissingMetricsSink,
    /// A configuration value is out of range (zero thread or queue counts).
    InvalidConfig(String),
    /// Socket creation or option setup failed before bind.
    SocketSetup(io::Error),
    /// Binding the UDP socket failed (address in use, permission denied,
    /// invalid address). Fatal: `start()` aborts before launching threads.
    BindFailed {
        /// The requested bind target.
        addr: SocketAddr,
        /// The underlying OS error.
        source: io::Error,
    },
    /// Spawning a reader or worker thread failed.
    ThreadSpawn(io::Error),
    /// Operation attempted in the wrong lifecycle state.
    InvalidState {
        /// The rejected operation.
        operation: &'static str,
        /// The state the receiver was in.
        state: LifecycleState,
    },
    /// The external dispatch handler reported a failure.
    Dispatch(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDispatchHandler => {
                write!(f, "dispatch handler is required but was not provided")
            }
            Self::MissingMetricsSink => {
                write!(f, "metrics sink is required but was not provided")
            }
            Self::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            Self::SocketSetup(err) => write!(f, "socket setup failed: {}", err),
            Self::BindFailed { addr, source } => {
                write!(f, "failed to bind UDP socket to {}: {}", addr, source)
            }
            Self::ThreadSpawn(err) => write!(f, "failed to spawn thread: {}", err),
            Self::InvalidState { operation, state } => {
                write!(f, "{} not allowed in state {}", operation, state)
            }
            Self::Dispatch(reason) => write!(f, "dispatch failed: {}", reason),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SocketSetup(err) | Self::ThreadSpawn(err) => Some(err),
            Self::BindFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result alias for receiver operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_bind_target() {
        let err = Error::BindFailed {
            addr: "127.0.0.1:9995".parse().expect("valid address"),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        let text = err.to_string();
        assert!(text.contains("127.0.0.1:9995"));
        assert!(text.contains("in use"));
    }

    #[test]
    fn error_source_is_preserved() {
        use std::error::Error as _;

        let err = Error::SocketSetup(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(err.source().is_some());
        assert!(Error::MissingMetricsSink.source().is_none());
    }
}
