// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Spangate global configuration - single source of truth.
//!
//! This module centralizes the receiver constants and the immutable
//! [`ReceiverConfig`] value. **NEVER hardcode elsewhere!**

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Largest payload a single UDP datagram can carry (65535 - 8 byte UDP
/// header - 20 byte IP header).
///
/// Every pooled receive buffer is this size: the wire format of agent
/// payloads is opaque to the receiver, so the buffer must accommodate the
/// worst case instead of allocating per datagram.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Socket receive timeout (`SO_RCVTIMEO`).
///
/// Reader threads block in `recv_from` for at most this long, then
/// re-check the run-state flag. This is the cooperative-shutdown bound:
/// no dedicated wake mechanism is needed beyond closing the socket.
pub const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on awaiting each thread group during shutdown.
///
/// After this deadline shutdown proceeds and leaves stragglers detached.
pub const SHUTDOWN_AWAIT: Duration = Duration::from_secs(10);

/// Default number of worker threads in the dispatch pool.
pub const DEFAULT_WORKER_THREADS: usize = 128;

/// Default capacity of the bounded dispatch queue.
pub const DEFAULT_WORKER_QUEUE_CAPACITY: usize = 1024;

/// Default `SO_RCVBUF` hint passed to the OS at bind time (best-effort).
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Sampling interval for dispatch-rejection warnings.
///
/// Under sustained overload a warning per rejection is a log storm; one
/// line per `REJECTION_LOG_INTERVAL` rejections is enough to alert.
pub const REJECTION_LOG_INTERVAL: u64 = 100;

/// Default reader-thread count: one blocking reader per logical CPU.
///
/// Raising this beyond the CPU count buys little; the readers spend
/// their time parked in the kernel.
#[must_use]
pub fn default_reader_threads() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1)
}

/// Immutable receiver configuration.
///
/// Created once by [`UdpReceiverBuilder`](crate::UdpReceiverBuilder) and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Label used for diagnostics, metric names, and thread names.
    pub name: String,
    /// UDP bind address.
    pub bind_address: IpAddr,
    /// UDP bind port.
    pub port: u16,
    /// Requested OS socket receive-buffer size (best-effort; the OS may
    /// clamp it, which is logged as a warning).
    pub receive_buffer_size: usize,
    /// Worker threads in the dispatch pool.
    pub worker_threads: usize,
    /// Capacity of the bounded dispatch queue.
    pub worker_queue_capacity: usize,
    /// Number of parallel reader loops.
    pub reader_threads: usize,
}

impl ReceiverConfig {
    /// Packet pool capacity: `worker_threads + worker_queue_capacity +
    /// reader_threads`.
    ///
    /// This sizing is an invariant, not a default. It covers every
    /// datagram that can simultaneously be queued for a worker, held by
    /// an executing worker, and filled by a reader's next receive, so
    /// pool exhaustion never occurs under correctly-bounded load.
    #[must_use]
    pub fn pool_capacity(&self) -> usize {
        self.worker_threads + self.worker_queue_capacity + self.reader_threads
    }

    /// Bind target as a socket address.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
