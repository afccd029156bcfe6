// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Receiver-internal diagnostic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Shared counters updated by reader and worker threads.
///
/// These are diagnostics only; nothing reads them for control flow.
#[derive(Debug, Default)]
pub(crate) struct ReceiverStats {
    /// Datagrams received (any length).
    pub(crate) packets_received: AtomicU64,
    /// Payload bytes received.
    pub(crate) bytes_received: AtomicU64,
    /// Receive iterations skipped because the pool was empty.
    pub(crate) pool_exhausted_drops: AtomicU64,
    /// Submissions rejected by the saturated worker queue.
    pub(crate) dispatch_rejections: AtomicU64,
    /// Datagrams handed to the dispatch handler successfully.
    pub(crate) dispatched: AtomicU64,
    /// Dispatch handler errors and panics.
    pub(crate) handler_errors: AtomicU64,
    /// Zero-length datagrams (each one retires a reader instance).
    pub(crate) zero_length_datagrams: AtomicU64,
    /// I/O errors observed while running (shutdown-induced excluded).
    pub(crate) io_errors: AtomicU64,
}

impl ReceiverStats {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            pool_exhausted_drops: self.pool_exhausted_drops.load(Ordering::Relaxed),
            dispatch_rejections: self.dispatch_rejections.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
            handler_errors: self.handler_errors.load(Ordering::Relaxed),
            zero_length_datagrams: self.zero_length_datagrams.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the receiver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub pool_exhausted_drops: u64,
    pub dispatch_rejections: u64,
    pub dispatched: u64,
    pub handler_errors: u64,
    pub zero_length_datagrams: u64,
    pub io_errors: u64,
}
