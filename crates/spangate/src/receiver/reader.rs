// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking reader loop (one per reader thread).

use super::dispatch::DispatchTask;
use super::pool::PacketPool;
use super::socket::{RecvOutcome, UdpGateway};
use super::stats::ReceiverStats;
use crate::config::REJECTION_LOG_INTERVAL;
use crate::metrics::MetricsSink;
use crossbeam::channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// State shared by one reader thread.
pub(crate) struct ReaderLoop {
    pub(crate) gateway: Arc<UdpGateway>,
    pub(crate) pool: Arc<PacketPool>,
    pub(crate) tx: Sender<DispatchTask>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) stats: Arc<ReceiverStats>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
    /// Receiver-wide rejection count, shared across readers for sampled
    /// logging. Diagnostics only, never control flow.
    pub(crate) rejected: Arc<AtomicU64>,
    pub(crate) rejected_name: Arc<str>,
}

impl ReaderLoop {
    /// Run until the run-state flag clears, the socket closes, or a
    /// zero-length datagram arrives.
    ///
    /// The zero-length exit retires only this reader instance while the
    /// rest keep serving. Under review: a zero-length probe silently
    /// reduces read parallelism, which is probably not what anyone
    /// sending a keep-alive expects.
    pub(crate) fn run(self) {
        let thread = std::thread::current();
        let name = thread.name().unwrap_or("<reader>");
        log::info!(
            "[reader] start local_addr={} thread={}",
            self.gateway.local_addr(),
            name
        );

        while self.running.load(Ordering::Acquire) {
            let mut buf = match self.pool.try_acquire() {
                Some(buf) => buf,
                None => {
                    self.stats.pool_exhausted_drops.fetch_add(1, Ordering::Relaxed);
                    log::error!("[reader] packet pool exhausted; skipping receive");
                    std::thread::yield_now();
                    continue;
                }
            };

            match self.gateway.receive(&mut buf) {
                RecvOutcome::TimedOut => {
                    self.pool.release(buf);
                }
                RecvOutcome::Closed => {
                    self.pool.release(buf);
                    break;
                }
                RecvOutcome::Failed(err) => {
                    self.pool.release(buf);
                    if self.running.load(Ordering::Acquire) {
                        self.stats.io_errors.fetch_add(1, Ordering::Relaxed);
                        log::error!("[reader] receive failed: {}", err);
                    }
                    // During shutdown this is the expected consequence of
                    // the socket being closed underneath us.
                }
                RecvOutcome::Datagram { len: 0, source } => {
                    self.pool.release(buf);
                    self.stats.zero_length_datagrams.fetch_add(1, Ordering::Relaxed);
                    log::debug!(
                        "[reader] zero-length datagram from {}; reader {} exiting",
                        source,
                        name
                    );
                    break;
                }
                RecvOutcome::Datagram { len, source } => {
                    self.stats.packets_received.fetch_add(1, Ordering::Relaxed);
                    self.stats.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
                    log::debug!("[reader] recv len={} src={}", len, source);
                    self.submit(DispatchTask::new(buf, source));
                }
            }
        }

        log::info!(
            "[reader] stop local_addr={} thread={}",
            self.gateway.local_addr(),
            name
        );
    }

    fn submit(&self, task: DispatchTask) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task) | TrySendError::Disconnected(task)) => {
                self.pool.release(task.into_buf());
                self.stats.dispatch_rejections.fetch_add(1, Ordering::Relaxed);
                self.metrics.increment_counter(&self.rejected_name, 1);
                let total = self.rejected.fetch_add(1, Ordering::Relaxed) + 1;
                if total % REJECTION_LOG_INTERVAL == 0 {
                    log::warn!(
                        "[reader] dispatch pool saturated; {} submissions rejected",
                        total
                    );
                }
            }
        }
    }
}
