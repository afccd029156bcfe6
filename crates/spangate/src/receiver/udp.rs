// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! UDP receiver assembly and lifecycle control.
//!
//! [`UdpReceiver`] wires the socket gateway, packet pool, reader loops,
//! and worker dispatch pool together and owns the lifecycle:
//!
//! ```text
//! Uninitialized -> Running -> Stopping -> Stopped
//! ```
//!
//! The state machine is linear; `Stopped` is terminal. `start()` binds
//! the socket before launching any thread, so a bind failure aborts
//! startup cleanly. `shutdown()` flips the run-state flag, closes the
//! socket out from under blocked readers, then awaits the reader group
//! and the worker group, in that order, each within a bounded deadline.

use super::dispatch::{DispatchHandler, WorkerPool};
use super::latch::ShutdownLatch;
use super::pool::PacketPool;
use super::reader::ReaderLoop;
use super::socket::UdpGateway;
use super::stats::{ReceiverStats, StatsSnapshot};
use super::{Error, Result};
use crate::config::{
    default_reader_threads, ReceiverConfig, DEFAULT_RECEIVE_BUFFER_SIZE,
    DEFAULT_WORKER_QUEUE_CAPACITY, DEFAULT_WORKER_THREADS, SHUTDOWN_AWAIT,
};
use crate::metrics::MetricsSink;
use parking_lot::Mutex;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Receiver lifecycle states (linear, `Stopped` is terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed, not yet started.
    Uninitialized = 0,
    /// Accepting traffic.
    Running = 1,
    /// Shutdown in progress.
    Stopping = 2,
    /// Shut down, or startup failed. Terminal.
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Uninitialized => "uninitialized",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        write!(f, "{}", label)
    }
}

/// Builder for [`UdpReceiver`].
///
/// The dispatch handler and metrics sink are required collaborators;
/// `build()` fails without them. Everything else has a default.
pub struct UdpReceiverBuilder {
    name: String,
    bind_address: IpAddr,
    port: u16,
    receive_buffer_size: usize,
    worker_threads: usize,
    worker_queue_capacity: usize,
    reader_threads: usize,
    handler: Option<Arc<dyn DispatchHandler>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl UdpReceiverBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            bind_address: Ipv4Addr::UNSPECIFIED.into(),
            port: 0,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            worker_threads: DEFAULT_WORKER_THREADS,
            worker_queue_capacity: DEFAULT_WORKER_QUEUE_CAPACITY,
            reader_threads: default_reader_threads(),
            handler: None,
            metrics: None,
        }
    }

    /// Bind target. Port 0 lets the OS pick an ephemeral port.
    #[must_use]
    pub fn bind(mut self, address: IpAddr, port: u16) -> Self {
        self.bind_address = address;
        self.port = port;
        self
    }

    /// Requested OS socket receive-buffer size (best-effort hint).
    #[must_use]
    pub fn receive_buffer_size(mut self, bytes: usize) -> Self {
        self.receive_buffer_size = bytes;
        self
    }

    /// Worker threads in the dispatch pool.
    #[must_use]
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.worker_threads = count;
        self
    }

    /// Capacity of the bounded dispatch queue.
    #[must_use]
    pub fn worker_queue_capacity(mut self, capacity: usize) -> Self {
        self.worker_queue_capacity = capacity;
        self
    }

    /// Number of parallel reader loops.
    #[must_use]
    pub fn reader_threads(mut self, count: usize) -> Self {
        self.reader_threads = count;
        self
    }

    /// The dispatch stage invoked for every received datagram. Required.
    #[must_use]
    pub fn dispatch_handler(mut self, handler: Arc<dyn DispatchHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// The metrics collaborator. Required.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate collaborators and configuration and construct the
    /// receiver (not yet started).
    pub fn build(self) -> Result<UdpReceiver> {
        let handler = self.handler.ok_or(Error::MissingDispatchHandler)?;
        let metrics = self.metrics.ok_or(Error::MissingMetricsSink)?;

        if self.worker_threads == 0 {
            return Err(Error::InvalidConfig("worker_threads must be > 0".to_string()));
        }
        if self.worker_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "worker_queue_capacity must be > 0".to_string(),
            ));
        }
        if self.reader_threads == 0 {
            return Err(Error::InvalidConfig("reader_threads must be > 0".to_string()));
        }

        let config = ReceiverConfig {
            name: self.name,
            bind_address: self.bind_address,
            port: self.port,
            receive_buffer_size: self.receive_buffer_size,
            worker_threads: self.worker_threads,
            worker_queue_capacity: self.worker_queue_capacity,
            reader_threads: self.reader_threads,
        };

        let rejected_name: Arc<str> = format!("{}-rejected", config.name).into();

        Ok(UdpReceiver {
            config,
            handler,
            metrics,
            state: AtomicU8::new(LifecycleState::Uninitialized as u8),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(ReceiverStats::default()),
            rejected: Arc::new(AtomicU64::new(0)),
            rejected_name,
            inner: Mutex::new(None),
        })
    }
}

/// Resources that only exist while the receiver is running.
struct Active {
    gateway: Arc<UdpGateway>,
    pool: Arc<PacketPool>,
    workers: WorkerPool,
    readers: Vec<JoinHandle<()>>,
    reader_latch: Arc<ShutdownLatch>,
}

/// UDP endpoint accepting serialized trace/metric datagrams.
///
/// See the [module documentation](self) for the lifecycle contract.
pub struct UdpReceiver {
    config: ReceiverConfig,
    handler: Arc<dyn DispatchHandler>,
    metrics: Arc<dyn MetricsSink>,
    state: AtomicU8,
    running: Arc<AtomicBool>,
    stats: Arc<ReceiverStats>,
    rejected: Arc<AtomicU64>,
    rejected_name: Arc<str>,
    inner: Mutex<Option<Active>>,
}

impl UdpReceiver {
    /// Start building a receiver labeled `name` (used for diagnostics,
    /// metric names, and thread names).
    pub fn builder(name: impl Into<String>) -> UdpReceiverBuilder {
        UdpReceiverBuilder::new(name.into())
    }

    /// Bind the socket, build the pool and worker group, and launch the
    /// reader loops.
    ///
    /// Fails fatally on bind errors, before any thread is launched. On
    /// any failure the receiver ends in the terminal `Stopped` state.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let state = self.state();
        if state != LifecycleState::Uninitialized {
            return Err(Error::InvalidState {
                operation: "start",
                state,
            });
        }

        let cfg = &self.config;
        log::info!("[receiver] {} starting on {}", cfg.name, cfg.bind_addr());

        let gateway = match UdpGateway::bind(cfg.bind_address, cfg.port, cfg.receive_buffer_size) {
            Ok(gateway) => Arc::new(gateway),
            Err(err) => {
                self.set_state(LifecycleState::Stopped);
                return Err(err);
            }
        };

        let pool = Arc::new(PacketPool::new(cfg.pool_capacity()));

        let workers = match WorkerPool::spawn(
            cfg,
            Arc::clone(&self.handler),
            Arc::clone(&pool),
            Arc::clone(&self.metrics),
            Arc::clone(&self.stats),
        ) {
            Ok(workers) => workers,
            Err(err) => {
                gateway.close();
                self.set_state(LifecycleState::Stopped);
                return Err(err);
            }
        };

        self.running.store(true, Ordering::Release);

        let reader_latch = Arc::new(ShutdownLatch::new());
        let mut readers = Vec::with_capacity(cfg.reader_threads);
        for i in 0..cfg.reader_threads {
            reader_latch.register();
            let reader = ReaderLoop {
                gateway: Arc::clone(&gateway),
                pool: Arc::clone(&pool),
                tx: workers.sender(),
                running: Arc::clone(&self.running),
                stats: Arc::clone(&self.stats),
                metrics: Arc::clone(&self.metrics),
                rejected: Arc::clone(&self.rejected),
                rejected_name: Arc::clone(&self.rejected_name),
            };
            let latch = Arc::clone(&reader_latch);
            let spawned = std::thread::Builder::new()
                .name(format!("{}-reader-{}", cfg.name, i))
                .spawn(move || {
                    reader.run();
                    latch.arrive();
                });
            match spawned {
                Ok(handle) => readers.push(handle),
                Err(err) => {
                    reader_latch.arrive();
                    self.running.store(false, Ordering::Release);
                    gateway.close();
                    reader_latch.wait_idle(SHUTDOWN_AWAIT);
                    for handle in readers {
                        let _ = handle.join();
                    }
                    workers.shutdown(SHUTDOWN_AWAIT);
                    self.set_state(LifecycleState::Stopped);
                    return Err(Error::ThreadSpawn(err));
                }
            }
        }

        log::info!(
            "[receiver] {} started on {}: {} reader(s), {} worker(s), queue {}, pool {}",
            cfg.name,
            gateway.local_addr(),
            cfg.reader_threads,
            cfg.worker_threads,
            cfg.worker_queue_capacity,
            pool.capacity()
        );

        *inner = Some(Active {
            gateway,
            pool,
            workers,
            readers,
            reader_latch,
        });
        self.set_state(LifecycleState::Running);
        Ok(())
    }

    /// Stop accepting traffic and drain both thread groups within the
    /// bounded [`SHUTDOWN_AWAIT`] deadline per group.
    ///
    /// Idempotent: any call outside the `Running` state is a no-op.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let state = self.state();
        if state != LifecycleState::Running {
            log::debug!(
                "[receiver] {} shutdown ignored in state {}",
                self.config.name,
                state
            );
            return;
        }
        self.set_state(LifecycleState::Stopping);
        log::info!("[receiver] {} shutting down", self.config.name);

        self.running.store(false, Ordering::Release);

        if let Some(active) = inner.take() {
            // Closing the shared socket is what unblocks readers still
            // parked in recv_from.
            active.gateway.close();

            if active.reader_latch.wait_idle(SHUTDOWN_AWAIT) {
                for handle in active.readers {
                    let _ = handle.join();
                }
            } else {
                log::warn!(
                    "[receiver] {} reader(s) still blocked after {:?}; detaching",
                    active.reader_latch.live(),
                    SHUTDOWN_AWAIT
                );
            }

            active.workers.shutdown(SHUTDOWN_AWAIT);
        }

        self.set_state(LifecycleState::Stopped);
        log::info!("[receiver] {} stopped", self.config.name);
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The receiver configuration.
    #[must_use]
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Snapshot of the diagnostic counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Total dispatch-submission rejections since start.
    #[must_use]
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Bound address while running (resolves port 0 to the real port).
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.lock().as_ref().map(|a| a.gateway.local_addr())
    }

    /// The packet pool while running.
    #[must_use]
    pub fn pool(&self) -> Option<Arc<PacketPool>> {
        self.inner.lock().as_ref().map(|a| Arc::clone(&a.pool))
    }

    /// Reader loops currently alive.
    #[must_use]
    pub fn active_readers(&self) -> usize {
        self.inner
            .lock()
            .as_ref()
            .map_or(0, |a| a.reader_latch.live())
    }

    /// Dispatch tasks queued and not yet picked up by a worker.
    #[must_use]
    pub fn queued_dispatches(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, |a| a.workers.queued())
    }
}

impl Drop for UdpReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
