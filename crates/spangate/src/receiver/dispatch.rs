// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Worker dispatch pool: bounded queue, fixed worker group, synchronous
//! reject-on-saturation.
//!
//! Submission never blocks the reader: `try_send` on the bounded channel
//! either enqueues the task or hands it straight back, which is the
//! system's primary backpressure mechanism. Workers block only while
//! waiting for queued work, never on the network.

use super::latch::ShutdownLatch;
use super::pool::{PacketBuf, PacketPool};
use super::stats::ReceiverStats;
use super::{Error, Result};
use crate::config::ReceiverConfig;
use crate::metrics::MetricsSink;
use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// External dispatch stage: decodes and routes one received datagram.
///
/// Invoked once per successfully received, non-empty datagram. The
/// payload borrow ends with the call; implementations must copy anything
/// they keep, because the buffer returns to the pool immediately after.
pub trait DispatchHandler: Send + Sync {
    /// Handle one datagram payload from `source`.
    fn handle(&self, payload: &[u8], source: SocketAddr) -> Result<()>;
}

/// One unit of dispatch work: a filled pooled buffer and its source.
///
/// Created at submission time, executed once by a worker thread.
/// [`run`](Self::run) consumes the task and releases the buffer on every
/// completion path (handler success, handler error, handler panic) -
/// the contract that prevents buffer leaks.
#[derive(Debug)]
pub struct DispatchTask {
    buf: PacketBuf,
    source: SocketAddr,
}

impl DispatchTask {
    pub(crate) fn new(buf: PacketBuf, source: SocketAddr) -> Self {
        Self { buf, source }
    }

    /// Recover the buffer from a rejected submission.
    pub(crate) fn into_buf(self) -> PacketBuf {
        self.buf
    }

    pub(crate) fn run(
        self,
        handler: &dyn DispatchHandler,
        pool: &PacketPool,
        metrics: &dyn MetricsSink,
        timer_name: &str,
        stats: &ReceiverStats,
    ) {
        let Self { buf, source } = self;

        let started = Instant::now();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler.handle(buf.payload(), source)
        }));
        metrics.record_timer(timer_name, started.elapsed());

        match outcome {
            Ok(Ok(())) => {
                stats.dispatched.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Ok(Err(err)) => {
                stats.handler_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                log::error!("[worker] dispatch handler failed for {}: {}", source, err);
            }
            Err(_) => {
                stats.handler_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                log::error!("[worker] dispatch handler panicked for {}", source);
            }
        }

        pool.release(buf);
    }
}

/// Fixed worker group consuming a bounded task queue.
pub(crate) struct WorkerPool {
    tx: Sender<DispatchTask>,
    handles: Vec<JoinHandle<()>>,
    latch: Arc<ShutdownLatch>,
}

impl WorkerPool {
    /// Spawn `config.worker_threads` workers over a queue of
    /// `config.worker_queue_capacity` slots.
    pub(crate) fn spawn(
        config: &ReceiverConfig,
        handler: Arc<dyn DispatchHandler>,
        pool: Arc<PacketPool>,
        metrics: Arc<dyn MetricsSink>,
        stats: Arc<ReceiverStats>,
    ) -> Result<Self> {
        let (tx, rx) = bounded(config.worker_queue_capacity);
        let latch = Arc::new(ShutdownLatch::new());
        let timer_name: Arc<str> = format!("{}-timer", config.name).into();

        let mut handles = Vec::with_capacity(config.worker_threads);
        for i in 0..config.worker_threads {
            latch.register();
            let spawned = Self::spawn_worker(
                format!("{}-worker-{}", config.name, i),
                rx.clone(),
                Arc::clone(&handler),
                Arc::clone(&pool),
                Arc::clone(&metrics),
                Arc::clone(&stats),
                Arc::clone(&timer_name),
                Arc::clone(&latch),
            );
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    latch.arrive();
                    // Dropping tx ends the workers spawned so far.
                    return Err(Error::ThreadSpawn(err));
                }
            }
        }

        Ok(Self { tx, handles, latch })
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_worker(
        name: String,
        rx: Receiver<DispatchTask>,
        handler: Arc<dyn DispatchHandler>,
        pool: Arc<PacketPool>,
        metrics: Arc<dyn MetricsSink>,
        stats: Arc<ReceiverStats>,
        timer_name: Arc<str>,
        latch: Arc<ShutdownLatch>,
    ) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new().name(name).spawn(move || {
            // recv drains queued tasks after disconnect before erroring,
            // so work accepted prior to shutdown still executes.
            while let Ok(task) = rx.recv() {
                task.run(&*handler, &pool, &*metrics, &timer_name, &stats);
            }
            latch.arrive();
        })
    }

    /// Non-blocking submission. A saturated queue returns the task to
    /// the caller, which still owns the buffer inside it.
    pub(crate) fn submit(&self, task: DispatchTask) -> std::result::Result<(), DispatchTask> {
        match self.tx.try_send(task) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(task) | TrySendError::Disconnected(task)) => Err(task),
        }
    }

    /// A sender clone for a reader thread.
    pub(crate) fn sender(&self) -> Sender<DispatchTask> {
        self.tx.clone()
    }

    /// Tasks currently queued (not yet picked up by a worker).
    pub(crate) fn queued(&self) -> usize {
        self.tx.len()
    }

    /// Stop accepting work, drain the queue, and await the workers for
    /// at most `deadline`. Returns `true` on a clean stop; otherwise the
    /// stragglers are detached.
    pub(crate) fn shutdown(self, deadline: Duration) -> bool {
        drop(self.tx);
        let clean = self.latch.wait_idle(deadline);
        if clean {
            for handle in self.handles {
                let _ = handle.join();
            }
        } else {
            log::warn!(
                "[worker] {} worker(s) still busy after {:?}; detaching",
                self.latch.live(),
                deadline
            );
        }
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricsRegistry;
    use parking_lot::{Condvar, Mutex};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn test_config(workers: usize, queue: usize) -> ReceiverConfig {
        ReceiverConfig {
            name: "test-udp".to_string(),
            bind_address: Ipv4Addr::LOCALHOST.into(),
            port: 0,
            receive_buffer_size: 64 * 1024,
            worker_threads: workers,
            worker_queue_capacity: queue,
            reader_threads: 1,
        }
    }

    fn source() -> SocketAddr {
        SocketAddr::new(Ipv4Addr::LOCALHOST.into(), 40_000)
    }

    fn task_from(pool: &PacketPool, payload: &[u8]) -> DispatchTask {
        let mut buf = pool.try_acquire().expect("pool should have a buffer");
        buf.storage_mut()[..payload.len()].copy_from_slice(payload);
        buf.record(payload.len(), source());
        DispatchTask::new(buf, source())
    }

    fn wait_until(deadline: Duration, check: impl Fn() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if check() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        check()
    }

    struct CountingHandler {
        handled: AtomicU64,
    }

    impl DispatchHandler for CountingHandler {
        fn handle(&self, _payload: &[u8], _source: SocketAddr) -> Result<()> {
            self.handled.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Blocks every handler invocation until `release()` is called.
    struct GatedHandler {
        entered: AtomicU64,
        open: Mutex<bool>,
        cv: Condvar,
    }

    impl GatedHandler {
        fn new() -> Self {
            Self {
                entered: AtomicU64::new(0),
                open: Mutex::new(false),
                cv: Condvar::new(),
            }
        }

        fn release(&self) {
            *self.open.lock() = true;
            self.cv.notify_all();
        }
    }

    impl DispatchHandler for GatedHandler {
        fn handle(&self, _payload: &[u8], _source: SocketAddr) -> Result<()> {
            self.entered.fetch_add(1, Ordering::Relaxed);
            let mut open = self.open.lock();
            while !*open {
                self.cv.wait(&mut open);
            }
            Ok(())
        }
    }

    #[test]
    fn task_releases_buffer_after_success() {
        let cfg = test_config(1, 4);
        let pool = Arc::new(PacketPool::new(cfg.pool_capacity()));
        let metrics = Arc::new(MetricsRegistry::new());
        let stats = Arc::new(ReceiverStats::default());
        let handler = Arc::new(CountingHandler {
            handled: AtomicU64::new(0),
        });

        let workers = WorkerPool::spawn(
            &cfg,
            Arc::clone(&handler) as Arc<dyn DispatchHandler>,
            Arc::clone(&pool),
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
            Arc::clone(&stats),
        )
        .expect("worker pool should spawn");

        workers
            .submit(task_from(&pool, b"span-payload"))
            .expect("submission should be accepted");

        assert!(wait_until(Duration::from_secs(5), || {
            handler.handled.load(Ordering::Relaxed) == 1
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            pool.available() == pool.capacity()
        }));
        assert_eq!(stats.snapshot().dispatched, 1);

        let timer = metrics.timer("test-udp-timer").expect("timer recorded");
        assert_eq!(timer.count, 1);

        assert!(workers.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn task_releases_buffer_after_handler_error() {
        struct FailingHandler;
        impl DispatchHandler for FailingHandler {
            fn handle(&self, _payload: &[u8], _source: SocketAddr) -> Result<()> {
                Err(Error::Dispatch("malformed span batch".to_string()))
            }
        }

        let cfg = test_config(1, 4);
        let pool = Arc::new(PacketPool::new(cfg.pool_capacity()));
        let stats = Arc::new(ReceiverStats::default());

        let workers = WorkerPool::spawn(
            &cfg,
            Arc::new(FailingHandler),
            Arc::clone(&pool),
            Arc::new(MetricsRegistry::new()),
            Arc::clone(&stats),
        )
        .expect("worker pool should spawn");

        workers
            .submit(task_from(&pool, b"bad"))
            .expect("submission should be accepted");

        assert!(wait_until(Duration::from_secs(5), || {
            stats.snapshot().handler_errors == 1
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            pool.available() == pool.capacity()
        }));
        assert!(workers.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn worker_survives_handler_panic_and_releases_buffer() {
        struct PanickyHandler {
            calls: AtomicU64,
        }
        impl DispatchHandler for PanickyHandler {
            fn handle(&self, _payload: &[u8], _source: SocketAddr) -> Result<()> {
                if self.calls.fetch_add(1, Ordering::Relaxed) == 0 {
                    panic!("decoder bug");
                }
                Ok(())
            }
        }

        let cfg = test_config(1, 4);
        let pool = Arc::new(PacketPool::new(cfg.pool_capacity()));
        let stats = Arc::new(ReceiverStats::default());

        let workers = WorkerPool::spawn(
            &cfg,
            Arc::new(PanickyHandler {
                calls: AtomicU64::new(0),
            }),
            Arc::clone(&pool),
            Arc::new(MetricsRegistry::new()),
            Arc::clone(&stats),
        )
        .expect("worker pool should spawn");

        workers
            .submit(task_from(&pool, b"boom"))
            .expect("submission should be accepted");
        workers
            .submit(task_from(&pool, b"fine"))
            .expect("submission should be accepted");

        assert!(wait_until(Duration::from_secs(5), || {
            let snap = stats.snapshot();
            snap.handler_errors == 1 && snap.dispatched == 1
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            pool.available() == pool.capacity()
        }));
        assert!(workers.shutdown(Duration::from_secs(5)));
    }

    /// Scenario B: workers=2, queue=2, pool capacity 5. With both
    /// workers busy and the queue full, the next six submissions are all
    /// rejected synchronously and every rejected buffer goes back to the
    /// pool.
    #[test]
    fn saturated_pool_rejects_without_blocking() {
        let cfg = test_config(2, 2);
        let pool = Arc::new(PacketPool::new(cfg.pool_capacity()));
        assert_eq!(pool.capacity(), 5);
        let handler = Arc::new(GatedHandler::new());
        let stats = Arc::new(ReceiverStats::default());

        let workers = WorkerPool::spawn(
            &cfg,
            Arc::clone(&handler) as Arc<dyn DispatchHandler>,
            Arc::clone(&pool),
            Arc::new(MetricsRegistry::new()),
            Arc::clone(&stats),
        )
        .expect("worker pool should spawn");

        // Occupy both workers.
        for _ in 0..2 {
            workers
                .submit(task_from(&pool, b"slow"))
                .expect("submission should be accepted");
        }
        assert!(wait_until(Duration::from_secs(5), || {
            handler.entered.load(Ordering::Relaxed) == 2
        }));

        // Fill the queue.
        for _ in 0..2 {
            workers
                .submit(task_from(&pool, b"queued"))
                .expect("submission should be accepted");
        }
        assert_eq!(workers.queued(), 2);

        // Threads + queue saturated: six more submissions all bounce.
        let mut rejected = 0;
        for _ in 0..6 {
            let task = task_from(&pool, b"burst");
            match workers.submit(task) {
                Ok(()) => panic!("submission should have been rejected"),
                Err(task) => {
                    pool.release(task.into_buf());
                    rejected += 1;
                }
            }
        }
        assert_eq!(rejected, 6);

        handler.release();
        assert!(wait_until(Duration::from_secs(5), || {
            stats.snapshot().dispatched == 4
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            pool.available() == pool.capacity()
        }));
        assert!(workers.shutdown(Duration::from_secs(5)));
    }

    #[test]
    fn shutdown_drains_accepted_work() {
        let cfg = test_config(1, 8);
        let pool = Arc::new(PacketPool::new(cfg.pool_capacity()));
        let stats = Arc::new(ReceiverStats::default());
        let handler = Arc::new(CountingHandler {
            handled: AtomicU64::new(0),
        });

        let workers = WorkerPool::spawn(
            &cfg,
            Arc::clone(&handler) as Arc<dyn DispatchHandler>,
            Arc::clone(&pool),
            Arc::new(MetricsRegistry::new()),
            Arc::clone(&stats),
        )
        .expect("worker pool should spawn");

        for _ in 0..5 {
            workers
                .submit(task_from(&pool, b"queued"))
                .expect("submission should be accepted");
        }

        assert!(workers.shutdown(Duration::from_secs(5)));
        assert_eq!(handler.handled.load(Ordering::Relaxed), 5);
        assert_eq!(pool.available(), pool.capacity());
    }
}
