// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded-wait latch over a thread group.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Counts live threads in a group and supports waiting, with a deadline,
/// for all of them to exit.
///
/// Threads are registered before they are spawned (so a wait cannot race
/// a slow spawn) and arrive exactly once when they finish.
pub(crate) struct ShutdownLatch {
    live: Mutex<usize>,
    cv: Condvar,
}

impl ShutdownLatch {
    pub(crate) fn new() -> Self {
        Self {
            live: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    /// Account for one thread about to be spawned.
    pub(crate) fn register(&self) {
        *self.live.lock() += 1;
    }

    /// Mark one thread as exited.
    pub(crate) fn arrive(&self) {
        let mut live = self.live.lock();
        *live = live.saturating_sub(1);
        if *live == 0 {
            self.cv.notify_all();
        }
    }

    /// Number of threads still live.
    pub(crate) fn live(&self) -> usize {
        *self.live.lock()
    }

    /// Wait until every registered thread has arrived or `timeout`
    /// elapses. Returns `true` when the group is idle.
    pub(crate) fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut live = self.live.lock();
        while *live > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.cv.wait_for(&mut live, deadline - now);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn idle_latch_returns_immediately() {
        let latch = ShutdownLatch::new();
        assert!(latch.wait_idle(Duration::from_millis(1)));
    }

    #[test]
    fn wait_times_out_while_threads_live() {
        let latch = ShutdownLatch::new();
        latch.register();
        assert!(!latch.wait_idle(Duration::from_millis(20)));
        assert_eq!(latch.live(), 1);
    }

    #[test]
    fn arrival_from_another_thread_wakes_waiter() {
        let latch = Arc::new(ShutdownLatch::new());
        latch.register();
        latch.register();

        let l = Arc::clone(&latch);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            l.arrive();
            l.arrive();
        });

        assert!(latch.wait_idle(Duration::from_secs(5)));
        assert_eq!(latch.live(), 0);
        handle.join().expect("helper thread should not panic");
    }
}
