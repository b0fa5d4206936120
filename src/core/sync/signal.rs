/*!
 * Epoch Wake Signal
 *
 * Condvar-based park/unpark used by the scheduler loop to block while both
 * queues are empty.
 *
 * # Design: Epoch Counter Over Boolean Flag
 *
 * Waiters remember the epoch they observed *before* checking for work and
 * park only while the epoch is unchanged. A notify that lands between the
 * work check and the park bumps the epoch, so the waiter returns at once.
 * No wake-up is ever lost and the loop never polls.
 *
 * Notifiers take a lock-free fast path when nobody is parked.
 */

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Result of a wake operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeResult {
    /// A parked waiter was signalled
    Woken,
    /// No waiters were parked
    NoWaiters,
}

/// Epoch-based wake signal
#[repr(C, align(64))]
pub struct WakeSignal {
    epoch: AtomicU64,
    waiters: AtomicUsize,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl WakeSignal {
    pub const fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            waiters: AtomicUsize::new(0),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Current epoch; read this before checking for work
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Bump the epoch and wake a parked waiter, if any
    pub fn notify(&self) -> WakeResult {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if self.waiters.load(Ordering::SeqCst) == 0 {
            return WakeResult::NoWaiters;
        }

        // Taking the lock orders us after a waiter that is between its
        // epoch check and the park
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
        WakeResult::Woken
    }

    /// Park until the epoch moves past `seen`
    ///
    /// Returns `true` if the epoch changed, `false` on timeout.
    pub fn wait_past(&self, seen: u64, timeout: Option<Duration>) -> bool {
        self.waiters.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.mutex.lock();

        let mut changed = true;
        while self.epoch.load(Ordering::SeqCst) == seen {
            match timeout {
                Some(timeout) => {
                    if self.condvar.wait_for(&mut guard, timeout).timed_out() {
                        changed = self.epoch.load(Ordering::SeqCst) != seen;
                        break;
                    }
                }
                None => self.condvar.wait(&mut guard),
            }
        }

        drop(guard);
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        changed
    }

    /// Number of parked waiters (diagnostics)
    #[inline]
    pub fn waiter_count(&self) -> usize {
        self.waiters.load(Ordering::Relaxed)
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_notify_wakes_parked_waiter() {
        let signal = Arc::new(WakeSignal::new());
        let seen = signal.epoch();

        let waiter = {
            let signal = signal.clone();
            thread::spawn(move || signal.wait_past(seen, Some(Duration::from_secs(5))))
        };

        // Give thread time to park
        thread::sleep(Duration::from_millis(50));
        signal.notify();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_notify_before_park_is_not_lost() {
        let signal = WakeSignal::new();
        let seen = signal.epoch();

        assert_eq!(signal.notify(), WakeResult::NoWaiters);

        // Epoch already moved, so this returns without blocking
        let start = Instant::now();
        assert!(signal.wait_past(seen, None));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_times_out() {
        let signal = WakeSignal::new();
        let start = Instant::now();

        assert!(!signal.wait_past(signal.epoch(), Some(Duration::from_millis(30))));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(signal.waiter_count(), 0);
    }
}
