/*!
 * Starvation Guard
 *
 * Bounds how long Immediate work can hold back a pending Deferred task.
 *
 * The starvation clock runs only while Deferred work is pending: a Deferred
 * task has been waiting since the later of its own enqueue time and the last
 * Deferred execution. Once that wait exceeds the configured window, the drain
 * is forced to yield before the next Immediate task, whatever budget remains.
 */

use super::queue::TaskQueue;
use crate::core::clock::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Guard decision before running another Immediate task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Proceed,
    /// A Deferred task has waited longer than the window
    ForceYield { starved: Duration },
}

/// Tracks `last_deferred_run_at` lock-free
///
/// Stored as nanoseconds past `origin` so metrics readers never block the
/// loop.
pub(crate) struct StarvationGuard {
    origin: Instant,
    last_deferred_run_nanos: AtomicU64,
}

impl StarvationGuard {
    pub fn new(origin: Instant) -> Self {
        Self {
            origin,
            last_deferred_run_nanos: AtomicU64::new(0),
        }
    }

    /// Reset the starvation clock; called once a Deferred task has run
    #[inline]
    pub fn record_deferred_run(&self, at: Instant) {
        let nanos = at.saturating_duration_since(self.origin).as_nanos() as u64;
        self.last_deferred_run_nanos.store(nanos, Ordering::Release);
    }

    #[inline]
    pub fn last_deferred_run_at(&self) -> Instant {
        self.origin + Duration::from_nanos(self.last_deferred_run_nanos.load(Ordering::Acquire))
    }

    /// How long the oldest pending Deferred task has been held back
    pub fn starvation(&self, now: Instant, oldest_pending: Option<Instant>) -> Duration {
        match oldest_pending {
            Some(enqueued_at) => {
                let waiting_since = enqueued_at.max(self.last_deferred_run_at());
                now.saturating_duration_since(waiting_since)
            }
            None => Duration::ZERO,
        }
    }

    /// Current reading against the live Deferred queue
    pub fn reading(&self, deferred: &TaskQueue, clock: &dyn Clock) -> Duration {
        if deferred.is_empty() {
            return Duration::ZERO;
        }
        self.starvation(clock.now(), deferred.oldest_enqueued_at())
    }

    /// Decide whether the drain may run another Immediate task
    pub fn check(&self, deferred: &TaskQueue, clock: &dyn Clock, window: Duration) -> GuardVerdict {
        let starved = self.reading(deferred, clock);
        if starved > window {
            GuardVerdict::ForceYield { starved }
        } else {
            GuardVerdict::Proceed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::core::id::SequenceGenerator;
    use crate::core::types::Priority;

    const WINDOW: Duration = Duration::from_millis(50);

    #[test]
    fn test_no_pending_deferred_never_yields() {
        let clock = ManualClock::new();
        let guard = StarvationGuard::new(clock.now());
        let deferred = TaskQueue::new(Priority::Deferred);

        clock.advance(Duration::from_secs(10));
        assert_eq!(guard.check(&deferred, &clock, WINDOW), GuardVerdict::Proceed);
    }

    #[test]
    fn test_forces_yield_past_window() {
        let clock = ManualClock::new();
        let guard = StarvationGuard::new(clock.now());
        let deferred = TaskQueue::new(Priority::Deferred);
        let sequence = SequenceGenerator::default_start();

        deferred.push(&sequence, &clock, Box::new(|| Ok(()))).unwrap();

        clock.advance(WINDOW);
        assert_eq!(guard.check(&deferred, &clock, WINDOW), GuardVerdict::Proceed);

        clock.advance(Duration::from_millis(1));
        assert_eq!(
            guard.check(&deferred, &clock, WINDOW),
            GuardVerdict::ForceYield {
                starved: Duration::from_millis(51)
            }
        );
    }

    #[test]
    fn test_clock_counts_from_later_of_enqueue_and_last_run() {
        let clock = ManualClock::new();
        let guard = StarvationGuard::new(clock.now());

        let enqueued_at = clock.now();
        clock.advance(Duration::from_millis(30));
        guard.record_deferred_run(clock.now());
        clock.advance(Duration::from_millis(10));

        // Waiting since the last run (30ms), not since enqueue (0ms)
        assert_eq!(
            guard.starvation(clock.now(), Some(enqueued_at)),
            Duration::from_millis(10)
        );
        assert_eq!(guard.starvation(clock.now(), None), Duration::ZERO);
    }
}
