/*!
 * Scheduler Lifecycle
 *
 * Start, stop, and manual driving. Exactly one thread owns loop progression
 * at a time: the background worker started by [`Scheduler::start`], or a
 * caller driving ticks by hand.
 *
 * Shutdown follows a graceful-with-fallback pattern: `stop` joins the worker
 * after it drains or discards; dropping a scheduler that was never stopped
 * falls back to an immediate shutdown and logs a warning.
 */

use super::event_loop::{LoopPhase, TickReport};
use super::{Scheduler, Shared};
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::limits::LOOP_THREAD_NAME;
use crate::core::types::ShutdownMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// What a call to [`Scheduler::stop`] accomplished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShutdownReport {
    /// Effective mode (an earlier immediate request wins over graceful)
    pub mode: ShutdownMode,
    /// Tasks that ran between the stop request and loop exit
    pub executed: u64,
    /// Queued tasks dropped without running
    pub discarded: u64,
    /// Whether a background loop thread was joined
    pub joined: bool,
}

impl Shared {
    /// Refuse new work and wake the loop so it can act on the request
    ///
    /// The queues close before the stop flag is published, so every push
    /// that succeeded is visible to a driver that observes the flag.
    pub(crate) fn request_stop(&self, mode: ShutdownMode) {
        self.queues.close();
        let previous = self.escalate_stop(mode);
        self.signal.notify();

        if previous.is_none() || (previous == Some(ShutdownMode::Graceful) && mode == ShutdownMode::Immediate) {
            info!(scheduler = %self.id, mode = ?mode, "Shutdown requested");
        }
    }
}

impl Shared {
    /// Hand back loop ownership after manual driving
    ///
    /// A stop requested while this thread held the loop is completed here,
    /// since the stopper could not claim the loop itself.
    fn release_manual_driver(&self) {
        loop {
            match self.stop_mode() {
                Some(mode) => self.settle_shutdown(mode),
                None => self.set_phase(LoopPhase::Idle),
            }
            self.release_driver();

            // A stop that landed between the check above and the release
            // lost its claim to us; settle it if nobody else has
            if self.stop_mode().is_none() || self.phase() == LoopPhase::Stopped || !self.claim_driver() {
                break;
            }
        }
    }
}

impl Scheduler {
    /// Spawn the loop on a dedicated thread
    ///
    /// Fails with `AlreadyRunning` if the loop is already owned, and `Closed`
    /// once shutdown has begun.
    pub fn start(&self) -> SchedulerResult<()> {
        let shared = self.shared();
        if shared.stop_mode().is_some() {
            return Err(SchedulerError::Closed);
        }
        if !shared.claim_driver() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let mut worker = self.worker.lock();
        let loop_shared = Arc::clone(shared);
        let spawned = thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_string())
            .spawn(move || {
                loop_shared.run();
                loop_shared.release_driver();
            });

        match spawned {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                shared.release_driver();
                Err(SchedulerError::SpawnFailed(e.to_string()))
            }
        }
    }

    /// Stop the scheduler and wait for the loop to halt
    ///
    /// Graceful mode runs every task already queued; immediate mode lets the
    /// in-flight task finish and discards the rest. Either way enqueue fails
    /// with `Closed` from here on. A scheduler that was never started runs
    /// its shutdown on the calling thread. While another thread drives the
    /// loop by hand, that driver completes the shutdown before its current
    /// call returns.
    pub fn stop(&self, mode: ShutdownMode) -> ShutdownReport {
        let shared = self.shared();
        let executed_before = shared.stats.executed();
        let discarded_before = shared.stats.discarded();

        shared.request_stop(mode);

        let worker = self.worker.lock().take();
        let joined = match worker {
            // Stopped from inside a task: the loop exits once that task returns
            Some(handle) if handle.thread().id() == thread::current().id() => false,
            Some(handle) => {
                if handle.join().is_err() {
                    error!(scheduler = %shared.id, "Scheduler loop thread panicked");
                }
                true
            }
            None => {
                if shared.claim_driver() {
                    shared.run();
                    shared.release_driver();
                } else if shared.stop_mode() == Some(ShutdownMode::Immediate) {
                    // A manual driver is mid-tick and settles the shutdown
                    // when it lets go; discard now so the report counts it
                    shared.discard_pending();
                }
                false
            }
        };

        let report = ShutdownReport {
            mode: shared.stop_mode().unwrap_or(mode),
            executed: shared.stats.executed() - executed_before,
            discarded: shared.stats.discarded() - discarded_before,
            joined,
        };
        info!(
            scheduler = %shared.id,
            mode = ?report.mode,
            executed = report.executed,
            discarded = report.discarded,
            joined,
            "Scheduler stopped"
        );
        report
    }

    /// Whether a background loop thread is attached
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one tick on the calling thread
    ///
    /// For embedding in another loop and for deterministic tests. Fails
    /// with `AlreadyRunning` while the background loop owns the scheduler.
    pub fn tick(&self) -> SchedulerResult<TickReport> {
        let shared = self.shared();
        if shared.stop_mode().is_some() {
            return Err(SchedulerError::Closed);
        }
        if !shared.claim_driver() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let report = shared.tick();
        shared.release_manual_driver();
        Ok(report)
    }

    /// Tick until both queues are empty; returns the number of tasks run
    pub fn run_until_idle(&self) -> SchedulerResult<u64> {
        let shared = self.shared();
        if shared.stop_mode().is_some() {
            return Err(SchedulerError::Closed);
        }
        if !shared.claim_driver() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let before = shared.stats.executed();
        while !shared.queues.is_idle() && shared.stop_mode().is_none() {
            shared.tick();
        }
        shared.release_manual_driver();
        Ok(shared.stats.executed() - before)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let shared = Arc::clone(self.shared());
        let worker = self.worker.get_mut().take();

        match worker {
            Some(handle) => {
                warn!(
                    scheduler = %shared.id,
                    "Scheduler dropped while running, falling back to immediate shutdown"
                );
                shared.request_stop(ShutdownMode::Immediate);
                if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                    error!(scheduler = %shared.id, "Scheduler loop thread panicked");
                }
            }
            None if shared.phase() != LoopPhase::Stopped => {
                // Never started or never settled: discard outstanding work
                shared.request_stop(ShutdownMode::Immediate);
                if shared.claim_driver() {
                    shared.settle_shutdown(ShutdownMode::Immediate);
                    shared.release_driver();
                }
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Priority;
    use crate::scheduler::SchedulerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_stop_without_start_drains_inline() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = Arc::clone(&count);
            scheduler
                .enqueue(Priority::Deferred, move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        let report = scheduler.stop(ShutdownMode::Graceful);
        assert_eq!(report.executed, 3);
        assert_eq!(report.discarded, 0);
        assert!(!report.joined);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(scheduler.metrics().phase, LoopPhase::Stopped);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        scheduler.start().unwrap();
        assert_eq!(scheduler.start(), Err(SchedulerError::AlreadyRunning));
        assert_eq!(scheduler.tick(), Err(SchedulerError::AlreadyRunning));

        let report = scheduler.stop(ShutdownMode::Graceful);
        assert!(report.joined);
        assert_eq!(scheduler.start(), Err(SchedulerError::Closed));
    }

    #[test]
    fn test_manual_tick_after_stop_is_closed() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        scheduler.stop(ShutdownMode::Immediate);
        assert_eq!(scheduler.tick(), Err(SchedulerError::Closed));
        assert_eq!(scheduler.run_until_idle(), Err(SchedulerError::Closed));
    }

    #[test]
    fn test_second_stop_reports_nothing() {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        scheduler.immediate(|| {}).unwrap();
        assert_eq!(scheduler.stop(ShutdownMode::Graceful).executed, 1);

        let again = scheduler.stop(ShutdownMode::Graceful);
        assert_eq!((again.executed, again.discarded), (0, 0));
    }
}
