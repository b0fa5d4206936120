/*!
 * Scheduler Loop
 *
 * One tick is: drain Immediate work under the drain budget and starvation
 * guard, then run at most one Deferred task.
 *
 * ```text
 * Idle -> RunningImmediate -> CheckDeferred -> RunningDeferred -> RunningImmediate -> ...
 *                                                                       |
 *                                                                    Stopped
 * ```
 *
 * Deferred work never batches: one task per tick keeps it from starving the
 * Immediate queue in return.
 *
 * Task failures (panics and returned errors) are caught here, counted, and
 * handed to the error handler; they never stop the loop.
 */

use super::drain::{drain_immediate, DrainBudget, DrainSource, DrainStop};
use super::guard::GuardVerdict;
use super::task::Task;
use super::Shared;
use crate::core::errors::TaskExecutionError;
use crate::core::types::{Priority, ShutdownMode, TaskId, TaskStatus};
use crate::monitoring::TaskSpan;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Loop state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum LoopPhase {
    Idle = 0,
    RunningImmediate = 1,
    CheckDeferred = 2,
    RunningDeferred = 3,
    Stopped = 4,
}

impl LoopPhase {
    #[inline]
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LoopPhase::Idle,
            1 => LoopPhase::RunningImmediate,
            2 => LoopPhase::CheckDeferred,
            3 => LoopPhase::RunningDeferred,
            4 => LoopPhase::Stopped,
            other => panic!("corrupt loop phase value {other}"),
        }
    }
}

/// Summary of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Immediate tasks run this tick
    pub immediate_ran: usize,
    /// Why the Immediate phase ended
    pub drain_stop: DrainStop,
    /// Deferred task run this tick, if any
    pub deferred_ran: Option<TaskId>,
}

impl TickReport {
    /// The tick found nothing to do
    pub fn is_idle(&self) -> bool {
        self.immediate_ran == 0 && self.deferred_ran.is_none()
    }
}

/// Binds the drain algorithm to a live scheduler
struct LoopDriver<'a> {
    shared: &'a Shared,
    window: Duration,
}

impl DrainSource for LoopDriver<'_> {
    #[inline]
    fn now(&self) -> Instant {
        self.shared.clock.now()
    }

    #[inline]
    fn shutdown_requested(&self) -> bool {
        self.shared.stop_mode() == Some(ShutdownMode::Immediate)
    }

    #[inline]
    fn immediate_pending(&self) -> bool {
        !self.shared.queues.get(Priority::Immediate).is_empty()
    }

    fn guard(&self) -> GuardVerdict {
        let shared = self.shared;
        let verdict = shared.guard.check(
            shared.queues.get(Priority::Deferred),
            shared.clock.as_ref(),
            self.window,
        );
        if let GuardVerdict::ForceYield { starved } = verdict {
            shared.stats.set_starvation(starved);
            shared.stats.inc_forced_yields();
        }
        verdict
    }

    #[inline]
    fn next_immediate(&mut self) -> Option<Task> {
        self.shared.queues.dequeue(Priority::Immediate)
    }

    #[inline]
    fn execute(&mut self, task: Task) {
        self.shared.execute(task);
    }
}

impl Shared {
    /// Run one full pass of the state machine on the calling thread
    ///
    /// Callers must own the loop (background thread or a claimed manual
    /// driver).
    pub(crate) fn tick(&self) -> TickReport {
        let config = self.config.load_full();

        self.set_phase(LoopPhase::RunningImmediate);
        let budget = DrainBudget::for_tick(&config, self.clock.now());
        let mut driver = LoopDriver {
            shared: self,
            window: config.max_starvation_window,
        };
        let outcome = drain_immediate(&mut driver, budget);

        self.set_phase(LoopPhase::CheckDeferred);
        let mut deferred_ran = None;
        if outcome.stop != DrainStop::Shutdown {
            if let Some(task) = self.queues.dequeue(Priority::Deferred) {
                self.set_phase(LoopPhase::RunningDeferred);
                let started = self.clock.now();
                self.stats
                    .record_deferred_wait(started.saturating_duration_since(task.enqueued_at()));

                deferred_ran = Some(task.id());
                self.execute(task);
                self.guard.record_deferred_run(self.clock.now());
            }
        }

        self.stats.end_tick(deferred_ran.is_some());
        self.stats.set_starvation(
            self.guard
                .reading(self.queues.get(Priority::Deferred), self.clock.as_ref()),
        );

        TickReport {
            immediate_ran: outcome.ran,
            drain_stop: outcome.stop,
            deferred_ran,
        }
    }

    /// Execute a claimed task, isolating any failure
    pub(crate) fn execute(&self, task: Task) {
        let (info, payload, state) = task.into_parts();
        let span = TaskSpan::new(&info);
        let _entered = span.enter();

        let started = self.clock.now();
        let failure = match panic::catch_unwind(AssertUnwindSafe(payload)) {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(TaskExecutionError::errored(info.id, info.priority, err)),
            Err(payload) => Some(TaskExecutionError::panicked(info.id, info.priority, payload)),
        };
        let finished = self.clock.now();
        span.finish(finished.saturating_duration_since(started), failure.is_some());

        state.finish(if failure.is_some() {
            TaskStatus::Failed
        } else {
            TaskStatus::Completed
        });
        self.stats.inc_executed(info.priority);

        if let Some(collector) = &self.collector {
            collector.record_task(
                info.priority,
                started.saturating_duration_since(info.enqueued_at),
                finished.saturating_duration_since(started),
                failure.is_some(),
            );
        }

        if let Some(failure) = failure {
            self.stats.inc_errors();
            let handler = &self.error_handler;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler(&failure, &info))) {
                error!(
                    task_id = info.id.0,
                    panic = %crate::core::errors::panic_message(payload.as_ref()),
                    "Error handler panicked"
                );
            }
        }
    }

    /// Drive the loop until shutdown completes
    ///
    /// Blocks on the wake signal while both queues are empty.
    pub(crate) fn run(&self) {
        if self.phase() == LoopPhase::Stopped {
            return;
        }
        info!(scheduler = %self.id, "Scheduler loop started");

        loop {
            if let Some(mode) = self.stop_mode() {
                self.settle_shutdown(mode);
                break;
            }

            // Read the epoch before looking for work so an enqueue that races
            // with the idle check still wakes us
            let seen = self.signal.epoch();
            self.tick();

            if self.queues.is_idle() && self.stop_mode().is_none() {
                self.set_phase(LoopPhase::Idle);
                self.signal.wait_past(seen, None);
            }
        }

        info!(
            scheduler = %self.id,
            executed = self.stats.executed(),
            discarded = self.stats.discarded(),
            "Scheduler loop stopped"
        );
    }

    /// Finish a requested shutdown on the driving thread
    ///
    /// Graceful runs ticks until both queues are empty (the queues are
    /// already closed, so this terminates); immediate discards. A graceful
    /// drain that gets escalated mid-way discards what is left.
    pub(crate) fn settle_shutdown(&self, mode: ShutdownMode) {
        if mode == ShutdownMode::Graceful {
            while !self.queues.is_idle() && self.stop_mode() == Some(ShutdownMode::Graceful) {
                self.tick();
            }
        }
        self.discard_pending();
        self.set_phase(LoopPhase::Stopped);
    }

    /// Drop everything still queued; handles report `Discarded`
    pub(crate) fn discard_pending(&self) -> usize {
        let discarded = self.queues.discard();
        if discarded > 0 {
            self.stats.add_discarded(discarded);
            debug!(scheduler = %self.id, discarded, "Discarded queued tasks");
        }
        discarded
    }
}
