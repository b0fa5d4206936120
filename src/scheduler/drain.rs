/*!
 * Drain Policy
 *
 * Decides how much Immediate work a tick may run before the loop must look
 * at the Deferred queue.
 *
 * The budget is fixed when the tick starts. Immediate tasks enqueued by
 * tasks running in this tick land at the back of the queue and draw on the
 * same remaining budget, so a self-rescheduling task cannot monopolize a tick.
 */

use super::config::SchedulerConfig;
use super::guard::GuardVerdict;
use super::task::Task;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Per-tick allowance for the Immediate phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainBudget {
    remaining: usize,
    deadline: Option<Instant>,
}

impl DrainBudget {
    /// Budget for a tick starting at `now`
    pub fn for_tick(config: &SchedulerConfig, now: Instant) -> Self {
        Self {
            remaining: config.max_immediate_per_tick,
            deadline: config.max_immediate_duration.map(|d| now + d),
        }
    }

    #[inline]
    fn consume(&mut self) {
        self.remaining = self.remaining.saturating_sub(1);
    }

    #[inline]
    fn is_spent(&self, now: impl FnOnce() -> Instant) -> bool {
        self.remaining == 0 || self.deadline.is_some_and(|deadline| now() >= deadline)
    }
}

/// Why the Immediate phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainStop {
    /// Nothing left to run
    QueueEmpty,
    /// Count or time budget used up
    BudgetExhausted,
    /// Starvation guard intervened
    ForcedYield,
    /// Immediate shutdown requested
    Shutdown,
}

/// Result of one Immediate phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    pub ran: usize,
    pub stop: DrainStop,
}

/// What the drain needs from the loop
pub(crate) trait DrainSource {
    fn now(&self) -> Instant;
    fn shutdown_requested(&self) -> bool;
    fn immediate_pending(&self) -> bool;
    fn guard(&self) -> GuardVerdict;
    fn next_immediate(&mut self) -> Option<Task>;
    fn execute(&mut self, task: Task);
}

/// Run Immediate tasks one at a time until the budget, the queue, the guard
/// or a shutdown request says stop
pub(crate) fn drain_immediate<S: DrainSource>(source: &mut S, mut budget: DrainBudget) -> DrainOutcome {
    let mut ran = 0;

    let stop = loop {
        if source.shutdown_requested() {
            break DrainStop::Shutdown;
        }
        if !source.immediate_pending() {
            break DrainStop::QueueEmpty;
        }
        if budget.is_spent(|| source.now()) {
            break DrainStop::BudgetExhausted;
        }
        if let GuardVerdict::ForceYield { starved } = source.guard() {
            debug!(ran, starved_us = starved.as_micros() as u64, "Starvation guard forced yield");
            break DrainStop::ForcedYield;
        }

        match source.next_immediate() {
            Some(task) => {
                source.execute(task);
                budget.consume();
                ran += 1;
            }
            // Lost a race with cancel
            None => break DrainStop::QueueEmpty,
        }
    };

    DrainOutcome { ran, stop }
}
