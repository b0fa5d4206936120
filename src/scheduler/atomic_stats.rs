/*!
 * Lock-Free Scheduler Statistics
 * Uses atomic counters for zero-contention stats tracking in hot scheduling paths
 */

use super::event_loop::LoopPhase;
use crate::core::serde::{is_zero_u64, is_zero_usize};
use crate::core::types::Priority;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Atomic scheduler counters
///
/// # Performance
/// - Cache-line aligned to prevent false sharing with the queues
/// - All updates use relaxed ordering; readers only need per-counter accuracy
#[repr(C, align(64))]
#[derive(Default)]
pub(crate) struct AtomicSchedulerStats {
    enqueued: AtomicU64,
    immediate_executed: AtomicU64,
    deferred_executed: AtomicU64,
    cancelled: AtomicU64,
    errors: AtomicU64,
    discarded: AtomicU64,
    forced_yields: AtomicU64,
    ticks: AtomicU64,
    ticks_since_last_deferred: AtomicU64,
    last_deferred_wait_micros: AtomicU64,
    max_deferred_wait_micros: AtomicU64,
    starvation_micros: AtomicU64,
}

impl AtomicSchedulerStats {
    #[inline(always)]
    pub fn inc_enqueued(&self) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Hot path - called after every task body returns
    #[inline(always)]
    pub fn inc_executed(&self, priority: Priority) {
        match priority {
            Priority::Immediate => self.immediate_executed.fetch_add(1, Ordering::Relaxed),
            Priority::Deferred => self.deferred_executed.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline(always)]
    pub fn inc_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_discarded(&self, count: usize) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_forced_yields(&self) {
        self.forced_yields.fetch_add(1, Ordering::Relaxed);
    }

    /// Close out a tick
    #[inline]
    pub fn end_tick(&self, ran_deferred: bool) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        if ran_deferred {
            self.ticks_since_last_deferred.store(0, Ordering::Relaxed);
        } else {
            self.ticks_since_last_deferred.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record how long a Deferred task waited between enqueue and start
    #[inline]
    pub fn record_deferred_wait(&self, waited: Duration) {
        let micros = waited.as_micros() as u64;
        self.last_deferred_wait_micros.store(micros, Ordering::Relaxed);
        self.max_deferred_wait_micros.fetch_max(micros, Ordering::Relaxed);
    }

    /// Publish the latest starvation reading (written by the loop only)
    #[inline]
    pub fn set_starvation(&self, starved: Duration) {
        self.starvation_micros
            .store(starved.as_micros() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn executed(&self) -> u64 {
        self.immediate_executed.load(Ordering::Relaxed) + self.deferred_executed.load(Ordering::Relaxed)
    }

    /// Counter half of a snapshot; queue depths and the loop phase are
    /// filled in by the caller
    ///
    /// # Note
    /// Counter values may not be perfectly consistent with each other due to
    /// concurrent updates, but each individual value is accurate.
    pub fn snapshot(&self, gauges: Gauges) -> MetricsSnapshot {
        let immediate = self.immediate_executed.load(Ordering::Relaxed);
        let deferred = self.deferred_executed.load(Ordering::Relaxed);

        MetricsSnapshot {
            immediate_queue_depth: gauges.immediate_depth,
            deferred_queue_depth: gauges.deferred_depth,
            ticks_since_last_deferred_run: self.ticks_since_last_deferred.load(Ordering::Relaxed),
            total_tasks_executed: immediate + deferred,
            total_tasks_cancelled: self.cancelled.load(Ordering::Relaxed),
            total_task_errors: self.errors.load(Ordering::Relaxed),
            total_tasks_enqueued: self.enqueued.load(Ordering::Relaxed),
            immediate_executed: immediate,
            deferred_executed: deferred,
            total_tasks_discarded: self.discarded.load(Ordering::Relaxed),
            forced_yields: self.forced_yields.load(Ordering::Relaxed),
            ticks: self.ticks.load(Ordering::Relaxed),
            starvation_micros: self.starvation_micros.load(Ordering::Relaxed),
            last_deferred_wait_micros: self.last_deferred_wait_micros.load(Ordering::Relaxed),
            max_deferred_wait_micros: self.max_deferred_wait_micros.load(Ordering::Relaxed),
            phase: gauges.phase,
        }
    }
}

/// Point-in-time readings that live outside the counters
#[derive(Debug, Clone, Copy)]
pub(crate) struct Gauges {
    pub immediate_depth: usize,
    pub deferred_depth: usize,
    pub phase: LoopPhase,
}

/// Scheduler metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsSnapshot {
    #[serde(skip_serializing_if = "is_zero_usize", default)]
    pub immediate_queue_depth: usize,
    #[serde(skip_serializing_if = "is_zero_usize", default)]
    pub deferred_queue_depth: usize,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub ticks_since_last_deferred_run: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub total_tasks_executed: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub total_tasks_cancelled: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub total_task_errors: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub total_tasks_enqueued: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub immediate_executed: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub deferred_executed: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub total_tasks_discarded: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub forced_yields: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub ticks: u64,
    /// How long the oldest pending Deferred task has been held back
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub starvation_micros: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub last_deferred_wait_micros: u64,
    #[serde(skip_serializing_if = "is_zero_u64", default)]
    pub max_deferred_wait_micros: u64,
    pub phase: LoopPhase,
}

impl MetricsSnapshot {
    /// Runnable tasks across both classes
    pub fn total_depth(&self) -> usize {
        self.immediate_queue_depth + self.deferred_queue_depth
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
