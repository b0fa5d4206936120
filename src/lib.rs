/*!
 * Fair Scheduler Library
 * Cooperative two-class task scheduling with starvation protection
 *
 * Producers enqueue Immediate or Deferred work; a single loop drains
 * Immediate work under a per-tick budget, runs one Deferred task per tick,
 * and forces a yield whenever a pending Deferred task has waited longer
 * than the starvation window.
 */

pub mod core;
pub mod monitoring;
pub mod scheduler;

// Re-exports
pub use crate::core::clock::{Clock, ManualClock, SystemClock};
pub use crate::core::errors::{FailureKind, SchedulerError, SchedulerResult, TaskExecutionError};
pub use crate::core::types::{Priority, SchedulerId, ShutdownMode, TaskId, TaskStatus};
pub use monitoring::{init_tracing, Health, MetricsCollector, StarvationDetector};
pub use scheduler::{
    DrainStop, ErrorHandler, LoopPhase, MetricsSnapshot, Scheduler, SchedulerBuilder, SchedulerConfig,
    SchedulerHandle, ShutdownReport, TaskHandle, TaskInfo, TickReport,
};
