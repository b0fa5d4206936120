/*!
 * Scheduler Limits and Constants
 *
 * Centralized location for defaults, bounds and thresholds.
 * Performance-critical constants are marked with [PERF].
 */

use std::time::Duration;

// =============================================================================
// DRAIN POLICY
// =============================================================================

/// Default Immediate tasks per tick before the Deferred queue is checked
pub const DEFAULT_MAX_IMMEDIATE_PER_TICK: usize = 1000;

/// Upper bound accepted for the per-tick Immediate budget
pub const MAX_IMMEDIATE_PER_TICK_LIMIT: usize = 1 << 24;

/// Per-tick Immediate budget used by the low-latency preset
pub const LOW_LATENCY_IMMEDIATE_PER_TICK: usize = 64;

/// Per-tick Immediate budget used by the throughput preset
/// [PERF] Fewer Deferred checks, higher batch throughput
pub const THROUGHPUT_IMMEDIATE_PER_TICK: usize = 10_000;

// =============================================================================
// STARVATION GUARD
// =============================================================================

/// Default starvation window (50ms)
/// Maximum time a pending Deferred task may be held back by Immediate work
pub const DEFAULT_MAX_STARVATION_WINDOW: Duration = Duration::from_millis(50);

/// Starvation window used by the low-latency preset (5ms)
pub const LOW_LATENCY_STARVATION_WINDOW: Duration = Duration::from_millis(5);

/// Starvation window used by the throughput preset (200ms)
pub const THROUGHPUT_STARVATION_WINDOW: Duration = Duration::from_millis(200);

/// Largest starvation window accepted by validation (1 minute)
pub const MAX_STARVATION_WINDOW_LIMIT: Duration = Duration::from_secs(60);

// =============================================================================
// MONITORING
// =============================================================================

/// Ticks without a Deferred execution, with Deferred work pending, before the
/// detector reports degradation
pub const DEFAULT_DEGRADED_TICK_THRESHOLD: u64 = 8;

/// Samples the starvation detector needs before z-score checks apply
pub const STARVATION_MIN_SAMPLES: u64 = 32;

/// Z-score above which a Deferred wait counts as anomalous
pub const STARVATION_Z_THRESHOLD: f64 = 3.0;

/// Task run time above which the loop logs a slow-task warning
/// A task this slow delays every pending Deferred task by the same amount
pub const SLOW_TASK_THRESHOLD: Duration = Duration::from_millis(10);

/// Histogram buckets (seconds) for task wait and run time
pub const LATENCY_BUCKETS: [f64; 10] = [
    0.000_01, 0.000_1, 0.000_5, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
];

// =============================================================================
// THREADING
// =============================================================================

/// Name given to the background loop thread
pub const LOOP_THREAD_NAME: &str = "fair-scheduler-loop";
