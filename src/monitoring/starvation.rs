/*!
 * Starvation Detection
 * Classifies scheduler snapshots before the starvation guard has to act
 *
 * Strategy: Track running statistics (mean, variance) of Deferred wait time
 * and flag outliers by z-score without storing history, alongside direct
 * checks on the live starvation reading and ticks since the last Deferred run.
 */

use crate::core::limits::{DEFAULT_DEGRADED_TICK_THRESHOLD, STARVATION_MIN_SAMPLES, STARVATION_Z_THRESHOLD};
use crate::scheduler::MetricsSnapshot;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

/// Deferred-class health
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    /// Deferred work is lagging but still inside the window
    Degraded,
    /// A pending Deferred task has waited a full window; the guard is forcing yields
    Starving,
}

/// Running statistics for Deferred wait time
#[derive(Debug, Clone, Default)]
struct Stats {
    count: u64,
    mean: f64,
    m2: f64, // For variance calculation (Welford's algorithm)
}

impl Stats {
    /// Update statistics with new value (Welford's online algorithm)
    fn update(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    fn stddev(&self) -> f64 {
        self.variance().sqrt()
    }

    fn z_score(&self, value: f64) -> f64 {
        let stddev = self.stddev();
        if stddev == 0.0 {
            0.0
        } else {
            (value - self.mean) / stddev
        }
    }

    /// Only unusually long waits count; short ones are good news
    fn is_anomaly(&self, value: f64) -> bool {
        self.count >= STARVATION_MIN_SAMPLES && self.z_score(value) > STARVATION_Z_THRESHOLD
    }
}

struct State {
    waits: Stats,
    /// `deferred_executed` at the previous assessment
    seen_deferred: u64,
    last: Health,
}

/// Deferred wait summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaitStats {
    pub count: u64,
    pub mean_micros: f64,
    pub stddev_micros: f64,
}

/// Snapshot-driven starvation detector
///
/// Feed it every metrics snapshot an operator polls; it needs no access to
/// the scheduler itself.
pub struct StarvationDetector {
    window: Duration,
    degraded_ticks: u64,
    state: Mutex<State>,
}

impl StarvationDetector {
    /// Detector for a scheduler configured with `window`
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            degraded_ticks: DEFAULT_DEGRADED_TICK_THRESHOLD,
            state: Mutex::new(State {
                waits: Stats::default(),
                seen_deferred: 0,
                last: Health::Healthy,
            }),
        }
    }

    /// Ticks without a Deferred run (while one is pending) before degrading
    pub fn with_degraded_ticks(mut self, ticks: u64) -> Self {
        self.degraded_ticks = ticks.max(1);
        self
    }

    /// Classify a snapshot and fold its Deferred wait into the running stats
    pub fn assess(&self, snapshot: &MetricsSnapshot) -> Health {
        let window_micros = self.window.as_micros() as u64;
        let pending = snapshot.deferred_queue_depth > 0;
        let mut state = self.state.lock();

        // Sample the wait only when a new Deferred task actually ran
        let fresh_wait = snapshot.deferred_executed > state.seen_deferred;
        state.seen_deferred = snapshot.deferred_executed;
        let wait = snapshot.last_deferred_wait_micros as f64;
        let anomalous = fresh_wait && state.waits.is_anomaly(wait);
        if fresh_wait {
            state.waits.update(wait);
        }

        let health = if pending && snapshot.starvation_micros >= window_micros {
            Health::Starving
        } else if pending
            && (snapshot.ticks_since_last_deferred_run >= self.degraded_ticks
                || snapshot.starvation_micros >= window_micros / 2)
        {
            Health::Degraded
        } else if anomalous {
            Health::Degraded
        } else {
            Health::Healthy
        };

        if health != state.last {
            match health {
                Health::Healthy => info!(
                    previous = ?state.last,
                    "Deferred queue recovered"
                ),
                _ => warn!(
                    health = ?health,
                    starvation_us = snapshot.starvation_micros,
                    ticks_since_last_deferred_run = snapshot.ticks_since_last_deferred_run,
                    deferred_depth = snapshot.deferred_queue_depth,
                    "Deferred queue health changed"
                ),
            }
            state.last = health;
        }
        health
    }

    /// Deferred wait statistics so far
    pub fn wait_stats(&self) -> WaitStats {
        let state = self.state.lock();
        WaitStats {
            count: state.waits.count,
            mean_micros: state.waits.mean,
            stddev_micros: state.waits.stddev(),
        }
    }

    /// Most recent classification
    pub fn last(&self) -> Health {
        self.state.lock().last
    }
}
