/*!
 * Scheduler Configuration
 *
 * Runtime configuration for the drain policy and starvation guard
 */

use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::limits::{
    DEFAULT_MAX_IMMEDIATE_PER_TICK, DEFAULT_MAX_STARVATION_WINDOW, LOW_LATENCY_IMMEDIATE_PER_TICK,
    LOW_LATENCY_STARVATION_WINDOW, MAX_IMMEDIATE_PER_TICK_LIMIT, MAX_STARVATION_WINDOW_LIMIT,
    THROUGHPUT_IMMEDIATE_PER_TICK, THROUGHPUT_STARVATION_WINDOW,
};
use crate::core::serde::{duration_micros, is_none, optional_duration_micros};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Environment variable overriding `max_immediate_per_tick`
pub const ENV_MAX_IMMEDIATE_PER_TICK: &str = "SCHEDULER_MAX_IMMEDIATE_PER_TICK";
/// Environment variable setting `max_immediate_duration` in microseconds
pub const ENV_MAX_IMMEDIATE_DURATION_US: &str = "SCHEDULER_MAX_IMMEDIATE_DURATION_US";
/// Environment variable overriding `max_starvation_window` in milliseconds
pub const ENV_STARVATION_WINDOW_MS: &str = "SCHEDULER_STARVATION_WINDOW_MS";

/// Scheduler configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SchedulerConfig {
    /// Immediate tasks allowed per tick before the Deferred queue is checked
    pub max_immediate_per_tick: usize,
    /// Optional wall-clock cap on the Immediate phase of a tick
    #[serde(with = "optional_duration_micros", skip_serializing_if = "is_none")]
    pub max_immediate_duration: Option<Duration>,
    /// Longest a pending Deferred task may be held back by Immediate work
    #[serde(with = "duration_micros")]
    pub max_starvation_window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_immediate_per_tick: DEFAULT_MAX_IMMEDIATE_PER_TICK,
            max_immediate_duration: None,
            max_starvation_window: DEFAULT_MAX_STARVATION_WINDOW,
        }
    }
}

impl SchedulerConfig {
    /// Configuration optimized for Deferred latency (timers, I/O completions)
    pub const fn low_latency() -> Self {
        Self {
            max_immediate_per_tick: LOW_LATENCY_IMMEDIATE_PER_TICK,
            max_immediate_duration: Some(Duration::from_millis(1)),
            max_starvation_window: LOW_LATENCY_STARVATION_WINDOW,
        }
    }

    /// Configuration optimized for Immediate batch throughput
    pub const fn throughput() -> Self {
        Self {
            max_immediate_per_tick: THROUGHPUT_IMMEDIATE_PER_TICK,
            max_immediate_duration: None,
            max_starvation_window: THROUGHPUT_STARVATION_WINDOW,
        }
    }

    pub fn with_max_immediate_per_tick(mut self, max: usize) -> Self {
        self.max_immediate_per_tick = max;
        self
    }

    pub fn with_max_immediate_duration(mut self, max: Duration) -> Self {
        self.max_immediate_duration = Some(max);
        self
    }

    pub fn with_max_starvation_window(mut self, window: Duration) -> Self {
        self.max_starvation_window = window;
        self
    }

    /// Check bounds
    ///
    /// The starvation window cannot be zero or disabled: the guard is a
    /// guarantee, not an option.
    pub fn validate(&self) -> SchedulerResult<()> {
        if self.max_immediate_per_tick == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_immediate_per_tick must be at least 1".into(),
            ));
        }
        if self.max_immediate_per_tick > MAX_IMMEDIATE_PER_TICK_LIMIT {
            return Err(SchedulerError::InvalidConfig(format!(
                "max_immediate_per_tick {} exceeds limit {}",
                self.max_immediate_per_tick, MAX_IMMEDIATE_PER_TICK_LIMIT
            )));
        }
        if self.max_immediate_duration == Some(Duration::ZERO) {
            return Err(SchedulerError::InvalidConfig(
                "max_immediate_duration must be non-zero when set".into(),
            ));
        }
        if self.max_starvation_window.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "max_starvation_window must be non-zero".into(),
            ));
        }
        if self.max_starvation_window > MAX_STARVATION_WINDOW_LIMIT {
            return Err(SchedulerError::InvalidConfig(format!(
                "max_starvation_window {:?} exceeds limit {:?}",
                self.max_starvation_window, MAX_STARVATION_WINDOW_LIMIT
            )));
        }
        Ok(())
    }

    /// Defaults overlaid with `SCHEDULER_*` environment variables
    pub fn from_env() -> SchedulerResult<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from a key lookup (environment, or a map in tests)
    pub fn overlay<F>(mut self, lookup: F) -> SchedulerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_IMMEDIATE_PER_TICK) {
            let max = parse_number(ENV_MAX_IMMEDIATE_PER_TICK, &raw)?;
            self.max_immediate_per_tick = usize::try_from(max).map_err(|_| {
                SchedulerError::InvalidConfig(format!(
                    "{}={} does not fit in usize",
                    ENV_MAX_IMMEDIATE_PER_TICK, max
                ))
            })?;
        }
        if let Some(raw) = lookup(ENV_MAX_IMMEDIATE_DURATION_US) {
            let micros = parse_number(ENV_MAX_IMMEDIATE_DURATION_US, &raw)?;
            self.max_immediate_duration = (micros > 0).then(|| Duration::from_micros(micros));
        }
        if let Some(raw) = lookup(ENV_STARVATION_WINDOW_MS) {
            self.max_starvation_window =
                Duration::from_millis(parse_number(ENV_STARVATION_WINDOW_MS, &raw)?);
        }

        self.validate()?;
        Ok(self)
    }
}

fn parse_number(key: &str, raw: &str) -> SchedulerResult<u64> {
    raw.trim().parse::<u64>().map_err(|e| {
        warn!(key, value = raw, error = %e, "Rejecting scheduler setting");
        SchedulerError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))
    })
}
