/*!
 * Scheduler Builder
 * Builder pattern for Scheduler construction
 */

use super::config::SchedulerConfig;
use super::task::TaskInfo;
use super::{ErrorHandler, Scheduler, Shared};
use crate::core::clock::{Clock, SystemClock};
use crate::core::errors::{SchedulerResult, TaskExecutionError};
use crate::monitoring::MetricsCollector;
use std::sync::Arc;
use tracing::{error, info};

/// Builder for Scheduler
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    error_handler: Option<ErrorHandler>,
    collector: Option<Arc<MetricsCollector>>,
}

impl SchedulerBuilder {
    /// Create a new Scheduler builder
    pub fn new() -> Self {
        Self {
            config: SchedulerConfig::default(),
            clock: None,
            error_handler: None,
            collector: None,
        }
    }

    /// Drain budget and starvation window
    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Inject a time source (defaults to the system clock)
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// Report task failures somewhere other than the log
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TaskExecutionError, &TaskInfo) + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    /// Feed per-task wait and run times into a metrics collector
    pub fn with_collector(mut self, collector: Arc<MetricsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Validate the configuration and build a stopped scheduler
    pub fn build(self) -> SchedulerResult<Scheduler> {
        self.config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let handler = self.error_handler.unwrap_or_else(log_failure);
        let shared = Shared::new(self.config, clock, handler, self.collector);

        info!(
            scheduler = %shared.id,
            max_immediate_per_tick = shared.config.load().max_immediate_per_tick,
            starvation_window_us = shared.config.load().max_starvation_window.as_micros() as u64,
            "Scheduler created"
        );
        Ok(Scheduler::from_shared(shared))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Default error handler: one structured error line per failed task
fn log_failure() -> ErrorHandler {
    Arc::new(|failure: &TaskExecutionError, info: &TaskInfo| {
        error!(
            task_id = info.id.0,
            priority = info.priority.as_str(),
            panicked = failure.is_panic(),
            "{}",
            failure
        );
    })
}
