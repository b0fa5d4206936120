/*!
 * Structured Tracing
 * Subscriber setup and per-task spans using the tracing crate
 *
 * Features:
 * - JSON-formatted logs for structured parsing
 * - One span per executed task carrying id, class and outcome
 * - Slow-task warnings (a long task delays every pending Deferred task)
 */

use crate::core::limits::SLOW_TASK_THRESHOLD;
use crate::scheduler::TaskInfo;
use std::time::Duration;
use tracing::{info, span, trace, warn, Level, Span};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable enabling JSON output
pub const ENV_TRACE_JSON: &str = "SCHEDULER_TRACE_JSON";

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - SCHEDULER_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(false),
            )
            .init();
        info!("Structured tracing initialized with JSON output");
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::NONE)
                    .compact(),
            )
            .init();
        info!("Structured tracing initialized");
    }
}

/// Span covering one task execution
pub(crate) struct TaskSpan {
    span: Span,
    info: TaskInfo,
}

impl TaskSpan {
    pub fn new(info: &TaskInfo) -> Self {
        let span = span!(
            Level::TRACE,
            "task",
            id = info.id.0,
            priority = info.priority.as_str(),
            run_us = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        Self { span, info: *info }
    }

    /// Enter the span for the duration of the task body
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Record how the task went
    pub fn finish(&self, run: Duration, failed: bool) {
        let run_us = run.as_micros() as u64;
        let outcome = if failed { "failed" } else { "completed" };
        self.span.record("run_us", run_us);
        self.span.record("outcome", outcome);

        if run > SLOW_TASK_THRESHOLD {
            warn!(
                task_id = self.info.id.0,
                priority = self.info.priority.as_str(),
                run_ms = run.as_millis() as u64,
                slow = true,
                "slow task held the scheduler loop"
            );
        } else {
            trace!(task_id = self.info.id.0, run_us, outcome, "task finished");
        }
    }
}
