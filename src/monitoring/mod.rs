/*!
 * Scheduler Monitoring
 * Metrics export, starvation detection and tracing setup
 */

mod metrics;
mod starvation;
mod tracer;

pub use metrics::{CollectorSnapshot, HistogramStats, MetricsCollector};
pub use starvation::{Health, StarvationDetector, WaitStats};
pub use tracer::{init_tracing, ENV_TRACE_JSON};

pub(crate) use tracer::TaskSpan;
