/*!
 * Fair Scheduler - Demo Entry Point
 *
 * Runs the recursive-validator workload against a live scheduler:
 * - Bursts of Immediate validators that each re-enqueue a follow-up check
 * - A steady stream of Deferred "I/O completions"
 * - Periodic metrics and starvation health reports
 *
 * Ctrl+C performs a graceful shutdown.
 */

use fair_scheduler::monitoring::MetricsCollector;
use fair_scheduler::{
    init_tracing, Health, Scheduler, SchedulerConfig, SchedulerHandle, SchedulerResult, ShutdownMode,
    StarvationDetector,
};
use miette::IntoDiagnostic;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Validators launched per burst
const VALIDATORS_PER_BURST: u64 = 10_000;

/// Follow-up checks each validator schedules for itself
const VALIDATION_DEPTH: u32 = 1;

/// Deferred "I/O completion" cadence
const IO_INTERVAL: Duration = Duration::from_millis(10);

/// Metrics report and validator burst cadence
const REPORT_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> miette::Result<()> {
    init_tracing();

    info!("Fair scheduler demo starting...");
    let config = SchedulerConfig::from_env()?;
    info!(
        max_immediate_per_tick = config.max_immediate_per_tick,
        starvation_window_ms = config.max_starvation_window.as_millis() as u64,
        "Configuration loaded"
    );

    let collector = Arc::new(MetricsCollector::new());
    let scheduler = Scheduler::builder()
        .with_config(config.clone())
        .with_collector(Arc::clone(&collector))
        .build()?;
    let detector = StarvationDetector::new(config.max_starvation_window);

    scheduler.start()?;
    let handle = scheduler.handle();
    info!("Scheduler running - press Ctrl+C to exit");

    let mut io = tokio::time::interval(IO_INTERVAL);
    let mut report = tokio::time::interval(REPORT_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut record: u64 = 0;
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.into_diagnostic()?;
                info!("Shutdown signal received");
                break;
            }
            _ = io.tick() => {
                deliver_io_completion(&handle)?;
            }
            _ = report.tick() => {
                let snapshot = handle.metrics();
                collector.record_snapshot(&snapshot);
                match detector.assess(&snapshot) {
                    Health::Healthy => {}
                    health => warn!(health = ?health, queued = snapshot.total_depth(), "Deferred work is lagging"),
                }
                info!(metrics = %snapshot.to_json().into_diagnostic()?, "Scheduler metrics");

                launch_validators(&handle, record, VALIDATORS_PER_BURST)?;
                record += VALIDATORS_PER_BURST;
            }
        }
    }

    let shutdown = tokio::task::spawn_blocking(move || scheduler.stop(ShutdownMode::Graceful))
        .await
        .into_diagnostic()?;
    info!(
        executed = shutdown.executed,
        discarded = shutdown.discarded,
        "Scheduler stopped"
    );

    let totals = collector.snapshot();
    info!(
        collected = %serde_json::to_string(&totals).into_diagnostic()?,
        "Final collector snapshot"
    );
    Ok(())
}

/// Enqueue a Deferred task standing in for an I/O callback
fn deliver_io_completion(handle: &SchedulerHandle) -> SchedulerResult<()> {
    let issued = Instant::now();
    handle.deferred(move || {
        debug!(
            waited_us = issued.elapsed().as_micros() as u64,
            "I/O completion delivered"
        );
    })?;
    Ok(())
}

/// Enqueue `count` validators starting at record `first`
fn launch_validators(handle: &SchedulerHandle, first: u64, count: u64) -> SchedulerResult<()> {
    for record in first..first + count {
        let next = handle.clone();
        handle.immediate(move || validate(next, record, VALIDATION_DEPTH))?;
    }
    Ok(())
}

/// Check one record, then schedule its follow-up check
fn validate(handle: SchedulerHandle, record: u64, depth: u32) {
    std::hint::black_box(checksum(record));

    if depth > 0 {
        let next = handle.clone();
        if let Err(e) = handle.immediate(move || validate(next, record, depth - 1)) {
            debug!(record, error = %e, "Follow-up validation dropped");
        }
    }
}

fn checksum(record: u64) -> u64 {
    (0..64u64).fold(record, |acc, i| acc.rotate_left(5) ^ i.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}
