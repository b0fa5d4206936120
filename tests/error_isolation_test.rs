/*!
 * Error Isolation Tests
 * Failing tasks are reported once and never stop the loop
 */

use anyhow::Context;
use fair_scheduler::monitoring::MetricsCollector;
use fair_scheduler::{
    FailureKind, ManualClock, Priority, Scheduler, ShutdownMode, TaskExecutionError, TaskInfo,
    TaskStatus,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Reports = Arc<Mutex<Vec<(TaskExecutionError, TaskInfo)>>>;

fn recording_scheduler() -> (Scheduler, Reports) {
    let reports: Reports = Arc::default();
    let sink = Arc::clone(&reports);
    let scheduler = Scheduler::builder()
        .with_clock(ManualClock::new())
        .with_error_handler(move |failure, info| {
            sink.lock().unwrap().push((failure.clone(), *info));
        })
        .build()
        .unwrap();
    (scheduler, reports)
}

#[test]
fn test_panicking_task_does_not_block_next_tasks() {
    let (scheduler, reports) = recording_scheduler();
    let ran = Arc::new(AtomicUsize::new(0));

    let bad = scheduler.immediate(|| panic!("validator exploded")).unwrap();
    for priority in Priority::ALL {
        let ran = Arc::clone(&ran);
        scheduler
            .enqueue(priority, move || {
                ran.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    assert_eq!(scheduler.run_until_idle().unwrap(), 3);
    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(bad.status(), TaskStatus::Failed);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    let (failure, info) = &reports[0];
    assert_eq!(failure.task_id, bad.id());
    assert_eq!(info.id, bad.id());
    assert_eq!(info.priority, Priority::Immediate);
    assert_eq!(failure.kind, FailureKind::Panicked("validator exploded".to_string()));

    let metrics = scheduler.metrics();
    assert_eq!(metrics.total_task_errors, 1);
    assert_eq!(metrics.total_tasks_executed, 3);
}

#[test]
fn test_returned_error_reported_with_context() {
    let (scheduler, reports) = recording_scheduler();

    let handle = scheduler
        .enqueue_fallible(Priority::Deferred, || {
            Err(anyhow::anyhow!("connection reset")).context("delivering I/O completion")
        })
        .unwrap();
    let ok = scheduler
        .enqueue_fallible(Priority::Deferred, || Ok(()))
        .unwrap();

    scheduler.run_until_idle().unwrap();

    assert_eq!(handle.status(), TaskStatus::Failed);
    assert_eq!(ok.status(), TaskStatus::Completed);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(!reports[0].0.is_panic());
    assert_eq!(
        reports[0].0.kind,
        FailureKind::Errored("delivering I/O completion: connection reset".to_string())
    );
    assert_eq!(scheduler.metrics().total_task_errors, 1);
}

#[test]
fn test_each_failure_counted_once() {
    let (scheduler, reports) = recording_scheduler();

    for i in 0..10 {
        if i % 3 == 0 {
            scheduler.deferred(move || panic!("task {i} failed")).unwrap();
        } else {
            scheduler.immediate(|| {}).unwrap();
        }
    }
    scheduler.run_until_idle().unwrap();

    assert_eq!(scheduler.metrics().total_task_errors, 4);
    assert_eq!(reports.lock().unwrap().len(), 4);
}

#[test]
fn test_panicking_error_handler_is_contained() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let scheduler = Scheduler::builder()
        .with_error_handler(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("handler is broken too");
        })
        .build()
        .unwrap();

    scheduler.immediate(|| panic!("first")).unwrap();
    scheduler.immediate(|| panic!("second")).unwrap();
    let survivor = scheduler.deferred(|| {}).unwrap();

    scheduler.start().unwrap();
    let report = scheduler.stop(ShutdownMode::Graceful);

    assert!(report.joined);
    assert_eq!(scheduler.metrics().total_tasks_executed, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(survivor.status(), TaskStatus::Completed);
}

#[test]
fn test_collector_sees_failures_and_latency() {
    let clock = ManualClock::new();
    let collector = Arc::new(MetricsCollector::new());
    let scheduler = Scheduler::builder()
        .with_clock(clock.clone())
        .with_collector(Arc::clone(&collector))
        .with_error_handler(|_, _| {})
        .build()
        .unwrap();

    scheduler.deferred(|| panic!("boom")).unwrap();
    {
        let clock = clock.clone();
        scheduler
            .immediate(move || clock.advance(Duration::from_millis(2)))
            .unwrap();
    }
    scheduler.run_until_idle().unwrap();

    let snapshot = collector.snapshot();
    assert_eq!(snapshot.counters["tasks.deferred.failed"], 1.0);
    assert_eq!(snapshot.counters["tasks.immediate.executed"], 1.0);
    assert_eq!(snapshot.histograms["tasks.immediate.run_seconds"].p50, 0.005);
    // The Deferred task waited behind 2ms of Immediate work
    assert_eq!(snapshot.histograms["tasks.deferred.wait_seconds"].p50, 0.005);
}
