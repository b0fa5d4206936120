/*!
 * Shutdown Tests
 * Graceful drain, immediate discard, and the drop fallback
 */

use fair_scheduler::{
    LoopPhase, Priority, Scheduler, SchedulerConfig, SchedulerError, SchedulerResult, ShutdownMode,
    TaskHandle, TaskStatus,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const QUEUED: usize = 25;
const DRIVEN_QUEUED: usize = 5;

/// A started scheduler whose loop is parked inside a gate task, with
/// `QUEUED` counting tasks behind it
struct Gated {
    scheduler: Scheduler,
    release: mpsc::Sender<()>,
    count: Arc<AtomicUsize>,
    handles: Vec<TaskHandle>,
}

fn gated() -> Gated {
    let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    let (release, gate) = mpsc::channel::<()>();
    let (entered_tx, entered) = mpsc::channel::<()>();

    scheduler
        .immediate(move || {
            entered_tx.send(()).unwrap();
            gate.recv().unwrap();
        })
        .unwrap();
    scheduler.start().unwrap();
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let handles = (0..QUEUED)
        .map(|i| {
            let count = Arc::clone(&count);
            let priority = if i % 2 == 0 { Priority::Immediate } else { Priority::Deferred };
            scheduler
                .enqueue(priority, move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
        })
        .collect();

    Gated {
        scheduler,
        release,
        count,
        handles,
    }
}

fn release_later(release: mpsc::Sender<()>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        release.send(()).unwrap();
    })
}

#[test]
fn test_graceful_stop_runs_every_queued_task() {
    let gated = gated();
    let releaser = release_later(gated.release);

    let report = gated.scheduler.stop(ShutdownMode::Graceful);
    releaser.join().unwrap();

    assert_eq!(gated.count.load(Ordering::SeqCst), QUEUED);
    // The in-flight gate task finishes after the request too
    assert_eq!(report.executed, QUEUED as u64 + 1);
    assert_eq!(report.discarded, 0);
    assert!(report.joined);
    assert!(gated.handles.iter().all(|h| h.status() == TaskStatus::Completed));
    assert_eq!(gated.scheduler.metrics().phase, LoopPhase::Stopped);
}

#[test]
fn test_immediate_stop_discards_queued_tasks() {
    let gated = gated();
    let releaser = release_later(gated.release);

    let report = gated.scheduler.stop(ShutdownMode::Immediate);
    releaser.join().unwrap();

    assert_eq!(gated.count.load(Ordering::SeqCst), 0);
    assert_eq!(report.executed, 1);
    assert_eq!(report.discarded, QUEUED as u64);
    assert!(gated.handles.iter().all(|h| h.status() == TaskStatus::Discarded));

    let metrics = gated.scheduler.metrics();
    assert_eq!(metrics.total_tasks_discarded, QUEUED as u64);
    assert_eq!(metrics.total_depth(), 0);
}

#[test]
fn test_enqueue_after_stop_is_closed() {
    let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    let producer = scheduler.handle();
    scheduler.start().unwrap();
    scheduler.stop(ShutdownMode::Graceful);

    assert_eq!(scheduler.immediate(|| {}).err(), Some(SchedulerError::Closed));
    assert_eq!(producer.deferred(|| {}).err(), Some(SchedulerError::Closed));
    assert!(producer.is_closed());
}

#[test]
fn test_drop_falls_back_to_immediate_stop() {
    let gated = gated();
    let releaser = release_later(gated.release);
    let handles = gated.handles;
    let count = gated.count;

    drop(gated.scheduler);
    releaser.join().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert!(handles.iter().all(|h| h.status() == TaskStatus::Discarded));
}

#[test]
fn test_drop_unstarted_settles_handles() {
    let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    let handle = scheduler.deferred(|| {}).unwrap();
    drop(scheduler);
    assert_eq!(handle.status(), TaskStatus::Discarded);
}

#[test]
fn test_task_can_request_stop() {
    let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    let producer = scheduler.handle();
    let (done_tx, done) = mpsc::channel();

    scheduler
        .deferred(move || {
            producer.request_stop(ShutdownMode::Graceful);
            done_tx.send(()).unwrap();
        })
        .unwrap();
    scheduler.start().unwrap();
    done.recv_timeout(Duration::from_secs(5)).unwrap();

    let report = scheduler.stop(ShutdownMode::Graceful);
    assert!(report.joined);
    assert_eq!(scheduler.metrics().phase, LoopPhase::Stopped);
}

#[test]
fn test_parked_loop_wakes_on_enqueue() {
    let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
    scheduler.start().unwrap();
    thread::sleep(Duration::from_millis(20));
    assert!(scheduler.is_running());

    let (tx, rx) = mpsc::channel();
    let producer = scheduler.handle();
    thread::spawn(move || {
        producer
            .deferred(move || {
                tx.send(thread::current().name().map(str::to_string)).unwrap();
            })
            .unwrap();
    })
    .join()
    .unwrap();

    let thread_name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(thread_name.as_deref(), Some("fair-scheduler-loop"));
    scheduler.stop(ShutdownMode::Graceful);
}

/// A scheduler driven by `run_until_idle` on another thread, held inside a
/// gate task with `DRIVEN_QUEUED` Deferred tasks behind it
struct Driven {
    scheduler: Arc<Scheduler>,
    driver: thread::JoinHandle<SchedulerResult<u64>>,
    release: mpsc::Sender<()>,
    count: Arc<AtomicUsize>,
    handles: Vec<TaskHandle>,
}

fn driven() -> Driven {
    let scheduler = Arc::new(Scheduler::new(SchedulerConfig::default()).unwrap());
    let (release, gate) = mpsc::channel::<()>();
    let (entered_tx, entered) = mpsc::channel::<()>();

    scheduler
        .immediate(move || {
            entered_tx.send(()).unwrap();
            gate.recv().unwrap();
        })
        .unwrap();

    let count = Arc::new(AtomicUsize::new(0));
    let handles = (0..DRIVEN_QUEUED)
        .map(|_| {
            let count = Arc::clone(&count);
            scheduler
                .deferred(move || {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
        })
        .collect();

    let driver = {
        let scheduler = Arc::clone(&scheduler);
        thread::spawn(move || scheduler.run_until_idle())
    };
    entered.recv_timeout(Duration::from_secs(5)).unwrap();

    Driven {
        scheduler,
        driver,
        release,
        count,
        handles,
    }
}

#[test]
fn test_graceful_stop_during_manual_drive_runs_queued_tasks() {
    let driven = driven();

    // The driver owns the loop, so stop cannot run the shutdown itself
    let report = driven.scheduler.stop(ShutdownMode::Graceful);
    assert!(!report.joined);
    driven.release.send(()).unwrap();

    assert_eq!(driven.driver.join().unwrap(), Ok(DRIVEN_QUEUED as u64 + 1));
    assert_eq!(driven.count.load(Ordering::SeqCst), DRIVEN_QUEUED);
    assert!(driven.handles.iter().all(|h| h.status() == TaskStatus::Completed));
    assert_eq!(driven.scheduler.metrics().phase, LoopPhase::Stopped);
    assert_eq!(driven.scheduler.run_until_idle(), Err(SchedulerError::Closed));
}

#[test]
fn test_immediate_stop_during_manual_drive_discards_queued_tasks() {
    let driven = driven();

    let report = driven.scheduler.stop(ShutdownMode::Immediate);
    assert_eq!(report.discarded, DRIVEN_QUEUED as u64);
    driven.release.send(()).unwrap();

    // Only the gate task that was already running completes
    assert_eq!(driven.driver.join().unwrap(), Ok(1));
    assert_eq!(driven.count.load(Ordering::SeqCst), 0);
    assert!(driven.handles.iter().all(|h| h.status() == TaskStatus::Discarded));

    let metrics = driven.scheduler.metrics();
    assert_eq!(metrics.phase, LoopPhase::Stopped);
    assert_eq!(metrics.total_depth(), 0);
}

#[test]
fn test_tasks_accepted_during_stop_always_settle() {
    for _ in 0..20 {
        let scheduler = Scheduler::new(SchedulerConfig::default()).unwrap();
        scheduler.start().unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let producer = scheduler.handle();
                let ran = Arc::clone(&ran);
                thread::spawn(move || {
                    let priority = if p % 2 == 0 { Priority::Immediate } else { Priority::Deferred };
                    let mut accepted = Vec::new();
                    loop {
                        let ran = Arc::clone(&ran);
                        match producer.enqueue(priority, move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                        }) {
                            Ok(handle) => accepted.push(handle),
                            Err(e) => {
                                assert_eq!(e, SchedulerError::Closed);
                                break accepted;
                            }
                        }
                    }
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(1));
        let report = scheduler.stop(ShutdownMode::Graceful);
        assert!(report.joined);

        let accepted: Vec<TaskHandle> = producers
            .into_iter()
            .flat_map(|producer| producer.join().unwrap())
            .collect();
        assert!(accepted.iter().all(|h| h.status() == TaskStatus::Completed));
        assert_eq!(ran.load(Ordering::SeqCst), accepted.len());
        assert_eq!(scheduler.metrics().total_depth(), 0);
    }
}
