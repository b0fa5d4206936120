/*!
 * Scheduler Module
 *
 * Fair cooperative scheduling over two priority classes.
 *
 * [`Scheduler`] owns the loop thread; [`SchedulerHandle`] is what producers
 * and running tasks hold. Handles share the scheduler state but never the
 * worker, so a task that captures a handle cannot keep its own loop alive.
 */

mod atomic_stats;
mod builder;
mod config;
mod drain;
mod event_loop;
mod guard;
mod lifecycle;
mod operations;
mod queue;
mod task;

pub use atomic_stats::MetricsSnapshot;
pub use builder::SchedulerBuilder;
pub use config::SchedulerConfig;
pub use drain::{DrainBudget, DrainOutcome, DrainStop};
pub use event_loop::{LoopPhase, TickReport};
pub use guard::GuardVerdict;
pub use lifecycle::ShutdownReport;
pub use task::{TaskHandle, TaskInfo};

use crate::core::clock::Clock;
use crate::core::errors::TaskExecutionError;
use crate::core::sync::WakeSignal;
use crate::core::types::{SchedulerId, ShutdownMode};
use crate::monitoring::MetricsCollector;
use arc_swap::ArcSwap;
use guard::StarvationGuard;
use parking_lot::Mutex;
use queue::QueuePair;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use atomic_stats::AtomicSchedulerStats;

/// Receives every task failure; called on the loop thread
pub type ErrorHandler = Arc<dyn Fn(&TaskExecutionError, &TaskInfo) + Send + Sync>;

const STOP_NONE: u8 = 0;
const STOP_GRACEFUL: u8 = 1;
const STOP_IMMEDIATE: u8 = 2;

/// State shared by the owner, every handle, and the loop
pub(crate) struct Shared {
    pub(crate) id: SchedulerId,
    pub(crate) queues: QueuePair,
    pub(crate) config: ArcSwap<SchedulerConfig>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) error_handler: ErrorHandler,
    pub(crate) stats: AtomicSchedulerStats,
    pub(crate) guard: StarvationGuard,
    pub(crate) signal: WakeSignal,
    pub(crate) collector: Option<Arc<MetricsCollector>>,
    phase: AtomicU8,
    /// Escalates only: none < graceful < immediate
    stop_request: AtomicU8,
    /// Set while some thread owns loop progression
    driving: AtomicBool,
}

impl Shared {
    pub(crate) fn new(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        error_handler: ErrorHandler,
        collector: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let origin = clock.now();
        Self {
            id: crate::core::id::next_scheduler_id(),
            queues: QueuePair::new(),
            config: ArcSwap::from_pointee(config),
            clock,
            error_handler,
            stats: AtomicSchedulerStats::default(),
            guard: StarvationGuard::new(origin),
            signal: WakeSignal::new(),
            collector,
            phase: AtomicU8::new(LoopPhase::Idle as u8),
            stop_request: AtomicU8::new(STOP_NONE),
            driving: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn stop_mode(&self) -> Option<ShutdownMode> {
        match self.stop_request.load(Ordering::SeqCst) {
            STOP_NONE => None,
            STOP_GRACEFUL => Some(ShutdownMode::Graceful),
            _ => Some(ShutdownMode::Immediate),
        }
    }

    /// Record a stop request; an immediate request overrides a graceful one
    pub(crate) fn escalate_stop(&self, mode: ShutdownMode) -> Option<ShutdownMode> {
        let raw = match mode {
            ShutdownMode::Graceful => STOP_GRACEFUL,
            ShutdownMode::Immediate => STOP_IMMEDIATE,
        };
        let previous = self.stop_request.fetch_max(raw, Ordering::SeqCst);
        match previous {
            STOP_NONE => None,
            STOP_GRACEFUL => Some(ShutdownMode::Graceful),
            _ => Some(ShutdownMode::Immediate),
        }
    }

    #[inline]
    pub(crate) fn set_phase(&self, phase: LoopPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    #[inline]
    pub(crate) fn phase(&self) -> LoopPhase {
        LoopPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Take ownership of loop progression
    ///
    /// Sequentially consistent together with `stop_request`: a stopper that
    /// loses the claim is guaranteed the releasing driver sees its request.
    #[inline]
    pub(crate) fn claim_driver(&self) -> bool {
        self.driving
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    #[inline]
    pub(crate) fn release_driver(&self) {
        self.driving.store(false, Ordering::SeqCst);
    }
}

/// Owner of a scheduler instance and its loop thread
///
/// Dropping a scheduler whose loop is still running performs an immediate
/// shutdown. Call [`Scheduler::stop`] to choose the mode explicitly.
pub struct Scheduler {
    handle: SchedulerHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Cheap clonable access for producers and tasks
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a scheduler with the system clock and the logging error handler
    pub fn new(config: SchedulerConfig) -> crate::core::errors::SchedulerResult<Self> {
        Self::builder().with_config(config).build()
    }

    pub fn builder() -> SchedulerBuilder {
        SchedulerBuilder::new()
    }

    pub(crate) fn from_shared(shared: Shared) -> Self {
        Self {
            handle: SchedulerHandle {
                shared: Arc::new(shared),
            },
            worker: Mutex::new(None),
        }
    }

    /// A producer handle that does not own the loop
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    #[inline]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.handle.shared
    }
}

impl SchedulerHandle {
    #[inline]
    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.shared().id)
            .field("phase", &self.shared().phase())
            .finish()
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("id", &self.shared.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::SystemClock;

    fn shared() -> Shared {
        Shared::new(
            SchedulerConfig::default(),
            Arc::new(SystemClock),
            Arc::new(|_, _| {}),
            None,
        )
    }

    #[test]
    fn test_stop_request_escalates() {
        let shared = shared();
        assert_eq!(shared.stop_mode(), None);

        assert_eq!(shared.escalate_stop(ShutdownMode::Graceful), None);
        assert_eq!(shared.stop_mode(), Some(ShutdownMode::Graceful));

        assert_eq!(
            shared.escalate_stop(ShutdownMode::Immediate),
            Some(ShutdownMode::Graceful)
        );
        // A later graceful request never downgrades
        shared.escalate_stop(ShutdownMode::Graceful);
        assert_eq!(shared.stop_mode(), Some(ShutdownMode::Immediate));
    }

    #[test]
    fn test_single_driver() {
        let shared = shared();
        assert!(shared.claim_driver());
        assert!(!shared.claim_driver());
        shared.release_driver();
        assert!(shared.claim_driver());
    }

    #[test]
    fn test_instances_get_distinct_ids() {
        assert_ne!(shared().id, shared().id);
    }
}
