/*!
 * Scheduled Tasks
 *
 * A [`Task`] is owned by exactly one queue until the loop runs it, skips it
 * as a cancelled tombstone, or discards it on shutdown. The producer keeps a
 * [`TaskHandle`] that shares only the task's state cell.
 *
 * # Exclusive Cancellation
 *
 * Every transition out of `Queued` is a single compare-and-swap on the shared
 * cell. Cancel swaps `Queued -> Cancelled`; the loop swaps `Queued -> Running`
 * at dequeue. Whichever lands first wins and the other observes the new
 * state, so a task is never both cancelled and executed.
 */

use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::types::{Priority, SchedulerId, TaskId, TaskStatus};
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Boxed task body. Infallible closures are adapted to return `Ok(())`.
pub(crate) type Payload = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Shared lifecycle cell
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(TaskStatus::Queued as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> TaskStatus {
        TaskStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Leave `Queued` for `to`; fails with the state that won instead
    #[inline]
    pub(crate) fn claim(&self, to: TaskStatus) -> Result<(), TaskStatus> {
        self.0
            .compare_exchange(
                TaskStatus::Queued as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(TaskStatus::from_u8)
    }

    /// Settle a running task
    #[inline]
    pub(crate) fn finish(&self, outcome: TaskStatus) {
        debug_assert!(matches!(outcome, TaskStatus::Completed | TaskStatus::Failed));
        let prev = self.0.swap(outcome as u8, Ordering::AcqRel);
        assert_eq!(
            prev,
            TaskStatus::Running as u8,
            "task settled from non-running state"
        );
    }
}

/// Metadata describing a task, handed to the error handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub priority: Priority,
    pub enqueued_at: Instant,
}

/// A unit of deferred work
pub(crate) struct Task {
    info: TaskInfo,
    payload: Payload,
    state: Arc<StateCell>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        priority: Priority,
        enqueued_at: Instant,
        payload: Payload,
    ) -> (Self, Arc<StateCell>) {
        let state = Arc::new(StateCell::new());
        let task = Self {
            info: TaskInfo {
                id,
                priority,
                enqueued_at,
            },
            payload,
            state: Arc::clone(&state),
        };
        (task, state)
    }

    #[inline]
    pub(crate) fn id(&self) -> TaskId {
        self.info.id
    }

    #[inline]
    pub(crate) fn enqueued_at(&self) -> Instant {
        self.info.enqueued_at
    }

    #[inline]
    pub(crate) fn state(&self) -> &StateCell {
        &self.state
    }

    /// Give up the payload once the task has been claimed for running
    pub(crate) fn into_parts(self) -> (TaskInfo, Payload, Arc<StateCell>) {
        (self.info, self.payload, self.state)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.info.id)
            .field("priority", &self.info.priority)
            .field("state", &self.state.load())
            .finish()
    }
}

/// Producer-side reference to an enqueued task
#[derive(Clone)]
pub struct TaskHandle {
    id: TaskId,
    priority: Priority,
    owner: SchedulerId,
    state: Arc<StateCell>,
}

impl TaskHandle {
    pub(crate) fn new(
        id: TaskId,
        priority: Priority,
        owner: SchedulerId,
        state: Arc<StateCell>,
    ) -> Self {
        Self {
            id,
            priority,
            owner,
            state,
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    #[inline]
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Scheduler that issued this handle
    #[inline]
    pub fn owner(&self) -> SchedulerId {
        self.owner
    }

    /// Current lifecycle state
    #[inline]
    pub fn status(&self) -> TaskStatus {
        self.state.load()
    }

    /// Whether the task reached a terminal state
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.status().is_terminal()
    }

    /// Attempt the `Queued -> Cancelled` transition
    pub(crate) fn claim_cancel(&self) -> SchedulerResult<()> {
        self.state.claim(TaskStatus::Cancelled).map_err(|won| match won {
            TaskStatus::Running => SchedulerError::TaskAlreadyExecuting(self.id),
            TaskStatus::Cancelled => SchedulerError::TaskCancelled(self.id),
            TaskStatus::Discarded => SchedulerError::Closed,
            TaskStatus::Completed | TaskStatus::Failed => SchedulerError::TaskFinished(self.id),
            TaskStatus::Queued => unreachable!("compare_exchange failed against Queued"),
        })
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("owner", &self.owner)
            .field("status", &self.status())
            .finish()
    }
}
