/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{Priority, TaskId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::any::Any;
use thiserror::Error;

/// Scheduler errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SchedulerError {
    #[error("Scheduler is closed")]
    #[diagnostic(
        code(scheduler::closed),
        help("Shutdown has begun on this instance. Do not retry; create a new scheduler.")
    )]
    Closed,

    #[error("Scheduler loop is already running")]
    #[diagnostic(
        code(scheduler::already_running),
        help("Only one driver may own the loop. Stop the background loop before driving it manually.")
    )]
    AlreadyRunning,

    #[error("Task {0} is already executing")]
    #[diagnostic(
        code(scheduler::task_already_executing),
        help("Cancellation is cooperative; a running task cannot be interrupted.")
    )]
    TaskAlreadyExecuting(TaskId),

    #[error("Task {0} has already finished")]
    #[diagnostic(code(scheduler::task_finished))]
    TaskFinished(TaskId),

    #[error("Task {0} was already cancelled")]
    #[diagnostic(code(scheduler::task_cancelled))]
    TaskCancelled(TaskId),

    #[error("Task {0} belongs to a different scheduler")]
    #[diagnostic(
        code(scheduler::foreign_handle),
        help("Handles can only be cancelled through the scheduler that issued them.")
    )]
    ForeignHandle(TaskId),

    #[error("Invalid scheduler configuration: {0}")]
    #[diagnostic(
        code(scheduler::invalid_config),
        help("Budgets and the starvation window must be non-zero and within core::limits bounds.")
    )]
    InvalidConfig(String),

    #[error("Failed to spawn scheduler loop: {0}")]
    #[diagnostic(
        code(scheduler::spawn_failed),
        help("The OS refused to create the loop thread. Check thread limits.")
    )]
    SpawnFailed(String),
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// How a task payload failed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum FailureKind {
    /// The payload panicked
    Panicked(String),
    /// The payload returned an error
    Errored(String),
}

/// A failure raised by a task payload, recovered by the loop
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[error("{priority} task {task_id} failed: {kind}")]
pub struct TaskExecutionError {
    pub task_id: TaskId,
    pub priority: Priority,
    pub kind: FailureKind,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Panicked(msg) => write!(f, "panicked: {}", msg),
            FailureKind::Errored(msg) => write!(f, "{}", msg),
        }
    }
}

impl TaskExecutionError {
    pub(crate) fn panicked(task_id: TaskId, priority: Priority, payload: Box<dyn Any + Send>) -> Self {
        Self {
            task_id,
            priority,
            kind: FailureKind::Panicked(panic_message(payload.as_ref())),
        }
    }

    pub(crate) fn errored(task_id: TaskId, priority: Priority, err: anyhow::Error) -> Self {
        Self {
            task_id,
            priority,
            // {:#} keeps the context chain on one line
            kind: FailureKind::Errored(format!("{:#}", err)),
        }
    }

    /// Whether the failure came from a panic rather than a returned error
    pub fn is_panic(&self) -> bool {
        matches!(self.kind, FailureKind::Panicked(_))
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = SchedulerError::TaskAlreadyExecuting(TaskId(7));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("task_already_executing"));

        let back: SchedulerError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_panic_message_extraction() {
        let static_payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(static_payload.as_ref()), "boom");

        let owned_payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(owned_payload.as_ref()), "owned boom");

        let opaque: Box<dyn Any + Send> = Box::new(42u32);
        assert_eq!(panic_message(opaque.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_errored_keeps_context_chain() {
        let err = anyhow::anyhow!("disk full").context("writing checkpoint");
        let failure = TaskExecutionError::errored(TaskId(3), Priority::Deferred, err);
        assert!(!failure.is_panic());
        assert_eq!(
            failure.to_string(),
            "deferred task task#3 failed: writing checkpoint: disk full"
        );
    }
}
