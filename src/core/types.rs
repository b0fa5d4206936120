/*!
 * Core Types
 * Common types shared by the queues, the loop and the public API
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic sequence counter value
pub type Sequence = u64;

/// Unique task identifier
///
/// Assigned from the scheduler's enqueue sequence, so within one priority
/// class a smaller id always means an earlier position in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Sequence);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Identity of a scheduler instance (used to reject foreign handles)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulerId(pub u64);

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler#{}", self.0)
    }
}

/// Priority class of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Microtask-like work, drained first within a tick
    Immediate,
    /// Macrotask-like work (timers, I/O completions), one per tick
    Deferred,
}

impl Priority {
    pub const ALL: [Priority; 2] = [Priority::Immediate, Priority::Deferred];

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Immediate => "immediate",
            Priority::Deferred => "deferred",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task as seen through its handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum TaskStatus {
    Queued = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
    /// Dropped unexecuted by an immediate shutdown
    Discarded = 5,
}

impl TaskStatus {
    #[inline]
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskStatus::Queued,
            1 => TaskStatus::Running,
            2 => TaskStatus::Completed,
            3 => TaskStatus::Failed,
            4 => TaskStatus::Cancelled,
            5 => TaskStatus::Discarded,
            other => panic!("corrupt task state value {other}"),
        }
    }

    /// Whether the task has reached a state it can never leave
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Queued | TaskStatus::Running)
    }
}

/// What happens to queued work when the scheduler stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Refuse new work, run everything already queued, then halt
    Graceful,
    /// Refuse new work, let the in-flight task finish, discard the rest
    Immediate,
}

impl From<bool> for ShutdownMode {
    /// `true` maps to [`ShutdownMode::Graceful`]
    fn from(graceful: bool) -> Self {
        if graceful {
            ShutdownMode::Graceful
        } else {
            ShutdownMode::Immediate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_through_u8() {
        for status in [
            TaskStatus::Queued,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
            TaskStatus::Discarded,
        ] {
            assert_eq!(TaskStatus::from_u8(status as u8), status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Discarded.is_terminal());
    }

    #[test]
    fn test_shutdown_mode_from_bool() {
        assert_eq!(ShutdownMode::from(true), ShutdownMode::Graceful);
        assert_eq!(ShutdownMode::from(false), ShutdownMode::Immediate);
    }

    #[test]
    fn test_priority_serializes_snake_case() {
        let json = serde_json::to_string(&Priority::Deferred).unwrap();
        assert_eq!(json, "\"deferred\"");
    }
}
