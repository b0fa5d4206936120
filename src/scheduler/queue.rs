/*!
 * Task Queue Pair
 * One FIFO queue per priority class, sharing a single enqueue sequence
 */

use super::task::{Payload, StateCell, Task};
use crate::core::clock::Clock;
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::id::{IdGenerator, SequenceGenerator};
use crate::core::types::{Priority, TaskId, TaskStatus};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

struct Inner {
    tasks: VecDeque<Task>,
    closed: bool,
}

/// FIFO queue for one priority class
///
/// Cancelled tasks stay in place as tombstones and are dropped when they
/// reach the front. `live` counts only tasks that can still run.
///
/// Payloads are always dropped after the lock is released, since dropping a
/// closure may run arbitrary code (including another enqueue).
pub(crate) struct TaskQueue {
    priority: Priority,
    inner: Mutex<Inner>,
    live: AtomicUsize,
}

impl TaskQueue {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            inner: Mutex::new(Inner {
                tasks: VecDeque::new(),
                closed: false,
            }),
            live: AtomicUsize::new(0),
        }
    }

    /// Append a task; the id is drawn under the lock so ids follow queue order
    pub fn push(
        &self,
        sequence: &SequenceGenerator,
        clock: &dyn Clock,
        payload: Payload,
    ) -> SchedulerResult<(TaskId, Arc<StateCell>)> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(SchedulerError::Closed);
        }

        let id = sequence.next();
        let (task, state) = Task::new(id, self.priority, clock.now(), payload);
        inner.tasks.push_back(task);
        self.live.fetch_add(1, Ordering::AcqRel);

        Ok((id, state))
    }

    /// Remove the oldest runnable task, claiming it as `Running`
    pub fn pop(&self) -> Option<Task> {
        let mut tombstones = Vec::new();

        let claimed = {
            let mut inner = self.inner.lock();
            loop {
                let task = match inner.tasks.pop_front() {
                    Some(task) => task,
                    None => break None,
                };

                match task.state().claim(TaskStatus::Running) {
                    Ok(()) => {
                        self.live.fetch_sub(1, Ordering::AcqRel);
                        break Some(task);
                    }
                    Err(TaskStatus::Cancelled) => tombstones.push(task),
                    Err(other) => panic!(
                        "{} queue held {} in state {:?}",
                        self.priority,
                        task.id(),
                        other
                    ),
                }
            }
        };

        drop(tombstones);
        claimed
    }

    /// Enqueue time of the oldest runnable task, if any
    pub fn oldest_enqueued_at(&self) -> Option<Instant> {
        let mut tombstones = Vec::new();

        let oldest = {
            let mut inner = self.inner.lock();
            while inner
                .tasks
                .front()
                .is_some_and(|task| task.state().load() == TaskStatus::Cancelled)
            {
                tombstones.extend(inner.tasks.pop_front());
            }
            inner.tasks.front().map(Task::enqueued_at)
        };

        drop(tombstones);
        oldest
    }

    /// Account for a successful cancellation
    #[inline]
    pub fn on_cancelled(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    /// Live (runnable) task count
    #[inline]
    pub fn len(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Refuse further pushes
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    /// Remove every queued task without running it; returns how many
    /// runnable tasks were discarded
    pub fn discard(&self) -> usize {
        let drained: Vec<Task> = {
            let mut inner = self.inner.lock();
            inner.tasks.drain(..).collect()
        };

        let mut discarded = 0;
        for task in &drained {
            if task.state().claim(TaskStatus::Discarded).is_ok() {
                self.live.fetch_sub(1, Ordering::AcqRel);
                discarded += 1;
            }
        }

        drop(drained);
        discarded
    }
}

/// Immediate and Deferred queues plus the shared sequence counter
pub(crate) struct QueuePair {
    immediate: TaskQueue,
    deferred: TaskQueue,
    sequence: SequenceGenerator,
}

impl QueuePair {
    pub fn new() -> Self {
        Self {
            immediate: TaskQueue::new(Priority::Immediate),
            deferred: TaskQueue::new(Priority::Deferred),
            sequence: SequenceGenerator::default_start(),
        }
    }

    #[inline]
    pub fn get(&self, priority: Priority) -> &TaskQueue {
        match priority {
            Priority::Immediate => &self.immediate,
            Priority::Deferred => &self.deferred,
        }
    }

    pub fn enqueue(
        &self,
        priority: Priority,
        clock: &dyn Clock,
        payload: Payload,
    ) -> SchedulerResult<(TaskId, Arc<StateCell>)> {
        self.get(priority).push(&self.sequence, clock, payload)
    }

    #[inline]
    pub fn dequeue(&self, priority: Priority) -> Option<Task> {
        self.get(priority).pop()
    }

    #[inline]
    pub fn len(&self, priority: Priority) -> usize {
        self.get(priority).len()
    }

    /// Both queues hold no runnable work
    #[inline]
    pub fn is_idle(&self) -> bool {
        self.immediate.is_empty() && self.deferred.is_empty()
    }

    pub fn close(&self) {
        self.immediate.close();
        self.deferred.close();
    }

    pub fn discard(&self) -> usize {
        self.immediate.discard() + self.deferred.discard()
    }
}
