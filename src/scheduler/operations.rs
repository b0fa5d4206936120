/*!
 * Scheduler Operations
 * Enqueue, cancel, metrics and reconfiguration
 */

use super::atomic_stats::{Gauges, MetricsSnapshot};
use super::config::SchedulerConfig;
use super::task::{Payload, TaskHandle};
use super::{Scheduler, SchedulerHandle, Shared};
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::types::{Priority, SchedulerId, ShutdownMode};
use std::sync::Arc;
use tracing::info;

impl Shared {
    fn submit(&self, priority: Priority, payload: Payload) -> SchedulerResult<TaskHandle> {
        if self.stop_mode().is_some() {
            return Err(SchedulerError::Closed);
        }

        let (id, state) = self.queues.enqueue(priority, self.clock.as_ref(), payload)?;
        self.stats.inc_enqueued();
        self.signal.notify();

        Ok(TaskHandle::new(id, priority, self.id, state))
    }

    fn try_cancel(&self, handle: &TaskHandle) -> SchedulerResult<()> {
        if handle.owner() != self.id {
            return Err(SchedulerError::ForeignHandle(handle.id()));
        }

        handle.claim_cancel()?;
        self.queues.get(handle.priority()).on_cancelled();
        self.stats.inc_cancelled();
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.stats.snapshot(Gauges {
            immediate_depth: self.queues.len(Priority::Immediate),
            deferred_depth: self.queues.len(Priority::Deferred),
            phase: self.phase(),
        })
    }

    fn reconfigure(&self, config: SchedulerConfig) -> SchedulerResult<()> {
        config.validate()?;
        info!(
            scheduler = %self.id,
            max_immediate_per_tick = config.max_immediate_per_tick,
            starvation_window_us = config.max_starvation_window.as_micros() as u64,
            "Scheduler reconfigured"
        );
        self.config.store(Arc::new(config));
        Ok(())
    }
}

impl SchedulerHandle {
    /// Scheduler this handle belongs to
    #[inline]
    pub fn id(&self) -> SchedulerId {
        self.shared().id
    }

    /// Queue `task` in `priority`'s FIFO
    ///
    /// Never blocks. Fails with [`SchedulerError::Closed`] once shutdown has
    /// been requested.
    pub fn enqueue<F>(&self, priority: Priority, task: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared().submit(
            priority,
            Box::new(move || {
                task();
                Ok(())
            }),
        )
    }

    /// Queue a task whose `Err` is reported like a panic
    pub fn enqueue_fallible<F>(&self, priority: Priority, task: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.shared().submit(priority, Box::new(task))
    }

    #[inline]
    pub fn immediate<F>(&self, task: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Priority::Immediate, task)
    }

    #[inline]
    pub fn deferred<F>(&self, task: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(Priority::Deferred, task)
    }

    /// Cancel a queued task, reporting why it could not be cancelled
    ///
    /// Exactly one of cancel and dequeue wins for any task.
    pub fn try_cancel(&self, handle: &TaskHandle) -> SchedulerResult<()> {
        self.shared().try_cancel(handle)
    }

    /// Cancel a queued task; `false` if it already started, finished, or
    /// was cancelled
    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        self.try_cancel(handle).is_ok()
    }

    /// Runnable tasks in one class
    pub fn len(&self, priority: Priority) -> usize {
        self.shared().queues.len(priority)
    }

    /// Both queues are empty
    pub fn is_idle(&self) -> bool {
        self.shared().queues.is_idle()
    }

    /// Read without blocking the loop
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared().metrics()
    }

    pub fn config(&self) -> SchedulerConfig {
        (**self.shared().config.load()).clone()
    }

    /// Swap the configuration; the loop picks it up at its next tick
    pub fn reconfigure(&self, config: SchedulerConfig) -> SchedulerResult<()> {
        self.shared().reconfigure(config)
    }

    /// Begin shutdown without waiting for the loop
    ///
    /// Usable from inside a task. The owner's [`Scheduler::stop`] joins.
    pub fn request_stop(&self, mode: ShutdownMode) {
        self.shared().request_stop(mode);
    }

    /// Shutdown has been requested
    pub fn is_closed(&self) -> bool {
        self.shared().stop_mode().is_some()
    }
}

impl Scheduler {
    #[inline]
    pub fn id(&self) -> SchedulerId {
        self.shared().id
    }

    /// See [`SchedulerHandle::enqueue`]
    pub fn enqueue<F>(&self, priority: Priority, task: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.enqueue(priority, task)
    }

    /// See [`SchedulerHandle::enqueue_fallible`]
    pub fn enqueue_fallible<F>(&self, priority: Priority, task: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.handle.enqueue_fallible(priority, task)
    }

    pub fn immediate<F>(&self, task: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.immediate(task)
    }

    pub fn deferred<F>(&self, task: F) -> SchedulerResult<TaskHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.deferred(task)
    }

    pub fn try_cancel(&self, handle: &TaskHandle) -> SchedulerResult<()> {
        self.handle.try_cancel(handle)
    }

    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        self.handle.cancel(handle)
    }

    pub fn len(&self, priority: Priority) -> usize {
        self.handle.len(priority)
    }

    pub fn is_idle(&self) -> bool {
        self.handle.is_idle()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.handle.metrics()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.handle.config()
    }

    pub fn reconfigure(&self, config: SchedulerConfig) -> SchedulerResult<()> {
        self.handle.reconfigure(config)
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}
