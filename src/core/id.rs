/*!
 * ID Generation
 * Monotonic sequence counters for task ids and scheduler identities
 */

use super::types::{SchedulerId, Sequence, TaskId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Generic ID generator interface
pub trait IdGenerator<T> {
    /// Generate next ID
    fn next(&self) -> T;

    /// Get current counter value (for diagnostics)
    fn current(&self) -> T;
}

/// Lock-free monotonic counter
///
/// # Performance
/// - Cache-line aligned to prevent false sharing with neighbouring queue state
/// - Never recycles: ids double as FIFO tie-breakers and must only grow
#[repr(C, align(64))]
pub struct SequenceGenerator {
    counter: AtomicU64,
}

impl SequenceGenerator {
    /// Create new generator starting at given value
    #[inline]
    pub const fn new(start: Sequence) -> Self {
        Self {
            counter: AtomicU64::new(start),
        }
    }

    /// Create new generator starting at 1
    #[inline]
    pub const fn default_start() -> Self {
        Self::new(1)
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::default_start()
    }
}

impl IdGenerator<TaskId> for SequenceGenerator {
    #[inline]
    fn next(&self) -> TaskId {
        TaskId(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    #[inline]
    fn current(&self) -> TaskId {
        TaskId(self.counter.load(Ordering::Relaxed))
    }
}

static SCHEDULER_IDS: SequenceGenerator = SequenceGenerator::default_start();

/// Allocate a process-unique scheduler identity
#[inline]
pub fn next_scheduler_id() -> SchedulerId {
    SchedulerId(SCHEDULER_IDS.counter.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let generator = SequenceGenerator::default_start();
        let a = generator.next();
        let b = generator.next();
        assert_eq!(a, TaskId(1));
        assert!(b > a);
        assert_eq!(generator.current(), TaskId(3));
    }

    #[test]
    fn test_scheduler_ids_unique() {
        assert_ne!(next_scheduler_id(), next_scheduler_id());
    }
}
