/*!
 * Synchronization Primitives
 *
 * Wait/notify for the scheduler loop. The loop parks only when both queues
 * are empty and every enqueue bumps the signal, so there is no busy polling.
 */

mod signal;

pub use signal::{WakeResult, WakeSignal};
