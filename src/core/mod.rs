/*!
 * Core Module
 * Fundamental scheduler types, clocks and error handling
 */

pub mod clock;
pub mod errors;
pub mod id;
pub mod limits;
pub mod serde;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::*;
pub use types::*;
