//! cadence-placement — the resource allocator.
//!
//! Given a request for a check or build container, picks the best
//! worker and materializes the container there. Build placement is
//! cache-aware: candidate workers are scored strictly by how many of
//! the requested inputs already exist as volumes on them, so input data
//! is re-transferred as little as possible.

pub mod allocator;
pub mod error;

pub use allocator::{Allocator, BuildInput};
pub use error::{AllocError, AllocResult};
