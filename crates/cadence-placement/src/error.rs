//! Allocator error types.

use thiserror::Error;

use cadence_workers::{PoolError, TransportError};

/// Result type alias for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// Errors that can occur placing a container.
#[derive(Debug, Error)]
pub enum AllocError {
    #[error("no compatible worker for the requested spec")]
    NoCompatibleWorker,

    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
