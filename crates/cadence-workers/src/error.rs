//! Worker pool error types.

use thiserror::Error;

use crate::transport::TransportError;

/// Result type alias for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors that can occur resolving workers or talking to them.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker not running: {0}")]
    WorkerNotRunning(String),

    #[error("state store error: {0}")]
    State(#[from] cadence_state::StateError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}
