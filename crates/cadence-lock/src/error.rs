//! Error types for the lease lock manager.

use thiserror::Error;

/// Result type alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur acquiring or releasing leases.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to open lock database: {0}")]
    Open(String),

    #[error("lock storage error: {0}")]
    Storage(String),

    #[error("lease encoding error: {0}")]
    Encoding(String),
}
