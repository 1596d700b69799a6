//! Scanner error types.

use thiserror::Error;

use cadence_lock::LockError;
use cadence_placement::AllocError;
use cadence_state::StateError;

/// Result type alias for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that fail a scan tick.
///
/// `NotFound` is the configuration-drift signal: the key no longer has
/// a row (or its pipeline is gone), and the caller should stop
/// scheduling it until reconfigured.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("no checker registered for resource type {0:?}")]
    NoChecker(String),

    #[error("state error: {0}")]
    State(StateError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    #[error("allocation error: {0}")]
    Alloc(#[from] AllocError),

    #[error("check invocation failed: {0}")]
    Check(#[source] anyhow::Error),
}

// A missing pipeline row surfaces from the state layer as NotFound;
// fold it into the scanner's own drift signal so callers have a single
// variant to stop scheduling on.
impl From<StateError> for ScanError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NotFound(what) => ScanError::NotFound(what),
            other => ScanError::State(other),
        }
    }
}
