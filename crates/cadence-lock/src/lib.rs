//! cadence-lock — advisory mutual exclusion with lease expiry.
//!
//! Scanners coordinate same-key check runs through leased locks in a
//! redb database shared by cloning one `LockManager`. Acquisition is
//! non-blocking and atomic (redb serializes write transactions); a
//! holder that never releases is evicted purely by TTL expiry, so a
//! scan loop that dies mid-check needs no heartbeat or break-lock
//! signal.

pub mod error;
pub mod manager;

pub use error::{LockError, LockResult};
pub use manager::{LockGuard, LockManager};
