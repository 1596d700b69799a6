//! cadence-workers — the worker pool and its transport seams.
//!
//! Tracks which registered workers are usable and produces live,
//! retry-wrapped handles to them. Handles are lazy: `get_worker` builds
//! no connection — the `Connector` is invoked per operation, and only
//! transient network faults are retried.
//!
//! # Architecture
//!
//! ```text
//! WorkerPool
//!   ├── StateStore (read worker rows + lifecycle state)
//!   ├── Connector (build per-call RuntimeClient / VolumeStoreClient)
//!   └── WorkerHandle (per call)
//!       ├── RetryPolicy (exponential backoff, transient-only)
//!       └── creation locks (serialize same-identity creations)
//! ```

pub mod error;
pub mod pool;
pub mod transport;
pub mod worker;

pub use error::{PoolError, PoolResult};
pub use pool::WorkerPool;
pub use transport::{Connector, RetryPolicy, RuntimeClient, TransportError, VolumeStoreClient};
pub use worker::WorkerHandle;
