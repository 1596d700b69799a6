//! Transport seams to remote workers, plus the retry policy that wraps
//! them.
//!
//! The wire protocols themselves are external capabilities; the pool
//! only defines the traits it consumes. `Connector` builds a *fresh*
//! client per call — nothing here is cached.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use cadence_core::config::WorkersConfig;
use cadence_core::{
    Container, ContainerIdentifier, ContainerMetadata, ContainerSpec, ContentIdentity, Volume,
    VolumeMount, WorkerInfo,
};

/// A fault talking to a worker endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level fault; the operation may be retried.
    #[error("worker unreachable: {0}")]
    Unreachable(String),

    /// The remote processed the request and rejected it; retrying
    /// cannot help.
    #[error("remote error: {0}")]
    Remote(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Unreachable(_))
    }
}

/// Container runtime endpoint of one worker.
///
/// `find_or_create_container` may return an existing container when one
/// with the same content identity is already present; creation against
/// the same identity is serialized by the caller.
pub trait RuntimeClient: Send + Sync {
    fn find_or_create_container(
        &self,
        identifier: &ContainerIdentifier,
        metadata: &ContainerMetadata,
        spec: &ContainerSpec,
        mounts: &[VolumeMount],
        output_paths: &BTreeMap<String, String>,
    ) -> Result<Container, TransportError>;
}

/// Volume store endpoint of one worker, keyed by content identity.
pub trait VolumeStoreClient: Send + Sync {
    fn lookup_volume(&self, identity: &ContentIdentity)
    -> Result<Option<Volume>, TransportError>;
}

/// Builds per-call clients from a worker's advertised addresses.
pub trait Connector: Send + Sync {
    fn runtime(&self, worker: &WorkerInfo) -> Result<Box<dyn RuntimeClient>, TransportError>;

    /// `Ok(None)` when the worker advertises no volume store.
    fn volume_store(
        &self,
        worker: &WorkerInfo,
    ) -> Result<Option<Box<dyn VolumeStoreClient>>, TransportError>;
}

/// Exponential backoff for transient transport faults. Application
/// errors (`TransportError::Remote`) surface on first occurrence.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per subsequent retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&WorkersConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &WorkersConfig) -> Self {
        Self {
            max_attempts: config.retry_max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_ms),
            max_delay: Duration::from_millis(config.retry_cap_ms),
        }
    }

    /// Run `op`, retrying transient faults up to the attempt budget.
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        let mut attempt: u32 = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(op = what, error = %e, ?delay, "transient transport fault, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        let ms = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(ms).min(self.max_delay)
    }
}
