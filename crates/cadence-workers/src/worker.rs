//! Live handle to a single worker.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

use cadence_core::{
    Container, ContainerIdentifier, ContainerMetadata, ContainerSpec, ContentIdentity, Volume,
    VolumeMount, WorkerInfo, WorkerSpec,
};

use crate::error::PoolResult;
use crate::transport::{Connector, RetryPolicy};

/// A usable worker. Holds no open connection — every operation asks the
/// `Connector` for a fresh client and wraps the call in the retry
/// policy.
pub struct WorkerHandle {
    info: WorkerInfo,
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
    creation_locks: CreationLocks,
}

impl WorkerHandle {
    pub(crate) fn new(
        info: WorkerInfo,
        connector: Arc<dyn Connector>,
        retry: RetryPolicy,
        creation_locks: CreationLocks,
    ) -> Self {
        Self {
            info,
            connector,
            retry,
            creation_locks,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &WorkerInfo {
        &self.info
    }

    /// Static compatibility with a container request.
    pub fn satisfies(&self, spec: &WorkerSpec) -> bool {
        self.info.satisfies(spec)
    }

    /// Find or create a container addressed by `identifier` on this
    /// worker. Creations against the same content identity are
    /// serialized so concurrent identical requests converge on one
    /// container instead of racing to create duplicates.
    pub fn find_or_create_container(
        &self,
        identifier: &ContainerIdentifier,
        metadata: &ContainerMetadata,
        spec: &ContainerSpec,
        mounts: &[VolumeMount],
        output_paths: &BTreeMap<String, String>,
    ) -> PoolResult<Container> {
        let identity = identifier.identity();
        let slot = self.creation_locks.slot(&self.info.name, &identity);
        let _creating = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        debug!(worker = %self.info.name, %identity, "finding or creating container");
        let container = self.retry.run("find_or_create_container", || {
            let client = self.connector.runtime(&self.info)?;
            client.find_or_create_container(identifier, metadata, spec, mounts, output_paths)
        })?;
        Ok(container)
    }

    /// Look up a cached volume by content identity on this worker.
    /// `Ok(None)` when the worker has no volume store or no match.
    pub fn lookup_volume(&self, identity: &ContentIdentity) -> PoolResult<Option<Volume>> {
        let Some(client) = self.connector.volume_store(&self.info)? else {
            return Ok(None);
        };
        let volume = self
            .retry
            .run("lookup_volume", || client.lookup_volume(identity))?;
        Ok(volume)
    }
}

// The connector and lock map carry no useful debug state.
impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("worker", &self.info.name)
            .finish_non_exhaustive()
    }
}

/// Worker-scoped creation locks keyed by `{worker}:{identity}`. Shared
/// by every handle the pool produces, so concurrent handles to the same
/// worker still serialize.
#[derive(Clone, Default)]
pub(crate) struct CreationLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl CreationLocks {
    fn slot(&self, worker: &str, identity: &ContentIdentity) -> Arc<Mutex<()>> {
        let key = format!("{worker}:{identity}");
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(key).or_default().clone()
    }
}
