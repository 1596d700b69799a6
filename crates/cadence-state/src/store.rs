//! StateStore — redb-backed persistence for the scheduling core.
//!
//! Typed CRUD over pipelines, resource/resource-type rows, and workers.
//! Values are JSON-serialized into redb's `&[u8]` value columns. Both
//! on-disk and in-memory backends are supported (the latter for tests).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use cadence_core::{PipelineRecord, SavedResource, SavedResourceType, Version, WorkerInfo, WorkerState};

use crate::error::{StateError, StateResult};
use crate::pipeline::PipelineHandle;
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PIPELINES).map_err(map_err!(Table))?;
        txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        txn.open_table(RESOURCE_TYPES).map_err(map_err!(Table))?;
        txn.open_table(WORKERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Scoped view of a single pipeline, as consumed by the scanner.
    pub fn pipeline(&self, name: &str) -> PipelineHandle {
        PipelineHandle::new(self.clone(), name)
    }

    // ── Pipelines ──────────────────────────────────────────────────

    /// Insert or update a pipeline record.
    pub fn put_pipeline(&self, pipeline: &PipelineRecord) -> StateResult<()> {
        let value = serde_json::to_vec(pipeline).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PIPELINES).map_err(map_err!(Table))?;
            table
                .insert(pipeline.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(pipeline = %pipeline.name, "pipeline stored");
        Ok(())
    }

    /// Get a pipeline by name.
    pub fn get_pipeline(&self, name: &str) -> StateResult<Option<PipelineRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PIPELINES).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: PipelineRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Store a pipeline and materialize its resource/resource-type rows.
    ///
    /// Existing baseline versions are preserved; rows no longer in the
    /// configuration are removed.
    pub fn apply_config(&self, pipeline: &PipelineRecord) -> StateResult<()> {
        self.put_pipeline(pipeline)?;

        let mut resources = Vec::with_capacity(pipeline.config.resources.len());
        for config in &pipeline.config.resources {
            let existing = self.get_resource(&pipeline.name, &config.name)?;
            resources.push(SavedResource {
                pipeline: pipeline.name.clone(),
                config: config.clone(),
                version: existing.and_then(|r| r.version),
            });
        }

        let mut resource_types = Vec::with_capacity(pipeline.config.resource_types.len());
        for config in &pipeline.config.resource_types {
            let existing = self.get_resource_type(&pipeline.name, &config.name)?;
            resource_types.push(SavedResourceType {
                pipeline: pipeline.name.clone(),
                config: config.clone(),
                version: existing.and_then(|r| r.version),
            });
        }

        let prefix = format!("{}/", pipeline.name);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            retain_prefixed(&mut table, &prefix, |k| {
                resources.iter().any(|r| scoped_key(&r.pipeline, &r.config.name) == k)
            })?;
            for row in &resources {
                let key = scoped_key(&row.pipeline, &row.config.name);
                let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }

            let mut table = txn.open_table(RESOURCE_TYPES).map_err(map_err!(Table))?;
            retain_prefixed(&mut table, &prefix, |k| {
                resource_types
                    .iter()
                    .any(|r| scoped_key(&r.pipeline, &r.config.name) == k)
            })?;
            for row in &resource_types {
                let key = scoped_key(&row.pipeline, &row.config.name);
                let value = serde_json::to_vec(row).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;

        debug!(
            pipeline = %pipeline.name,
            resources = resources.len(),
            resource_types = resource_types.len(),
            "pipeline configuration applied"
        );
        Ok(())
    }

    // ── Resources ──────────────────────────────────────────────────

    /// Get a resource row by pipeline and name.
    pub fn get_resource(&self, pipeline: &str, name: &str) -> StateResult<Option<SavedResource>> {
        let key = scoped_key(pipeline, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let row: SavedResource =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Set a resource's baseline version. Fails with `NotFound` if the
    /// row does not exist.
    pub fn save_resource_version(
        &self,
        pipeline: &str,
        name: &str,
        version: &Version,
    ) -> StateResult<()> {
        let key = scoped_key(pipeline, name);
        let mut row = self
            .get_resource(pipeline, name)?
            .ok_or_else(|| StateError::NotFound(format!("resource {key}")))?;
        row.version = Some(version.clone());

        let value = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(resource = %key, ?version, "resource baseline saved");
        Ok(())
    }

    // ── Resource types ─────────────────────────────────────────────

    /// Get a resource-type row by pipeline and name.
    pub fn get_resource_type(
        &self,
        pipeline: &str,
        name: &str,
    ) -> StateResult<Option<SavedResourceType>> {
        let key = scoped_key(pipeline, name);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RESOURCE_TYPES).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let row: SavedResourceType =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    /// Set a resource type's baseline version.
    pub fn save_resource_type_version(
        &self,
        pipeline: &str,
        name: &str,
        version: &Version,
    ) -> StateResult<()> {
        let key = scoped_key(pipeline, name);
        let mut row = self
            .get_resource_type(pipeline, name)?
            .ok_or_else(|| StateError::NotFound(format!("resource type {key}")))?;
        row.version = Some(version.clone());

        let value = serde_json::to_vec(&row).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCE_TYPES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(resource_type = %key, ?version, "resource type baseline saved");
        Ok(())
    }

    // ── Workers ────────────────────────────────────────────────────

    /// Insert or update a worker row (written by the external
    /// registration process).
    pub fn put_worker(&self, worker: &WorkerInfo) -> StateResult<()> {
        let value = serde_json::to_vec(worker).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            table
                .insert(worker.name.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get a worker by name.
    pub fn get_worker(&self, name: &str) -> StateResult<Option<WorkerInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        match table.get(name).map_err(map_err!(Read))? {
            Some(guard) => {
                let worker: WorkerInfo =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(worker))
            }
            None => Ok(None),
        }
    }

    /// List all registered workers, sorted by name (redb iterates keys
    /// in order).
    pub fn list_workers(&self) -> StateResult<Vec<WorkerInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let worker: WorkerInfo =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(worker);
        }
        Ok(results)
    }

    /// Move a worker to a new lifecycle state, enforcing the monotonic
    /// Running→{Stalled,Landing}→Landed order.
    pub fn transition_worker(&self, name: &str, next: WorkerState) -> StateResult<()> {
        let mut worker = self
            .get_worker(name)?
            .ok_or_else(|| StateError::NotFound(format!("worker {name}")))?;

        if !worker.state.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                worker: name.to_string(),
                from: worker.state,
                to: next,
            });
        }

        let from = worker.state;
        worker.state = next;
        self.put_worker(&worker)?;
        debug!(worker = %name, ?from, to = ?next, "worker state transitioned");
        Ok(())
    }

    /// Remove a worker row. Returns true if it existed.
    pub fn delete_worker(&self, name: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            existed = table.remove(name).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

/// Composite key for pipeline-scoped rows.
fn scoped_key(pipeline: &str, name: &str) -> String {
    format!("{pipeline}/{name}")
}

/// Drop prefixed keys for which `keep` returns false.
fn retain_prefixed(
    table: &mut redb::Table<'_, &'static str, &'static [u8]>,
    prefix: &str,
    keep: impl Fn(&str) -> bool,
) -> StateResult<()> {
    let stale: Vec<String> = table
        .iter()
        .map_err(map_err!(Read))?
        .filter_map(|entry| {
            let (key, _) = entry.ok()?;
            let k = key.value().to_string();
            (k.starts_with(prefix) && !keep(&k)).then_some(k)
        })
        .collect();
    for key in stale {
        table.remove(key.as_str()).map_err(map_err!(Write))?;
    }
    Ok(())
}
