//! WorkerPool — who is usable, and handles to reach them.

use std::sync::Arc;

use tracing::debug;

use cadence_core::WorkerState;
use cadence_state::StateStore;

use crate::error::{PoolError, PoolResult};
use crate::transport::{Connector, RetryPolicy};
use crate::worker::{CreationLocks, WorkerHandle};

/// Tracks the registered worker set and produces live handles.
///
/// One explicitly constructed instance per process; worker rows are
/// re-read from the state store on every call, so registration updates
/// are picked up without a refresh step.
pub struct WorkerPool {
    state: StateStore,
    connector: Arc<dyn Connector>,
    retry: RetryPolicy,
    creation_locks: CreationLocks,
}

impl WorkerPool {
    pub fn new(state: StateStore, connector: Arc<dyn Connector>, retry: RetryPolicy) -> Self {
        Self {
            state,
            connector,
            retry,
            creation_locks: CreationLocks::default(),
        }
    }

    /// Handles for all workers currently in state Running, ordered by
    /// worker name.
    pub fn running_workers(&self) -> PoolResult<Vec<WorkerHandle>> {
        let workers = self.state.list_workers()?;
        let handles: Vec<WorkerHandle> = workers
            .into_iter()
            .filter(|w| w.state == WorkerState::Running)
            .map(|w| self.handle(w))
            .collect();
        debug!(running = handles.len(), "listed running workers");
        Ok(handles)
    }

    /// A handle to a named worker.
    ///
    /// `Ok(None)` when the worker is unknown; `WorkerNotRunning` for
    /// Stalled and Landed workers. Running and Landing workers get a
    /// fresh handle on every call — no connection is built until the
    /// handle is used.
    pub fn get_worker(&self, name: &str) -> PoolResult<Option<WorkerHandle>> {
        let Some(worker) = self.state.get_worker(name)? else {
            return Ok(None);
        };

        match worker.state {
            WorkerState::Stalled | WorkerState::Landed => {
                Err(PoolError::WorkerNotRunning(name.to_string()))
            }
            WorkerState::Running | WorkerState::Landing => Ok(Some(self.handle(worker))),
        }
    }

    fn handle(&self, info: cadence_core::WorkerInfo) -> WorkerHandle {
        WorkerHandle::new(
            info,
            Arc::clone(&self.connector),
            self.retry.clone(),
            self.creation_locks.clone(),
        )
    }
}
