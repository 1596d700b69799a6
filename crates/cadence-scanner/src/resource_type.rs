//! Per-resource-type scan cycle.
//!
//! Resource types check on the system default cadence only; there is no
//! per-type interval override, and no on-demand trigger. Their check
//! containers run privileged so the fetched type image can itself host
//! nested containers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use cadence_core::{ContainerIdentifier, ContainerMetadata, ContainerSpec, SavedResourceType};
use cadence_lock::LockManager;
use cadence_placement::Allocator;
use cadence_state::PipelineHandle;

use crate::checker::{CheckOutcome, CheckerRegistry};
use crate::error::{ScanError, ScanResult};
use crate::runner::Scan;
use crate::scanner::{ScanTick, TickOutcome};

/// Runs the check cycle for one pipeline's custom resource types.
pub struct ResourceTypeScanner {
    pipeline: PipelineHandle,
    locks: LockManager,
    allocator: Arc<Allocator>,
    checkers: CheckerRegistry,
    default_interval: Duration,
}

impl ResourceTypeScanner {
    pub fn new(
        pipeline: PipelineHandle,
        locks: LockManager,
        allocator: Arc<Allocator>,
        checkers: CheckerRegistry,
        default_interval: Duration,
    ) -> Self {
        Self {
            pipeline,
            locks,
            allocator,
            checkers,
            default_interval,
        }
    }

    /// One periodic scan tick for the named resource type.
    pub fn run(&self, name: &str) -> ScanResult<ScanTick> {
        if self.pipeline.is_paused()? {
            debug!(
                pipeline = %self.pipeline.name(),
                resource_type = name,
                "pipeline paused, skipping"
            );
            return Ok(ScanTick {
                next_interval: self.default_interval,
                outcome: TickOutcome::PipelinePaused,
            });
        }

        let row = self.pipeline.get_resource_type(name)?.ok_or_else(|| {
            ScanError::NotFound(format!("resource type {}/{}", self.pipeline.name(), name))
        })?;

        let key = format!("resource-type:{}/{}", self.pipeline.name(), name);
        let Some(guard) = self.locks.try_acquire(&key, self.default_interval)? else {
            debug!(%key, "check lock busy");
            return Ok(ScanTick {
                next_interval: self.default_interval,
                outcome: TickOutcome::LockBusy,
            });
        };

        let outcome = self.check(&row);
        if let Err(err) = guard.release() {
            warn!(%key, error = %err, "failed to release check lock");
        }

        Ok(ScanTick {
            next_interval: self.default_interval,
            outcome: outcome?,
        })
    }

    fn check(&self, row: &SavedResourceType) -> ScanResult<TickOutcome> {
        let name = &row.config.name;
        let resource_type = &row.config.resource_type;
        let team_id = self.pipeline.team_id()?;

        let checker = self
            .checkers
            .get(resource_type)
            .ok_or_else(|| ScanError::NoChecker(resource_type.clone()))?;

        let identifier =
            ContainerIdentifier::check(resource_type, row.config.source.clone(), Some(team_id));
        let metadata = ContainerMetadata {
            pipeline_id: self.pipeline.pipeline_id()?,
            working_directory: format!("/tmp/check/{name}"),
            env: Vec::new(),
        };
        let spec = ContainerSpec {
            image_resource_type: resource_type.clone(),
            platform: "linux".to_string(),
            tags: Vec::new(),
            team_id: Some(team_id),
            privileged: true,
            ephemeral: true,
        };
        let container = self.allocator.check_container(&identifier, &metadata, &spec)?;

        let outcome = checker
            .check(&container, &row.config.source, row.version.as_ref())
            .map_err(ScanError::Check)?;

        match outcome {
            CheckOutcome::Success(versions) => {
                if let Some(latest) = versions.last() {
                    self.pipeline.save_resource_type_version(name, latest)?;
                    info!(
                        pipeline = %self.pipeline.name(),
                        resource_type = name,
                        discovered = versions.len(),
                        "type baseline advanced"
                    );
                }
                Ok(TickOutcome::Completed)
            }
            CheckOutcome::ScriptFailure {
                exit_status,
                stderr,
            } => {
                warn!(
                    pipeline = %self.pipeline.name(),
                    resource_type = name,
                    exit_status,
                    "type check script failed"
                );
                Ok(TickOutcome::ScriptFailure {
                    exit_status,
                    stderr,
                })
            }
        }
    }
}

impl Scan for ResourceTypeScanner {
    fn scan(&self, key: &str) -> ScanResult<ScanTick> {
        self.run(key)
    }
}
