//! Per-resource scan cycle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use cadence_core::{
    ContainerIdentifier, ContainerMetadata, ContainerSpec, SavedResource, Version,
};
use cadence_lock::LockManager;
use cadence_placement::Allocator;
use cadence_state::PipelineHandle;

use crate::checker::{CheckOutcome, CheckerRegistry};
use crate::error::{ScanError, ScanResult};
use crate::runner::Scan;

/// How one tick ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Check ran; baseline advanced if anything new was discovered.
    Completed,
    /// Check ran and the script exited non-zero. Soft: cadence keeps
    /// its configured interval and no version is written.
    ScriptFailure { exit_status: i32, stderr: String },
    /// Pipeline is paused; nothing was attempted.
    PipelinePaused,
    /// Another scheduler instance holds the check lock.
    LockBusy,
}

/// Result of one scan tick: what happened, and when to come back.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTick {
    pub next_interval: Duration,
    pub outcome: TickOutcome,
}

/// Result of an on-demand check trigger. Pause and lock contention are
/// no-ops from the caller's point of view and fold into `Completed`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanResponse {
    Completed,
    ScriptFailure { exit_status: i32, stderr: String },
}

/// Runs the check cycle for one pipeline's resources.
pub struct ResourceScanner {
    pipeline: PipelineHandle,
    locks: LockManager,
    allocator: Arc<Allocator>,
    checkers: CheckerRegistry,
    default_interval: Duration,
}

impl ResourceScanner {
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

    /// One periodic scan tick for the named resource.
    pub fn run(&self, name: &str) -> ScanResult<ScanTick> {
        self.tick(name, None)
    }

    /// On-demand check, optionally overriding the stored baseline.
    ///
    /// The override replaces the baseline for this check only; the
    /// stored row is not modified until the check succeeds with new
    /// versions.
    pub fn scan_from_version(
        &self,
        name: &str,
        from: Option<Version>,
    ) -> ScanResult<ScanResponse> {
        let tick = self.tick(name, from.as_ref())?;
        Ok(match tick.outcome {
            TickOutcome::ScriptFailure {
                exit_status,
                stderr,
            } => ScanResponse::ScriptFailure {
                exit_status,
                stderr,
            },
            TickOutcome::Completed | TickOutcome::PipelinePaused | TickOutcome::LockBusy => {
                ScanResponse::Completed
            }
        })
    }

    fn tick(&self, name: &str, from: Option<&Version>) -> ScanResult<ScanTick> {
        if self.pipeline.is_paused()? {
            debug!(pipeline = %self.pipeline.name(), resource = name, "pipeline paused, skipping");
            return Ok(ScanTick {
                next_interval: self.default_interval,
                outcome: TickOutcome::PipelinePaused,
            });
        }

        let resource = self
            .pipeline
            .get_resource(name)?
            .ok_or_else(|| {
                ScanError::NotFound(format!("resource {}/{}", self.pipeline.name(), name))
            })?;
        let interval = resource
            .config
            .check_every_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_interval);

        let key = format!("resource:{}/{}", self.pipeline.name(), name);
        let Some(guard) = self.locks.try_acquire(&key, interval)? else {
            debug!(%key, "check lock busy");
            return Ok(ScanTick {
                next_interval: self.default_interval,
                outcome: TickOutcome::LockBusy,
            });
        };

        // Run under the lock; release on every exit path. The guard's
        // Drop covers the error path, the explicit release the rest.
        let outcome = self.check(&resource, from);
        if let Err(err) = guard.release() {
            warn!(%key, error = %err, "failed to release check lock");
        }

        Ok(ScanTick {
            next_interval: interval,
            outcome: outcome?,
        })
    }

    fn check(&self, resource: &SavedResource, from: Option<&Version>) -> ScanResult<TickOutcome> {
        let name = &resource.config.name;
        let resource_type = &resource.config.resource_type;
        let team_id = self.pipeline.team_id()?;

        let checker = self
            .checkers
            .get(resource_type)
            .ok_or_else(|| ScanError::NoChecker(resource_type.clone()))?;

        let identifier =
            ContainerIdentifier::check(resource_type, resource.config.source.clone(), Some(team_id));
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

        let baseline = from.or(resource.version.as_ref());
        let outcome = checker
            .check(&container, &resource.config.source, baseline)
            .map_err(ScanError::Check)?;

        match outcome {
            CheckOutcome::Success(versions) => {
                if let Some(latest) = versions.last() {
                    self.pipeline.save_resource_version(name, latest)?;
                    info!(
                        pipeline = %self.pipeline.name(),
                        resource = name,
                        discovered = versions.len(),
                        "baseline advanced"
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
                    resource = name,
                    exit_status,
                    "check script failed"
                );
                Ok(TickOutcome::ScriptFailure {
                    exit_status,
                    stderr,
                })
            }
        }
    }
}

impl Scan for ResourceScanner {
    fn scan(&self, key: &str) -> ScanResult<ScanTick> {
        self.run(key)
    }
}
