//! Domain types shared across Cadence crates.
//!
//! Containers and volumes reference their owning worker by *name* — the
//! worker set is a keyed arena, so nothing here holds an owning reference
//! to a worker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::identity::ContentIdentity;

/// A discovered resource version. Ordered keys so serialization (and
/// therefore fingerprinting) is deterministic.
pub type Version = BTreeMap<String, String>;

/// Opaque source configuration for a resource or resource type.
pub type Source = serde_json::Value;

// ── Pipeline configuration ─────────────────────────────────────────

/// Configured resource within a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub source: Source,
    /// Check cadence override in seconds; the system default applies
    /// when absent.
    pub check_every_secs: Option<u64>,
}

/// Configured custom resource type within a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceTypeConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub source: Source,
}

/// The resource/resource-type portion of a pipeline's configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub resources: Vec<ResourceConfig>,
    pub resource_types: Vec<ResourceTypeConfig>,
}

/// A stored pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineRecord {
    pub name: String,
    pub id: u32,
    pub team_id: u32,
    /// Consulted before every check; a paused pipeline is never scanned.
    pub paused: bool,
    pub config: PipelineConfig,
}

/// A resource row: configuration plus the last-known baseline version.
/// Mutated only by the scanner after a successful check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedResource {
    pub pipeline: String,
    pub config: ResourceConfig,
    pub version: Option<Version>,
}

/// A resource-type row, versioned like a resource.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedResourceType {
    pub pipeline: String,
    pub config: ResourceTypeConfig,
    pub version: Option<Version>,
}

// ── Workers ────────────────────────────────────────────────────────

/// Lifecycle state of a remote worker.
///
/// Transitions are monotonic: Running→Stalled→Landed or
/// Running→Landing→Landed. A worker never returns to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running,
    Stalled,
    Landing,
    Landed,
}

impl WorkerState {
    /// Whether `next` is a legal forward transition from this state.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Running, Stalled) | (Running, Landing) | (Stalled, Landed) | (Landing, Landed)
        )
    }
}

/// A registered remote worker, as written by the (external) registration
/// process and read by the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerInfo {
    pub name: String,
    /// Container runtime endpoint.
    pub runtime_addr: String,
    /// Volume store endpoint, when the worker hosts one.
    pub volume_store_addr: Option<String>,
    pub state: WorkerState,
    pub tags: Vec<String>,
    pub platform: String,
    /// Resource types this worker can run checks/builds for.
    pub resource_types: Vec<String>,
    /// Owning team; `None` means shared across teams.
    pub team_id: Option<u32>,
    pub active_containers: u32,
}

impl WorkerInfo {
    /// Static compatibility: platform, supported resource types, tags,
    /// and team ownership. A tagged worker only serves tagged requests.
    pub fn satisfies(&self, spec: &WorkerSpec) -> bool {
        if self.platform != spec.platform {
            return false;
        }

        if let Some(rt) = &spec.resource_type
            && !self.resource_types.iter().any(|t| t == rt)
        {
            return false;
        }

        if !spec.tags.iter().all(|t| self.tags.contains(t)) {
            return false;
        }
        if !self.tags.is_empty() && spec.tags.is_empty() {
            return false;
        }

        match self.team_id {
            Some(team) => spec.team_id == Some(team),
            None => true,
        }
    }
}

/// What a container request statically demands of a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSpec {
    pub platform: String,
    pub tags: Vec<String>,
    pub resource_type: Option<String>,
    pub team_id: Option<u32>,
}

// ── Containers & volumes ───────────────────────────────────────────

/// What a container was created to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStage {
    Check,
    Build,
}

/// Requested shape of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub image_resource_type: String,
    pub platform: String,
    pub tags: Vec<String>,
    pub team_id: Option<u32>,
    pub privileged: bool,
    pub ephemeral: bool,
}

impl ContainerSpec {
    /// The worker-compatibility constraints implied by this spec.
    pub fn worker_spec(&self) -> WorkerSpec {
        WorkerSpec {
            platform: self.platform.clone(),
            tags: self.tags.clone(),
            resource_type: Some(self.image_resource_type.clone()),
            team_id: self.team_id,
        }
    }
}

/// Operational metadata carried alongside a container identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContainerMetadata {
    pub pipeline_id: u32,
    pub working_directory: String,
    pub env: Vec<String>,
}

/// A materialized container on some worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Container {
    pub handle: String,
    pub worker_name: String,
    pub identity: ContentIdentity,
}

/// A cached unit of data on a specific worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Volume {
    pub handle: String,
    pub worker_name: String,
    pub identity: ContentIdentity,
    /// Handle of the volume this one was copy-on-write cloned from.
    pub cow_origin: Option<String>,
}

/// A volume attached to a container at a path.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeMount {
    pub volume: Volume,
    pub mount_path: String,
}
