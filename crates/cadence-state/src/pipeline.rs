//! Scoped per-pipeline view over the state store.
//!
//! This is the surface the scanner consumes: pause state, resource and
//! resource-type rows, baseline persistence, and pipeline identity.

use cadence_core::{PipelineConfig, PipelineRecord, SavedResource, SavedResourceType, Version};

use crate::error::{StateError, StateResult};
use crate::store::StateStore;

/// A view of one pipeline's scheduling-relevant state.
#[derive(Clone)]
pub struct PipelineHandle {
    store: StateStore,
    name: String,
}

impl PipelineHandle {
    pub(crate) fn new(store: StateStore, name: &str) -> Self {
        Self {
            store,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn record(&self) -> StateResult<PipelineRecord> {
        self.store
            .get_pipeline(&self.name)?
            .ok_or_else(|| StateError::NotFound(format!("pipeline {}", self.name)))
    }

    /// Whether checks for this pipeline are suspended.
    pub fn is_paused(&self) -> StateResult<bool> {
        Ok(self.record()?.paused)
    }

    pub fn pipeline_id(&self) -> StateResult<u32> {
        Ok(self.record()?.id)
    }

    pub fn team_id(&self) -> StateResult<u32> {
        Ok(self.record()?.team_id)
    }

    pub fn config(&self) -> StateResult<PipelineConfig> {
        Ok(self.record()?.config)
    }

    pub fn get_resource(&self, name: &str) -> StateResult<Option<SavedResource>> {
        self.store.get_resource(&self.name, name)
    }

    pub fn get_resource_type(&self, name: &str) -> StateResult<Option<SavedResourceType>> {
        self.store.get_resource_type(&self.name, name)
    }

    pub fn save_resource_version(&self, name: &str, version: &Version) -> StateResult<()> {
        self.store.save_resource_version(&self.name, name, version)
    }

    pub fn save_resource_type_version(&self, name: &str, version: &Version) -> StateResult<()> {
        self.store.save_resource_type_version(&self.name, name, version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use cadence_core::ResourceConfig;

    fn seed(store: &StateStore, paused: bool) {
        let pipeline = PipelineRecord {
            name: "main".to_string(),
            id: 42,
            team_id: 7,
            paused,
            config: PipelineConfig {
                resources: vec![ResourceConfig {
                    name: "app".to_string(),
                    resource_type: "git".to_string(),
                    source: json!({"uri": "https://example.com/app.git"}),
                    check_every_secs: None,
                }],
                resource_types: vec![],
            },
        };
        store.apply_config(&pipeline).unwrap();
    }

    #[test]
    fn exposes_pipeline_identity() {
        let store = StateStore::open_in_memory().unwrap();
        seed(&store, false);

        let handle = store.pipeline("main");
        assert_eq!(handle.pipeline_id().unwrap(), 42);
        assert_eq!(handle.team_id().unwrap(), 7);
        assert!(!handle.is_paused().unwrap());
        assert_eq!(handle.config().unwrap().resources.len(), 1);
    }

    #[test]
    fn paused_flag_reads_current_state() {
        let store = StateStore::open_in_memory().unwrap();
        seed(&store, true);
        assert!(store.pipeline("main").is_paused().unwrap());
    }

    #[test]
    fn missing_pipeline_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.pipeline("ghost").is_paused().unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    #[test]
    fn saves_version_through_scoped_view() {
        let store = StateStore::open_in_memory().unwrap();
        seed(&store, false);

        let handle = store.pipeline("main");
        let version: Version = [("ref".to_string(), "abc".to_string())].into_iter().collect();
        handle.save_resource_version("app", &version).unwrap();

        let row = handle.get_resource("app").unwrap().unwrap();
        assert_eq!(row.version, Some(version));
    }
}
