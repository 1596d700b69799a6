//! Container placement over the worker pool.

use std::collections::BTreeMap;

use tracing::{debug, info};

use cadence_core::{Container, ContainerIdentifier, ContainerMetadata, ContainerSpec, Volume, VolumeMount};
use cadence_workers::{TransportError, WorkerHandle, WorkerPool};

use crate::error::{AllocError, AllocResult};

/// One declared input to a build container.
///
/// The allocator asks each candidate worker whether the input's content
/// already exists there as a volume; implementations resolve that
/// however their input kind caches (resource version caches, artifact
/// stores, and so on).
pub trait BuildInput {
    /// Input name, used to report cache misses back to the caller.
    fn name(&self) -> &str;

    /// Path inside the container where the input is mounted.
    fn mount_path(&self) -> &str;

    /// Volume holding this input's content on `worker`, if one exists.
    fn cached_volume_on(&self, worker: &WorkerHandle) -> Result<Option<Volume>, TransportError>;
}

/// Places check and build containers on workers from the pool.
pub struct Allocator {
    pool: WorkerPool,
}

impl Allocator {
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Place a check container.
    ///
    /// Checks carry no inputs, so placement is by load alone: among the
    /// compatible running workers, the one with the fewest active
    /// containers wins, with worker name breaking ties.
    pub fn check_container(
        &self,
        identifier: &ContainerIdentifier,
        metadata: &ContainerMetadata,
        spec: &ContainerSpec,
    ) -> AllocResult<Container> {
        let worker_spec = spec.worker_spec();
        let chosen = self
            .pool
            .running_workers()?
            .into_iter()
            .filter(|w| w.satisfies(&worker_spec))
            .min_by_key(|w| (w.info().active_containers, w.name().to_string()))
            .ok_or(AllocError::NoCompatibleWorker)?;

        debug!(worker = %chosen.name(), "placing check container");
        let container =
            chosen.find_or_create_container(identifier, metadata, spec, &[], &BTreeMap::new())?;
        Ok(container)
    }

    /// Place a build container where the most inputs are already
    /// cached.
    ///
    /// Every compatible running worker is probed for each input's
    /// volume; the worker with strictly the most hits wins, and on a
    /// tie the earliest worker in name order is kept. Cached inputs
    /// become mounts on the new container; the returned list names the
    /// inputs the caller still has to stream in.
    pub fn build_container(
        &self,
        identifier: &ContainerIdentifier,
        metadata: &ContainerMetadata,
        spec: &ContainerSpec,
        inputs: &[&dyn BuildInput],
        output_paths: &BTreeMap<String, String>,
    ) -> AllocResult<(Container, Vec<String>)> {
        let worker_spec = spec.worker_spec();
        let candidates: Vec<WorkerHandle> = self
            .pool
            .running_workers()?
            .into_iter()
            .filter(|w| w.satisfies(&worker_spec))
            .collect();

        let mut best: Option<(WorkerHandle, Vec<VolumeMount>, Vec<String>)> = None;
        for worker in candidates {
            let mut mounts = Vec::new();
            let mut missing = Vec::new();
            for input in inputs {
                match input.cached_volume_on(&worker)? {
                    Some(volume) => mounts.push(VolumeMount {
                        volume,
                        mount_path: input.mount_path().to_string(),
                    }),
                    None => missing.push(input.name().to_string()),
                }
            }

            let improves = match &best {
                Some((_, best_mounts, _)) => mounts.len() > best_mounts.len(),
                None => true,
            };
            if improves {
                best = Some((worker, mounts, missing));
            }
        }

        let (chosen, mounts, missing) = best.ok_or(AllocError::NoCompatibleWorker)?;
        info!(
            worker = %chosen.name(),
            cached = mounts.len(),
            missing = missing.len(),
            "placing build container"
        );
        let container =
            chosen.find_or_create_container(identifier, metadata, spec, &mounts, output_paths)?;
        Ok((container, missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use cadence_core::{ContentIdentity, WorkerInfo, WorkerState};
    use cadence_state::StateStore;
    use cadence_workers::{Connector, RetryPolicy, RuntimeClient, VolumeStoreClient};

    struct FakeRuntime {
        worker: String,
        fail: bool,
        creations: Arc<AtomicUsize>,
        recorded_mounts: Arc<std::sync::Mutex<Vec<(String, Vec<String>)>>>,
    }

    impl RuntimeClient for FakeRuntime {
        fn find_or_create_container(
            &self,
            identifier: &ContainerIdentifier,
            _metadata: &ContainerMetadata,
            _spec: &ContainerSpec,
            mounts: &[VolumeMount],
            _output_paths: &BTreeMap<String, String>,
        ) -> Result<Container, TransportError> {
            if self.fail {
                return Err(TransportError::Remote("container rejected".to_string()));
            }
            self.creations.fetch_add(1, Ordering::SeqCst);
            self.recorded_mounts
                .lock()
                .unwrap()
                .push((
                    self.worker.clone(),
                    mounts.iter().map(|m| m.mount_path.clone()).collect(),
                ));
            Ok(Container {
                handle: format!("c-{}", identifier.identity()),
                worker_name: self.worker.clone(),
                identity: identifier.identity(),
            })
        }
    }

    #[derive(Default)]
    struct FakeConnector {
        fail_creation: bool,
        creations: Arc<AtomicUsize>,
        recorded_mounts: Arc<std::sync::Mutex<Vec<(String, Vec<String>)>>>,
    }

    impl Connector for FakeConnector {
        fn runtime(&self, worker: &WorkerInfo) -> Result<Box<dyn RuntimeClient>, TransportError> {
            Ok(Box::new(FakeRuntime {
                worker: worker.name.clone(),
                fail: self.fail_creation,
                creations: Arc::clone(&self.creations),
                recorded_mounts: Arc::clone(&self.recorded_mounts),
            }))
        }

        fn volume_store(
            &self,
            _worker: &WorkerInfo,
        ) -> Result<Option<Box<dyn VolumeStoreClient>>, TransportError> {
            Ok(None)
        }
    }

    /// Input cached only on the named workers.
    struct FakeInput {
        name: String,
        mount_path: String,
        cached_on: Vec<String>,
        probes: Arc<AtomicUsize>,
    }

    impl FakeInput {
        fn new(name: &str, cached_on: &[&str]) -> Self {
            Self {
                name: name.to_string(),
                mount_path: format!("/tmp/build/{name}"),
                cached_on: cached_on.iter().map(|w| w.to_string()).collect(),
                probes: Arc::default(),
            }
        }
    }

    impl BuildInput for FakeInput {
        fn name(&self) -> &str {
            &self.name
        }

        fn mount_path(&self) -> &str {
            &self.mount_path
        }

        fn cached_volume_on(
            &self,
            worker: &WorkerHandle,
        ) -> Result<Option<Volume>, TransportError> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            if self.cached_on.iter().any(|w| w == worker.name()) {
                Ok(Some(Volume {
                    handle: format!("v-{}-{}", worker.name(), self.name),
                    worker_name: worker.name().to_string(),
                    identity: ContentIdentity::of(&json!({ "input": self.name })),
                    cow_origin: None,
                }))
            } else {
                Ok(None)
            }
        }
    }

    fn worker(name: &str, active_containers: u32) -> WorkerInfo {
        WorkerInfo {
            name: name.to_string(),
            runtime_addr: format!("{name}.internal:7777"),
            volume_store_addr: None,
            state: WorkerState::Running,
            tags: Vec::new(),
            platform: "linux".to_string(),
            resource_types: vec!["git".to_string()],
            team_id: None,
            active_containers,
        }
    }

    fn allocator_with(workers: &[WorkerInfo]) -> (Allocator, Arc<FakeConnector>) {
        let state = StateStore::open_in_memory().unwrap();
        for w in workers {
            state.put_worker(w).unwrap();
        }
        let connector = Arc::new(FakeConnector::default());
        let pool = WorkerPool::new(
            state,
            Arc::clone(&connector) as Arc<dyn Connector>,
            RetryPolicy::default(),
        );
        (Allocator::new(pool), connector)
    }

    fn build_spec() -> (ContainerIdentifier, ContainerMetadata, ContainerSpec) {
        let identifier = ContainerIdentifier::build(
            "git",
            json!({ "uri": "https://example.com/repo.git" }),
            Some(7),
        );
        let metadata = ContainerMetadata {
            pipeline_id: 1,
            working_directory: "/tmp/build".to_string(),
            env: Vec::new(),
        };
        let spec = ContainerSpec {
            image_resource_type: "git".to_string(),
            platform: "linux".to_string(),
            tags: Vec::new(),
            team_id: None,
            privileged: false,
            ephemeral: false,
        };
        (identifier, metadata, spec)
    }

    #[test]
    fn build_goes_to_worker_with_most_cached_inputs() {
        let (allocator, connector) = allocator_with(&[worker("w1", 0), worker("w2", 0)]);
        let (identifier, metadata, spec) = build_spec();

        let a = FakeInput::new("source", &["w1", "w2"]);
        let b = FakeInput::new("deps", &["w1"]);
        let c = FakeInput::new("assets", &["w2"]);
        let b_also_w1 = FakeInput::new("toolchain", &["w1"]);
        let inputs: Vec<&dyn BuildInput> = vec![&a, &b, &b_also_w1, &c];

        let (container, missing) = allocator
            .build_container(&identifier, &metadata, &spec, &inputs, &BTreeMap::new())
            .unwrap();

        // w1 caches three of four inputs, w2 only two.
        assert_eq!(container.worker_name, "w1");
        assert_eq!(missing, vec!["assets".to_string()]);

        let recorded = connector.recorded_mounts.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        let (placed_on, mounts) = &recorded[0];
        assert_eq!(placed_on, "w1");
        assert_eq!(
            *mounts,
            vec![
                "/tmp/build/source".to_string(),
                "/tmp/build/deps".to_string(),
                "/tmp/build/toolchain".to_string(),
            ]
        );
    }

    #[test]
    fn build_tie_goes_to_first_worker_by_name() {
        let (allocator, _connector) = allocator_with(&[worker("beta", 0), worker("alpha", 0)]);
        let (identifier, metadata, spec) = build_spec();

        let input = FakeInput::new("source", &["alpha", "beta"]);
        let inputs: Vec<&dyn BuildInput> = vec![&input];

        let (container, missing) = allocator
            .build_container(&identifier, &metadata, &spec, &inputs, &BTreeMap::new())
            .unwrap();

        assert_eq!(container.worker_name, "alpha");
        assert!(missing.is_empty());
    }

    #[test]
    fn build_with_no_cached_inputs_still_places() {
        let (allocator, _connector) = allocator_with(&[worker("w1", 0)]);
        let (identifier, metadata, spec) = build_spec();

        let a = FakeInput::new("source", &[]);
        let b = FakeInput::new("deps", &[]);
        let inputs: Vec<&dyn BuildInput> = vec![&a, &b];

        let (container, missing) = allocator
            .build_container(&identifier, &metadata, &spec, &inputs, &BTreeMap::new())
            .unwrap();

        assert_eq!(container.worker_name, "w1");
        assert_eq!(missing, vec!["source".to_string(), "deps".to_string()]);
    }

    #[test]
    fn no_compatible_worker_creates_nothing() {
        let mut windows = worker("win1", 0);
        windows.platform = "windows".to_string();
        let (allocator, connector) = allocator_with(&[windows]);
        let (identifier, metadata, spec) = build_spec();

        let input = FakeInput::new("source", &["win1"]);
        let inputs: Vec<&dyn BuildInput> = vec![&input];

        let err = allocator
            .build_container(&identifier, &metadata, &spec, &inputs, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, AllocError::NoCompatibleWorker));
        // Incompatible workers are never probed or asked to create.
        assert_eq!(input.probes.load(Ordering::SeqCst), 0);
        assert_eq!(connector.creations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn check_goes_to_least_loaded_worker() {
        let (allocator, _connector) =
            allocator_with(&[worker("busy", 9), worker("idle", 1), worker("mid", 4)]);
        let identifier = ContainerIdentifier::check(
            "git",
            json!({ "uri": "https://example.com/repo.git" }),
            Some(7),
        );
        let metadata = ContainerMetadata {
            pipeline_id: 1,
            working_directory: "/tmp/check".to_string(),
            env: Vec::new(),
        };
        let spec = ContainerSpec {
            image_resource_type: "git".to_string(),
            platform: "linux".to_string(),
            tags: Vec::new(),
            team_id: None,
            privileged: false,
            ephemeral: true,
        };

        let container = allocator
            .check_container(&identifier, &metadata, &spec)
            .unwrap();
        assert_eq!(container.worker_name, "idle");
    }

    #[test]
    fn check_with_no_workers_is_no_compatible_worker() {
        let (allocator, _connector) = allocator_with(&[]);
        let identifier = ContainerIdentifier::check("git", json!({}), Some(7));
        let metadata = ContainerMetadata::default();
        let spec = ContainerSpec {
            image_resource_type: "git".to_string(),
            platform: "linux".to_string(),
            tags: Vec::new(),
            team_id: None,
            privileged: false,
            ephemeral: true,
        };

        let err = allocator
            .check_container(&identifier, &metadata, &spec)
            .unwrap_err();
        assert!(matches!(err, AllocError::NoCompatibleWorker));
    }

    #[test]
    fn creation_failure_propagates() {
        let state = StateStore::open_in_memory().unwrap();
        state.put_worker(&worker("w1", 0)).unwrap();
        let connector = Arc::new(FakeConnector {
            fail_creation: true,
            ..FakeConnector::default()
        });
        let pool = WorkerPool::new(
            state,
            Arc::clone(&connector) as Arc<dyn Connector>,
            RetryPolicy::default(),
        );
        let allocator = Allocator::new(pool);
        let (identifier, metadata, spec) = build_spec();

        let err = allocator
            .build_container(&identifier, &metadata, &spec, &[], &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, AllocError::Pool(_)));
    }
}
