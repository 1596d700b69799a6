//! Shared fixtures for the scanner test suites.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use cadence_core::{
    Container, ContainerIdentifier, ContainerMetadata, ContainerSpec, Source, Version,
    PipelineConfig, PipelineRecord, ResourceConfig, ResourceTypeConfig, VolumeMount, WorkerInfo,
    WorkerState,
};
use cadence_lock::LockManager;
use cadence_placement::Allocator;
use cadence_state::StateStore;
use cadence_workers::{
    Connector, RetryPolicy, RuntimeClient, TransportError, VolumeStoreClient, WorkerPool,
};

use crate::checker::{CheckOutcome, Checker, CheckerRegistry};
use crate::resource_type::ResourceTypeScanner;
use crate::scanner::ResourceScanner;

pub(crate) const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub(crate) const CONFIGURED_INTERVAL: Duration = Duration::from_secs(123);

/// What the fake checker should do when invoked.
pub(crate) enum Script {
    Versions(Vec<Version>),
    Fail { exit_status: i32, stderr: String },
    Error(String),
}

pub(crate) struct FakeChecker {
    script: Mutex<Script>,
    pub calls: AtomicUsize,
    pub seen_from: Mutex<Vec<Option<Version>>>,
    /// How long each call blocks, to widen race windows.
    pub hold: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl FakeChecker {
    pub fn returning(versions: Vec<Version>) -> Arc<Self> {
        Arc::new(Self::with_script(Script::Versions(versions)))
    }

    pub fn with_script(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            seen_from: Mutex::new(Vec::new()),
            hold: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn holding(versions: Vec<Version>, hold: Duration) -> Arc<Self> {
        let mut checker = Self::with_script(Script::Versions(versions));
        checker.hold = hold;
        Arc::new(checker)
    }
}

impl Checker for FakeChecker {
    fn check(
        &self,
        _container: &Container,
        _source: &Source,
        from: Option<&Version>,
    ) -> anyhow::Result<CheckOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_from.lock().unwrap().push(from.cloned());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.hold.is_zero() {
            std::thread::sleep(self.hold);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match &*self.script.lock().unwrap() {
            Script::Versions(versions) => Ok(CheckOutcome::Success(versions.clone())),
            Script::Fail {
                exit_status,
                stderr,
            } => Ok(CheckOutcome::ScriptFailure {
                exit_status: *exit_status,
                stderr: stderr.clone(),
            }),
            Script::Error(message) => Err(anyhow::anyhow!("{message}")),
        }
    }
}

struct FakeRuntime {
    worker: String,
    created: Arc<AtomicUsize>,
    privileged: Arc<Mutex<Vec<bool>>>,
}

impl RuntimeClient for FakeRuntime {
    fn find_or_create_container(
        &self,
        identifier: &ContainerIdentifier,
        _metadata: &ContainerMetadata,
        spec: &ContainerSpec,
        _mounts: &[VolumeMount],
        _output_paths: &BTreeMap<String, String>,
    ) -> Result<Container, TransportError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.privileged.lock().unwrap().push(spec.privileged);
        Ok(Container {
            handle: format!("c-{}", identifier.identity()),
            worker_name: self.worker.clone(),
            identity: identifier.identity(),
        })
    }
}

#[derive(Default)]
pub(crate) struct FakeConnector {
    pub created: Arc<AtomicUsize>,
    pub privileged: Arc<Mutex<Vec<bool>>>,
}

impl Connector for FakeConnector {
    fn runtime(&self, worker: &WorkerInfo) -> Result<Box<dyn RuntimeClient>, TransportError> {
        Ok(Box::new(FakeRuntime {
            worker: worker.name.clone(),
            created: Arc::clone(&self.created),
            privileged: Arc::clone(&self.privileged),
        }))
    }

    fn volume_store(
        &self,
        _worker: &WorkerInfo,
    ) -> Result<Option<Box<dyn VolumeStoreClient>>, TransportError> {
        Ok(None)
    }
}

pub(crate) struct Harness {
    pub store: StateStore,
    pub locks: LockManager,
    pub allocator: Arc<Allocator>,
    pub connector: Arc<FakeConnector>,
    pub checker: Arc<FakeChecker>,
    pub registry: CheckerRegistry,
}

impl Harness {
    /// In-memory store with pipeline `main` (team 7), resource `app`
    /// (type `git`, 123s interval), resource type `custom`, one running
    /// linux worker, and the given checker registered for `git`.
    pub fn new(paused: bool, checker: Arc<FakeChecker>) -> Self {
        let store = StateStore::open_in_memory().unwrap();
        store
            .apply_config(&PipelineRecord {
                name: "main".to_string(),
                id: 1,
                team_id: 7,
                paused,
                config: PipelineConfig {
                    resources: vec![ResourceConfig {
                        name: "app".to_string(),
                        resource_type: "git".to_string(),
                        source: json!({"uri": "https://example.com/app.git"}),
                        check_every_secs: Some(CONFIGURED_INTERVAL.as_secs()),
                    }],
                    resource_types: vec![ResourceTypeConfig {
                        name: "custom".to_string(),
                        resource_type: "git".to_string(),
                        source: json!({"repository": "example/custom"}),
                    }],
                },
            })
            .unwrap();
        store
            .put_worker(&WorkerInfo {
                name: "w1".to_string(),
                runtime_addr: "w1.internal:7777".to_string(),
                volume_store_addr: None,
                state: WorkerState::Running,
                tags: Vec::new(),
                platform: "linux".to_string(),
                resource_types: vec!["git".to_string()],
                team_id: None,
                active_containers: 0,
            })
            .unwrap();

        let locks = LockManager::open_in_memory().unwrap();
        let connector = Arc::new(FakeConnector::default());
        let pool = WorkerPool::new(
            store.clone(),
            Arc::clone(&connector) as Arc<dyn Connector>,
            RetryPolicy::default(),
        );
        let allocator = Arc::new(Allocator::new(pool));

        let mut registry = CheckerRegistry::new();
        registry.register("git", Arc::clone(&checker) as Arc<dyn Checker>);

        Self {
            store,
            locks,
            allocator,
            connector,
            checker,
            registry,
        }
    }

    pub fn resource_scanner(&self) -> ResourceScanner {
        ResourceScanner::new(
            self.store.pipeline("main"),
            self.locks.clone(),
            Arc::clone(&self.allocator),
            self.registry.clone(),
            DEFAULT_INTERVAL,
        )
    }

    pub fn type_scanner(&self) -> ResourceTypeScanner {
        ResourceTypeScanner::new(
            self.store.pipeline("main"),
            self.locks.clone(),
            Arc::clone(&self.allocator),
            self.registry.clone(),
            DEFAULT_INTERVAL,
        )
    }
}

pub(crate) fn version(pairs: &[(&str, &str)]) -> Version {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
