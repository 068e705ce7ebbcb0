//! Scriptable environment for unit tests of the execution engine.

use super::access_token::{AccessToken, ResourceControl, ServiceDescription};
use super::environment::{BatchEnvironment, BatchJob, JobService, RuntimePayload, SampleType};
use super::error::ExecutionError;
use super::job::{Job, RuntimeDescriptor, RuntimeResult};
use super::state::{ExecutionState, StateTracker};
use crate::storage::{CommunicationStorage, LocalStorage, StorageDescription, StorageUri};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

/// Gate that tasks wait on until a test opens it.
pub struct Gate {
    open: watch::Sender<bool>,
}

impl Gate {
    pub fn new(open: bool) -> Self {
        let (open, _) = watch::channel(open);
        Self { open }
    }

    pub fn open(&self) {
        self.open.send_replace(true);
    }

    pub fn close(&self) {
        self.open.send_replace(false);
    }

    pub async fn wait(&self) {
        let mut rx = self.open.subscribe();
        let _ = rx.wait_for(|open| *open).await;
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Local storage whose reads wait on a gate and whose removals are recorded.
pub struct MockStorage {
    local: LocalStorage,
    pub read_gate: Gate,
    pub removed: Mutex<Vec<StorageUri>>,
}

impl CommunicationStorage for MockStorage {
    fn description(&self) -> &StorageDescription {
        self.local.description()
    }

    fn root(&self) -> &StorageUri {
        self.local.root()
    }

    async fn make_dir(&self, uri: &StorageUri) -> Result<(), ExecutionError> {
        self.local.make_dir(uri).await
    }

    async fn upload(&self, local: &Path, uri: &StorageUri) -> Result<u64, ExecutionError> {
        self.local.upload(local, uri).await
    }

    async fn write(&self, uri: &StorageUri, data: Vec<u8>) -> Result<(), ExecutionError> {
        self.local.write(uri, data).await
    }

    async fn read(&self, uri: &StorageUri) -> Result<Vec<u8>, ExecutionError> {
        self.read_gate.wait().await;
        self.local.read(uri).await
    }

    async fn remove(&self, uri: &StorageUri, recursive: bool) -> Result<(), ExecutionError> {
        self.removed.lock().push(uri.clone());
        self.local.remove(uri, recursive).await
    }
}

// =============================================================================
// Batch Job
// =============================================================================

/// Shared state of a scripted batch job.
pub struct MockJobState {
    pub tracker: StateTracker,
    pub script: Mutex<VecDeque<ExecutionState>>,
    pub kills: AtomicUsize,
    pub output: StorageUri,
}

/// Batch job whose refreshed states come from a script.
///
/// Each refresh pops the next scripted state; an empty script keeps the
/// current state.
pub struct MockBatchJob {
    pub state: Arc<MockJobState>,
}

impl BatchJob for MockBatchJob {
    fn state(&self) -> ExecutionState {
        self.state.tracker.state()
    }

    async fn updated_state(&self) -> Result<ExecutionState, ExecutionError> {
        if let Some(next) = self.state.script.lock().pop_front() {
            self.state.tracker.set(next);
        }
        Ok(self.state.tracker.state())
    }

    fn last_status_duration(&self) -> Duration {
        self.state.tracker.last_status_duration()
    }

    async fn kill(&self) -> Result<(), ExecutionError> {
        self.state.kills.fetch_add(1, Ordering::SeqCst);
        self.state.tracker.set(ExecutionState::Killed);
        Ok(())
    }
}

// =============================================================================
// Job Service
// =============================================================================

pub struct MockService {
    description: ServiceDescription,
    pub submit_gate: Gate,
    /// Submissions started, including those waiting on the gate.
    pub attempts: AtomicUsize,
    pub failing_submissions: AtomicUsize,
    pub submissions: AtomicUsize,
    pub script: Mutex<Vec<ExecutionState>>,
    pub jobs: Mutex<Vec<Arc<MockJobState>>>,
}

impl MockService {
    /// Returns the state of the `index`-th submitted job.
    pub fn job(&self, index: usize) -> Arc<MockJobState> {
        Arc::clone(&self.jobs.lock()[index])
    }
}

impl JobService for MockService {
    type Job = MockBatchJob;

    fn description(&self) -> &ServiceDescription {
        &self.description
    }

    async fn submit(
        &self,
        _input: &StorageUri,
        output: &StorageUri,
        _runtime: &RuntimeDescriptor,
        _token: &AccessToken,
    ) -> Result<MockBatchJob, ExecutionError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.submit_gate.wait().await;
        self.submissions.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_submissions.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_submissions.store(failing - 1, Ordering::SeqCst);
            return Err(ExecutionError::internal("service unavailable"));
        }

        let state = Arc::new(MockJobState {
            tracker: StateTracker::new(ExecutionState::Submitted),
            script: Mutex::new(self.script.lock().iter().copied().collect()),
            kills: AtomicUsize::new(0),
            output: output.clone(),
        });
        self.jobs.lock().push(Arc::clone(&state));
        Ok(MockBatchJob { state })
    }
}

// =============================================================================
// Environment
// =============================================================================

pub struct MockEnvironment {
    pub storage: Arc<MockStorage>,
    pub service: Arc<MockService>,
    pub storage_gate: Gate,
    resource_control: ResourceControl,
    runtime: RuntimePayload,
    pub samples: Mutex<Vec<(SampleType, Duration)>>,
    _dir: TempDir,
}

impl MockEnvironment {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            storage: Arc::new(MockStorage {
                local: LocalStorage::new(dir.path().join("comm")),
                read_gate: Gate::new(true),
                removed: Mutex::new(Vec::new()),
            }),
            service: Arc::new(MockService {
                description: ServiceDescription::new("mock-ce"),
                submit_gate: Gate::new(true),
                attempts: AtomicUsize::new(0),
                failing_submissions: AtomicUsize::new(0),
                submissions: AtomicUsize::new(0),
                script: Mutex::new(Vec::new()),
                jobs: Mutex::new(Vec::new()),
            }),
            storage_gate: Gate::new(true),
            resource_control: ResourceControl::new(2),
            runtime: RuntimePayload::default(),
            samples: Mutex::new(Vec::new()),
            _dir: dir,
        }
    }

    /// Sets the states every submitted job goes through on refresh.
    pub fn script(&self, states: &[ExecutionState]) {
        *self.service.script.lock() = states.to_vec();
    }

    /// Writes the runtime result of the `index`-th submitted job.
    pub async fn write_output(&self, index: usize, result: &RuntimeResult) {
        let output = self.service.job(index).output.clone();
        self.storage
            .write(&output, serde_json::to_vec(result).unwrap())
            .await
            .unwrap();
    }

    pub fn path_of(&self, uri: &StorageUri) -> std::path::PathBuf {
        self.storage.local.resolve(uri)
    }

    pub fn samples_of(&self, kind: SampleType) -> usize {
        self.samples.lock().iter().filter(|(k, _)| *k == kind).count()
    }
}

impl BatchEnvironment for MockEnvironment {
    type Service = MockService;
    type Storage = MockStorage;

    async fn get_a_job_service(&self) -> Result<(Arc<MockService>, AccessToken), ExecutionError> {
        let token = self
            .resource_control
            .controller(self.service.description())
            .acquire_token()
            .await;
        Ok((Arc::clone(&self.service), token))
    }

    async fn select_storage(&self) -> Result<Arc<MockStorage>, ExecutionError> {
        self.storage_gate.wait().await;
        Ok(Arc::clone(&self.storage))
    }

    fn runtime(&self) -> &RuntimePayload {
        &self.runtime
    }

    fn resource_control(&self) -> &ResourceControl {
        &self.resource_control
    }

    fn sample(&self, kind: SampleType, duration: Duration, _job: &Job) {
        self.samples.lock().push((kind, duration));
    }
}
