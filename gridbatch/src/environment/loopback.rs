//! In-process batch environment.

use crate::execution::{
    AccessToken, BatchEnvironment, BatchJob, ExecutionError, ExecutionMessage, ExecutionState,
    Job, JobService, ResourceControl, RuntimeDescriptor, RuntimePayload, RuntimeResult,
    SampleType, ServiceDescription, StateTracker, DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
};
use crate::statistics::Statistics;
use crate::storage::{CommunicationStorage, LocalStorage, StorageUri};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Behaviour of a [`LoopbackEnvironment`].
#[derive(Clone, Debug)]
pub struct LoopbackConfig {
    /// Time a submitted job waits before running.
    pub queue_time: Duration,
    /// Time a job runs before finishing.
    pub run_time: Duration,
    /// Every n-th submission fails remotely.
    pub fail_every: Option<u32>,
    /// Access tokens of the job service.
    pub max_concurrent_submissions: usize,
    /// Runtime archive staged with every job.
    pub runtime_archive: Option<PathBuf>,
    /// Memory hint passed to the runtime.
    pub memory_mb: u32,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            queue_time: Duration::from_millis(100),
            run_time: Duration::from_millis(500),
            fail_every: None,
            max_concurrent_submissions: DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
            runtime_archive: None,
            memory_mb: 1024,
        }
    }
}

// =============================================================================
// Batch Job
// =============================================================================

/// A job "running" in a background task of the loopback service.
///
/// The task advances `remote`; `observed` only changes when the state is
/// queried through [`BatchJob::updated_state`], like a real remote service.
pub struct LoopbackJob {
    remote: Arc<StateTracker>,
    observed: StateTracker,
    task: JoinHandle<()>,
}

impl BatchJob for LoopbackJob {
    fn state(&self) -> ExecutionState {
        self.observed.state()
    }

    async fn updated_state(&self) -> Result<ExecutionState, ExecutionError> {
        let state = self.remote.state();
        self.observed.set(state);
        Ok(state)
    }

    fn last_status_duration(&self) -> Duration {
        self.observed.last_status_duration()
    }

    async fn kill(&self) -> Result<(), ExecutionError> {
        self.task.abort();
        self.remote.set(ExecutionState::Killed);
        self.observed.set(ExecutionState::Killed);
        Ok(())
    }
}

impl Drop for LoopbackJob {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// Job Service
// =============================================================================

/// Job service executing staged jobs in background tasks.
pub struct LoopbackJobService {
    description: ServiceDescription,
    storage: Arc<LocalStorage>,
    config: LoopbackConfig,
    submissions: AtomicU32,
}

impl LoopbackJobService {
    /// Returns the number of submissions accepted so far.
    pub fn submissions(&self) -> u32 {
        self.submissions.load(Ordering::SeqCst)
    }
}

impl JobService for LoopbackJobService {
    type Job = LoopbackJob;

    fn description(&self) -> &ServiceDescription {
        &self.description
    }

    async fn submit(
        &self,
        input: &StorageUri,
        output: &StorageUri,
        _runtime: &RuntimeDescriptor,
        _token: &AccessToken,
    ) -> Result<LoopbackJob, ExecutionError> {
        let message: ExecutionMessage = serde_json::from_slice(&self.storage.read(input).await?)?;

        let submission = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        let fails = self
            .config
            .fail_every
            .is_some_and(|every| every > 0 && submission % every == 0);

        let remote = Arc::new(StateTracker::new(ExecutionState::Submitted));
        let task = tokio::spawn(execute(
            message,
            output.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&remote),
            self.config.clone(),
            fails,
        ));

        debug!(submission, fails, input = %input, "Loopback job submitted");
        Ok(LoopbackJob {
            remote,
            observed: StateTracker::new(ExecutionState::Submitted),
            task,
        })
    }
}

/// Simulates the remote runtime: queue, run, then write the result.
async fn execute(
    message: ExecutionMessage,
    output: StorageUri,
    storage: Arc<LocalStorage>,
    tracker: Arc<StateTracker>,
    config: LoopbackConfig,
    fails: bool,
) {
    tokio::time::sleep(config.queue_time).await;
    tracker.set(ExecutionState::Running);
    tokio::time::sleep(config.run_time).await;

    if fails {
        tracker.set(ExecutionState::Failed);
        return;
    }

    let result = RuntimeResult {
        job_id: Some(message.job_id.clone()),
        stdout: Some(format!(
            "executed {} with {} input file(s)",
            message.job_id,
            message.files.len()
        )),
        stderr: None,
        error: None,
        context: message.context,
    };

    let written = match serde_json::to_vec(&result) {
        Ok(data) => storage.write(&output, data).await,
        Err(e) => Err(e.into()),
    };
    match written {
        Ok(()) => {
            tracker.set(ExecutionState::Done);
        }
        Err(e) => {
            warn!(job_id = %message.job_id, error = %e, "Loopback runtime could not write result");
            tracker.set(ExecutionState::Failed);
        }
    }
}

// =============================================================================
// Environment
// =============================================================================

/// Environment running jobs in the current process.
pub struct LoopbackEnvironment {
    storage: Arc<LocalStorage>,
    service: Arc<LoopbackJobService>,
    resource_control: ResourceControl,
    runtime: RuntimePayload,
    statistics: Statistics,
}

impl LoopbackEnvironment {
    /// Creates an environment staging jobs under `work_dir`.
    pub fn new(work_dir: impl Into<PathBuf>, config: LoopbackConfig) -> Self {
        let storage = Arc::new(LocalStorage::new(work_dir));
        let runtime = RuntimePayload {
            archive: config.runtime_archive.clone(),
            memory_mb: config.memory_mb,
        };
        let resource_control = ResourceControl::new(config.max_concurrent_submissions);
        let service = Arc::new(LoopbackJobService {
            description: ServiceDescription::new(format!("loopback:{}", storage.description())),
            storage: Arc::clone(&storage),
            config,
            submissions: AtomicU32::new(0),
        });

        Self {
            storage,
            service,
            resource_control,
            runtime,
            statistics: Statistics::default(),
        }
    }

    pub fn storage(&self) -> &Arc<LocalStorage> {
        &self.storage
    }

    pub fn service(&self) -> &Arc<LoopbackJobService> {
        &self.service
    }

    pub fn statistics(&self) -> &Statistics {
        &self.statistics
    }
}

impl BatchEnvironment for LoopbackEnvironment {
    type Service = LoopbackJobService;
    type Storage = LocalStorage;

    async fn get_a_job_service(
        &self,
    ) -> Result<(Arc<LoopbackJobService>, AccessToken), ExecutionError> {
        let token = self
            .resource_control
            .controller(self.service.description())
            .acquire_token()
            .await;
        Ok((Arc::clone(&self.service), token))
    }

    async fn select_storage(&self) -> Result<Arc<LocalStorage>, ExecutionError> {
        Ok(Arc::clone(&self.storage))
    }

    fn runtime(&self) -> &RuntimePayload {
        &self.runtime
    }

    fn resource_control(&self) -> &ResourceControl {
        &self.resource_control
    }

    fn sample(&self, kind: SampleType, duration: Duration, job: &Job) {
        debug!(job_id = %job.id(), kind = %kind, duration_ms = duration.as_millis() as u64, "Sample");
        self.statistics.record(kind, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn fast_config() -> LoopbackConfig {
        LoopbackConfig {
            queue_time: Duration::from_millis(10),
            run_time: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn stage(env: &LoopbackEnvironment, name: &str) -> (StorageUri, StorageUri) {
        let dir = env.storage().root().join(name);
        let input = dir.join("input.json");
        let output = dir.join("output.json");
        let message = ExecutionMessage {
            job_id: name.into(),
            context: json!({ "name": name }),
            files: Vec::new(),
            output: output.clone(),
            runtime: RuntimeDescriptor::default(),
        };
        env.storage()
            .write(&input, serde_json::to_vec(&message).unwrap())
            .await
            .unwrap();
        (input, output)
    }

    async fn wait_for(job: &LoopbackJob, state: ExecutionState) {
        for _ in 0..200 {
            if job.updated_state().await.unwrap() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never reached {}", state);
    }

    #[tokio::test]
    async fn test_job_runs_and_writes_result() {
        let temp_dir = TempDir::new().unwrap();
        let env = LoopbackEnvironment::new(temp_dir.path(), fast_config());
        let (input, output) = stage(&env, "j1").await;

        let (service, token) = env.get_a_job_service().await.unwrap();
        let job = service
            .submit(&input, &output, &RuntimeDescriptor::default(), &token)
            .await
            .unwrap();
        drop(token);

        assert_eq!(job.state(), ExecutionState::Submitted);
        wait_for(&job, ExecutionState::Done).await;

        let result: RuntimeResult =
            serde_json::from_slice(&env.storage().read(&output).await.unwrap()).unwrap();
        assert_eq!(result.job_id, Some("j1".into()));
        assert_eq!(result.context["name"], "j1");
        assert!(job.last_status_duration() > Duration::ZERO);
    }

    #[tokio::test]
    async fn test_state_changes_only_when_queried() {
        let temp_dir = TempDir::new().unwrap();
        let env = LoopbackEnvironment::new(temp_dir.path(), fast_config());
        let (input, output) = stage(&env, "lazy").await;
        let (service, token) = env.get_a_job_service().await.unwrap();
        let job = service
            .submit(&input, &output, &RuntimeDescriptor::default(), &token)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(job.state(), ExecutionState::Submitted);
        assert_eq!(job.updated_state().await.unwrap(), ExecutionState::Done);
        assert_eq!(job.state(), ExecutionState::Done);
    }

    #[tokio::test]
    async fn test_every_nth_submission_fails() {
        let temp_dir = TempDir::new().unwrap();
        let env = LoopbackEnvironment::new(
            temp_dir.path(),
            LoopbackConfig {
                fail_every: Some(2),
                ..fast_config()
            },
        );

        let mut jobs = Vec::new();
        for name in ["a", "b"] {
            let (input, output) = stage(&env, name).await;
            let (service, token) = env.get_a_job_service().await.unwrap();
            jobs.push(
                service
                    .submit(&input, &output, &RuntimeDescriptor::default(), &token)
                    .await
                    .unwrap(),
            );
        }

        wait_for(&jobs[0], ExecutionState::Done).await;
        wait_for(&jobs[1], ExecutionState::Failed).await;
        assert_eq!(env.service().submissions(), 2);
    }

    #[tokio::test]
    async fn test_submit_without_staging_fails() {
        let temp_dir = TempDir::new().unwrap();
        let env = LoopbackEnvironment::new(temp_dir.path(), fast_config());
        let (service, token) = env.get_a_job_service().await.unwrap();

        let result = service
            .submit(
                &StorageUri::new("missing/input.json"),
                &StorageUri::new("missing/output.json"),
                &RuntimeDescriptor::default(),
                &token,
            )
            .await;
        assert!(matches!(result, Err(ExecutionError::InternalProcessing(_))));
    }

    #[tokio::test]
    async fn test_kill_stops_execution() {
        let temp_dir = TempDir::new().unwrap();
        let env = LoopbackEnvironment::new(
            temp_dir.path(),
            LoopbackConfig {
                queue_time: Duration::from_secs(60),
                ..fast_config()
            },
        );
        let (input, output) = stage(&env, "k").await;
        let (service, token) = env.get_a_job_service().await.unwrap();
        let job = service
            .submit(&input, &output, &RuntimeDescriptor::default(), &token)
            .await
            .unwrap();

        job.kill().await.unwrap();
        assert_eq!(job.state(), ExecutionState::Killed);
        assert!(env.storage().read(&output).await.is_err());
    }

    #[tokio::test]
    async fn test_tokens_bounded_by_config() {
        let temp_dir = TempDir::new().unwrap();
        let env = LoopbackEnvironment::new(
            temp_dir.path(),
            LoopbackConfig {
                max_concurrent_submissions: 1,
                ..fast_config()
            },
        );

        let (_service, held) = env.get_a_job_service().await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(50), env.get_a_job_service()).await;
        assert!(second.is_err());

        drop(held);
        assert!(env.get_a_job_service().await.is_ok());
    }
}
