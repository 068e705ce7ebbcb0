//! Lifecycle of one execution attempt of a job on a batch environment.
//!
//! A [`BatchExecutionJob`] is driven by repeated calls to
//! [`update`](BatchExecutionJob::update). Each call refreshes the state of the
//! attempt and advances its pipeline:
//!
//! ```text
//! READY ──copy──► (token) submit ──► SUBMITTED ──► RUNNING ──► DONE ──download──► KILLED
//!   ▲                                     │            │
//!   └────────────── retry ◄── FAILED ◄────┴────────────┘
//! ```
//!
//! Upload and download run as tasks on the [`TaskPools`]; `update` only
//! launches them and polls them without waiting. Submission is the one step
//! awaited inline, since it may wait for an access token.
//!
//! [`kill`](BatchExecutionJob::kill) stops the attempt from any thread at any
//! point. Its effects run exactly once: in-flight tasks are cancelled, the
//! communication directory is removed and the remote job is terminated, all
//! in the background. Successful completion also ends in the killed state,
//! with the result stored in the [`Job`].
//!
//! # Example
//!
//! ```ignore
//! let execution = BatchExecutionJob::new(job, environment, pools, UpdateIntervalConfig::default());
//!
//! while execution.update().await {
//!     tokio::time::sleep(execution.delay()).await;
//! }
//! ```

use super::cleanup::{BatchJobKiller, CommunicationDirCleaner};
use super::copy::{CopyToEnvironment, CopyToEnvironmentResult};
use super::environment::{BatchEnvironment, BatchJob, JobService, SampleType, ServiceJob};
use super::error::ExecutionError;
use super::interval::{AdaptiveDelay, UpdateIntervalConfig};
use super::job::Job;
use super::pools::{ExecutorType, TaskHandle, TaskPoll, TaskPools};
use super::result::GetResultFromEnvironment;
use super::state::ExecutionState;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type CopyResult<E> = CopyToEnvironmentResult<<E as BatchEnvironment>::Storage>;

/// Mutable part of an execution, guarded by a short-lived lock.
///
/// The lock is never held across an await point.
struct Inner<E: BatchEnvironment> {
    batch_job: Option<Arc<ServiceJob<E>>>,
    copy_result: Option<Arc<CopyResult<E>>>,
    copy_task: Option<TaskHandle<CopyResult<E>>>,
    copy_cancellation: CancellationToken,
    finalize_task: Option<TaskHandle<()>>,
    delay: AdaptiveDelay,
}

/// One attempt to execute a [`Job`] on a [`BatchEnvironment`].
pub struct BatchExecutionJob<E: BatchEnvironment> {
    job: Arc<Job>,
    environment: Arc<E>,
    pools: TaskPools,
    intervals: UpdateIntervalConfig,
    killed: AtomicBool,
    update_lock: tokio::sync::Mutex<()>,
    inner: Mutex<Inner<E>>,
}

impl<E: BatchEnvironment> BatchExecutionJob<E> {
    /// Creates an attempt in the READY state.
    ///
    /// Nothing is launched until the first [`update`](Self::update).
    pub fn new(
        job: Arc<Job>,
        environment: Arc<E>,
        pools: TaskPools,
        intervals: UpdateIntervalConfig,
    ) -> Self {
        Self {
            job,
            environment,
            pools,
            intervals,
            killed: AtomicBool::new(false),
            update_lock: tokio::sync::Mutex::new(()),
            inner: Mutex::new(Inner {
                batch_job: None,
                copy_result: None,
                copy_task: None,
                copy_cancellation: CancellationToken::new(),
                finalize_task: None,
                delay: AdaptiveDelay::new(),
            }),
        }
    }

    pub fn job(&self) -> &Arc<Job> {
        &self.job
    }

    pub fn environment(&self) -> &Arc<E> {
        &self.environment
    }

    /// Returns the handle of the current remote submission, if any.
    pub fn batch_job(&self) -> Option<Arc<ServiceJob<E>>> {
        self.inner.lock().batch_job.clone()
    }

    /// Returns true if the staged inputs of this attempt are available.
    pub fn is_staged(&self) -> bool {
        self.inner.lock().copy_result.is_some()
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }

    /// Returns the state of the attempt without contacting the remote service.
    pub fn state(&self) -> ExecutionState {
        if self.is_killed() {
            return ExecutionState::Killed;
        }
        match &self.inner.lock().batch_job {
            // A submitted job never goes back to READY.
            Some(batch_job) => match batch_job.state() {
                ExecutionState::Ready => ExecutionState::Submitted,
                state => state,
            },
            None => ExecutionState::Ready,
        }
    }

    /// Returns the delay to wait before the next [`update`](Self::update).
    pub fn delay(&self) -> Duration {
        self.inner.lock().delay.get(&self.intervals)
    }

    // =========================================================================
    // Update cycle
    // =========================================================================

    /// Advances the attempt by one cycle.
    ///
    /// Returns false once the attempt is killed, either explicitly or after
    /// its result was retrieved. Errors never escape: processing and
    /// configuration failures kill the attempt.
    pub async fn update(&self) -> bool {
        if self.is_killed() {
            return false;
        }

        let _guard = self.update_lock.lock().await;
        if self.is_killed() {
            return false;
        }

        match self.run_cycle().await {
            Ok(()) => {}
            Err(ExecutionError::Cancelled) => {
                debug!(job_id = %self.job.id(), "Operation interrupted because the job was killed");
            }
            Err(e) => {
                self.kill();
                warn!(job_id = %self.job.id(), error = %e, "Error in job update");
            }
        }

        !self.is_killed()
    }

    async fn run_cycle(&self) -> Result<(), ExecutionError> {
        let old_state = self.state();

        match self.update_and_get_state().await? {
            ExecutionState::Ready => {
                if self.asynchronous_copy()? {
                    self.try_submit().await?;
                }
            }
            ExecutionState::Submitted | ExecutionState::Running | ExecutionState::Killed => {}
            ExecutionState::Failed => self.retry(),
            ExecutionState::Done => self.try_finalize()?,
        }

        let new_state = self.state();
        let delay = self
            .inner
            .lock()
            .delay
            .advance(old_state != new_state, &self.intervals);

        debug!(
            job_id = %self.job.id(),
            old_state = %old_state,
            new_state = %new_state,
            delay_ms = delay.as_millis() as u64,
            "Refreshed execution state"
        );
        Ok(())
    }

    /// Refreshes the remote state and returns the state of the attempt.
    ///
    /// The remote service is only contacted while the cached state is not
    /// final. The queue time is sampled when the job is seen to start.
    async fn update_and_get_state(&self) -> Result<ExecutionState, ExecutionError> {
        if self.is_killed() {
            return Ok(ExecutionState::Killed);
        }
        let Some(batch_job) = self.batch_job() else {
            return Ok(ExecutionState::Ready);
        };

        let old_state = batch_job.state();
        if !old_state.is_final() {
            let new_state = batch_job.updated_state().await?;
            if old_state == ExecutionState::Submitted && new_state == ExecutionState::Running {
                self.environment.sample(
                    SampleType::Waiting,
                    batch_job.last_status_duration(),
                    &self.job,
                );
            }
        }

        Ok(self.state())
    }

    // =========================================================================
    // Pipeline phases
    // =========================================================================

    /// Launches or polls the upload.
    ///
    /// Returns true once the staged inputs are available.
    fn asynchronous_copy(&self) -> Result<bool, ExecutionError> {
        let mut inner = self.inner.lock();
        if inner.copy_result.is_some() {
            return Ok(true);
        }
        if self.is_killed() {
            return Ok(false);
        }

        let task = match inner.copy_task.take() {
            Some(task) => task,
            None => {
                debug!(job_id = %self.job.id(), "Staging job");
                let copy = CopyToEnvironment::new(
                    Arc::clone(&self.environment),
                    Arc::clone(&self.job),
                )
                .with_cancellation(inner.copy_cancellation.clone());
                self.pools.spawn(ExecutorType::Upload, copy.run())
            }
        };

        match task.poll() {
            TaskPoll::Pending(task) => {
                inner.copy_task = Some(task);
                Ok(false)
            }
            TaskPoll::Ready(result) => {
                inner.copy_result = Some(Arc::new(result?));
                Ok(true)
            }
        }
    }

    /// Submits the staged job while holding an access token.
    ///
    /// A failed submission leaves the attempt READY; the next cycle submits
    /// again from the same staged inputs.
    async fn try_submit(&self) -> Result<(), ExecutionError> {
        let copy_result = self.inner.lock().copy_result.clone();
        let Some(copy_result) = copy_result else {
            return Ok(());
        };

        let (service, token) = self.environment.get_a_job_service().await?;
        let usage = self
            .environment
            .resource_control()
            .controller(service.description());

        if self.is_killed() {
            usage.release_token(token);
            debug!(job_id = %self.job.id(), "Job killed before submission");
            return Ok(());
        }

        let submitted = service
            .submit(
                &copy_result.input_file,
                &copy_result.output_file,
                &copy_result.runtime,
                &token,
            )
            .await;
        usage.release_token(token);

        match submitted {
            Ok(batch_job) => {
                self.install_batch_job(Arc::new(batch_job));
                Ok(())
            }
            Err(ExecutionError::InternalProcessing(message)) => {
                debug!(
                    job_id = %self.job.id(),
                    service = %service.description(),
                    error = %message,
                    "Error during job submission"
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Installs a freshly submitted job, or terminates it if the attempt was
    /// killed during submission.
    fn install_batch_job(&self, batch_job: Arc<ServiceJob<E>>) {
        let mut inner = self.inner.lock();
        if self.is_killed() {
            drop(inner);
            debug!(job_id = %self.job.id(), "Job killed during submission, terminating it");
            self.pools
                .spawn(ExecutorType::Kill, BatchJobKiller::new(batch_job).run());
            return;
        }
        debug!(job_id = %self.job.id(), "Job submitted");
        inner.batch_job = Some(batch_job);
    }

    /// Launches or polls the result retrieval; kills the attempt once the
    /// result is stored.
    fn try_finalize(&self) -> Result<(), ExecutionError> {
        let finished = {
            let mut inner = self.inner.lock();
            if self.is_killed() {
                return Ok(());
            }

            let task = match inner.finalize_task.take() {
                Some(task) => task,
                None => {
                    let (Some(copy_result), Some(batch_job)) =
                        (inner.copy_result.clone(), inner.batch_job.clone())
                    else {
                        return Err(ExecutionError::internal(format!(
                            "job {} is done but has no staged inputs",
                            self.job.id()
                        )));
                    };
                    let download = GetResultFromEnvironment::new(
                        Arc::clone(&copy_result.storage),
                        copy_result.output_file.clone(),
                        Arc::clone(&self.job),
                        Arc::clone(&self.environment),
                        batch_job.last_status_duration(),
                    );
                    self.pools.spawn(ExecutorType::Download, download.run())
                }
            };

            match task.poll() {
                TaskPoll::Pending(task) => {
                    inner.finalize_task = Some(task);
                    false
                }
                TaskPoll::Ready(result) => {
                    result?;
                    true
                }
            }
        };

        if finished {
            debug!(job_id = %self.job.id(), "Job result retrieved");
            self.kill();
        }
        Ok(())
    }

    // =========================================================================
    // Termination
    // =========================================================================

    /// Kills the attempt.
    ///
    /// Safe to call from any thread, any number of times; the cleanup runs
    /// once. Returns without waiting for the cleanup.
    pub fn kill(&self) {
        if self.killed.swap(true, Ordering::SeqCst) {
            return;
        }

        let (copy_task, finalize_task, mut copy_result, batch_job) = {
            let mut inner = self.inner.lock();
            inner.copy_cancellation.cancel();
            (
                inner.copy_task.take(),
                inner.finalize_task.take(),
                inner.copy_result.take(),
                inner.batch_job.clone(),
            )
        };

        if let Some(task) = copy_task {
            match task.poll() {
                TaskPoll::Ready(Ok(result)) => copy_result = Some(Arc::new(result)),
                TaskPoll::Ready(Err(_)) => {}
                // Cancelled above. The task removes its partial staging, but
                // it may still have finished staging before noticing.
                TaskPoll::Pending(task) => self.clean_when_staged(task),
            }
        }

        if let Some(task) = finalize_task {
            task.cancel();
        }

        if let Some(copy_result) = copy_result {
            self.pools.spawn(
                ExecutorType::Remove,
                CommunicationDirCleaner::new(
                    Arc::clone(&copy_result.storage),
                    copy_result.communication_dir.clone(),
                )
                .run(),
            );
        }

        if let Some(batch_job) = batch_job {
            self.pools
                .spawn(ExecutorType::Kill, BatchJobKiller::new(batch_job).run());
        }

        debug!(job_id = %self.job.id(), "Execution killed");
    }

    /// Waits for a cancelled copy and removes its directory if it completed.
    fn clean_when_staged(&self, task: TaskHandle<CopyResult<E>>) {
        self.pools.spawn(ExecutorType::Remove, async move {
            match task.join().await {
                Ok(staged) => {
                    CommunicationDirCleaner::new(staged.storage, staged.communication_dir)
                        .run()
                        .await
                }
                Err(_) => Ok(()),
            }
        });
    }

    /// Discards the remote job so that the next cycle submits again.
    ///
    /// Staged inputs are kept.
    pub fn retry(&self) {
        let mut inner = self.inner.lock();
        inner.batch_job = None;
        inner.delay.reset();
        debug!(job_id = %self.job.id(), "Retrying failed job");
    }
}

impl<E: BatchEnvironment> fmt::Debug for BatchExecutionJob<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchExecutionJob")
            .field("job_id", self.job.id())
            .field("state", &self.state())
            .field("delay", &self.delay())
            .finish()
    }
}
