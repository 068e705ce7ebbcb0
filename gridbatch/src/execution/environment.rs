//! Contracts between the lifecycle engine and a remote execution environment.
//!
//! An environment plugs a concrete protocol into the engine by implementing
//! three traits:
//!
//! - [`BatchEnvironment`] hands out job services with access tokens, selects
//!   the communication storage and receives duration samples
//! - [`JobService`] submits staged jobs
//! - [`BatchJob`] reports the state of one submitted job
//!
//! All remote operations return futures; the engine never blocks a thread on
//! them.

use super::access_token::{AccessToken, ResourceControl, ServiceDescription};
use super::error::ExecutionError;
use super::job::{Job, RuntimeDescriptor};
use super::state::ExecutionState;
use crate::storage::{CommunicationStorage, StorageUri};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Kind of duration reported to an environment's statistics sink.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum SampleType {
    /// Time a job spent queued before it started running.
    Waiting,
    /// Time a job spent running.
    Running,
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
        }
    }
}

/// Runtime shipped with every job of an environment.
#[derive(Clone, Debug, Default)]
pub struct RuntimePayload {
    /// Local runtime archive to stage, if any.
    pub archive: Option<PathBuf>,
    /// Memory hint passed to the remote runtime, in megabytes.
    pub memory_mb: u32,
}

/// Handle to one job submitted to a remote job service.
pub trait BatchJob: Send + Sync + 'static {
    /// Returns the last known state without contacting the remote service.
    fn state(&self) -> ExecutionState;

    /// Refreshes the state from the remote service and returns it.
    fn updated_state(&self) -> impl Future<Output = Result<ExecutionState, ExecutionError>> + Send;

    /// Returns how long the job stayed in its previous state.
    fn last_status_duration(&self) -> Duration;

    /// Terminates the remote job.
    fn kill(&self) -> impl Future<Output = Result<(), ExecutionError>> + Send;
}

/// A remote service accepting job submissions.
pub trait JobService: Send + Sync + 'static {
    /// Handle type returned by [`submit`](JobService::submit).
    type Job: BatchJob;

    /// Returns the description keying this service's usage control.
    fn description(&self) -> &ServiceDescription;

    /// Submits a staged job.
    ///
    /// The caller holds `token` for the duration of the call.
    fn submit(
        &self,
        input: &StorageUri,
        output: &StorageUri,
        runtime: &RuntimeDescriptor,
        token: &AccessToken,
    ) -> impl Future<Output = Result<Self::Job, ExecutionError>> + Send;
}

/// A remote execution destination.
pub trait BatchEnvironment: Send + Sync + 'static {
    /// Job service type of this environment.
    type Service: JobService;

    /// Communication storage type of this environment.
    type Storage: CommunicationStorage;

    /// Picks a job service and acquires an access token for it.
    ///
    /// May wait until the service's usage control has a free token.
    fn get_a_job_service(
        &self,
    ) -> impl Future<Output = Result<(Arc<Self::Service>, AccessToken), ExecutionError>> + Send;

    /// Picks the storage used to stage a job.
    fn select_storage(
        &self,
    ) -> impl Future<Output = Result<Arc<Self::Storage>, ExecutionError>> + Send;

    /// Returns the runtime shipped with every job.
    fn runtime(&self) -> &RuntimePayload;

    /// Returns the usage controls of this environment's job services.
    fn resource_control(&self) -> &ResourceControl;

    /// Records a duration sample for `job`.
    fn sample(&self, kind: SampleType, duration: Duration, job: &Job);
}

/// Batch job handle type produced by an environment.
pub type ServiceJob<E> = <<E as BatchEnvironment>::Service as JobService>::Job;
