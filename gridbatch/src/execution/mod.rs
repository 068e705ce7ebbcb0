//! Batch Execution Engine
//!
//! This module drives jobs through remote batch environments: staging their
//! inputs, submitting them under a concurrency cap, polling their state with an
//! adaptive delay, retrieving their results and cleaning up after them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  VariableDelayUpdater                        │
//! │  Calls update() on each execution, sleeps for its delay     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                   BatchExecutionJob                          │
//! │  State machine: copy → submit → poll → download → kill      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │ TaskPools   │  │ Resource    │  │ BatchEnvironment    │  │
//! │  │ (4 kinds)   │  │ Control     │  │ JobService/BatchJob │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - **Job**: the unit of work handed over by the workflow engine, with its
//!   input files and context. Its result is stored back into it.
//!
//! - **BatchExecutionJob**: one attempt to run a job on an environment. It
//!   owns the staged inputs and the remote handle of the attempt.
//!
//! - **Access token**: capability to submit one job to a job service. Each
//!   service has a fixed number of tokens.
//!
//! - **Task pools**: bounded pools for uploads, downloads, removals and
//!   kills, returning handles that are polled without blocking.
//!
//! # Example
//!
//! ```ignore
//! use gridbatch::execution::{BatchExecutionJob, Job, TaskPools, TaskPoolConfig, UpdateIntervalConfig};
//! use gridbatch::updater::VariableDelayUpdater;
//!
//! let pools = TaskPools::new(TaskPoolConfig::default());
//! let updater = VariableDelayUpdater::new(shutdown.clone());
//!
//! let job = Arc::new(Job::new("sample", serde_json::json!({ "seed": 1 })));
//! let execution = Arc::new(BatchExecutionJob::new(
//!     Arc::clone(&job),
//!     environment,
//!     pools,
//!     UpdateIntervalConfig::default(),
//! ));
//! updater.register(execution);
//! ```

mod access_token;
mod batch_job;
mod cleanup;
mod copy;
mod environment;
mod error;
mod interval;
mod job;
mod pools;
mod result;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use access_token::{
    AccessToken, ResourceControl, ServiceDescription, UsageControl,
    DEFAULT_MAX_CONCURRENT_SUBMISSIONS,
};
pub use batch_job::BatchExecutionJob;
pub use cleanup::{BatchJobKiller, CommunicationDirCleaner};
pub use copy::{CopyToEnvironment, CopyToEnvironmentResult, INPUT_FILE_NAME, OUTPUT_FILE_NAME};
pub use environment::{
    BatchEnvironment, BatchJob, JobService, RuntimePayload, SampleType, ServiceJob,
};
pub use error::ExecutionError;
pub use interval::{
    AdaptiveDelay, UpdateIntervalConfig, DEFAULT_INCREMENT_UPDATE_INTERVAL,
    DEFAULT_MAX_UPDATE_INTERVAL, DEFAULT_MIN_UPDATE_INTERVAL,
};
pub use job::{ExecutionMessage, Job, JobId, ReplicatedFile, RuntimeDescriptor, RuntimeResult};
pub use pools::{
    ExecutorType, TaskHandle, TaskPoll, TaskPoolConfig, TaskPools, DEFAULT_DOWNLOAD_POOL_SIZE,
    DEFAULT_KILL_POOL_SIZE, DEFAULT_REMOVE_POOL_SIZE, DEFAULT_UPLOAD_POOL_SIZE,
};
pub use result::GetResultFromEnvironment;
pub use state::{ExecutionState, StateTracker};
