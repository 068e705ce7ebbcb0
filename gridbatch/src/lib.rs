//! gridbatch - Lifecycle engine for jobs executed on remote batch environments
//!
//! A [`BatchExecutionJob`](execution::BatchExecutionJob) carries one job
//! through staging, submission, monitoring and result retrieval on a
//! [`BatchEnvironment`](execution::BatchEnvironment). It is driven by the
//! [`VariableDelayUpdater`](updater::VariableDelayUpdater), which polls each
//! execution with a delay that grows while nothing changes.
//!
//! # Example
//!
//! ```ignore
//! use gridbatch::environment::{LoopbackConfig, LoopbackEnvironment};
//! use gridbatch::execution::{BatchExecutionJob, Job, TaskPools, UpdateIntervalConfig};
//! use gridbatch::updater::VariableDelayUpdater;
//!
//! let env = Arc::new(LoopbackEnvironment::new(work_dir, LoopbackConfig::default()));
//! let pools = TaskPools::new(Default::default());
//! let updater = VariableDelayUpdater::new(CancellationToken::new());
//!
//! let job = Arc::new(Job::new("sample", serde_json::json!({ "x": 1 })));
//! let execution = Arc::new(BatchExecutionJob::new(job, env, pools, UpdateIntervalConfig::default()));
//! updater.register(execution);
//! updater.wait_idle().await;
//! ```

pub mod config;
pub mod environment;
pub mod execution;
pub mod logging;
pub mod statistics;
pub mod storage;
pub mod updater;

/// Version of the gridbatch library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
