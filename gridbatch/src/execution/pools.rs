//! Bounded task pools for the asynchronous phases of an execution.
//!
//! Uploads, downloads, remote directory removal and remote job termination
//! each run on their own pool so that slow work of one kind cannot starve
//! another. A pool is a semaphore bounding how many of its tasks execute at
//! once; tasks beyond the limit are spawned but wait for a permit.
//!
//! [`TaskPools::spawn`] returns a [`TaskHandle`] that the owner polls without
//! blocking and may cancel at any time.
//!
//! # Example
//!
//! ```ignore
//! use gridbatch::execution::{ExecutorType, TaskPoll, TaskPoolConfig, TaskPools};
//!
//! let pools = TaskPools::new(TaskPoolConfig::default());
//! let handle = pools.spawn(ExecutorType::Upload, async { Ok(42) });
//!
//! match handle.poll() {
//!     TaskPoll::Ready(result) => println!("{:?}", result),
//!     TaskPoll::Pending(handle) => handle.cancel(),
//! }
//! ```

use super::error::ExecutionError;
use crate::config::PoolSettings;
use futures::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// Default number of concurrent uploads.
pub const DEFAULT_UPLOAD_POOL_SIZE: usize = 16;

/// Default number of concurrent downloads.
pub const DEFAULT_DOWNLOAD_POOL_SIZE: usize = 16;

/// Default number of concurrent remote removals.
pub const DEFAULT_REMOVE_POOL_SIZE: usize = 4;

/// Default number of concurrent remote kills.
pub const DEFAULT_KILL_POOL_SIZE: usize = 4;

/// Category of asynchronous work.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ExecutorType {
    /// Staging job inputs into the communication storage.
    Upload,
    /// Retrieving job results.
    Download,
    /// Removing communication directories.
    Remove,
    /// Terminating remote jobs.
    Kill,
}

impl fmt::Display for ExecutorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upload => write!(f, "upload"),
            Self::Download => write!(f, "download"),
            Self::Remove => write!(f, "remove"),
            Self::Kill => write!(f, "kill"),
        }
    }
}

/// Concurrency limit of each pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskPoolConfig {
    pub upload: usize,
    pub download: usize,
    pub remove: usize,
    pub kill: usize,
}

impl Default for TaskPoolConfig {
    fn default() -> Self {
        Self {
            upload: DEFAULT_UPLOAD_POOL_SIZE,
            download: DEFAULT_DOWNLOAD_POOL_SIZE,
            remove: DEFAULT_REMOVE_POOL_SIZE,
            kill: DEFAULT_KILL_POOL_SIZE,
        }
    }
}

impl From<&PoolSettings> for TaskPoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        Self {
            upload: settings.upload,
            download: settings.download,
            remove: settings.remove,
            kill: settings.kill,
        }
    }
}

// =============================================================================
// Task Pools
// =============================================================================

struct PoolsInner {
    runtime: Handle,
    config: TaskPoolConfig,
    upload: Arc<Semaphore>,
    download: Arc<Semaphore>,
    remove: Arc<Semaphore>,
    kill: Arc<Semaphore>,
}

/// The four bounded pools shared by all executions of an engine.
///
/// Cloning is cheap and clones share the same pools. Tasks run on the Tokio
/// runtime captured at construction, so tasks may be spawned from threads
/// outside the runtime.
#[derive(Clone)]
pub struct TaskPools {
    inner: Arc<PoolsInner>,
}

impl TaskPools {
    /// Creates pools on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime or if a pool size is zero.
    pub fn new(config: TaskPoolConfig) -> Self {
        Self::with_handle(config, Handle::current())
    }

    /// Creates pools spawning onto the given runtime.
    ///
    /// # Panics
    ///
    /// Panics if a pool size is zero.
    pub fn with_handle(config: TaskPoolConfig, runtime: Handle) -> Self {
        assert!(config.upload > 0, "upload pool size must be > 0");
        assert!(config.download > 0, "download pool size must be > 0");
        assert!(config.remove > 0, "remove pool size must be > 0");
        assert!(config.kill > 0, "kill pool size must be > 0");

        Self {
            inner: Arc::new(PoolsInner {
                runtime,
                config,
                upload: Arc::new(Semaphore::new(config.upload)),
                download: Arc::new(Semaphore::new(config.download)),
                remove: Arc::new(Semaphore::new(config.remove)),
                kill: Arc::new(Semaphore::new(config.kill)),
            }),
        }
    }

    fn semaphore(&self, kind: ExecutorType) -> &Arc<Semaphore> {
        match kind {
            ExecutorType::Upload => &self.inner.upload,
            ExecutorType::Download => &self.inner.download,
            ExecutorType::Remove => &self.inner.remove,
            ExecutorType::Kill => &self.inner.kill,
        }
    }

    /// Spawns a task on the pool of the given kind.
    ///
    /// The task starts executing once the pool has a free slot. Dropping the
    /// returned handle detaches the task.
    pub fn spawn<F, T>(&self, kind: ExecutorType, task: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, ExecutionError>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::clone(self.semaphore(kind));
        let join = self.inner.runtime.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| ExecutionError::Cancelled)?;
            task.await
        });
        TaskHandle { join, kind }
    }

    /// Returns the number of free slots in a pool.
    pub fn available(&self, kind: ExecutorType) -> usize {
        self.semaphore(kind).available_permits()
    }

    pub fn config(&self) -> &TaskPoolConfig {
        &self.inner.config
    }
}

impl fmt::Debug for TaskPools {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPools")
            .field("config", &self.inner.config)
            .finish()
    }
}

// =============================================================================
// Task Handle
// =============================================================================

/// Outcome of a non-blocking poll of a [`TaskHandle`].
#[derive(Debug)]
pub enum TaskPoll<T> {
    /// The task has not finished; the handle is returned to the caller.
    Pending(TaskHandle<T>),
    /// The task finished with this result.
    Ready(Result<T, ExecutionError>),
}

/// Handle to a task spawned on a pool.
pub struct TaskHandle<T> {
    join: JoinHandle<Result<T, ExecutionError>>,
    kind: ExecutorType,
}

impl<T> TaskHandle<T> {
    /// Returns true if the task has finished, successfully or not.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Returns the pool this task was spawned on.
    pub fn kind(&self) -> ExecutorType {
        self.kind
    }

    /// Takes the result if the task has finished, without waiting.
    ///
    /// A task that panicked or was aborted yields an error.
    pub fn poll(mut self) -> TaskPoll<T> {
        if !self.join.is_finished() {
            return TaskPoll::Pending(self);
        }
        match (&mut self.join).now_or_never() {
            Some(Ok(result)) => TaskPoll::Ready(result),
            Some(Err(e)) => TaskPoll::Ready(Err(e.into())),
            None => TaskPoll::Pending(self),
        }
    }

    /// Aborts the task.
    pub fn cancel(self) {
        self.join.abort();
    }

    /// Waits for the task to finish.
    pub async fn join(self) -> Result<T, ExecutionError> {
        self.join.await?
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("kind", &self.kind)
            .field("finished", &self.join.is_finished())
            .finish()
    }
}
