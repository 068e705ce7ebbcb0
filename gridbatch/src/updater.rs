//! Periodic updates with a delay chosen by the updated object.
//!
//! The [`VariableDelayUpdater`] runs one loop per registered object: call
//! [`update`](UpdatableWithVariableDelay::update), then sleep for the delay the
//! object reports, until `update` returns false or the updater is shut down.
//!
//! # Example
//!
//! ```ignore
//! use gridbatch::updater::VariableDelayUpdater;
//! use tokio_util::sync::CancellationToken;
//!
//! let shutdown = CancellationToken::new();
//! let updater = VariableDelayUpdater::new(shutdown.clone());
//!
//! updater.register(Arc::clone(&execution));
//! updater.wait_idle().await;
//! ```

use crate::execution::{BatchEnvironment, BatchExecutionJob};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// An object that is updated periodically and picks its own update delay.
pub trait UpdatableWithVariableDelay: Send + Sync + 'static {
    /// Runs one update. Returns false when no more updates are needed.
    fn update(&self) -> impl Future<Output = bool> + Send;

    /// Returns the delay to wait before the next update.
    fn delay(&self) -> Duration;
}

impl<E: BatchEnvironment> UpdatableWithVariableDelay for BatchExecutionJob<E> {
    fn update(&self) -> impl Future<Output = bool> + Send {
        BatchExecutionJob::update(self)
    }

    fn delay(&self) -> Duration {
        BatchExecutionJob::delay(self)
    }
}

/// Counts live update loops and wakes idle waiters.
#[derive(Default)]
struct LiveLoops {
    count: AtomicUsize,
    idle: Notify,
}

/// Decrements the live count when an update loop ends, even on panic.
struct LiveGuard(Arc<LiveLoops>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Drives registered objects until they finish or the updater is shut down.
///
/// Shutdown takes effect between updates: an update in progress is never
/// interrupted.
pub struct VariableDelayUpdater {
    shutdown: CancellationToken,
    live: Arc<LiveLoops>,
}

impl VariableDelayUpdater {
    /// Creates an updater stopped by `shutdown`.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            live: Arc::new(LiveLoops::default()),
        }
    }

    /// Starts updating an object.
    ///
    /// The first update runs immediately. Must be called within a Tokio
    /// runtime.
    pub fn register<U: UpdatableWithVariableDelay>(&self, updatable: Arc<U>) -> JoinHandle<()> {
        self.live.count.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live));
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let _guard = guard;
            // Shutdown is only observed between updates.
            while !shutdown.is_cancelled() {
                if !updatable.update().await || shutdown.is_cancelled() {
                    break;
                }

                let delay = updatable.delay();
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            debug!("Update loop finished");
        })
    }

    /// Returns the number of objects still being updated.
    pub fn live(&self) -> usize {
        self.live.count.load(Ordering::SeqCst)
    }

    /// Waits until every registered object has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.live.idle.notified();
            if self.live() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stops all update loops once their current update returns.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
