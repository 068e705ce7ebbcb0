//! Best-effort cleanup tasks run after an execution is killed.

use super::environment::BatchJob;
use super::error::ExecutionError;
use super::state::ExecutionState;
use crate::storage::{CommunicationStorage, StorageUri};
use std::sync::Arc;
use tracing::debug;

/// Terminates a remote job.
pub struct BatchJobKiller<J> {
    batch_job: Arc<J>,
}

impl<J: BatchJob> BatchJobKiller<J> {
    pub fn new(batch_job: Arc<J>) -> Self {
        Self { batch_job }
    }

    /// Kills the remote job unless it is already done or killed.
    ///
    /// Failures are logged and swallowed.
    pub async fn run(self) -> Result<(), ExecutionError> {
        match self.batch_job.state() {
            ExecutionState::Done | ExecutionState::Killed => Ok(()),
            _ => {
                if let Err(e) = self.batch_job.kill().await {
                    debug!(error = %e, "Could not kill batch job");
                }
                Ok(())
            }
        }
    }
}

/// Removes a communication directory.
pub struct CommunicationDirCleaner<S> {
    storage: Arc<S>,
    communication_dir: StorageUri,
}

impl<S: CommunicationStorage> CommunicationDirCleaner<S> {
    pub fn new(storage: Arc<S>, communication_dir: StorageUri) -> Self {
        Self {
            storage,
            communication_dir,
        }
    }

    /// Removes the directory recursively. Failures are logged and swallowed.
    pub async fn run(self) -> Result<(), ExecutionError> {
        if let Err(e) = self.storage.remove(&self.communication_dir, true).await {
            debug!(
                storage = %self.storage.description(),
                dir = %self.communication_dir,
                error = %e,
                "Could not remove communication directory"
            );
        }
        Ok(())
    }
}
