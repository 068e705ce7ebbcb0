//! Download phase: retrieving the result of a finished job.

use super::environment::{BatchEnvironment, SampleType};
use super::error::ExecutionError;
use super::job::{Job, RuntimeResult};
use crate::storage::{CommunicationStorage, StorageUri};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Download task for one finished job.
pub struct GetResultFromEnvironment<E: BatchEnvironment> {
    storage: Arc<E::Storage>,
    output_file: StorageUri,
    job: Arc<Job>,
    environment: Arc<E>,
    last_status_duration: Duration,
}

impl<E: BatchEnvironment> GetResultFromEnvironment<E> {
    pub fn new(
        storage: Arc<E::Storage>,
        output_file: StorageUri,
        job: Arc<Job>,
        environment: Arc<E>,
        last_status_duration: Duration,
    ) -> Self {
        Self {
            storage,
            output_file,
            job,
            environment,
            last_status_duration,
        }
    }

    /// Reads the runtime result and stores it into the job.
    ///
    /// A result reporting an error fails the download; the running time is
    /// only sampled for successful executions.
    pub async fn run(self) -> Result<(), ExecutionError> {
        let data = self.storage.read(&self.output_file).await?;
        let result: RuntimeResult = serde_json::from_slice(&data)?;

        if let Some(error) = &result.error {
            return Err(ExecutionError::internal(format!(
                "remote execution of job {} failed: {}",
                self.job.id(),
                error
            )));
        }

        self.environment
            .sample(SampleType::Running, self.last_status_duration, &self.job);

        if !self.job.complete(result) {
            debug!(job_id = %self.job.id(), "Job already had a result, keeping the first one");
        }
        debug!(job_id = %self.job.id(), output = %self.output_file, "Result retrieved");
        Ok(())
    }
}
