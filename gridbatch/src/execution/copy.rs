//! Upload phase: staging a job into a communication directory.
//!
//! Layout of a communication directory:
//!
//! ```text
//! <storage root>/<job id>-<sequence>/
//!     files/<index>-<file name>    job input files
//!     runtime/<file name>          runtime archive, when the environment has one
//!     input.json                   ExecutionMessage
//!     output.json                  RuntimeResult, written by the remote runtime
//! ```

use super::environment::BatchEnvironment;
use super::error::ExecutionError;
use super::job::{ExecutionMessage, Job, ReplicatedFile, RuntimeDescriptor};
use crate::storage::{CommunicationStorage, StorageUri};
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// File name of the staged execution message.
pub const INPUT_FILE_NAME: &str = "input.json";

/// File name of the result written by the remote runtime.
pub const OUTPUT_FILE_NAME: &str = "output.json";

/// Sequence making communication directories unique across attempts.
static COMMUNICATION_DIR_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Everything produced by a successful upload.
///
/// Held by the execution until the attempt is cleaned up.
pub struct CopyToEnvironmentResult<S> {
    pub storage: Arc<S>,
    pub communication_dir: StorageUri,
    pub input_file: StorageUri,
    pub output_file: StorageUri,
    pub runtime: RuntimeDescriptor,
}

impl<S: CommunicationStorage> fmt::Debug for CopyToEnvironmentResult<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyToEnvironmentResult")
            .field("storage", self.storage.description())
            .field("communication_dir", &self.communication_dir)
            .field("input_file", &self.input_file)
            .field("output_file", &self.output_file)
            .finish()
    }
}

/// Upload task for one job.
pub struct CopyToEnvironment<E: BatchEnvironment> {
    environment: Arc<E>,
    job: Arc<Job>,
    cancellation: CancellationToken,
}

impl<E: BatchEnvironment> CopyToEnvironment<E> {
    pub fn new(environment: Arc<E>, job: Arc<Job>) -> Self {
        Self {
            environment,
            job,
            cancellation: CancellationToken::new(),
        }
    }

    /// Interrupts the upload when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Runs the upload.
    ///
    /// A partially staged directory is removed when the upload fails or is
    /// cancelled.
    pub async fn run(self) -> Result<CopyToEnvironmentResult<E::Storage>, ExecutionError> {
        let cancellation = self.cancellation.clone();
        let storage = tokio::select! {
            biased;
            _ = cancellation.cancelled() => return Err(ExecutionError::Cancelled),
            storage = self.environment.select_storage() => storage?,
        };
        let sequence = COMMUNICATION_DIR_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let communication_dir = storage
            .root()
            .join(&format!("{}-{}", self.job.id(), sequence));

        let staged = tokio::select! {
            biased;
            _ = cancellation.cancelled() => Err(ExecutionError::Cancelled),
            staged = self.stage(&storage, &communication_dir) => staged,
        };

        match staged {
            Ok((input_file, output_file, runtime)) => {
                debug!(
                    job_id = %self.job.id(),
                    storage = %storage.description(),
                    dir = %communication_dir,
                    "Job staged"
                );
                Ok(CopyToEnvironmentResult {
                    storage,
                    communication_dir,
                    input_file,
                    output_file,
                    runtime,
                })
            }
            Err(e) => {
                if let Err(cleanup) = storage.remove(&communication_dir, true).await {
                    debug!(dir = %communication_dir, error = %cleanup, "Failed to remove partial staging");
                }
                Err(e)
            }
        }
    }

    async fn stage(
        &self,
        storage: &E::Storage,
        communication_dir: &StorageUri,
    ) -> Result<(StorageUri, StorageUri, RuntimeDescriptor), ExecutionError> {
        storage.make_dir(communication_dir).await?;

        let files_dir = communication_dir.join("files");
        let mut files = Vec::with_capacity(self.job.input_files().len());

        for (index, path) in self.job.input_files().iter().enumerate() {
            let name = ReplicatedFile::file_name(path);
            let uri = files_dir.join(&format!("{}-{}", index, name));
            let size = self.upload(storage, path, &uri).await?;
            files.push(ReplicatedFile { name, uri, size });
        }

        let payload = self.environment.runtime();
        let archive = match &payload.archive {
            Some(path) => {
                let uri = communication_dir
                    .join("runtime")
                    .join(&ReplicatedFile::file_name(path));
                self.upload(storage, path, &uri).await?;
                Some(uri)
            }
            None => None,
        };
        let runtime = RuntimeDescriptor {
            archive,
            memory_mb: payload.memory_mb,
        };

        let input_file = communication_dir.join(INPUT_FILE_NAME);
        let output_file = communication_dir.join(OUTPUT_FILE_NAME);
        let message = ExecutionMessage {
            job_id: self.job.id().clone(),
            context: self.job.context().clone(),
            files,
            output: output_file.clone(),
            runtime: runtime.clone(),
        };
        storage
            .write(&input_file, serde_json::to_vec(&message)?)
            .await?;

        Ok((input_file, output_file, runtime))
    }

    async fn upload(
        &self,
        storage: &E::Storage,
        path: &Path,
        uri: &StorageUri,
    ) -> Result<u64, ExecutionError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(ExecutionError::user(format!(
                "input file {} of job {} does not exist",
                path.display(),
                self.job.id()
            )));
        }
        storage.upload(path, uri).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::testing::MockEnvironment;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_stages_inputs_and_message() {
        let env = Arc::new(MockEnvironment::new());
        let inputs = TempDir::new().unwrap();
        let params = inputs.path().join("params.csv");
        std::fs::write(&params, b"a,b\n1,2\n").unwrap();

        let job = Arc::new(Job::new("staged", json!({ "seed": 3 })).with_input_file(&params));
        let result = CopyToEnvironment::new(Arc::clone(&env), Arc::clone(&job))
            .run()
            .await
            .unwrap();

        assert!(result
            .communication_dir
            .as_str()
            .starts_with(&format!("{}-", job.id())));
        assert_eq!(result.input_file, result.communication_dir.join(INPUT_FILE_NAME));
        assert_eq!(result.output_file, result.communication_dir.join(OUTPUT_FILE_NAME));

        let message: ExecutionMessage =
            serde_json::from_slice(&std::fs::read(env.path_of(&result.input_file)).unwrap())
                .unwrap();
        assert_eq!(&message.job_id, job.id());
        assert_eq!(message.context["seed"], 3);
        assert_eq!(message.files.len(), 1);
        assert_eq!(message.files[0].name, "params.csv");
        assert_eq!(message.files[0].size, 8);
        assert!(message.files[0].uri.as_str().ends_with("files/0-params.csv"));
        assert!(env.path_of(&message.files[0].uri).exists());
    }

    #[tokio::test]
    async fn test_attempts_get_distinct_directories() {
        let env = Arc::new(MockEnvironment::new());
        let job = Arc::new(Job::new("twice", json!(null)));

        let first = CopyToEnvironment::new(Arc::clone(&env), Arc::clone(&job))
            .run()
            .await
            .unwrap();
        let second = CopyToEnvironment::new(Arc::clone(&env), Arc::clone(&job))
            .run()
            .await
            .unwrap();
        assert_ne!(first.communication_dir, second.communication_dir);
    }

    #[tokio::test]
    async fn test_missing_input_removes_partial_staging() {
        let env = Arc::new(MockEnvironment::new());
        let job = Arc::new(Job::new("broken", json!(null)).with_input_file("/nonexistent/x.dat"));

        let err = CopyToEnvironment::new(Arc::clone(&env), job)
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err, ExecutionError::UserBadData(_)));
        let removed = env.storage.removed.lock().clone();
        assert_eq!(removed.len(), 1);
        assert!(!env.path_of(&removed[0]).exists());
    }

    #[tokio::test]
    async fn test_cancelled_before_storage() {
        let env = Arc::new(MockEnvironment::new());
        env.storage_gate.close();
        let token = CancellationToken::new();
        token.cancel();

        let err = CopyToEnvironment::new(env, Arc::new(Job::new("c", json!(null))))
            .with_cancellation(token)
            .run()
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
