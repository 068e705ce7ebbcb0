//! Jobs and the records exchanged with the remote runtime.
//!
//! A [`Job`] is the logical unit of work handed to an environment by the
//! workflow engine. The upload phase serialises it into an
//! [`ExecutionMessage`]; the remote runtime answers with a [`RuntimeResult`]
//! that the download phase stores back into the job.
//!
//! # Example
//!
//! ```
//! use gridbatch::execution::Job;
//! use serde_json::json;
//!
//! let job = Job::new("sample-7", json!({ "seed": 7 }))
//!     .with_input_file("/data/params.csv");
//!
//! assert_eq!(job.input_files().len(), 1);
//! assert!(!job.is_finished());
//! ```

use crate::storage::StorageUri;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Global counter for generating unique job IDs.
static JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a job.
#[derive(Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a job ID with the given string value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a unique auto-generated job ID of the form `job-{counter}`.
    pub fn auto() -> Self {
        let counter = JOB_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("job-{}", counter))
    }

    /// Returns the string value of this job ID.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobId({})", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// =============================================================================
// Job
// =============================================================================

/// A logical unit of computation dispatched to a batch environment.
///
/// The descriptor part (id, name, inputs, context) is immutable. The outcome
/// slot is written at most once, by the result retrieval of a successful
/// attempt.
#[derive(Debug)]
pub struct Job {
    id: JobId,
    name: String,
    input_files: Vec<PathBuf>,
    context: serde_json::Value,
    outcome: OnceLock<RuntimeResult>,
}

impl Job {
    /// Creates a job with an auto-generated ID.
    pub fn new(name: impl Into<String>, context: serde_json::Value) -> Self {
        Self::with_id(JobId::auto(), name, context)
    }

    /// Creates a job with an explicit ID.
    pub fn with_id(id: JobId, name: impl Into<String>, context: serde_json::Value) -> Self {
        Self {
            id,
            name: name.into(),
            input_files: Vec::new(),
            context,
            outcome: OnceLock::new(),
        }
    }

    /// Adds a local file to stage alongside the job.
    pub fn with_input_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.input_files.push(path.into());
        self
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_files(&self) -> &[PathBuf] {
        &self.input_files
    }

    pub fn context(&self) -> &serde_json::Value {
        &self.context
    }

    /// Stores the result of a successful execution.
    ///
    /// Returns false if a result was already recorded.
    pub fn complete(&self, result: RuntimeResult) -> bool {
        self.outcome.set(result).is_ok()
    }

    /// Returns the recorded result, if the job has finished.
    pub fn outcome(&self) -> Option<&RuntimeResult> {
        self.outcome.get()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.get().is_some()
    }
}

// =============================================================================
// Wire Records
// =============================================================================

/// A local file replicated into the communication directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicatedFile {
    /// Original file name.
    pub name: String,
    /// Location in the communication storage.
    pub uri: StorageUri,
    /// Size in bytes.
    pub size: u64,
}

impl ReplicatedFile {
    pub(crate) fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string())
    }
}

/// Runtime payload staged for the remote side.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDescriptor {
    /// Staged runtime archive, when the environment ships one.
    pub archive: Option<StorageUri>,
    /// Memory hint for the remote runtime, in megabytes.
    pub memory_mb: u32,
}

/// Everything the remote runtime needs to execute a job.
///
/// Written as JSON to the input file of the communication directory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMessage {
    pub job_id: JobId,
    pub context: serde_json::Value,
    pub files: Vec<ReplicatedFile>,
    pub output: StorageUri,
    pub runtime: RuntimeDescriptor,
}

/// Result produced by the remote runtime.
///
/// Read as JSON from the output file of the communication directory. A
/// populated `error` means the runtime failed to execute the job.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResult {
    pub job_id: Option<JobId>,
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_job_id_auto_is_unique() {
        let id1 = JobId::auto();
        let id2 = JobId::auto();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("job-"));
    }

    #[test]
    fn test_job_id_display() {
        let id = JobId::new("exploration-42");
        assert_eq!(format!("{}", id), "exploration-42");
        assert_eq!(format!("{:?}", id), "JobId(exploration-42)");
    }

    #[test]
    fn test_job_builder() {
        let job = Job::with_id(JobId::new("j1"), "sampling", json!({"x": 1}))
            .with_input_file("/tmp/a.txt")
            .with_input_file("/tmp/b.txt");

        assert_eq!(job.id().as_str(), "j1");
        assert_eq!(job.name(), "sampling");
        assert_eq!(job.input_files().len(), 2);
        assert_eq!(job.context()["x"], 1);
    }

    #[test]
    fn test_job_outcome_written_once() {
        let job = Job::new("once", json!(null));
        assert!(job.outcome().is_none());

        let first = RuntimeResult {
            stdout: Some("first".to_string()),
            ..Default::default()
        };
        assert!(job.complete(first));
        assert!(!job.complete(RuntimeResult::default()));

        assert!(job.is_finished());
        assert_eq!(job.outcome().unwrap().stdout.as_deref(), Some("first"));
    }

    #[test]
    fn test_runtime_result_tolerates_missing_fields() {
        let result: RuntimeResult = serde_json::from_str(r#"{"job_id": "j9"}"#).unwrap();
        assert_eq!(result.job_id, Some(JobId::new("j9")));
        assert!(result.error.is_none());
        assert!(result.context.is_null());
    }

    #[test]
    fn test_replicated_file_name() {
        assert_eq!(
            ReplicatedFile::file_name(Path::new("/data/params.csv")),
            "params.csv"
        );
        assert_eq!(ReplicatedFile::file_name(Path::new("/")), "input");
    }
}
