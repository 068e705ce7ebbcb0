//! Errors raised while driving an execution attempt.

use thiserror::Error;

/// Failure taxonomy of the execution engine.
///
/// None of these escape [`BatchExecutionJob::update`](super::BatchExecutionJob::update):
/// processing and configuration failures kill the attempt, cancellations are
/// swallowed.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// Infrastructure fault (I/O, remote protocol error, corrupt result).
    #[error("Internal processing error: {0}")]
    InternalProcessing(String),

    /// Misconfiguration detected while processing the job.
    #[error("User configuration error: {0}")]
    UserBadData(String),

    /// The operation was interrupted because the job was killed.
    #[error("Operation cancelled")]
    Cancelled,
}

impl ExecutionError {
    /// Creates an internal processing error.
    pub fn internal(message: impl std::fmt::Display) -> Self {
        Self::InternalProcessing(message.to_string())
    }

    /// Creates a user configuration error.
    pub fn user(message: impl std::fmt::Display) -> Self {
        Self::UserBadData(message.to_string())
    }

    /// Returns true for the cancellation variant.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for ExecutionError {
    fn from(e: std::io::Error) -> Self {
        Self::InternalProcessing(e.to_string())
    }
}

impl From<serde_json::Error> for ExecutionError {
    fn from(e: serde_json::Error) -> Self {
        Self::InternalProcessing(format!("malformed execution record: {}", e))
    }
}

impl From<tokio::task::JoinError> for ExecutionError {
    fn from(e: tokio::task::JoinError) -> Self {
        if e.is_cancelled() {
            Self::Cancelled
        } else {
            Self::InternalProcessing(format!("task panicked: {}", e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ExecutionError::internal("disk full").to_string(),
            "Internal processing error: disk full"
        );
        assert_eq!(
            ExecutionError::user("missing input").to_string(),
            "User configuration error: missing input"
        );
        assert_eq!(ExecutionError::Cancelled.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_io_error_is_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: ExecutionError = io.into();
        assert!(matches!(err, ExecutionError::InternalProcessing(_)));
        assert!(!err.is_cancelled());
    }

    #[tokio::test]
    async fn test_aborted_join_is_cancelled() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        let err: ExecutionError = handle.await.unwrap_err().into();
        assert!(err.is_cancelled());
    }
}
