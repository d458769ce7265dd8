//! Error types for the save pipeline.

use crate::response::SaveResponse;
use thiserror::Error;

/// Result type for save and execute operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur while sequencing, transmitting, or applying
/// changes.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Registry or change-list error.
    #[error("tracking error: {0}")]
    Core(#[from] restwire_core::CoreError),

    /// The external serializer failed to produce a body.
    #[error("serialization failed: {message}")]
    Serialize {
        /// Description of the failure.
        message: String,
    },

    /// The transport failed to deliver a request.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether retrying could help.
        retryable: bool,
    },

    /// The server answered an operation with an error status.
    #[error("operation {index} failed with status {status}: {message}")]
    Operation {
        /// Index of the failed operation in the change list.
        index: usize,
        /// HTTP status code.
        status: u16,
        /// Server-provided message, propagated without reinterpretation.
        message: String,
    },

    /// An operation requires an identity that has not been assigned.
    #[error("entity in set {set_name} has no identity yet; its insert must complete first")]
    MissingIdentity {
        /// Set of the identity-less descriptor.
        set_name: String,
    },

    /// The save was cancelled before transmission completed.
    #[error("save cancelled")]
    Cancelled,

    /// Some operations failed; the response lists every outcome.
    #[error("{failed} of {total} operations failed", failed = .response.failure_count(), total = .response.results.len())]
    PartialFailure {
        /// Per-operation outcomes for the whole save.
        response: SaveResponse,
    },

    /// The change list exceeds the configured per-save limit.
    #[error("change list has {count} operations, more than the configured limit of {limit}")]
    TooManyOperations {
        /// Number of pending operations.
        count: usize,
        /// Configured limit.
        limit: usize,
    },
}

impl ClientError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a serialization error.
    pub fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize {
            message: message.into(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport { retryable: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::OperationResponse;

    #[test]
    fn retryable_predicate() {
        assert!(ClientError::transport_retryable("timeout").is_retryable());
        assert!(!ClientError::transport_fatal("bad certificate").is_retryable());
        assert!(!ClientError::Cancelled.is_retryable());
    }

    #[test]
    fn partial_failure_display() {
        let response = SaveResponse {
            results: vec![
                OperationResponse::success(0, None, 201),
                OperationResponse::failure(1, None, 400, "bad request"),
            ],
        };
        let err = ClientError::PartialFailure { response };
        assert_eq!(err.to_string(), "1 of 2 operations failed");
    }
}
