//! Save response aggregates.

use restwire_core::OperationDescriptor;

/// The outcome of one operation within a save.
#[derive(Debug, Clone)]
pub struct OperationResponse {
    /// Index of the operation in the change list.
    pub index: usize,
    /// The descriptor the operation acted on; `None` for plain reads.
    pub descriptor: Option<OperationDescriptor>,
    /// HTTP status code (0 if the operation never reached the server).
    pub status: u16,
    /// Error message for failed operations.
    pub error: Option<String>,
}

impl OperationResponse {
    /// Creates a success entry.
    pub fn success(index: usize, descriptor: Option<OperationDescriptor>, status: u16) -> Self {
        Self {
            index,
            descriptor,
            status,
            error: None,
        }
    }

    /// Creates a failure entry.
    pub fn failure(
        index: usize,
        descriptor: Option<OperationDescriptor>,
        status: u16,
        error: impl Into<String>,
    ) -> Self {
        Self {
            index,
            descriptor,
            status,
            error: Some(error.into()),
        }
    }

    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-operation outcomes of one save call, in request order.
#[derive(Debug, Clone, Default)]
pub struct SaveResponse {
    /// One entry per attempted operation.
    pub results: Vec<OperationResponse>,
}

impl SaveResponse {
    /// Returns true if every operation succeeded.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(OperationResponse::is_success)
    }

    /// Returns the number of failed operations.
    pub fn failure_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    /// Returns the first failed operation, if any.
    pub fn first_failure(&self) -> Option<&OperationResponse> {
        self.results.iter().find(|r| !r.is_success())
    }
}
