//! Save behavior options.

use serde::{Deserialize, Serialize};

/// Selects how a save operation sequences and transmits its changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SaveOptions {
    /// One request per operation; the first failure aborts the rest.
    #[default]
    None,
    /// One request per operation; failures are collected and surfaced
    /// together once every operation has been attempted.
    ContinueOnError,
    /// Like `None`, but updates replace the full entity (PUT) instead of
    /// patching it.
    ReplaceOnUpdate,
    /// All side-effecting operations grouped into one atomic changeset
    /// inside a single batch request.
    BatchWithSingleChangeset,
    /// Each operation is its own part of a single batch request; one
    /// part failing does not roll back the others.
    BatchWithIndependentOperations,
}

impl SaveOptions {
    /// Returns true if the save is transmitted as one batch envelope.
    pub fn is_batch(&self) -> bool {
        matches!(
            self,
            SaveOptions::BatchWithSingleChangeset | SaveOptions::BatchWithIndependentOperations
        )
    }

    /// Returns true if operations after a failure are still attempted.
    ///
    /// Holds for `ContinueOnError` and for batch parts outside an atomic
    /// changeset.
    pub fn continue_on_error(&self) -> bool {
        matches!(
            self,
            SaveOptions::ContinueOnError | SaveOptions::BatchWithIndependentOperations
        )
    }

    /// Returns true if updates use full replace (PUT) semantics.
    pub fn replace_on_update(&self) -> bool {
        matches!(self, SaveOptions::ReplaceOnUpdate)
    }

    /// Returns true if all operations commit or roll back together.
    pub fn is_atomic(&self) -> bool {
        matches!(self, SaveOptions::BatchWithSingleChangeset)
    }
}
