//! Error types for query translation.

use restwire_protocol::ProtocolVersion;
use thiserror::Error;

/// Result type for query building and translation.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur while translating a query tree to a URI.
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    /// A segment was appended after a terminal (non-composable) segment.
    #[error("the segment '{attempted}' cannot follow '{terminal}': '{terminal}' must be the last segment of the resource path")]
    Composability {
        /// The terminal segment already in place.
        terminal: String,
        /// The segment that was appended after it.
        attempted: String,
    },

    /// The query uses a construct the translator does not support.
    #[error("the construct '{construct}' is not supported: {reason}")]
    NotSupported {
        /// Name of the offending method or clause.
        construct: String,
        /// Why it is rejected.
        reason: String,
    },

    /// The construct requires a higher negotiated protocol version.
    #[error("the construct '{construct}' requires protocol version {required} but {negotiated} was negotiated")]
    ProtocolVersion {
        /// Name of the gated construct.
        construct: String,
        /// Minimum version that introduced it.
        required: ProtocolVersion,
        /// The version in effect.
        negotiated: ProtocolVersion,
    },

    /// The name resolver had no wire name for a runtime type.
    #[error("no wire type name could be resolved for '{type_name}'")]
    UnresolvableType {
        /// The runtime type that failed to resolve.
        type_name: String,
    },

    /// The tree has no source set to translate from.
    #[error("the query has no source set")]
    EmptyQuery,
}

impl QueryError {
    /// Creates a not-supported error.
    pub fn not_supported(construct: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotSupported {
            construct: construct.into(),
            reason: reason.into(),
        }
    }

    /// Creates a composability error.
    pub fn composability(terminal: impl Into<String>, attempted: impl Into<String>) -> Self {
        Self::Composability {
            terminal: terminal.into(),
            attempted: attempted.into(),
        }
    }
}
