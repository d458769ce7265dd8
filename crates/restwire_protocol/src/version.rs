//! Negotiated protocol versions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A negotiated data-service protocol version.
///
/// Versions are totally ordered; feature gates compare the negotiated
/// version against the version that introduced a construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Version 1.0.
    V1,
    /// Version 2.0.
    V2,
    /// Version 3.0.
    V3,
}

impl ProtocolVersion {
    /// Returns the wire form used in version headers.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "1.0",
            ProtocolVersion::V2 => "2.0",
            ProtocolVersion::V3 => "3.0",
        }
    }

    /// Returns true if this version is at least `required`.
    pub fn supports(&self, required: ProtocolVersion) -> bool {
        *self >= required
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        ProtocolVersion::V3
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
