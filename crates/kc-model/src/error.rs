//! Model error types.

use thiserror::Error;

/// Errors raised while parsing or decoding model values.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Unknown enum variant in a textual representation.
    #[error("unknown {kind}: '{value}'")]
    UnknownVariant {
        /// Kind of value being parsed (e.g., "action type").
        kind: &'static str,
        /// Rejected input.
        value: String,
    },

    /// Snapshot envelope written by an unsupported format version.
    #[error("unsupported snapshot format version {0}")]
    UnsupportedSnapshotVersion(u64),

    /// Snapshot payload does not have the expected shape.
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

impl ModelError {
    /// Creates an unknown variant error.
    #[must_use]
    pub fn unknown(kind: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            kind,
            value: value.into(),
        }
    }
}
