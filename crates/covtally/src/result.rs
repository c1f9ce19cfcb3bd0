//! Result and error types for covtally.

use thiserror::Error;

/// Result type for covtally operations
pub type CovResult<T> = Result<T, CovError>;

/// Errors that can occur while loading, merging or verifying coverage
#[derive(Debug, Error)]
pub enum CovError {
    /// Stream does not look like a coverage snapshot
    #[error("Invalid coverage format: {message}")]
    Format {
        /// Error message
        message: String,
    },

    /// Snapshot version this reader cannot interpret
    #[error("Unsupported snapshot version {found} (supported: 1..={supported})")]
    UnsupportedVersion {
        /// Version tag found in the stream
        found: u64,
        /// Highest version this build writes
        supported: u64,
    },

    /// Stream ended in the middle of a record
    #[error("Truncated stream while reading {context}")]
    Truncated {
        /// What was being decoded
        context: String,
    },

    /// Counters for a class disagree with its known structure
    #[error("Structural mismatch for class {class}: {message}")]
    StructuralMismatch {
        /// Class name
        class: String,
        /// Error message
        message: String,
    },

    /// Class is not part of the structural baseline
    #[error("Class {class} is not present in the structural baseline")]
    MissingClass {
        /// Class name
        class: String,
    },

    /// Class filter pattern failed to compile
    #[error("Invalid class pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Regex compiler message
        message: String,
    },

    /// Decimal threshold could not be parsed
    #[error("Invalid decimal value '{input}'")]
    InvalidDecimal {
        /// Offending input
        input: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CovError {
    /// Create a format error
    #[must_use]
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    /// Create a truncation error
    #[must_use]
    pub fn truncated(context: impl Into<String>) -> Self {
        Self::Truncated {
            context: context.into(),
        }
    }

    /// Create a structural mismatch error
    #[must_use]
    pub fn structural(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StructuralMismatch {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Create a missing class error
    #[must_use]
    pub fn missing_class(class: impl Into<String>) -> Self {
        Self::MissingClass {
            class: class.into(),
        }
    }

    /// True for errors that only affect a single class and leave the batch usable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StructuralMismatch { .. } | Self::MissingClass { .. }
        )
    }
}
