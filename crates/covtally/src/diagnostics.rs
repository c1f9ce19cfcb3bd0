//! Best-effort diagnostic sink.
//!
//! Code that runs inside a measured process must never propagate failures
//! into it. Such failures are classified by [`Severity`] and [`DiagnosticKind`],
//! filtered against a threshold, forwarded to `tracing`, and kept in a log the
//! embedding tool can inspect after the fact.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Severity of a diagnostic, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Internal detail, off by default
    Debug,
    /// Informational
    Info,
    /// Data was skipped but processing continued
    #[default]
    Warn,
    /// An operation failed and produced a partial result
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// Wrong magic or version
    Format,
    /// Counters incompatible with the known class structure
    StructuralMismatch,
    /// Class absent from the structural baseline
    MissingClass,
    /// File or stream failure
    Io,
    /// Newer stream data that this build skipped
    SkippedData,
}

impl DiagnosticKind {
    /// Default severity for this kind of problem
    #[must_use]
    pub const fn default_severity(self) -> Severity {
        match self {
            Self::Format | Self::Io => Severity::Error,
            Self::StructuralMismatch | Self::MissingClass => Severity::Warn,
            Self::SkippedData => Severity::Debug,
        }
    }
}

/// A single recorded diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity
    pub severity: Severity,
    /// Classification
    pub kind: DiagnosticKind,
    /// Human-readable description
    pub message: String,
}

/// Collects diagnostics at or above a threshold
#[derive(Debug)]
pub struct DiagnosticSink {
    threshold: Severity,
    records: Mutex<Vec<Diagnostic>>,
}

impl DiagnosticSink {
    /// Create a sink that keeps diagnostics at or above `threshold`
    #[must_use]
    pub fn new(threshold: Severity) -> Self {
        Self {
            threshold,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Current threshold
    #[must_use]
    pub fn threshold(&self) -> Severity {
        self.threshold
    }

    /// Report a diagnostic with the kind's default severity
    pub fn report(&self, kind: DiagnosticKind, message: impl Into<String>) {
        self.report_with(kind.default_severity(), kind, message);
    }

    /// Report a diagnostic with an explicit severity
    pub fn report_with(&self, severity: Severity, kind: DiagnosticKind, message: impl Into<String>) {
        if severity < self.threshold {
            return;
        }
        let message = message.into();
        match severity {
            Severity::Debug => tracing::debug!(?kind, "{message}"),
            Severity::Info => tracing::info!(?kind, "{message}"),
            Severity::Warn => tracing::warn!(?kind, "{message}"),
            Severity::Error => tracing::error!(?kind, "{message}"),
        }
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Diagnostic {
                severity,
                kind,
                message,
            });
    }

    /// Report a recoverable error using its own classification
    pub fn report_error(&self, err: &crate::CovError) {
        let kind = match err {
            crate::CovError::StructuralMismatch { .. } => DiagnosticKind::StructuralMismatch,
            crate::CovError::MissingClass { .. } => DiagnosticKind::MissingClass,
            crate::CovError::Io(_) => DiagnosticKind::Io,
            _ => DiagnosticKind::Format,
        };
        self.report(kind, err.to_string());
    }

    /// Snapshot of all kept diagnostics
    #[must_use]
    pub fn records(&self) -> Vec<Diagnostic> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of kept diagnostics of the given kind
    #[must_use]
    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.kind == kind)
            .count()
    }

    /// True if nothing was kept
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Drop all kept diagnostics
    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for DiagnosticSink {
    fn default() -> Self {
        Self::new(Severity::default())
    }
}
