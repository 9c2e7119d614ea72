//! Error types for the tiling core.
//!
//! This module defines all error types used throughout the crate,
//! organized by the layer that produces them, plus the [`Diagnostic`]
//! type used for warnings that travel alongside a successful result.

use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum TileError {
    /// Error inside the set-algebra facade
    #[error("Set error: {0}")]
    Set(#[from] SetError),

    /// Error during a schedule transformation
    #[error("Transformation error: {0}")]
    Transform(#[from] TransformError),

    /// Malformed or unsupported SCoP description
    #[error("SCoP error: {0}")]
    Scop(#[from] ScopError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// JSON (de)serialization failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error raised by set and relation operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SetError {
    /// The error message
    pub message: String,
    /// The kind of set error
    pub kind: SetErrorKind,
}

/// Kinds of [`SetError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetErrorKind {
    /// A dimension has no finite bound, so the set cannot be enumerated
    Unbounded,
    /// Enumeration would exceed the point limit
    TooLarge,
    /// Operands live in incompatible spaces
    SpaceMismatch,
    /// A point was requested from an empty set
    Empty,
}

impl SetError {
    /// Create a new set error.
    pub fn new(kind: SetErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

/// Error during a schedule transformation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} in {transform}")]
pub struct TransformError {
    /// The error message
    pub message: String,
    /// The kind of transformation error
    pub kind: TransformErrorKind,
    /// The transformation that failed
    pub transform: String,
}

/// Kinds of [`TransformError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformErrorKind {
    /// Node is not a band, a path is dangling, or a required input is missing
    MalformedInput,
    /// The dependence or parameter pattern is outside what the algorithm handles
    UnsupportedPattern,
    /// Tile sizes missing or not strictly positive
    InvalidTileSize,
    /// Transformation not applicable
    NotApplicable,
}

impl TransformError {
    /// Create a new transformation error.
    pub fn new(
        kind: TransformErrorKind,
        transform: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            kind,
            transform: transform.into(),
        }
    }

    /// Shorthand for [`TransformErrorKind::MalformedInput`].
    pub fn malformed(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransformErrorKind::MalformedInput, transform, message)
    }

    /// Shorthand for [`TransformErrorKind::UnsupportedPattern`].
    pub fn unsupported(transform: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(TransformErrorKind::UnsupportedPattern, transform, message)
    }
}

/// Error in a SCoP description.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ScopError {
    /// The error message
    pub message: String,
    /// The kind of SCoP error
    pub kind: ScopErrorKind,
}

/// Kinds of [`ScopError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopErrorKind {
    /// A statement uses parameters that are not a prefix of the SCoP parameters
    NonContiguousParams,
    /// Dimensions of a domain, schedule or dependence do not line up
    DimensionMismatch,
    /// A name refers to no statement
    UnknownStatement,
    /// A statement has no schedule
    MissingSchedule,
    /// Parameter value missing
    UnboundParameter,
}

impl ScopError {
    /// Create a new SCoP error.
    pub fn new(kind: ScopErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

/// Invalid tiling configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (field `{field}`)")]
pub struct ConfigError {
    /// The error message
    pub message: String,
    /// Offending field
    pub field: String,
}

impl ConfigError {
    /// Create a new configuration error.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { message: message.into(), field: field.into() }
    }
}

/// A diagnostic message with severity level.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: DiagnosticSeverity,
    /// Message
    pub message: String,
    /// Additional notes
    pub notes: Vec<String>,
    /// Suggested fix (if any)
    pub suggestion: Option<String>,
}

/// Severity of a [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum DiagnosticSeverity {
    /// Error - the requested strategy could not be applied
    Error,
    /// Warning - the result is usable but may be degraded
    Warning,
    /// Note - informational message
    Note,
    /// Help - suggestion for fixing the issue
    Help,
}

impl Diagnostic {
    fn with_severity(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            notes: Vec::new(),
            suggestion: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Warning, message)
    }

    /// Create a new note.
    pub fn note(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Note, message)
    }

    /// Add a note to the diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Add a suggestion to the diagnostic.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// True for warnings and errors.
    pub fn is_problem(&self) -> bool {
        self.severity <= DiagnosticSeverity::Warning
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Note => "note",
            DiagnosticSeverity::Help => "help",
        };
        write!(f, "{}: {}", label, self.message)?;
        for note in &self.notes {
            write!(f, "\n  = note: {}", note)?;
        }
        if let Some(ref s) = self.suggestion {
            write!(f, "\n  = help: {}", s)?;
        }
        Ok(())
    }
}

/// Result type using TileError.
pub type TileResult<T> = Result<T, TileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransformError::unsupported("split_tile", "space coefficient 2 != 1");
        let s = format!("{}", err);
        assert!(s.contains("space coefficient"));
        assert!(s.contains("split_tile"));

        let top: TileError = err.into();
        assert!(format!("{}", top).starts_with("Transformation error"));
    }

    #[test]
    fn test_diagnostic_builder() {
        let d = Diagnostic::warning("transitive closure is inexact")
            .with_note("halo soundness checked for 4 steps only")
            .with_suggestion("raise closure_limit");
        assert!(d.is_problem());
        let s = d.to_string();
        assert!(s.starts_with("warning: transitive closure"));
        assert!(s.contains("= help: raise closure_limit"));
        assert!(!Diagnostic::note("fyi").is_problem());
    }
}
