//! Error types for form schema compilation and validation.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or compiling a form schema.
///
/// These are authoring errors: compilation stops at the first one.
#[derive(Debug, Error)]
pub enum CompileError {
    // IO errors (exit code 3)
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[cfg(feature = "remote")]
    #[error("failed to fetch {url}: {source}")]
    NetworkError {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    // Parse errors (exit code 2)
    #[error("invalid JSON: {source}")]
    InvalidJson {
        #[source]
        source: serde_json::Error,
    },

    // Schema errors (exit code 2)
    #[error("invalid schema at {path}: {message}")]
    InvalidSchema { path: String, message: String },

    #[error("unknown constraint kind \"{kind}\" on field {key}")]
    UnknownConstraintKind { key: String, kind: String },

    #[error("invalid \"{kind}\" constraint on field {key}: {message}")]
    InvalidConstraint {
        key: String,
        kind: String,
        message: String,
    },
}

impl CompileError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::FileNotFound { .. } | CompileError::ReadError { .. } => 3,
            #[cfg(feature = "remote")]
            CompileError::NetworkError { .. } => 3,
            _ => 2,
        }
    }

    pub(crate) fn invalid_schema(path: impl Into<String>, message: impl Into<String>) -> Self {
        CompileError::InvalidSchema {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Errors during validation.
#[derive(Debug, Error)]
pub enum ValidateError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("validation failed with {} error(s)", errors.len())]
    Invalid { errors: Vec<FieldError> },
}

impl ValidateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ValidateError::Compile(e) => e.exit_code(),
            ValidateError::Invalid { .. } => 1,
        }
    }

    /// Field errors when the data was rejected, empty for compile failures.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ValidateError::Invalid { errors } => errors,
            ValidateError::Compile(_) => &[],
        }
    }
}

/// Category of a data error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Value does not match the declared base type and could not be coerced.
    TypeMismatch,
    /// A constraint's check failed.
    ConstraintViolation,
}

/// Single validation error with path context.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct FieldError {
    /// Dotted/bracketed path to the invalid field, e.g. `users[0].value.name`.
    pub path: String,
    /// Message configured on the failing constraint or type.
    pub message: String,
    pub kind: ErrorKind,
}

impl FieldError {
    pub(crate) fn type_mismatch(path: &str, message: &str) -> Self {
        Self {
            path: path.to_string(),
            message: message.to_string(),
            kind: ErrorKind::TypeMismatch,
        }
    }

    pub(crate) fn violation(path: &str, message: &str) -> Self {
        Self {
            path: path.to_string(),
            message: message.to_string(),
            kind: ErrorKind::ConstraintViolation,
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}
