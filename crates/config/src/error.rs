//! Error types for configuration loading.
//!
//! Responsibilities:
//! - Define the error variants for every stage of a load (read, expand, decode).
//! - Tag each failure with the `Origin` of the source that produced it.
//! - Keep the "required variable missing" condition distinguishable from
//!   ordinary template execution failures.
//!
//! Does NOT handle:
//! - Errors raised by data-source collaborators before a load starts
//!   (those crates define their own error types).
//!
//! Invariants:
//! - `ConfigError::kind()` maps 1:1 onto the variant, so callers can match on
//!   the kind without destructuring.
//! - A `TemplateError::RequiredVariableMissing` always becomes
//!   `ConfigError::RequiredVariableMissing`, never `TemplateExecution`.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::decode::{DecodeError, Format};
use crate::template::TemplateError;

/// Result type alias for loader operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Identifies the source a failure came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A file read from disk.
    Path(PathBuf),
    /// An in-memory buffer, by its position in the source list.
    Bytes(usize),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Path(path) => write!(f, "{}", path.display()),
            Origin::Bytes(index) => write!(f, "<bytes #{index}>"),
        }
    }
}

/// Coarse classification of a [`ConfigError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceRead,
    TemplateParse,
    TemplateExecution,
    RequiredVariableMissing,
    Decode,
    Encode,
}

/// Errors that can occur while loading or marshaling configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{origin} read failed: {source}")]
    SourceRead {
        origin: Origin,
        #[source]
        source: std::io::Error,
    },

    #[error("{origin} load failed: template parse error at line {line}: {message}")]
    TemplateParse {
        origin: Origin,
        line: usize,
        message: String,
    },

    #[error("{origin} load failed: template execution error at line {line}: {message}")]
    TemplateExecution {
        origin: Origin,
        line: usize,
        message: String,
    },

    /// Raised by `must_env` (or any function returning
    /// `FuncError::RequiredVariableMissing`) when the variable is undefined.
    #[error("{origin} load failed: must_env: environment variable {name} is not defined")]
    RequiredVariableMissing { origin: Origin, name: String },

    #[error("{origin} load failed: {format} decode error: {source}")]
    Decode {
        origin: Origin,
        format: Format,
        #[source]
        source: DecodeError,
    },

    #[error("{format} encode failed: {message}")]
    Encode { format: Format, message: String },
}

impl ConfigError {
    pub(crate) fn from_template(origin: Origin, error: TemplateError) -> Self {
        match error {
            TemplateError::Parse { line, message } => ConfigError::TemplateParse {
                origin,
                line,
                message,
            },
            TemplateError::Execution { line, message } => ConfigError::TemplateExecution {
                origin,
                line,
                message,
            },
            TemplateError::RequiredVariableMissing { name } => {
                ConfigError::RequiredVariableMissing { origin, name }
            }
        }
    }

    /// The stage that failed.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::SourceRead { .. } => ErrorKind::SourceRead,
            ConfigError::TemplateParse { .. } => ErrorKind::TemplateParse,
            ConfigError::TemplateExecution { .. } => ErrorKind::TemplateExecution,
            ConfigError::RequiredVariableMissing { .. } => ErrorKind::RequiredVariableMissing,
            ConfigError::Decode { .. } => ErrorKind::Decode,
            ConfigError::Encode { .. } => ErrorKind::Encode,
        }
    }

    /// The source that failed, if the error came from a load.
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            ConfigError::SourceRead { origin, .. }
            | ConfigError::TemplateParse { origin, .. }
            | ConfigError::TemplateExecution { origin, .. }
            | ConfigError::RequiredVariableMissing { origin, .. }
            | ConfigError::Decode { origin, .. } => Some(origin),
            ConfigError::Encode { .. } => None,
        }
    }

    pub fn is_required_variable_missing(&self) -> bool {
        self.kind() == ErrorKind::RequiredVariableMissing
    }
}
