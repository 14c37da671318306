//! Error types for state loading and lookups.

use thiserror::Error;

/// Result type alias for tfstate operations.
pub type Result<T> = std::result::Result<T, TfstateError>;

/// Errors that can occur while loading or querying a state file.
#[derive(Error, Debug)]
pub enum TfstateError {
    #[error("failed to read tfstate {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse tfstate: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported tfstate version {0}, only version 4 is supported")]
    UnsupportedVersion(u64),

    #[error("invalid tfstate location {location}: {message}")]
    InvalidLocation { location: String, message: String },

    #[error("unsupported tfstate URL scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("invalid address {address:?}: {message}")]
    InvalidAddress { address: String, message: String },
}
