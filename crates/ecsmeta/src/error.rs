//! Error types for metadata fetching.

use thiserror::Error;

/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, MetadataError>;

/// Errors that can occur while fetching task metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    /// The request could not be sent or no response arrived.
    #[error("unable to get response from {endpoint}: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint answered with something other than 200 OK.
    #[error("incorrect status code {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    /// The response body was not JSON.
    #[error("unable to decode response body: {0}")]
    Decode(#[source] reqwest::Error),

    /// Every attempt failed.
    #[error("max retries reached after {attempts} attempts: {last}")]
    MaxRetriesExceeded {
        attempts: usize,
        #[source]
        last: Box<MetadataError>,
    },
}

impl MetadataError {
    /// Whether another attempt may succeed.
    ///
    /// The metadata agent can come up after the task starts, so every single
    /// request failure qualifies; only exhaustion is final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::MaxRetriesExceeded { .. })
    }
}
