//! ECS task metadata for configuration templates.
//!
//! [`fetch`] requests the task metadata document from the ECS agent and
//! returns it as a [`DataMap`] keyed by [`DATA_KEY`], ready for
//! `Loader::data`. Templates can then walk it, e.g.
//! `{{ range $c := .ecsTaskMetadata.Containers }}{{ $c.Image }}{{ end }}`.
//!
//! Failed attempts are retried with exponential backoff and jitter; running
//! out of retries is an error, since configuration rendered without the
//! metadata is not usable.

mod error;
mod options;

use confmerge::DataMap;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

pub use error::{MetadataError, Result};
pub use options::{
    DEFAULT_INTERVAL, DEFAULT_JITTER_FACTOR, DEFAULT_MAX_INTERVAL, DEFAULT_MAX_RETRIES,
    DEFAULT_REQUEST_TIMEOUT, ENV_METADATA_URI, ENV_METADATA_URI_V4, MetadataOptions, V2_ENDPOINT,
};

/// Data context key the metadata document is stored under.
pub const DATA_KEY: &str = "ecsTaskMetadata";

/// Fetch the task metadata.
///
/// Returns an empty map when no endpoint is configured.
pub async fn fetch(options: &MetadataOptions) -> Result<DataMap> {
    let mut data = DataMap::new();
    let Some(endpoint) = options.endpoint() else {
        debug!("No ECS metadata endpoint configured, skipping fetch");
        return Ok(data);
    };
    let metadata = fetch_with_retry(options, endpoint).await?;
    data.insert(DATA_KEY.to_string(), metadata);
    Ok(data)
}

async fn fetch_with_retry(options: &MetadataOptions, endpoint: &str) -> Result<Value> {
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match fetch_once(options, endpoint).await {
            Ok(metadata) => {
                if attempt > 1 {
                    debug!(attempt, "ECS metadata fetched after retry");
                }
                return Ok(metadata);
            }
            Err(error) => {
                warn!(
                    attempt,
                    max_attempts = options.max_retries() + 1,
                    error = %error,
                    "Unable to get ECS metadata response"
                );
                if attempt > options.max_retries() {
                    warn!(attempts = attempt, "Max retries reached for ECS metadata");
                    return Err(MetadataError::MaxRetriesExceeded {
                        attempts: attempt,
                        last: Box::new(error),
                    });
                }
                let retry = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
                tokio::time::sleep(options.backoff_delay(retry)).await;
            }
        }
    }
}

async fn fetch_once(options: &MetadataOptions, endpoint: &str) -> Result<Value> {
    let response = options
        .client()
        .get(endpoint)
        .timeout(options.request_timeout())
        .send()
        .await
        .map_err(|source| MetadataError::Request {
            endpoint: endpoint.to_string(),
            source,
        })?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(MetadataError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }

    response.json::<Value>().await.map_err(MetadataError::Decode)
}
