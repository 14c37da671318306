//! Terraform state lookups for configuration templates.
//!
//! Responsibilities:
//! - Load a version 4 state file from a path or `file://` URL.
//! - Provide a `tfstate` template function resolving resource addresses.
//!
//! Does NOT handle:
//! - Remote state backends (S3, GCS, HTTP).
//! - Legacy state formats before version 4.
//!
//! Invariants:
//! - String values render as-is; anything else renders as compact JSON.
//! - A missing or `null` value follows the configured [`MissingPolicy`].

pub mod address;
mod error;
mod state;

use confmerge::{FuncError, FuncMap, func};
use serde_json::Value;
use std::sync::Arc;

pub use error::{Result, TfstateError};
pub use state::TfState;

/// Name the lookup function is registered under.
pub const FUNC_NAME: &str = "tfstate";

/// What `tfstate` does with an address it cannot resolve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingPolicy {
    /// Fail the template expansion.
    #[default]
    Fail,
    /// Render an empty string.
    Empty,
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build the function map for an already loaded state.
pub fn funcs(state: Arc<TfState>, policy: MissingPolicy) -> FuncMap {
    let lookup = func(move |args| {
        let [address] = args else {
            return Err(FuncError::Failed(format!(
                "wrong number of args for {FUNC_NAME}: want 1 got {}",
                args.len()
            )));
        };
        match state.lookup(address) {
            Ok(Some(value)) => Ok(render(&value)),
            Ok(None) if policy == MissingPolicy::Empty => Ok(String::new()),
            Ok(None) => Err(FuncError::Failed(format!("{address} is not found in tfstate"))),
            Err(_) if policy == MissingPolicy::Empty => Ok(String::new()),
            Err(e) => Err(FuncError::Failed(e.to_string())),
        }
    });
    FuncMap::from([(FUNC_NAME.to_string(), lookup)])
}

/// Read the state at `location` and build its function map with the default
/// policy.
pub fn load(location: &str) -> Result<FuncMap> {
    load_with_policy(location, MissingPolicy::default())
}

pub fn load_with_policy(location: &str, policy: MissingPolicy) -> Result<FuncMap> {
    let state = TfState::read(location)?;
    Ok(funcs(Arc::new(state), policy))
}
