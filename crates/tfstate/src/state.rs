//! State file model and lookups.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing::debug;
use url::Url;

use crate::address::{self, InstanceKey, Step, Target};
use crate::error::{Result, TfstateError};

const SUPPORTED_VERSION: u64 = 4;

#[derive(Debug, Clone, Deserialize)]
struct StateFile {
    version: u64,
    #[serde(default)]
    outputs: Map<String, Value>,
    #[serde(default)]
    resources: Vec<Resource>,
}

#[derive(Debug, Clone, Deserialize)]
struct Resource {
    #[serde(default)]
    module: Option<String>,
    mode: String,
    #[serde(rename = "type")]
    kind: String,
    name: String,
    #[serde(default)]
    instances: Vec<Instance>,
}

#[derive(Debug, Clone, Deserialize)]
struct Instance {
    #[serde(default)]
    index_key: Option<Value>,
    #[serde(default)]
    attributes: Value,
}

impl Instance {
    fn matches(&self, key: &InstanceKey) -> bool {
        match (key, &self.index_key) {
            (InstanceKey::Index(n), Some(Value::Number(k))) => k.as_u64() == Some(*n),
            (InstanceKey::Key(s), Some(Value::String(k))) => k == s,
            _ => false,
        }
    }
}

/// A loaded Terraform state (format version 4).
#[derive(Debug, Clone)]
pub struct TfState {
    state: StateFile,
}

/// Resolve a plain path or `file://` URL to a filesystem path.
fn resolve_location(location: &str) -> Result<PathBuf> {
    if !location.contains("://") {
        return Ok(PathBuf::from(location));
    }
    // `file://./relative/path` names a path relative to the working directory.
    if let Some(rest) = location.strip_prefix("file://")
        && !rest.starts_with('/')
    {
        return Ok(PathBuf::from(rest));
    }
    let url = Url::parse(location).map_err(|e| TfstateError::InvalidLocation {
        location: location.to_string(),
        message: e.to_string(),
    })?;
    if url.scheme() != "file" {
        return Err(TfstateError::UnsupportedScheme(url.scheme().to_string()));
    }
    url.to_file_path().map_err(|()| TfstateError::InvalidLocation {
        location: location.to_string(),
        message: "not a local file path".to_string(),
    })
}

impl TfState {
    /// Parse state from JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let state: StateFile = serde_json::from_slice(bytes)?;
        if state.version != SUPPORTED_VERSION {
            return Err(TfstateError::UnsupportedVersion(state.version));
        }
        Ok(Self { state })
    }

    /// Read state from a plain path or a `file://` URL.
    pub fn read(location: &str) -> Result<Self> {
        let path = resolve_location(location)?;
        debug!(location, path = %path.display(), "Reading tfstate");
        let bytes = std::fs::read(&path).map_err(|source| TfstateError::Read {
            location: location.to_string(),
            source,
        })?;
        Self::from_slice(&bytes)
    }

    /// Look up `address`. `Ok(None)` means the address is well formed but
    /// nothing (or only `null`) is stored there.
    pub fn lookup(&self, address: &str) -> Result<Option<Value>> {
        let parsed = address::parse(address)?;
        let root = match &parsed.target {
            Target::Output(name) => self
                .state
                .outputs
                .get(name)
                .and_then(|output| output.get("value"))
                .cloned(),
            Target::Resource {
                module,
                data,
                kind,
                name,
                key,
            } => {
                let mode = if *data { "data" } else { "managed" };
                self.state
                    .resources
                    .iter()
                    .find(|r| {
                        r.module.as_deref() == module.as_deref()
                            && r.mode == mode
                            && &r.kind == kind
                            && &r.name == name
                    })
                    .and_then(|resource| select_instance(resource, key.as_ref()))
            }
        };
        let found = root.and_then(|value| walk(value, &parsed.path));
        debug!(address, found = found.is_some(), "tfstate lookup");
        Ok(found.filter(|value| !value.is_null()))
    }
}

/// Attributes of the addressed instance. Without a key, a single unkeyed
/// instance yields its attributes; counted instances yield an array and
/// `for_each` instances an object keyed by instance key.
fn select_instance(resource: &Resource, key: Option<&InstanceKey>) -> Option<Value> {
    if let Some(key) = key {
        return resource
            .instances
            .iter()
            .find(|instance| instance.matches(key))
            .map(|instance| instance.attributes.clone());
    }
    match resource.instances.as_slice() {
        [] => None,
        [only] if only.index_key.is_none() => Some(only.attributes.clone()),
        instances => {
            if instances
                .iter()
                .all(|i| matches!(i.index_key, Some(Value::String(_))))
            {
                let map = instances
                    .iter()
                    .filter_map(|i| match &i.index_key {
                        Some(Value::String(k)) => Some((k.clone(), i.attributes.clone())),
                        _ => None,
                    })
                    .collect();
                Some(Value::Object(map))
            } else {
                Some(Value::Array(
                    instances.iter().map(|i| i.attributes.clone()).collect(),
                ))
            }
        }
    }
}

fn walk(value: Value, path: &[Step]) -> Option<Value> {
    let mut current = value;
    for step in path {
        current = match (step, current) {
            (Step::Key(key) | Step::IndexKey(key), Value::Object(mut map)) => map.remove(key)?,
            (Step::Index(n), Value::Array(mut items)) => {
                let n = usize::try_from(*n).ok()?;
                if n >= items.len() {
                    return None;
                }
                items.swap_remove(n)
            }
            _ => return None,
        };
    }
    Some(current)
}
