//! Decoder dispatch and decoding of a source on top of a target value.
//!
//! Responsibilities:
//! - Check that expanded bytes are well-formed YAML, JSON or TOML.
//! - Decode the source over the target's current state (see `merge.rs`).
//! - Enforce the optional unknown-field policy.
//! - Marshal values back to YAML or indented JSON.
//!
//! Does NOT handle:
//! - Reading sources or template expansion (see `loader`).
//!
//! Invariants:
//! - Struct fields merge one by one; map entries and everything else named
//!   by the source are replaced.
//! - An empty or `null` document leaves the target untouched.
//! - The target is only assigned after the whole source decoded cleanly.
//! - The target is rebuilt from its serialized form, so fields marked
//!   `#[serde(skip)]` are reset to their default by every source.

mod merge;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::error::{ConfigError, Result};
use merge::{Merging, Unknown};

/// Serialization format of a configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Yaml,
    Json,
    Toml,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Yaml => write!(f, "yaml"),
            Format::Json => write!(f, "json"),
            Format::Toml => write!(f, "toml"),
        }
    }
}

/// Errors raised while decoding a source into the target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The source is not well-formed in its format.
    #[error("{0}")]
    Syntax(String),

    /// The source does not fit the target's shape.
    #[error("{0}")]
    Shape(String),

    /// The source names a field the target does not have.
    #[error("unknown field {0:?}")]
    UnknownField(String),
}

/// Parse `bytes` into a generic document.
pub fn parse_document(format: Format, bytes: &[u8]) -> std::result::Result<Value, DecodeError> {
    match format {
        Format::Yaml => {
            serde_yaml::from_slice(bytes).map_err(|e| DecodeError::Syntax(e.to_string()))
        }
        Format::Json => {
            serde_json::from_slice(bytes).map_err(|e| DecodeError::Syntax(e.to_string()))
        }
        Format::Toml => {
            let text =
                std::str::from_utf8(bytes).map_err(|e| DecodeError::Syntax(e.to_string()))?;
            toml::from_str(text).map_err(|e| DecodeError::Syntax(e.to_string()))
        }
    }
}

/// Decode `bytes` on top of `target`.
pub fn decode_into<T>(
    format: Format,
    bytes: &[u8],
    target: &mut T,
    disallow_unknown_fields: bool,
) -> std::result::Result<(), DecodeError>
where
    T: Serialize + DeserializeOwned,
{
    if parse_document(format, bytes)?.is_null() {
        return Ok(());
    }
    let base = serde_json::to_value(&*target)
        .map_err(|e| DecodeError::Shape(format!("target is not representable: {e}")))?;

    let unknown = Unknown::default();
    let next: T = merge_decode(format, bytes, base, &unknown).map_err(DecodeError::Shape)?;

    if disallow_unknown_fields && let Some(field) = unknown.into_inner().into_iter().next() {
        return Err(DecodeError::UnknownField(field));
    }

    *target = next;
    Ok(())
}

fn merge_decode<T>(
    format: Format,
    bytes: &[u8],
    base: Value,
    unknown: &Unknown,
) -> std::result::Result<T, String>
where
    T: DeserializeOwned,
{
    match format {
        Format::Yaml => {
            let de = serde_yaml::Deserializer::from_slice(bytes);
            T::deserialize(Merging::root(de, base, unknown)).map_err(|e| e.to_string())
        }
        Format::Json => {
            let mut de = serde_json::Deserializer::from_slice(bytes);
            let value = T::deserialize(Merging::root(&mut de, base, unknown))
                .map_err(|e| e.to_string())?;
            de.end().map_err(|e| e.to_string())?;
            Ok(value)
        }
        Format::Toml => {
            let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            let de = toml::Deserializer::parse(text).map_err(|e| e.to_string())?;
            T::deserialize(Merging::root(de, base, unknown)).map_err(|e| e.to_string())
        }
    }
}

/// Serialize `value` as a YAML document.
pub fn marshal_yaml<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_yaml::to_string(value)
        .map(String::into_bytes)
        .map_err(|e| ConfigError::Encode {
            format: Format::Yaml,
            message: e.to_string(),
        })
}

/// Serialize `value` as JSON indented by two spaces.
pub fn marshal_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| ConfigError::Encode {
        format: Format::Json,
        message: e.to_string(),
    })
}
