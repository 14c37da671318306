//! Per-source pipeline: read, expand, decode.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::borrow::Cow;
use std::path::PathBuf;
use tracing::debug;

use super::LoaderState;
use crate::decode::{Format, decode_into};
use crate::error::{ConfigError, Origin, Result};
use crate::template;

/// One configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// A file read from disk when its turn comes.
    Path(PathBuf),
    /// An in-memory buffer.
    Bytes(Vec<u8>),
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&std::path::Path> for Source {
    fn from(path: &std::path::Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl Source {
    /// Fetch the raw contents. `index` is the source's position in its list
    /// and names in-memory buffers in errors.
    pub(crate) fn read(&self, index: usize) -> Result<(Origin, Cow<'_, [u8]>)> {
        match self {
            Source::Path(path) => {
                let origin = Origin::Path(path.clone());
                match std::fs::read(path) {
                    Ok(bytes) => Ok((origin, Cow::Owned(bytes))),
                    Err(source) => Err(ConfigError::SourceRead { origin, source }),
                }
            }
            Source::Bytes(bytes) => Ok((Origin::Bytes(index), Cow::Borrowed(bytes.as_slice()))),
        }
    }
}

pub(crate) fn expand(state: &LoaderState, origin: &Origin, src: &[u8]) -> Result<Vec<u8>> {
    let data = Value::Object(state.data.clone());
    template::expand(src, &state.left, &state.right, &state.funcs, &data)
        .map_err(|e| ConfigError::from_template(origin.clone(), e))
}

pub(crate) fn apply<T>(
    state: &LoaderState,
    target: &mut T,
    format: Format,
    expand_templates: bool,
    origin: &Origin,
    src: &[u8],
) -> Result<()>
where
    T: Serialize + DeserializeOwned,
{
    debug!(
        origin = %origin,
        format = %format,
        expand = expand_templates,
        bytes = src.len(),
        "Loading configuration source"
    );

    let expanded;
    let body = if expand_templates {
        expanded = expand(state, origin, src)?;
        expanded.as_slice()
    } else {
        src
    };

    decode_into(format, body, target, state.disallow_unknown_fields).map_err(|source| {
        ConfigError::Decode {
            origin: origin.clone(),
            format,
            source,
        }
    })
}
