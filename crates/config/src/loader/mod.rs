//! Configuration loader instances.
//!
//! Responsibilities:
//! - Own a function registry, data context, delimiters and the unknown-field
//!   flag per `Loader`, so independently configured loaders can coexist.
//! - Drive the read -> expand -> decode pipeline over an ordered list of
//!   sources (see `source.rs`).
//!
//! Does NOT handle:
//! - Template parsing or evaluation (see `template`).
//! - Format-specific decoding and overlay (see `decode`).
//! - Fetching external data; callers register it before loading.
//!
//! Invariants:
//! - Registration calls merge; later registrations of a name win.
//! - Each load works from one snapshot of the configuration taken at its
//!   start, so concurrent registration never affects an in-progress load.
//! - There is no process-wide default instance.

mod source;

#[cfg(test)]
mod tests;

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::decode::Format;
use crate::error::{ConfigError, Origin, Result};
use crate::funcs::{FuncError, FuncMap, builtins};

pub use source::Source;

/// Named values exposed to templates as the root context.
pub type DataMap = serde_json::Map<String, serde_json::Value>;

#[derive(Clone)]
pub(crate) struct LoaderState {
    pub(crate) funcs: FuncMap,
    pub(crate) data: DataMap,
    pub(crate) left: String,
    pub(crate) right: String,
    pub(crate) disallow_unknown_fields: bool,
}

impl Default for LoaderState {
    fn default() -> Self {
        Self {
            funcs: builtins(),
            data: DataMap::new(),
            left: String::new(),
            right: String::new(),
            disallow_unknown_fields: false,
        }
    }
}

/// A configuration loader with its own functions, data and delimiters.
///
/// Registration methods take `&self` and may be called from other threads
/// while loads are running.
///
/// Each source decodes over the serialized form of the target and replaces
/// it. Fields marked `#[serde(skip)]` never serialize, so they reset to their
/// `Default` on every source; keep runtime-only state outside the target.
pub struct Loader {
    state: Mutex<LoaderState>,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        let mut names: Vec<&String> = state.funcs.keys().collect();
        names.sort();
        f.debug_struct("Loader")
            .field("funcs", &names)
            .field("data", &state.data)
            .field("left", &state.left)
            .field("right", &state.right)
            .field("disallow_unknown_fields", &state.disallow_unknown_fields)
            .finish()
    }
}

impl Loader {
    /// Create a loader seeded with the built-in functions.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LoaderState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn snapshot(&self) -> LoaderState {
        self.lock().clone()
    }

    /// Merge `additions` into the function registry.
    pub fn funcs(&self, additions: FuncMap) -> &Self {
        self.lock().funcs.extend(additions);
        self
    }

    /// Register a single function.
    pub fn func<F>(&self, name: impl Into<String>, f: F) -> &Self
    where
        F: Fn(&[String]) -> std::result::Result<String, FuncError> + Send + Sync + 'static,
    {
        self.lock().funcs.insert(name.into(), Arc::new(f));
        self
    }

    /// Merge `additions` into the data context.
    pub fn data(&self, additions: DataMap) -> &Self {
        self.lock().data.extend(additions);
        self
    }

    /// Serialize `value` and store it in the data context under `name`.
    pub fn insert_data<T>(&self, name: impl Into<String>, value: &T) -> Result<&Self>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(value).map_err(|e| ConfigError::Encode {
            format: Format::Json,
            message: e.to_string(),
        })?;
        self.lock().data.insert(name.into(), value);
        Ok(self)
    }

    /// Set the template delimiters. An empty string selects the default for
    /// that side.
    pub fn delims(&self, left: impl Into<String>, right: impl Into<String>) -> &Self {
        let mut state = self.lock();
        state.left = left.into();
        state.right = right.into();
        self
    }

    /// Reject source fields that have no counterpart in the target.
    pub fn disallow_unknown_fields(&self, disallow: bool) -> &Self {
        self.lock().disallow_unknown_fields = disallow;
        self
    }

    /// Decode `sources` in order into `target`, expanding templates first
    /// when `expand` is set.
    ///
    /// Stops at the first failure; sources decoded before it stay applied.
    pub fn load_sources<T, I>(
        &self,
        target: &mut T,
        format: Format,
        expand: bool,
        sources: I,
    ) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator<Item = Source>,
    {
        let state = self.snapshot();
        for (index, src) in sources.into_iter().enumerate() {
            let (origin, bytes) = src.read(index)?;
            source::apply(&state, target, format, expand, &origin, &bytes)?;
        }
        Ok(())
    }

    fn load_paths<T, I>(&self, target: &mut T, format: Format, expand: bool, paths: I) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        self.load_sources(
            target,
            format,
            expand,
            paths.into_iter().map(|p| Source::Path(p.as_ref().to_path_buf())),
        )
    }

    fn load_buffer<T>(&self, target: &mut T, format: Format, expand: bool, src: &[u8]) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        let state = self.snapshot();
        source::apply(&state, target, format, expand, &Origin::Bytes(0), src)
    }

    /// Load YAML files without template expansion.
    pub fn load<T, I>(&self, target: &mut T, paths: I) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        self.load_paths(target, Format::Yaml, false, paths)
    }

    /// Load JSON files without template expansion.
    pub fn load_json<T, I>(&self, target: &mut T, paths: I) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        self.load_paths(target, Format::Json, false, paths)
    }

    /// Load TOML files without template expansion.
    pub fn load_toml<T, I>(&self, target: &mut T, paths: I) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        self.load_paths(target, Format::Toml, false, paths)
    }

    /// Load YAML files, expanding templates in each.
    pub fn load_with_env<T, I>(&self, target: &mut T, paths: I) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        self.load_paths(target, Format::Yaml, true, paths)
    }

    /// Load JSON files, expanding templates in each.
    pub fn load_with_env_json<T, I>(&self, target: &mut T, paths: I) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        self.load_paths(target, Format::Json, true, paths)
    }

    /// Load TOML files, expanding templates in each.
    pub fn load_with_env_toml<T, I>(&self, target: &mut T, paths: I) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator,
        I::Item: AsRef<Path>,
    {
        self.load_paths(target, Format::Toml, true, paths)
    }

    /// Decode one YAML buffer without template expansion.
    pub fn load_bytes<T>(&self, target: &mut T, src: &[u8]) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.load_buffer(target, Format::Yaml, false, src)
    }

    /// Decode one JSON buffer without template expansion.
    pub fn load_json_bytes<T>(&self, target: &mut T, src: &[u8]) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.load_buffer(target, Format::Json, false, src)
    }

    /// Decode one TOML buffer without template expansion.
    pub fn load_toml_bytes<T>(&self, target: &mut T, src: &[u8]) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.load_buffer(target, Format::Toml, false, src)
    }

    /// Decode one YAML buffer, expanding templates first.
    pub fn load_with_env_bytes<T>(&self, target: &mut T, src: &[u8]) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.load_buffer(target, Format::Yaml, true, src)
    }

    /// Decode one JSON buffer, expanding templates first.
    pub fn load_with_env_json_bytes<T>(&self, target: &mut T, src: &[u8]) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.load_buffer(target, Format::Json, true, src)
    }

    /// Decode one TOML buffer, expanding templates first.
    pub fn load_with_env_toml_bytes<T>(&self, target: &mut T, src: &[u8]) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
    {
        self.load_buffer(target, Format::Toml, true, src)
    }

    /// Read `path` and return its template-expanded contents.
    pub fn read_with_env(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let source = Source::Path(path.as_ref().to_path_buf());
        let (origin, bytes) = source.read(0)?;
        source::expand(&self.snapshot(), &origin, &bytes)
    }

    /// Return the template-expanded form of `src`.
    pub fn read_with_env_bytes(&self, src: &[u8]) -> Result<Vec<u8>> {
        source::expand(&self.snapshot(), &Origin::Bytes(0), src)
    }
}
