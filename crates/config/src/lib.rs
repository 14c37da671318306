//! Configuration loading with template expansion and sequential overlay.
//!
//! A [`Loader`] reads YAML, JSON or TOML sources in order, optionally expands
//! `{{ ... }}` template actions in each (environment lookups, registered
//! functions, a data context), and decodes every source on top of the same
//! target so later sources override earlier ones.
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Default, Serialize, Deserialize)]
//! struct Conf {
//!     #[serde(default)]
//!     domain: String,
//!     #[serde(default)]
//!     is_dev: bool,
//! }
//!
//! let loader = confmerge::Loader::new();
//! let mut conf = Conf::default();
//! loader.load_with_env(&mut conf, ["config.yml", "config_local.yml"])?;
//! # Ok::<(), confmerge::ConfigError>(())
//! ```

pub mod decode;
pub mod duration;
pub mod error;
pub mod funcs;
mod loader;
pub mod template;

pub use decode::{DecodeError, Format, marshal_json, marshal_yaml};
pub use error::{ConfigError, ErrorKind, Origin, Result};
pub use funcs::{FuncError, FuncMap, TemplateFn, func};
pub use loader::{DataMap, Loader, Source};
