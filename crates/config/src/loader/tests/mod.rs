//! Tests for `Loader`.
//!
//! Invariants:
//! - Tests that touch environment variables are `#[serial]` and scope their
//!   changes with `temp_env`.
//! - Files live in a `tempfile::TempDir` that is removed on drop.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

mod overlay_tests;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct DbConfig {
    #[serde(default)]
    pub master: String,
    #[serde(default)]
    pub slave: String,
    #[serde(default, with = "crate::duration")]
    pub timeout: Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub(super) struct Conf {
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub is_dev: bool,
    #[serde(default, with = "crate::duration")]
    pub timeout: Duration,
    #[serde(default)]
    pub db: DbConfig,
}

/// Write `contents` to `name` inside `dir` and return the path.
pub(super) fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write config file");
    path
}
