//! Shared test utilities for merge-env-config integration tests.
//!
//! Invariants / Assumptions:
//! - Commands never inherit ECS metadata endpoints or `RUST_LOG` from the host.

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::TempDir;

/// Returns a hermetic `merge-env-config` command.
pub fn merge_cmd() -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("merge-env-config");
    cmd.env_remove("ECS_CONTAINER_METADATA_URI")
        .env_remove("ECS_CONTAINER_METADATA_URI_V4")
        .env_remove("RUST_LOG");
    cmd
}

/// Write `contents` to `name` inside `dir` and return the path.
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write test file");
    path
}
