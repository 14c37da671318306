//! merge-env-config - merge configuration files and print the result.
//!
//! Responsibilities:
//! - Parse arguments, set up logging and build a `Loader`.
//! - Register optional data sources (Terraform state, ECS task metadata).
//! - Load the files in order with template expansion and print the merged
//!   document as YAML or JSON.
//!
//! Does NOT handle:
//! - Template expansion or merging (see the `confmerge` crate).
//!
//! Invariants:
//! - Logs go to stderr; stdout carries only the merged document.
//! - Any failure prints the error to stderr and exits with status 1 without
//!   writing partial output.

mod args;

use anyhow::Result;
use args::{Cli, normalize_args};
use clap::{CommandFactory, Parser};
use confmerge::{Loader, marshal_json, marshal_yaml};
use confmerge_ecsmeta::MetadataOptions;
use serde_json::Value;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse_from(normalize_args(std::env::args_os()));

    if cli.files.is_empty() {
        eprintln!("{}", Cli::command().render_help());
        return ExitCode::FAILURE;
    }

    let output = match run(&cli).await {
        Ok(output) => output,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout().lock();
    if let Err(e) = stdout.write_all(&output).and_then(|()| stdout.flush()) {
        eprintln!("failed to write output: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run(cli: &Cli) -> Result<Vec<u8>> {
    let loader = Loader::new();

    if let Some(location) = &cli.tfstate {
        tracing::debug!(location = %location, "Registering tfstate lookups");
        loader.funcs(confmerge_tfstate::load(location)?);
    }

    if cli.ecs_metadata {
        let options = MetadataOptions::from_env();
        tracing::debug!(endpoint = ?options.endpoint(), "Fetching ECS task metadata");
        loader.data(confmerge_ecsmeta::fetch(&options).await?);
    }

    let mut merged = Value::Object(serde_json::Map::new());
    let output = if cli.json {
        loader.load_with_env_json(&mut merged, &cli.files)?;
        let mut out = marshal_json(&merged)?;
        out.push(b'\n');
        out
    } else {
        loader.load_with_env(&mut merged, &cli.files)?;
        marshal_yaml(&merged)?
    };
    Ok(output)
}
