//! CLI argument definitions and parsing.
//!
//! Responsibilities:
//! - Define the CLI structure using clap derive macros.
//! - Accept single-dash long flags (`-json`, `-version`) as aliases.
//!
//! Non-responsibilities:
//! - Does not load or print configuration (see `main.rs`).

use clap::{ArgAction, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// Long flags that may also be spelled with a single dash.
const SINGLE_DASH_LONG_FLAGS: &[&str] = &["json", "version", "tfstate", "ecs-metadata"];

#[derive(Parser, Debug)]
#[command(name = "merge-env-config")]
#[command(
    about = "Merge config files in order, expanding {{ env \"NAME\" }} templates, and print the result",
    long_about = None
)]
#[command(version, disable_version_flag = true)]
#[command(
    after_help = "Examples:\n  merge-env-config config.yml config_local.yml\n  merge-env-config -json config.json override.json\n  merge-env-config --tfstate file://./terraform.tfstate app.yml\n"
)]
pub struct Cli {
    /// Treat input files and output as JSON instead of YAML
    #[arg(long)]
    pub json: bool,

    /// Terraform state (path or file:// URL) for the `tfstate` template function
    #[arg(long, value_name = "URL")]
    pub tfstate: Option<String>,

    /// Fetch ECS task metadata and expose it to templates as `.ecsTaskMetadata`
    #[arg(long)]
    pub ecs_metadata: bool,

    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,

    /// Config files; later files override earlier ones
    #[arg(value_name = "CONFIG")]
    pub files: Vec<PathBuf>,
}

/// Rewrite `-flag` to `--flag` for the known long flags, up to a `--`
/// separator.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            if passthrough {
                return arg;
            }
            if arg == "--" {
                passthrough = true;
                return arg;
            }
            match arg.to_str() {
                Some(s) => {
                    let (name, value) = match s.split_once('=') {
                        Some((name, value)) => (name, Some(value)),
                        None => (s, None),
                    };
                    match name.strip_prefix('-') {
                        Some(flag)
                            if !flag.starts_with('-') && SINGLE_DASH_LONG_FLAGS.contains(&flag) =>
                        {
                            match value {
                                Some(value) => OsString::from(format!("--{flag}={value}")),
                                None => OsString::from(format!("--{flag}")),
                            }
                        }
                        _ => arg,
                    }
                }
                None => arg,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(normalize_args(args.iter().map(OsString::from))).unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_single_dash_json() {
        let cli = parse(&["merge-env-config", "-json", "a.json", "b.json"]);
        assert!(cli.json);
        assert_eq!(cli.files, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
    }

    #[test]
    fn test_single_dash_with_value() {
        let cli = parse(&["merge-env-config", "-tfstate=file://./s.tfstate", "a.yml"]);
        assert_eq!(cli.tfstate.as_deref(), Some("file://./s.tfstate"));
    }

    #[test]
    fn test_short_flags_untouched() {
        let args = normalize_args(["merge-env-config", "-v", "-x", "--", "-json"].map(OsString::from));
        assert_eq!(args, ["merge-env-config", "-v", "-x", "--", "-json"].map(OsString::from));
    }

    #[test]
    fn test_files_after_separator_are_positional() {
        let cli = parse(&["merge-env-config", "--", "-json"]);
        assert!(!cli.json);
        assert_eq!(cli.files, vec![PathBuf::from("-json")]);
    }

    #[test]
    fn test_version_flags() {
        for flag in ["-v", "--version", "-version"] {
            let err = Cli::try_parse_from(normalize_args(
                ["merge-env-config", flag].map(OsString::from),
            ))
            .unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion, "{flag}");
        }
    }
}
