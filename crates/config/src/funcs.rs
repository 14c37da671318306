//! Template function registry and the built-in functions.
//!
//! Responsibilities:
//! - Define the callable shape (`TemplateFn`) used by the template expander.
//! - Provide the built-ins `env`, `must_env` and `json_escape`.
//!
//! Does NOT handle:
//! - Registration and last-write-wins merging (see `Loader::funcs`).
//!
//! Invariants:
//! - `env` falls back to the literal of its last argument when every
//!   variable is unset or empty.
//! - `must_env` fails with `FuncError::RequiredVariableMissing` only when the
//!   variable is undefined; a defined-but-empty variable yields `""`.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A function callable from a template.
///
/// Arguments arrive already rendered to strings, in call order, with a piped
/// value appended last.
pub type TemplateFn = Arc<dyn Fn(&[String]) -> Result<String, FuncError> + Send + Sync>;

/// Name to function mapping.
pub type FuncMap = HashMap<String, TemplateFn>;

/// Failure raised by a template function.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FuncError {
    /// Ordinary failure; reported as a template execution error.
    #[error("{0}")]
    Failed(String),

    /// A value the configuration cannot do without is absent.
    ///
    /// Surfaces as `ConfigError::RequiredVariableMissing` at the top of the load.
    #[error("environment variable {0} is not defined")]
    RequiredVariableMissing(String),
}

/// Wrap a closure as a [`TemplateFn`].
pub fn func<F>(f: F) -> TemplateFn
where
    F: Fn(&[String]) -> Result<String, FuncError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The functions every new loader starts with.
pub fn builtins() -> FuncMap {
    let mut map = FuncMap::new();
    map.insert("env".to_string(), func(|args| Ok(env(args))));
    map.insert("must_env".to_string(), func(must_env));
    map.insert("json_escape".to_string(), func(json_escape));
    map
}

/// Value of the first non-empty environment variable among `keys`, or the
/// last key itself when none is set.
pub fn env(keys: &[String]) -> String {
    let mut value = String::new();
    for key in keys {
        match std::env::var(key) {
            Ok(v) if !v.is_empty() => return v,
            _ => value = key.clone(),
        }
    }
    value
}

/// Value of a required environment variable.
pub fn must_env(args: &[String]) -> Result<String, FuncError> {
    let [key] = args else {
        return Err(FuncError::Failed(format!(
            "must_env: wrong number of args: want 1 got {}",
            args.len()
        )));
    };
    match std::env::var(key) {
        Ok(value) => Ok(value),
        Err(std::env::VarError::NotUnicode(raw)) => Ok(raw.to_string_lossy().into_owned()),
        Err(std::env::VarError::NotPresent) => {
            Err(FuncError::RequiredVariableMissing(key.clone()))
        }
    }
}

/// Encode the argument as a JSON string literal without its quotes.
pub fn json_escape(args: &[String]) -> Result<String, FuncError> {
    let [s] = args else {
        return Err(FuncError::Failed(format!(
            "json_escape: wrong number of args: want 1 got {}",
            args.len()
        )));
    };
    let quoted = serde_json::to_string(s).map_err(|e| FuncError::Failed(e.to_string()))?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serial_test::serial;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    #[serial]
    fn test_env_returns_first_non_empty() {
        temp_env::with_vars(
            [("CM_FIRST", Some("")), ("CM_SECOND", Some("two"))],
            || {
                assert_eq!(env(&args(&["CM_FIRST", "CM_SECOND"])), "two");
            },
        );
    }

    #[test]
    #[serial]
    fn test_env_falls_back_to_last_literal() {
        temp_env::with_vars(
            [("CM_UNSET_X", None::<&str>), ("CM_UNSET_Y", Some(""))],
            || {
                assert_eq!(env(&args(&["CM_UNSET_X", "CM_UNSET_Y"])), "CM_UNSET_Y");
                assert_eq!(env(&args(&["CM_UNSET_X", "default"])), "default");
            },
        );
    }

    #[test]
    fn test_env_without_args_is_empty() {
        assert_eq!(env(&[]), "");
    }

    #[test]
    #[serial]
    fn test_must_env_defined_but_empty() {
        temp_env::with_var("CM_MUST_EMPTY", Some(""), || {
            assert_eq!(must_env(&args(&["CM_MUST_EMPTY"])), Ok(String::new()));
        });
    }

    #[test]
    #[serial]
    fn test_must_env_undefined() {
        temp_env::with_var_unset("CM_MUST_MISSING", || {
            assert_eq!(
                must_env(&args(&["CM_MUST_MISSING"])),
                Err(FuncError::RequiredVariableMissing("CM_MUST_MISSING".to_string()))
            );
        });
    }

    #[test]
    fn test_must_env_arity() {
        assert!(matches!(must_env(&[]), Err(FuncError::Failed(_))));
    }

    #[test]
    fn test_json_escape_special_characters() {
        assert_eq!(json_escape(&args(&["b\"ar"])).unwrap(), "b\\\"ar");
        assert_eq!(json_escape(&args(&["a\nb"])).unwrap(), "a\\nb");
        assert_eq!(json_escape(&args(&["tab\there"])).unwrap(), "tab\\there");
    }

    proptest! {
        #[test]
        fn prop_json_escape_round_trips(s in any::<String>()) {
            let escaped = json_escape(&[s.clone()]).unwrap();
            let decoded: String = serde_json::from_str(&format!("\"{escaped}\"")).unwrap();
            prop_assert_eq!(decoded, s);
        }
    }
}
