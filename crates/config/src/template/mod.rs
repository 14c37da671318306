//! Template expansion for configuration sources.
//!
//! Responsibilities:
//! - Parse a source with configurable delimiters into a node tree.
//! - Execute it with the data context as the root value (`.`, `$`) and
//!   functions resolved from the registry.
//!
//! Does NOT handle:
//! - Decoding the expanded output (see `decode`).
//! - Owning the registry or data (the loader passes snapshots in).
//!
//! Invariants:
//! - Empty delimiters fall back to `{{` / `}}`, each side independently.
//! - Unknown functions are parse errors; unresolved field paths are
//!   execution errors.
//! - `TemplateError::RequiredVariableMissing` is never folded into
//!   `TemplateError::Execution`.

mod ast;
mod eval;
mod lexer;
mod parser;

use serde_json::Value;
use thiserror::Error;

use crate::funcs::FuncMap;

pub const DEFAULT_LEFT_DELIM: &str = "{{";
pub const DEFAULT_RIGHT_DELIM: &str = "}}";

/// Errors that can occur during template operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("template execution error at line {line}: {message}")]
    Execution { line: usize, message: String },

    #[error("must_env: environment variable {name} is not defined")]
    RequiredVariableMissing { name: String },
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    nodes: Vec<ast::Node>,
}

impl Template {
    /// Parse `src` using `left`/`right` delimiters and the functions in `funcs`.
    pub fn parse(
        src: &str,
        left: &str,
        right: &str,
        funcs: &FuncMap,
    ) -> Result<Self, TemplateError> {
        let left = if left.is_empty() { DEFAULT_LEFT_DELIM } else { left };
        let right = if right.is_empty() { DEFAULT_RIGHT_DELIM } else { right };
        let items = lexer::lex(src, left, right)?;
        let nodes = parser::Parser::new(items, funcs).parse()?;
        Ok(Self { nodes })
    }

    /// Execute the template with `data` bound to `.` and `$`.
    pub fn execute(&self, data: &Value, funcs: &FuncMap) -> Result<String, TemplateError> {
        eval::Evaluator::new(funcs, data).run(&self.nodes, data)
    }
}

/// Parse and execute `src` in one step.
pub fn expand(
    src: &[u8],
    left: &str,
    right: &str,
    funcs: &FuncMap,
    data: &Value,
) -> Result<Vec<u8>, TemplateError> {
    let text = std::str::from_utf8(src).map_err(|e| TemplateError::Parse {
        line: 1 + src[..e.valid_up_to()].iter().filter(|b| **b == b'\n').count(),
        message: format!("source is not valid UTF-8: {e}"),
    })?;
    let template = Template::parse(text, left, right, funcs)?;
    Ok(template.execute(data, funcs)?.into_bytes())
}
