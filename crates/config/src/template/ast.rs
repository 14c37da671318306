//! Template AST types.

use serde_json::Number;

/// A node in the template AST.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    /// Literal text copied to the output.
    Text(String),

    /// `{{ pipeline }}`; prints its value unless it declares a variable.
    Action(Action),

    /// `{{ if pipeline }}...{{ else }}...{{ end }}`
    If(Branch),

    /// `{{ with pipeline }}...{{ else }}...{{ end }}`; rebinds dot.
    With(Branch),

    /// `{{ range pipeline }}...{{ else }}...{{ end }}`
    Range(Branch),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Action {
    pub line: usize,
    pub pipeline: Pipeline,
}

/// Shared shape of `if`, `with` and `range`.
///
/// `else if` / `else with` chains are stored as a single nested node in
/// `else_list`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub line: usize,
    pub pipeline: Pipeline,
    pub list: Vec<Node>,
    pub else_list: Option<Vec<Node>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipeline {
    /// Declared or assigned variable names, including the `$`.
    pub decl: Vec<String>,
    /// `=` rather than `:=`.
    pub assign: bool,
    pub commands: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Dot,
    Field(Vec<String>),
    Variable { name: String, fields: Vec<String> },
    Func(String),
    Str(String),
    Number(Number),
    Bool(bool),
    Nil,
    /// Parenthesized pipeline followed by an optional field chain.
    Pipeline(Box<Pipeline>, Vec<String>),
}
