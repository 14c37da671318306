//! Template evaluation.
//!
//! Executes a parsed node tree against a root value. A function returning
//! `FuncError::RequiredVariableMissing` aborts evaluation through its own
//! `TemplateError` variant so callers can still tell it apart.

use serde_json::Value;

use super::TemplateError;
use super::ast::{Branch, Command, Node, Operand, Pipeline};
use crate::funcs::{FuncError, FuncMap};

pub(crate) struct Evaluator<'a> {
    funcs: &'a FuncMap,
    vars: Vec<(String, Value)>,
    out: String,
}

fn exec_error(line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Execution {
        line,
        message: message.into(),
    }
}

/// Render a value the way an action prints it.
pub(crate) fn print_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "<no value>".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(funcs: &'a FuncMap, root: &Value) -> Self {
        Self {
            funcs,
            vars: vec![("$".to_string(), root.clone())],
            out: String::new(),
        }
    }

    pub(crate) fn run(mut self, nodes: &[Node], dot: &Value) -> Result<String, TemplateError> {
        self.walk(nodes, dot)?;
        Ok(self.out)
    }

    fn walk(&mut self, nodes: &[Node], dot: &Value) -> Result<(), TemplateError> {
        for node in nodes {
            match node {
                Node::Text(text) => self.out.push_str(text),
                Node::Action(action) => {
                    let value = self.eval_pipeline(&action.pipeline, dot, action.line)?;
                    if action.pipeline.decl.is_empty() {
                        self.out.push_str(&print_value(&value));
                    }
                }
                Node::If(branch) => self.walk_if(branch, dot)?,
                Node::With(branch) => self.walk_with(branch, dot)?,
                Node::Range(branch) => self.walk_range(branch, dot)?,
            }
        }
        Ok(())
    }

    fn walk_if(&mut self, branch: &Branch, dot: &Value) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(&branch.pipeline, dot, branch.line)?;
        let result = if is_truthy(&value) {
            self.walk(&branch.list, dot)
        } else if let Some(else_list) = &branch.else_list {
            self.walk(else_list, dot)
        } else {
            Ok(())
        };
        self.vars.truncate(mark);
        result
    }

    fn walk_with(&mut self, branch: &Branch, dot: &Value) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(&branch.pipeline, dot, branch.line)?;
        let result = if is_truthy(&value) {
            self.walk(&branch.list, &value)
        } else if let Some(else_list) = &branch.else_list {
            self.walk(else_list, dot)
        } else {
            Ok(())
        };
        self.vars.truncate(mark);
        result
    }

    fn walk_range(&mut self, branch: &Branch, dot: &Value) -> Result<(), TemplateError> {
        let mark = self.vars.len();
        let value = self.eval_commands(&branch.pipeline.commands, dot, branch.line)?;
        let decl = &branch.pipeline.decl;

        let entries: Vec<(Value, Value)> = match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::from(i), item))
                .collect(),
            Value::Object(map) => {
                let mut pairs: Vec<(String, Value)> = map.into_iter().collect();
                pairs.sort_by(|a, b| a.0.cmp(&b.0));
                pairs
                    .into_iter()
                    .map(|(key, item)| (Value::String(key), item))
                    .collect()
            }
            Value::Number(n) if n.as_u64().is_some() => (0..n.as_u64().unwrap_or(0))
                .map(|i| (Value::from(i), Value::from(i)))
                .collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(exec_error(
                    branch.line,
                    format!("range can't iterate over {}", print_value(&other)),
                ));
            }
        };

        if entries.is_empty() {
            if let Some(else_list) = &branch.else_list {
                self.walk(else_list, dot)?;
            }
            return Ok(());
        }

        for (key, item) in entries {
            match decl.as_slice() {
                [elem] => self.vars.push((elem.clone(), item.clone())),
                [index, elem] => {
                    self.vars.push((index.clone(), key));
                    self.vars.push((elem.clone(), item.clone()));
                }
                _ => {}
            }
            let result = self.walk(&branch.list, &item);
            self.vars.truncate(mark);
            result?;
        }
        Ok(())
    }

    fn eval_pipeline(
        &mut self,
        pipeline: &Pipeline,
        dot: &Value,
        line: usize,
    ) -> Result<Value, TemplateError> {
        let value = self.eval_commands(&pipeline.commands, dot, line)?;
        for name in &pipeline.decl {
            if pipeline.assign {
                if let Some(slot) = self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                    slot.1 = value.clone();
                }
            } else {
                self.vars.push((name.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    fn eval_commands(
        &mut self,
        commands: &[Command],
        dot: &Value,
        line: usize,
    ) -> Result<Value, TemplateError> {
        let mut piped = None;
        for command in commands {
            piped = Some(self.eval_command(command, dot, piped, line)?);
        }
        Ok(piped.unwrap_or(Value::Null))
    }

    fn eval_command(
        &mut self,
        command: &Command,
        dot: &Value,
        piped: Option<Value>,
        line: usize,
    ) -> Result<Value, TemplateError> {
        match command.operands.as_slice() {
            [Operand::Func(name), args @ ..] => {
                let mut rendered = Vec::with_capacity(args.len() + 1);
                for arg in args {
                    rendered.push(print_value(&self.eval_operand(arg, dot, line)?));
                }
                if let Some(value) = piped {
                    rendered.push(print_value(&value));
                }
                self.call(name, &rendered, line)
            }
            [operand] => {
                if piped.is_some() {
                    return Err(exec_error(line, "can't give argument to non-function"));
                }
                self.eval_operand(operand, dot, line)
            }
            _ => Err(exec_error(line, "missing value for command")),
        }
    }

    fn eval_operand(
        &mut self,
        operand: &Operand,
        dot: &Value,
        line: usize,
    ) -> Result<Value, TemplateError> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(fields) => resolve(dot, fields, line),
            Operand::Variable { name, fields } => {
                let value = self
                    .vars
                    .iter()
                    .rev()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| exec_error(line, format!("undefined variable {name:?}")))?;
                resolve(value, fields, line)
            }
            Operand::Func(name) => self.call(name, &[], line),
            Operand::Str(s) => Ok(Value::String(s.clone())),
            Operand::Number(n) => Ok(Value::Number(n.clone())),
            Operand::Bool(b) => Ok(Value::Bool(*b)),
            Operand::Nil => Ok(Value::Null),
            Operand::Pipeline(pipeline, fields) => {
                let value = self.eval_commands(&pipeline.commands, dot, line)?;
                resolve(&value, fields, line)
            }
        }
    }

    fn call(&self, name: &str, args: &[String], line: usize) -> Result<Value, TemplateError> {
        let func = self
            .funcs
            .get(name)
            .ok_or_else(|| exec_error(line, format!("function {name:?} not defined")))?;
        match func(args) {
            Ok(value) => Ok(Value::String(value)),
            Err(FuncError::Failed(message)) => Err(exec_error(
                line,
                format!("error calling {name}: {message}"),
            )),
            Err(FuncError::RequiredVariableMissing(variable)) => {
                Err(TemplateError::RequiredVariableMissing { name: variable })
            }
        }
    }
}

fn resolve(value: &Value, fields: &[String], line: usize) -> Result<Value, TemplateError> {
    let mut current = value;
    for field in fields {
        current = match current {
            Value::Object(map) => map.get(field).ok_or_else(|| {
                exec_error(line, format!("map has no entry for key {field:?}"))
            })?,
            other => {
                return Err(exec_error(
                    line,
                    format!("can't evaluate field {field} in type {}", type_name(other)),
                ));
            }
        };
    }
    Ok(current.clone())
}
