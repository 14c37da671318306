//! Template parser.
//!
//! Turns the lexer's items into a node tree. Function names are resolved
//! against the registry here, and variables must be declared before use.

use super::TemplateError;
use super::ast::{Action, Branch, Command, Node, Operand, Pipeline};
use super::lexer::{Item, Token};
use crate::funcs::FuncMap;

const KEYWORDS: &[&str] = &[
    "if", "else", "end", "range", "with", "define", "template", "block", "break", "continue",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchKind {
    If,
    With,
    Range,
}

impl BranchKind {
    fn keyword(self) -> &'static str {
        match self {
            BranchKind::If => "if",
            BranchKind::With => "with",
            BranchKind::Range => "range",
        }
    }
}

enum Terminator {
    Eof,
    End { line: usize },
    Else { line: usize, tokens: Vec<Token> },
}

pub(crate) struct Parser<'a> {
    items: std::vec::IntoIter<Item>,
    funcs: &'a FuncMap,
    vars: Vec<String>,
}

fn parse_error(line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Parse {
        line,
        message: message.into(),
    }
}

impl<'a> Parser<'a> {
    pub(crate) fn new(items: Vec<Item>, funcs: &'a FuncMap) -> Self {
        Self {
            items: items.into_iter(),
            funcs,
            vars: vec!["$".to_string()],
        }
    }

    pub(crate) fn parse(mut self) -> Result<Vec<Node>, TemplateError> {
        let (nodes, terminator) = self.parse_list()?;
        match terminator {
            Terminator::Eof => Ok(nodes),
            Terminator::End { line } => Err(parse_error(line, "unexpected {{end}}")),
            Terminator::Else { line, .. } => Err(parse_error(line, "unexpected {{else}}")),
        }
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Terminator), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            let (line, tokens) = match item {
                Item::Text(text) => {
                    nodes.push(Node::Text(text));
                    continue;
                }
                Item::Action { line, tokens } => (line, tokens),
            };

            let keyword = match tokens.first() {
                Some(Token::Ident(word)) => word.as_str(),
                _ => "",
            };
            match keyword {
                "end" => {
                    if tokens.len() > 1 {
                        return Err(parse_error(line, "unexpected token in end"));
                    }
                    return Ok((nodes, Terminator::End { line }));
                }
                "else" => {
                    return Ok((
                        nodes,
                        Terminator::Else {
                            line,
                            tokens: tokens[1..].to_vec(),
                        },
                    ));
                }
                "if" => nodes.push(self.parse_branch(BranchKind::If, line, &tokens[1..])?),
                "with" => nodes.push(self.parse_branch(BranchKind::With, line, &tokens[1..])?),
                "range" => nodes.push(self.parse_branch(BranchKind::Range, line, &tokens[1..])?),
                _ => {
                    let pipeline = self.parse_pipeline(line, &tokens, "command", false)?;
                    nodes.push(Node::Action(Action { line, pipeline }));
                }
            }
        }
        Ok((nodes, Terminator::Eof))
    }

    fn parse_branch(
        &mut self,
        kind: BranchKind,
        line: usize,
        tokens: &[Token],
    ) -> Result<Node, TemplateError> {
        let mark = self.vars.len();
        let pipeline =
            self.parse_pipeline(line, tokens, kind.keyword(), kind == BranchKind::Range)?;
        let body_mark = self.vars.len();

        let (list, terminator) = self.parse_list()?;
        self.vars.truncate(body_mark);

        let else_list = match terminator {
            Terminator::Eof => {
                return Err(parse_error(
                    line,
                    format!("unexpected EOF in {}", kind.keyword()),
                ));
            }
            Terminator::End { .. } => None,
            Terminator::Else {
                line: else_line,
                tokens: rest,
            } => match rest.first() {
                None => {
                    let (else_nodes, terminator) = self.parse_list()?;
                    match terminator {
                        Terminator::End { .. } => Some(else_nodes),
                        Terminator::Else { line, .. } => {
                            return Err(parse_error(line, "expected end; found {{else}}"));
                        }
                        Terminator::Eof => {
                            return Err(parse_error(
                                line,
                                format!("unexpected EOF in {}", kind.keyword()),
                            ));
                        }
                    }
                }
                Some(Token::Ident(word)) if kind != BranchKind::Range && word == kind.keyword() => {
                    Some(vec![self.parse_branch(kind, else_line, &rest[1..])?])
                }
                Some(_) => {
                    return Err(parse_error(else_line, "unexpected token after else"));
                }
            },
        };
        self.vars.truncate(mark);

        let branch = Branch {
            line,
            pipeline,
            list,
            else_list,
        };
        Ok(match kind {
            BranchKind::If => Node::If(branch),
            BranchKind::With => Node::With(branch),
            BranchKind::Range => Node::Range(branch),
        })
    }

    fn parse_pipeline(
        &mut self,
        line: usize,
        tokens: &[Token],
        context: &str,
        allow_two_vars: bool,
    ) -> Result<Pipeline, TemplateError> {
        let mut rest = tokens;
        let mut decl = Vec::new();
        let mut assign = false;

        match rest {
            [Token::Variable { name, fields }, Token::Declare | Token::Assign, ..]
                if fields.is_empty() =>
            {
                assign = rest[1] == Token::Assign;
                decl.push(name.clone());
                rest = &rest[2..];
            }
            [
                Token::Variable { name: first, fields: f1 },
                Token::Comma,
                Token::Variable { name: second, fields: f2 },
                Token::Declare,
                ..,
            ] if allow_two_vars && f1.is_empty() && f2.is_empty() => {
                decl.push(first.clone());
                decl.push(second.clone());
                rest = &rest[4..];
            }
            _ => {}
        }
        if assign {
            for name in &decl {
                if !self.vars.contains(name) {
                    return Err(parse_error(line, format!("undefined variable {name:?}")));
                }
            }
        }

        if rest.is_empty() {
            return Err(parse_error(line, format!("missing value for {context}")));
        }

        let mut commands = Vec::new();
        for segment in split_commands(rest) {
            if segment.is_empty() {
                return Err(parse_error(line, "missing value for command"));
            }
            commands.push(self.parse_command(line, segment)?);
        }

        if !assign {
            self.vars.extend(decl.iter().cloned());
        }
        Ok(Pipeline {
            decl,
            assign,
            commands,
        })
    }

    fn parse_command(&mut self, line: usize, tokens: &[Token]) -> Result<Command, TemplateError> {
        let mut operands = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let operand = match &tokens[i] {
                Token::LeftParen => {
                    let close = matching_paren(tokens, i)
                        .ok_or_else(|| parse_error(line, "unclosed left paren"))?;
                    let inner =
                        self.parse_pipeline(line, &tokens[i + 1..close], "parenthesized pipeline", false)?;
                    if !inner.decl.is_empty() {
                        return Err(parse_error(line, "variable declaration inside parentheses"));
                    }
                    let fields = match &tokens[close] {
                        Token::RightParen { fields } => fields.clone(),
                        _ => Vec::new(),
                    };
                    i = close;
                    Operand::Pipeline(Box::new(inner), fields)
                }
                Token::RightParen { .. } => {
                    return Err(parse_error(line, "unexpected right paren"));
                }
                Token::Dot => Operand::Dot,
                Token::Field(fields) => Operand::Field(fields.clone()),
                Token::Variable { name, fields } => {
                    if !self.vars.contains(name) {
                        return Err(parse_error(line, format!("undefined variable {name:?}")));
                    }
                    Operand::Variable {
                        name: name.clone(),
                        fields: fields.clone(),
                    }
                }
                Token::Ident(name) => {
                    if KEYWORDS.contains(&name.as_str()) {
                        return Err(parse_error(line, format!("unexpected <{name}> in command")));
                    }
                    if !self.funcs.contains_key(name) {
                        return Err(parse_error(line, format!("function {name:?} not defined")));
                    }
                    Operand::Func(name.clone())
                }
                Token::Str(s) => Operand::Str(s.clone()),
                Token::Number(n) => Operand::Number(n.clone()),
                Token::Bool(b) => Operand::Bool(*b),
                Token::Nil => Operand::Nil,
                Token::Pipe | Token::Declare | Token::Assign | Token::Comma => {
                    return Err(parse_error(line, format!("unexpected {:?} in operand", tokens[i])));
                }
            };
            operands.push(operand);
            i += 1;
        }

        if operands.len() > 1 && !matches!(operands[0], Operand::Func(_)) {
            return Err(parse_error(line, "can't give argument to non-function"));
        }
        Ok(Command { operands })
    }
}

/// Split on `|` outside parentheses.
fn split_commands(tokens: &[Token]) -> Vec<&[Token]> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::LeftParen => depth += 1,
            Token::RightParen { .. } => depth = depth.saturating_sub(1),
            Token::Pipe if depth == 0 => {
                segments.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&tokens[start..]);
    segments
}

fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token {
            Token::LeftParen => depth += 1,
            Token::RightParen { .. } => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
