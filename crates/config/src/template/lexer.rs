//! Template lexer.
//!
//! Splits a source into literal text and action token lists. Comments are
//! dropped here, and `{{-` / `-}}` trim markers are applied to the
//! neighbouring text so the parser never sees them.
//!
//! A comment must touch its delimiters: `{{/* c */}}` or `{{- /* c */ -}}`.

use serde_json::Number;

use super::TemplateError;

/// A lexed unit of the template source.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item {
    Text(String),
    Action { line: usize, tokens: Vec<Token> },
}

/// A token inside an action.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `.` on its own.
    Dot,
    /// `.a.b` chain relative to dot.
    Field(Vec<String>),
    /// `$`, `$x` or `$x.a.b`.
    Variable { name: String, fields: Vec<String> },
    /// Bare word: a keyword or a function name.
    Ident(String),
    Str(String),
    Number(Number),
    Bool(bool),
    Nil,
    Pipe,
    LeftParen,
    /// `)` plus any field chain immediately following it.
    RightParen { fields: Vec<String> },
    Declare,
    Assign,
    Comma,
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn newlines(s: &str) -> usize {
    s.bytes().filter(|b| *b == b'\n').count()
}

fn parse_error(line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Parse {
        line,
        message: message.into(),
    }
}

/// Lex `src` using the given delimiters.
pub(crate) fn lex(src: &str, left: &str, right: &str) -> Result<Vec<Item>, TemplateError> {
    let mut items = Vec::new();
    let mut rest = src;
    let mut line = 1;
    let mut trim_next_text = false;

    loop {
        let Some(pos) = rest.find(left) else {
            let mut text = rest;
            if trim_next_text {
                text = text.trim_start_matches(is_space);
            }
            if !text.is_empty() {
                items.push(Item::Text(text.to_string()));
            }
            return Ok(items);
        };

        let mut text = &rest[..pos];
        let mut body = &rest[pos + left.len()..];
        let trim_left = body.starts_with('-') && body[1..].starts_with(is_space);
        if trim_next_text {
            text = text.trim_start_matches(is_space);
        }
        if trim_left {
            text = text.trim_end_matches(is_space);
            body = &body[1..];
        }
        if !text.is_empty() {
            items.push(Item::Text(text.to_string()));
        }
        line += newlines(&rest[..pos]);

        let action_line = line;
        let action = lex_action(body, right, trim_left, &mut line)?;
        if let Some(tokens) = action.tokens {
            items.push(Item::Action {
                line: action_line,
                tokens,
            });
        }
        trim_next_text = action.trim_right;
        rest = &body[action.consumed..];
    }
}

struct LexedAction {
    /// `None` for a comment.
    tokens: Option<Vec<Token>>,
    consumed: usize,
    trim_right: bool,
}

fn lex_action(
    body: &str,
    right: &str,
    trim_left: bool,
    line: &mut usize,
) -> Result<LexedAction, TemplateError> {
    let start_line = *line;

    // A comment opens right after the delimiter, or after `- ` when trimming,
    // and must be followed directly by the closing delimiter or ` -`.
    let leading = usize::from(trim_left);
    if body[leading..].starts_with("/*") {
        let Some(end) = body[leading + 2..].find("*/") else {
            return Err(parse_error(start_line, "unclosed comment"));
        };
        *line += newlines(&body[..leading + 2 + end]);
        let i = leading + 2 + end + 2;
        let rest = &body[i..];
        if rest.starts_with(right) {
            return Ok(LexedAction {
                tokens: None,
                consumed: i + right.len(),
                trim_right: false,
            });
        }
        if rest.starts_with(is_space)
            && rest[1..].starts_with('-')
            && rest[2..].starts_with(right)
        {
            return Ok(LexedAction {
                tokens: None,
                consumed: i + 2 + right.len(),
                trim_right: true,
            });
        }
        return Err(parse_error(*line, "comment ends before closing delimiter"));
    }

    let mut tokens = Vec::new();
    let mut i = 0;
    loop {
        let after_space = body[i..].trim_start_matches(is_space);
        let skipped = body[i..].len() - after_space.len();
        *line += newlines(&body[i..i + skipped]);
        i += skipped;
        let rest = &body[i..];

        if rest.is_empty() {
            return Err(parse_error(start_line, "unclosed action"));
        }
        if skipped > 0 && rest.starts_with('-') && rest[1..].starts_with(right) {
            return Ok(LexedAction {
                tokens: Some(tokens),
                consumed: i + 1 + right.len(),
                trim_right: true,
            });
        }
        if rest.starts_with(right) {
            return Ok(LexedAction {
                tokens: Some(tokens),
                consumed: i + right.len(),
                trim_right: false,
            });
        }
        let (token, len) = lex_token(rest, *line)?;
        *line += newlines(&rest[..len]);
        tokens.push(token);
        i += len;
    }
}

fn lex_token(rest: &str, line: usize) -> Result<(Token, usize), TemplateError> {
    let mut chars = rest.chars();
    let Some(c) = chars.next() else {
        return Err(parse_error(line, "unexpected end of action"));
    };
    let next = chars.next();

    match c {
        '|' => Ok((Token::Pipe, 1)),
        ',' => Ok((Token::Comma, 1)),
        '(' => Ok((Token::LeftParen, 1)),
        ')' => {
            let (fields, len) = lex_fields(&rest[1..]);
            Ok((Token::RightParen { fields }, 1 + len))
        }
        ':' if next == Some('=') => Ok((Token::Declare, 2)),
        '=' => Ok((Token::Assign, 1)),
        '"' => lex_quoted(rest, line),
        '`' => match rest[1..].find('`') {
            Some(end) => Ok((Token::Str(rest[1..1 + end].to_string()), end + 2)),
            None => Err(parse_error(line, "unterminated raw quoted string")),
        },
        '.' if next.is_some_and(is_ident_start) => {
            let (fields, len) = lex_fields(rest);
            Ok((Token::Field(fields), len))
        }
        '.' if next.is_some_and(|n| n.is_ascii_digit()) => lex_number(rest, line),
        '.' => Ok((Token::Dot, 1)),
        '$' => {
            let name_len = rest[1..]
                .find(|ch: char| !is_ident_char(ch))
                .unwrap_or(rest.len() - 1);
            let name = format!("${}", &rest[1..1 + name_len]);
            let (fields, len) = lex_fields(&rest[1 + name_len..]);
            Ok((Token::Variable { name, fields }, 1 + name_len + len))
        }
        '-' | '+' if next.is_some_and(|n| n.is_ascii_digit() || n == '.') => lex_number(rest, line),
        c if c.is_ascii_digit() => lex_number(rest, line),
        c if is_ident_start(c) => {
            let len = rest.find(|ch: char| !is_ident_char(ch)).unwrap_or(rest.len());
            let word = &rest[..len];
            let token = match word {
                "true" => Token::Bool(true),
                "false" => Token::Bool(false),
                "nil" => Token::Nil,
                _ => Token::Ident(word.to_string()),
            };
            Ok((token, len))
        }
        other => Err(parse_error(
            line,
            format!("unexpected {other:?} in command"),
        )),
    }
}

/// Lex a `.a.b` chain at the start of `s`, returning the names and the bytes consumed.
fn lex_fields(s: &str) -> (Vec<String>, usize) {
    let mut fields = Vec::new();
    let mut i = 0;
    while s[i..].starts_with('.') && s[i + 1..].starts_with(is_ident_start) {
        let name_start = i + 1;
        let name_len = s[name_start..]
            .find(|ch: char| !is_ident_char(ch))
            .unwrap_or(s.len() - name_start);
        fields.push(s[name_start..name_start + name_len].to_string());
        i = name_start + name_len;
    }
    (fields, i)
}

fn lex_number(rest: &str, line: usize) -> Result<(Token, usize), TemplateError> {
    let mut len = 0;
    let mut prev = '\0';
    for (idx, ch) in rest.char_indices() {
        let sign_ok = (ch == '-' || ch == '+') && (idx == 0 || matches!(prev, 'e' | 'E'));
        if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' || sign_ok {
            len = idx + ch.len_utf8();
            prev = ch;
        } else {
            break;
        }
    }
    let literal = &rest[..len];
    let cleaned = literal.trim_start_matches('+').replace('_', "");
    let bad = || parse_error(line, format!("bad number syntax: {literal:?}"));

    let is_float = cleaned.contains(['.', 'e', 'E']) && !cleaned.contains(['x', 'X']);
    let number = if is_float {
        let value: f64 = cleaned.parse().map_err(|_| bad())?;
        Number::from_f64(value).ok_or_else(bad)?
    } else if let Some(hex) = cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Number::from(i64::from_str_radix(hex, 16).map_err(|_| bad())?)
    } else if let Some(hex) = cleaned
        .strip_prefix("-0x")
        .or_else(|| cleaned.strip_prefix("-0X"))
    {
        Number::from(-i64::from_str_radix(hex, 16).map_err(|_| bad())?)
    } else {
        Number::from(cleaned.parse::<i64>().map_err(|_| bad())?)
    };
    Ok((Token::Number(number), len))
}

fn lex_quoted(rest: &str, line: usize) -> Result<(Token, usize), TemplateError> {
    let mut out = String::new();
    let mut chars = rest.char_indices().skip(1);
    let unterminated = || parse_error(line, "unterminated quoted string");

    while let Some((idx, ch)) = chars.next() {
        match ch {
            '"' => return Ok((Token::Str(out), idx + 1)),
            '\n' => return Err(unterminated()),
            '\\' => {
                let (_, esc) = chars.next().ok_or_else(unterminated)?;
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'a' => out.push('\u{07}'),
                    'b' => out.push('\u{08}'),
                    'f' => out.push('\u{0C}'),
                    'v' => out.push('\u{0B}'),
                    '\\' | '"' | '\'' => out.push(esc),
                    'x' | 'u' | 'U' => {
                        let width = match esc {
                            'x' => 2,
                            'u' => 4,
                            _ => 8,
                        };
                        let mut hex = String::with_capacity(width);
                        for _ in 0..width {
                            let (_, h) = chars.next().ok_or_else(unterminated)?;
                            hex.push(h);
                        }
                        let decoded = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| {
                                parse_error(line, format!("invalid escape \\{esc}{hex}"))
                            })?;
                        out.push(decoded);
                    }
                    other => {
                        return Err(parse_error(line, format!("unknown escape sequence \\{other}")));
                    }
                }
            }
            _ => out.push(ch),
        }
    }
    Err(unterminated())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_tokens(src: &str) -> Vec<Token> {
        match lex(src, "{{", "}}").unwrap().as_slice() {
            [Item::Action { tokens, .. }] => tokens.clone(),
            other => panic!("expected one action, got {other:?}"),
        }
    }

    #[test]
    fn test_text_and_action() {
        let items = lex("a {{ .b }} c", "{{", "}}").unwrap();
        assert_eq!(
            items,
            vec![
                Item::Text("a ".to_string()),
                Item::Action {
                    line: 1,
                    tokens: vec![Token::Field(vec!["b".to_string()])]
                },
                Item::Text(" c".to_string()),
            ]
        );
    }

    #[test]
    fn test_function_call_tokens() {
        assert_eq!(
            action_tokens(r#"{{ env "FOO" "bar" | json_escape }}"#),
            vec![
                Token::Ident("env".to_string()),
                Token::Str("FOO".to_string()),
                Token::Str("bar".to_string()),
                Token::Pipe,
                Token::Ident("json_escape".to_string()),
            ]
        );
    }

    #[test]
    fn test_variable_declaration_tokens() {
        assert_eq!(
            action_tokens("{{ range $i, $c := .Containers }}"),
            vec![
                Token::Ident("range".to_string()),
                Token::Variable {
                    name: "$i".to_string(),
                    fields: vec![]
                },
                Token::Comma,
                Token::Variable {
                    name: "$c".to_string(),
                    fields: vec![]
                },
                Token::Declare,
                Token::Field(vec!["Containers".to_string()]),
            ]
        );
    }

    #[test]
    fn test_variable_with_fields_and_paren_chain() {
        assert_eq!(
            action_tokens("{{ ($c).Image.Name $.Root }}"),
            vec![
                Token::LeftParen,
                Token::Variable {
                    name: "$c".to_string(),
                    fields: vec![]
                },
                Token::RightParen {
                    fields: vec!["Image".to_string(), "Name".to_string()]
                },
                Token::Variable {
                    name: "$".to_string(),
                    fields: vec!["Root".to_string()]
                },
            ]
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            action_tokens("{{ 42 -7 0.5 true nil `raw\\n` \"q\\u00e9\" }}"),
            vec![
                Token::Number(Number::from(42)),
                Token::Number(Number::from(-7)),
                Token::Number(Number::from_f64(0.5).unwrap()),
                Token::Bool(true),
                Token::Nil,
                Token::Str("raw\\n".to_string()),
                Token::Str("q\u{e9}".to_string()),
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        let items = lex("a  \n{{- .x -}}\n  b", "{{", "}}").unwrap();
        assert_eq!(items.first(), Some(&Item::Text("a".to_string())));
        assert_eq!(items.last(), Some(&Item::Text("b".to_string())));
    }

    #[test]
    fn test_comment_is_dropped() {
        let items = lex("a{{/* note */}}b", "{{", "}}").unwrap();
        assert_eq!(
            items,
            vec![Item::Text("a".to_string()), Item::Text("b".to_string())]
        );
    }

    #[test]
    fn test_comment_with_trim_markers() {
        let items = lex("a {{- /* note */ -}} b", "{{", "}}").unwrap();
        assert_eq!(
            items,
            vec![Item::Text("a".to_string()), Item::Text("b".to_string())]
        );
    }

    #[test]
    fn test_comment_must_touch_delimiters() {
        for src in ["{{ /* x */}}", "{{/* x */ }}", "{{-  /* x */}}", "{{/* x */  -}}"] {
            let err = lex(src, "{{", "}}").unwrap_err();
            assert!(matches!(err, TemplateError::Parse { line: 1, .. }), "{src}");
        }
    }

    #[test]
    fn test_custom_delimiters() {
        let items = lex("foo: '<% env \"FOO\" %>' {{ keep }}", "<%", "%>").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[2], Item::Text("' {{ keep }}".to_string()));
    }

    #[test]
    fn test_line_numbers() {
        let items = lex("a\nb\n{{ .c }}", "{{", "}}").unwrap();
        assert!(matches!(items[1], Item::Action { line: 3, .. }));
    }

    #[test]
    fn test_unclosed_action() {
        let err = lex("a {{ .b", "{{", "}}").unwrap_err();
        assert!(matches!(err, TemplateError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_unterminated_string() {
        assert!(lex("{{ \"abc }}", "{{", "}}").is_err());
    }
}
