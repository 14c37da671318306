//! Resource address parsing.
//!
//! Accepted forms:
//! - `output.NAME` followed by any attribute path.
//! - `[module.NAME[IDX].]*[data.]TYPE.NAME[IDX]` followed by any attribute
//!   path, where a path step is `.ATTR`, `[N]` or `["KEY"]`.

use crate::error::{Result, TfstateError};

/// One step of an address after tokenizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// `.name` (or the leading bare name).
    Key(String),
    /// `[0]`
    Index(u64),
    /// `["key"]`
    IndexKey(String),
}

impl Step {
    fn bracket(&self) -> Option<String> {
        match self {
            Step::Index(n) => Some(format!("[{n}]")),
            Step::IndexKey(key) => Some(format!("[{}]", quote(key))),
            Step::Key(_) => None,
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{s}\""))
}

/// Instance key of a counted or `for_each` resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceKey {
    Index(u64),
    Key(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Output(String),
    Resource {
        /// Module path as written in the state file, e.g. `module.a["x"]`.
        module: Option<String>,
        data: bool,
        kind: String,
        name: String,
        key: Option<InstanceKey>,
    },
}

/// A parsed address: what to look up, then the attribute path inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub target: Target,
    pub path: Vec<Step>,
}

fn invalid(address: &str, message: impl Into<String>) -> TfstateError {
    TfstateError::InvalidAddress {
        address: address.to_string(),
        message: message.into(),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Split an address into steps.
pub fn tokenize(address: &str) -> Result<Vec<Step>> {
    let chars: Vec<char> = address.chars().collect();
    let mut steps = Vec::new();
    let mut i = 0;
    let mut expect_name = true;

    while i < chars.len() {
        match chars[i] {
            '.' if !expect_name => {
                i += 1;
                expect_name = true;
            }
            '[' => {
                if expect_name {
                    return Err(invalid(address, format!("unexpected '[' at {i}")));
                }
                i += 1;
                if chars.get(i) == Some(&'"') {
                    i += 1;
                    let mut key = String::new();
                    loop {
                        match chars.get(i) {
                            Some('\\') => {
                                let escaped = chars
                                    .get(i + 1)
                                    .ok_or_else(|| invalid(address, "unterminated string"))?;
                                key.push(*escaped);
                                i += 2;
                            }
                            Some('"') => {
                                i += 1;
                                break;
                            }
                            Some(c) => {
                                key.push(*c);
                                i += 1;
                            }
                            None => return Err(invalid(address, "unterminated string")),
                        }
                    }
                    steps.push(Step::IndexKey(key));
                } else {
                    let start = i;
                    while chars.get(i).is_some_and(char::is_ascii_digit) {
                        i += 1;
                    }
                    let digits: String = chars[start..i].iter().collect();
                    let n = digits
                        .parse()
                        .map_err(|_| invalid(address, format!("invalid index at {start}")))?;
                    steps.push(Step::Index(n));
                }
                if chars.get(i) != Some(&']') {
                    return Err(invalid(address, format!("expected ']' at {i}")));
                }
                i += 1;
            }
            c if expect_name && is_ident_char(c) => {
                let start = i;
                while chars.get(i).copied().is_some_and(is_ident_char) {
                    i += 1;
                }
                steps.push(Step::Key(chars[start..i].iter().collect()));
                expect_name = false;
            }
            c => return Err(invalid(address, format!("unexpected {c:?} at {i}"))),
        }
    }
    if expect_name {
        return Err(invalid(address, "incomplete address"));
    }
    Ok(steps)
}

fn take_key(address: &str, steps: &[Step], i: &mut usize, what: &str) -> Result<String> {
    match steps.get(*i) {
        Some(Step::Key(name)) => {
            *i += 1;
            Ok(name.clone())
        }
        _ => Err(invalid(address, format!("missing {what}"))),
    }
}

/// Parse an address. Single quotes are accepted in place of double quotes.
pub fn parse(address: &str) -> Result<Address> {
    let normalized = address.trim().replace('\'', "\"");
    let steps = tokenize(&normalized)?;
    let mut i = 0;

    if steps.first() == Some(&Step::Key("output".to_string())) {
        i += 1;
        let name = take_key(&normalized, &steps, &mut i, "output name")?;
        return Ok(Address {
            target: Target::Output(name),
            path: steps[i..].to_vec(),
        });
    }

    let mut modules = Vec::new();
    while steps.get(i) == Some(&Step::Key("module".to_string())) {
        i += 1;
        let name = take_key(&normalized, &steps, &mut i, "module name")?;
        let mut module = format!("module.{name}");
        if let Some(bracket) = steps.get(i).and_then(Step::bracket) {
            module.push_str(&bracket);
            i += 1;
        }
        modules.push(module);
    }

    let data = steps.get(i) == Some(&Step::Key("data".to_string()));
    if data {
        i += 1;
    }
    let kind = take_key(&normalized, &steps, &mut i, "resource type")?;
    let name = take_key(&normalized, &steps, &mut i, "resource name")?;
    let key = match steps.get(i) {
        Some(Step::Index(n)) => Some(InstanceKey::Index(*n)),
        Some(Step::IndexKey(k)) => Some(InstanceKey::Key(k.clone())),
        _ => None,
    };
    if key.is_some() {
        i += 1;
    }

    Ok(Address {
        target: Target::Resource {
            module: (!modules.is_empty()).then(|| modules.join(".")),
            data,
            kind,
            name,
            key,
        },
        path: steps[i..].to_vec(),
    })
}
