//! Declarative expressions for CUSTOM cloning
//!
//! Grammar: `term ('+' term)*` where a term is a `'quoted string'`, a number,
//! `true`, `false`, `null`, or a path `self.a.b` / `original.a.b`. `self`
//! binds to the clone and `original` to the instance being cloned. `+` sums
//! numbers and concatenates text; `null` is its identity.

use relmodel_core_types::{InstanceId, PropertyId};
use std::iter::Peekable;
use std::str::CharIndices;

use crate::errors::{ModelError, Result};
use crate::graph::Graph;
use crate::ops::dispatch;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathRoot {
    /// The clone under construction
    This,
    /// The instance being cloned
    Original,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Literal(Value),
    Path {
        root: PathRoot,
        segments: Vec<PropertyId>,
    },
}

/// Parsed expression: the sum of its terms
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    terms: Vec<Term>,
}

#[derive(Debug, PartialEq)]
enum Token {
    Str(String),
    Num(String),
    Ident(String),
    Plus,
}

fn tokenize(src: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars: Peekable<CharIndices> = src.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '+' {
            chars.next();
            tokens.push(Token::Plus);
        } else if c == '\'' {
            chars.next();
            let mut text = String::new();
            let mut closed = false;
            while let Some((_, c)) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some((_, escaped)) => text.push(escaped),
                        None => break,
                    },
                    '\'' => {
                        closed = true;
                        break;
                    }
                    other => text.push(other),
                }
            }
            if !closed {
                return Err(format!("unterminated string starting at offset {}", offset));
            }
            tokens.push(Token::Str(text));
        } else if c.is_ascii_digit() || c == '-' {
            let mut number = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_digit() || c == '.' || (c == '-' && number.is_empty()) {
                    number.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Num(number));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_alphanumeric() || c == '_' || c == '.' {
                    ident.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Ident(ident));
        } else {
            return Err(format!("unexpected character '{}' at offset {}", c, offset));
        }
    }
    Ok(tokens)
}

fn parse_term(token: Token) -> std::result::Result<Term, String> {
    match token {
        Token::Str(s) => Ok(Term::Literal(Value::Text(s))),
        Token::Num(n) => {
            if let Ok(i) = n.parse::<i64>() {
                Ok(Term::Literal(Value::Int(i)))
            } else {
                n.parse::<f64>()
                    .map(|x| Term::Literal(Value::Float(x)))
                    .map_err(|_| format!("invalid number '{}'", n))
            }
        }
        Token::Ident(ident) => match ident.as_str() {
            "true" => Ok(Term::Literal(Value::Bool(true))),
            "false" => Ok(Term::Literal(Value::Bool(false))),
            "null" => Ok(Term::Literal(Value::Null)),
            _ => {
                let mut parts = ident.split('.');
                let root = match parts.next() {
                    Some("self") => PathRoot::This,
                    Some("original") => PathRoot::Original,
                    _ => {
                        return Err(format!(
                            "path '{}' must start with 'self' or 'original'",
                            ident
                        ))
                    }
                };
                let segments: Vec<PropertyId> = parts.map(PropertyId::from).collect();
                if segments.is_empty() || segments.iter().any(|s| s.as_str().is_empty()) {
                    return Err(format!("malformed path '{}'", ident));
                }
                Ok(Term::Path { root, segments })
            }
        },
        Token::Plus => Err("expected a term, found '+'".to_string()),
    }
}

impl Expr {
    /// Parse expression source
    ///
    /// # Errors
    ///
    /// Returns a description of the first syntax error.
    pub fn parse(src: &str) -> std::result::Result<Self, String> {
        let mut tokens = tokenize(src)?.into_iter();
        let mut terms = Vec::new();

        loop {
            let token = tokens
                .next()
                .ok_or_else(|| "expected a term at end of expression".to_string())?;
            terms.push(parse_term(token)?);
            match tokens.next() {
                None => break,
                Some(Token::Plus) => continue,
                Some(other) => return Err(format!("expected '+', found {:?}", other)),
            }
        }
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Evaluate against a clone (`self`) and its original
    ///
    /// # Errors
    ///
    /// Returns `ExpressionFailed` naming `property` when a path crosses a
    /// non-reference or the operands of `+` cannot be combined; dispatcher
    /// read errors propagate unchanged.
    pub fn eval(
        &self,
        graph: &Graph,
        this: InstanceId,
        original: InstanceId,
        property: &PropertyId,
    ) -> Result<Value> {
        let fail = |reason: String| ModelError::ExpressionFailed {
            property: property.clone(),
            reason,
        };

        let mut acc = Value::Null;
        for term in &self.terms {
            let value = match term {
                Term::Literal(v) => v.clone(),
                Term::Path { root, segments } => {
                    let start = match root {
                        PathRoot::This => this,
                        PathRoot::Original => original,
                    };
                    eval_path(graph, start, segments).map_err(|e| match e {
                        PathError::Model(err) => err,
                        PathError::NotReference(seg) => {
                            fail(format!("'{}' is not a reference", seg))
                        }
                    })?
                }
            };
            acc = add_values(acc, value).map_err(fail)?;
        }
        Ok(acc)
    }
}

enum PathError {
    Model(ModelError),
    NotReference(PropertyId),
}

fn eval_path(
    graph: &Graph,
    start: InstanceId,
    segments: &[PropertyId],
) -> std::result::Result<Value, PathError> {
    let mut current = start;
    let last = segments.len().saturating_sub(1);
    for (i, segment) in segments.iter().enumerate() {
        let value = dispatch::read(graph, current, segment.as_str()).map_err(PathError::Model)?;
        if i == last {
            return Ok(value);
        }
        match value {
            Value::Ref(next) => current = next,
            Value::Null => return Ok(Value::Null),
            _ => return Err(PathError::NotReference(segment.clone())),
        }
    }
    Ok(Value::Null)
}

fn add_values(left: Value, right: Value) -> std::result::Result<Value, String> {
    match (left, right) {
        (Value::Null, v) | (v, Value::Null) => Ok(v),
        (Value::Int(a), Value::Int(b)) => a
            .checked_add(b)
            .map(Value::Int)
            .ok_or_else(|| "integer overflow".to_string()),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(a as f64 + b)),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + b as f64)),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
        (Value::Text(a), b) if is_scalar(&b) => Ok(Value::Text(format!("{}{}", a, b))),
        (a, Value::Text(b)) if is_scalar(&a) => Ok(Value::Text(format!("{}{}", a, b))),
        (a, b) => Err(format!(
            "cannot add {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(
        value,
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Text(_) | Value::Date(_)
    )
}
