//! Parsing of field match expressions.

use crate::error::{CoreError, CoreResult};
use crate::index::tokenizer::TokenizerConfig;
use crate::index::{FieldKind, FieldValue};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
}

/// A parsed match expression, bound to a field kind.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Matcher {
    Any,
    Exact(String),
    Prefix(String),
    Tokens(Vec<String>),
    Compare(Comparison, f64),
    Range(f64, f64),
    Bool(bool),
}

impl Matcher {
    pub(crate) fn parse(kind: FieldKind, label: &str, raw: &str, tokenizer: &TokenizerConfig) -> CoreResult<Self> {
        let value = raw.trim();
        if value == "*" {
            return Ok(Self::Any);
        }
        if value.is_empty() {
            return Err(CoreError::invalid_query(format!("empty value for field {label}")));
        }
        match kind {
            FieldKind::Keyword => Ok(match unquote(value) {
                Some(exact) => Self::Exact(exact.to_lowercase()),
                None => Self::Prefix(value.trim_end_matches('*').to_lowercase()),
            }),
            FieldKind::Text => {
                let text = unquote(value).unwrap_or(value);
                let tokens = tokenizer.tokenize(text.trim_end_matches('*'));
                if tokens.is_empty() {
                    return Err(CoreError::invalid_query(format!(
                        "no searchable tokens in {raw:?} for field {label}"
                    )));
                }
                Ok(Self::Tokens(tokens))
            }
            FieldKind::Numeric => parse_numeric(label, value),
            FieldKind::Bool => match value.to_ascii_lowercase().as_str() {
                "true" => Ok(Self::Bool(true)),
                "false" => Ok(Self::Bool(false)),
                _ => Err(CoreError::invalid_query(format!(
                    "field {label} expects true or false, got {raw:?}"
                ))),
            },
        }
    }

    /// Whether one stored value satisfies the matcher.
    pub(crate) fn matches(&self, value: &FieldValue, tokenizer: &TokenizerConfig) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Exact(term), FieldValue::Text(text)) => text.to_lowercase() == *term,
            (Self::Prefix(term), FieldValue::Text(text)) => text.to_lowercase().starts_with(term.as_str()),
            (Self::Tokens(tokens), FieldValue::Text(text)) => {
                let present = tokenizer.tokenize(text);
                tokens.iter().all(|token| present.contains(token))
            }
            (Self::Compare(op, bound), FieldValue::Number(n)) => match op {
                Comparison::Lt => n < bound,
                Comparison::Le => n <= bound,
                Comparison::Gt => n > bound,
                Comparison::Ge => n >= bound,
                Comparison::Eq => (n - bound).abs() < f64::EPSILON,
            },
            (Self::Range(low, high), FieldValue::Number(n)) => low <= n && n <= high,
            (Self::Bool(wanted), FieldValue::Bool(b)) => wanted == b,
            _ => false,
        }
    }
}

fn unquote(value: &str) -> Option<&str> {
    value
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
}

fn parse_number(label: &str, raw: &str) -> CoreResult<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| CoreError::invalid_query(format!("field {label} expects a number, got {raw:?}")))
}

fn parse_numeric(label: &str, value: &str) -> CoreResult<Matcher> {
    for (prefix, op) in [
        (">=", Comparison::Ge),
        ("<=", Comparison::Le),
        (">", Comparison::Gt),
        ("<", Comparison::Lt),
        ("=", Comparison::Eq),
    ] {
        if let Some(rest) = value.strip_prefix(prefix) {
            return Ok(Matcher::Compare(op, parse_number(label, rest)?));
        }
    }
    // A leading '-' is a sign, not a range separator.
    if let Some((split, _)) = value.char_indices().skip(1).find(|(_, c)| *c == '-') {
        let low = parse_number(label, &value[..split])?;
        let high = parse_number(label, &value[split + 1..])?;
        if low > high {
            return Err(CoreError::invalid_query(format!(
                "empty range {value:?} for field {label}"
            )));
        }
        return Ok(Matcher::Range(low, high));
    }
    Ok(Matcher::Compare(Comparison::Eq, parse_number(label, value)?))
}
