//! Index documents.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One indexed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// A string, matched as keyword or text depending on the field.
    Text(String),
    /// A number.
    Number(f64),
    /// A flag.
    Bool(bool),
}

impl FieldValue {
    /// The number, for numeric values.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for FieldValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<f32> for FieldValue {
    fn from(value: f32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// The indexable projection of one record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    /// Id of the record.
    pub id: String,
    /// Values per lowercased field label.
    pub fields: BTreeMap<String, Vec<FieldValue>>,
}

impl Document {
    /// An empty document.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds values to a field.
    #[must_use]
    pub fn with(mut self, label: &str, values: Vec<FieldValue>) -> Self {
        self.insert(label, values);
        self
    }

    /// Adds values to a field; empty value lists are dropped.
    pub fn insert(&mut self, label: &str, values: Vec<FieldValue>) {
        if values.is_empty() {
            return;
        }
        self.fields
            .entry(label.to_lowercase())
            .or_default()
            .extend(values);
    }

    /// Values of a field.
    #[must_use]
    pub fn get(&self, label: &str) -> &[FieldValue] {
        self.fields
            .get(&label.to_lowercase())
            .map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_case_insensitive() {
        let doc = Document::new("d1").with("Image Sha", vec!["sha256:abc".into()]);
        assert_eq!(doc.get("image sha"), &[FieldValue::Text("sha256:abc".into())]);
        assert!(doc.get("missing").is_empty());
    }

    #[test]
    fn numbers_render_compactly() {
        assert_eq!(FieldValue::from(7.0).to_string(), "7");
        assert_eq!(FieldValue::from(7.5).to_string(), "7.5");
        assert_eq!(FieldValue::from(true).to_string(), "true");
    }
}
