//! Hand-written field tables per category.

use crate::error::{CoreError, CoreResult};
use crate::index::{Document, FieldValue};
use crate::types::Category;
use std::collections::BTreeMap;
use std::fmt;

/// How a field's values are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Whole-value match: exact, prefix or wildcard, case-insensitive.
    Keyword,
    /// Tokenized match: every query token must occur.
    Text,
    /// Numeric comparison or range.
    Numeric,
    /// `true` / `false`.
    Bool,
}

/// Extracts the values of one field from a record.
pub type ExtractFn<T> = fn(&T) -> Vec<FieldValue>;

/// One searchable field.
pub struct FieldDef<T> {
    /// Display label, unique per category ignoring case.
    pub label: &'static str,
    /// Match semantics.
    pub kind: FieldKind,
    /// Value accessor.
    pub extract: ExtractFn<T>,
}

impl<T> fmt::Debug for FieldDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDef")
            .field("label", &self.label)
            .field("kind", &self.kind)
            .finish()
    }
}

/// The searchable fields of a category.
pub struct Schema<T> {
    category: Category,
    fields: Vec<FieldDef<T>>,
}

impl<T> Schema<T> {
    /// An empty schema.
    #[must_use]
    pub fn new(category: Category) -> Self {
        Self {
            category,
            fields: Vec::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn field(mut self, label: &'static str, kind: FieldKind, extract: ExtractFn<T>) -> Self {
        self.fields.push(FieldDef {
            label,
            kind,
            extract,
        });
        self
    }

    /// The category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// The fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[FieldDef<T>] {
        &self.fields
    }

    /// Checks the table and derives the category's options map.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] for empty or duplicate
    /// labels.
    pub fn validate(&self) -> CoreResult<OptionsMap> {
        let mut options = OptionsMap::new(self.category);
        for field in &self.fields {
            if field.label.trim().is_empty() {
                return Err(CoreError::invalid_configuration(format!(
                    "{}: empty field label",
                    self.category
                )));
            }
            if options.contains(field.label) {
                return Err(CoreError::invalid_configuration(format!(
                    "{}: duplicate field label {:?}",
                    self.category, field.label
                )));
            }
            options.insert(field.label, field.kind);
        }
        Ok(options)
    }

    /// Projects `entity` into a document.
    #[must_use]
    pub fn project(&self, id: &str, entity: &T) -> Document {
        let mut doc = Document::new(id);
        for field in &self.fields {
            doc.insert(field.label, (field.extract)(entity));
        }
        doc
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("category", &self.category)
            .field("fields", &self.fields)
            .finish()
    }
}

/// A field as seen by the query engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldOptions {
    /// Display label.
    pub label: String,
    /// Match semantics.
    pub kind: FieldKind,
}

/// Field label to options, for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionsMap {
    category: Category,
    fields: BTreeMap<String, FieldOptions>,
}

impl OptionsMap {
    /// An empty map.
    #[must_use]
    pub fn new(category: Category) -> Self {
        Self {
            category,
            fields: BTreeMap::new(),
        }
    }

    /// The category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    pub(crate) fn insert(&mut self, label: &str, kind: FieldKind) {
        self.fields.insert(
            label.to_lowercase(),
            FieldOptions {
                label: label.to_string(),
                kind,
            },
        );
    }

    /// Options of `label`, ignoring case.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&FieldOptions> {
        self.fields.get(&label.to_lowercase())
    }

    /// Whether `label` is known, ignoring case.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Display labels, sorted by lowercase label.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.values().map(|field| field.label.as_str())
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Image {
        name: String,
        cvss: f64,
    }

    fn schema() -> Schema<Image> {
        Schema::new(Category::new("image"))
            .field("Image", FieldKind::Keyword, |i: &Image| vec![i.name.as_str().into()])
            .field("Image Top CVSS", FieldKind::Numeric, |i: &Image| vec![i.cvss.into()])
    }

    #[test]
    fn validate_builds_case_insensitive_options() {
        let options = schema().validate().unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options.get("image top cvss").unwrap().kind, FieldKind::Numeric);
        assert_eq!(options.get("IMAGE").unwrap().label, "Image");
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        let schema = schema().field("IMAGE", FieldKind::Text, |_: &Image| Vec::new());
        assert!(matches!(
            schema.validate(),
            Err(CoreError::InvalidConfiguration { .. })
        ));
        let empty = Schema::new(Category::new("x")).field(" ", FieldKind::Text, |_: &Image| Vec::new());
        assert!(empty.validate().is_err());
    }

    #[test]
    fn project_extracts_fields() {
        let image = Image {
            name: "nginx:1.25".into(),
            cvss: 9.8,
        };
        let doc = schema().project("img-1", &image);
        assert_eq!(doc.id, "img-1");
        assert_eq!(doc.get("Image"), &[FieldValue::Text("nginx:1.25".into())]);
        assert_eq!(doc.get("image top cvss")[0].as_number(), Some(9.8));
    }
}
