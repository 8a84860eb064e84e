//! Structured queries.

use std::collections::BTreeSet;
use std::fmt;

/// A query predicate over field labels.
///
/// Field values are matched according to the field's kind:
///
/// | Value        | Keyword            | Text              | Numeric        |
/// |--------------|--------------------|-------------------|----------------|
/// | `*`          | field present      | field present     | field present  |
/// | `"x y"`      | exact, any case    | all tokens        | -              |
/// | `abc`        | prefix, any case   | all tokens        | `= abc`        |
/// | `abc*`       | prefix, any case   | all tokens        | -              |
/// | `>=7`, `<3`  | -                  | -                 | comparison     |
/// | `1-5`        | -                  | -                 | inclusive range|
///
/// Bool fields take `true` or `false`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Every document.
    MatchAll,
    /// No document.
    MatchNone,
    /// Documents whose field `label` matches `value`.
    Field {
        /// Field label, case-insensitive.
        label: String,
        /// Raw match expression.
        value: String,
    },
    /// Documents matching every clause.
    And(Vec<Predicate>),
    /// Documents matching any clause.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// A field clause.
    pub fn field(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Field {
            label: label.into(),
            value: value.into(),
        }
    }

    /// Lowercased labels referenced anywhere in the predicate.
    #[must_use]
    pub fn labels(&self) -> BTreeSet<String> {
        let mut labels = BTreeSet::new();
        self.collect_labels(&mut labels);
        labels
    }

    fn collect_labels(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::MatchAll | Self::MatchNone => {}
            Self::Field { label, .. } => {
                out.insert(label.to_lowercase());
            }
            Self::And(clauses) | Self::Or(clauses) => {
                for clause in clauses {
                    clause.collect_labels(out);
                }
            }
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, clauses: &[Predicate], sep: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, clause) in clauses.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{clause}")?;
            }
            f.write_str(")")
        }
        match self {
            Self::MatchAll => f.write_str("*"),
            Self::MatchNone => f.write_str("!*"),
            Self::Field { label, value } => write!(f, "{label}:{value}"),
            Self::And(clauses) => join(f, clauses, " + "),
            Self::Or(clauses) => join(f, clauses, " | "),
        }
    }
}

/// What results are ordered by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortField {
    /// Relevance score.
    Score,
    /// A document field, by its first value.
    Field(String),
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortOption {
    /// The key.
    pub field: SortField,
    /// Descending instead of ascending (for scores: ascending instead of
    /// descending).
    pub reversed: bool,
}

impl SortOption {
    /// Sort by score, best first.
    #[must_use]
    pub fn score() -> Self {
        Self {
            field: SortField::Score,
            reversed: false,
        }
    }

    /// Sort by a field, ascending.
    pub fn field(label: impl Into<String>) -> Self {
        Self {
            field: SortField::Field(label.into()),
            reversed: false,
        }
    }

    /// Flips the direction.
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.reversed = !self.reversed;
        self
    }
}

/// Offset/limit slicing plus ordering.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pagination {
    /// Results to skip.
    pub offset: usize,
    /// Maximum results; `None` is unbounded.
    pub limit: Option<usize>,
    /// Sort keys, most significant first.
    pub sort: Vec<SortOption>,
}

impl Pagination {
    /// A page of `limit` results starting at `offset`.
    #[must_use]
    pub fn page(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
            sort: Vec::new(),
        }
    }

    /// Adds a sort key.
    #[must_use]
    pub fn sort_by(mut self, option: SortOption) -> Self {
        self.sort.push(option);
        self
    }
}

/// A predicate plus optional pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// What to match.
    pub predicate: Predicate,
    /// How to slice and order the results.
    pub pagination: Option<Pagination>,
}

impl Query {
    /// A query without pagination.
    #[must_use]
    pub fn new(predicate: Predicate) -> Self {
        Self {
            predicate,
            pagination: None,
        }
    }

    /// Matches everything.
    #[must_use]
    pub fn match_all() -> Self {
        Self::new(Predicate::MatchAll)
    }

    /// Matches nothing.
    #[must_use]
    pub fn match_none() -> Self {
        Self::new(Predicate::MatchNone)
    }

    /// Attaches pagination.
    #[must_use]
    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// A copy without pagination.
    #[must_use]
    pub fn without_pagination(&self) -> Self {
        Self::new(self.predicate.clone())
    }
}

impl From<Predicate> for Query {
    fn from(predicate: Predicate) -> Self {
        Self::new(predicate)
    }
}

/// Builds conjunctive queries.
///
/// ```
/// use scopegraph_core::search::{Predicate, QueryBuilder};
///
/// let query = QueryBuilder::new()
///     .add_exact_match("CVE", "CVE-2023-0001")
///     .add_strings("Cluster", ["prod", "staging"])
///     .build();
/// assert!(matches!(query.predicate, Predicate::And(_)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    clauses: Vec<Predicate>,
    pagination: Option<Pagination>,
}

impl QueryBuilder {
    /// An empty builder; builds a match-all query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `label` to match any of `values`.
    #[must_use]
    pub fn add_strings<I, S>(mut self, label: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut alternatives: Vec<Predicate> = values
            .into_iter()
            .map(|value| Predicate::field(label, value))
            .collect();
        match alternatives.len() {
            0 => self.clauses.push(Predicate::MatchNone),
            1 => self.clauses.extend(alternatives.pop()),
            _ => self.clauses.push(Predicate::Or(alternatives)),
        }
        self
    }

    /// Requires `label` to equal `value` exactly (case-insensitive).
    #[must_use]
    pub fn add_exact_match(mut self, label: &str, value: &str) -> Self {
        self.clauses
            .push(Predicate::field(label, format!("\"{value}\"")));
        self
    }

    /// Requires a bool field to be `value`.
    #[must_use]
    pub fn add_bool(mut self, label: &str, value: bool) -> Self {
        self.clauses.push(Predicate::field(label, value.to_string()));
        self
    }

    /// Adds an arbitrary clause.
    #[must_use]
    pub fn add_predicate(mut self, predicate: Predicate) -> Self {
        self.clauses.push(predicate);
        self
    }

    /// Sets pagination.
    #[must_use]
    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Builds the query.
    #[must_use]
    pub fn build(mut self) -> Query {
        let predicate = match self.clauses.len() {
            0 => Predicate::MatchAll,
            1 => self.clauses.remove(0),
            _ => Predicate::And(self.clauses),
        };
        Query {
            predicate,
            pagination: self.pagination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_shapes() {
        assert_eq!(QueryBuilder::new().build(), Query::match_all());
        assert_eq!(
            QueryBuilder::new().add_strings("Image", ["nginx"]).build().predicate,
            Predicate::field("Image", "nginx")
        );
        assert_eq!(
            QueryBuilder::new()
                .add_strings("Image", Vec::<String>::new())
                .build()
                .predicate,
            Predicate::MatchNone
        );
    }

    #[test]
    fn labels_are_collected_lowercase() {
        let query = QueryBuilder::new()
            .add_exact_match("CVE", "CVE-1")
            .add_strings("Component", ["a", "b"])
            .build();
        let labels: Vec<_> = query.predicate.labels().into_iter().collect();
        assert_eq!(labels, vec!["component", "cve"]);
        assert_eq!(
            query.predicate.to_string(),
            "(CVE:\"CVE-1\" + (Component:a | Component:b))"
        );
    }

    #[test]
    fn without_pagination_keeps_predicate() {
        let query = Query::new(Predicate::field("Image", "x"))
            .with_pagination(Pagination::page(5, 10).sort_by(SortOption::field("Image")));
        let stripped = query.without_pagination();
        assert_eq!(stripped.pagination, None);
        assert_eq!(stripped.predicate, query.predicate);
    }
}
