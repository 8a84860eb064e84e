//! Sorting and offset/limit slicing over an inner searcher.

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::index::{FieldValue, Indexer};
use crate::search::{Query, SearchResult, Searcher, SortField, SortOption};
use crate::types::Category;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Where field sort keys are read from.
#[derive(Debug, Clone)]
pub struct SortSource {
    indexer: Arc<Indexer>,
    category: Category,
}

impl SortSource {
    /// Sort keys from the documents of `category`.
    #[must_use]
    pub fn new(indexer: Arc<Indexer>, category: Category) -> Self {
        Self { indexer, category }
    }

    /// The category sort keys come from.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    pub(crate) fn validate(&self, sort: &[SortOption]) -> CoreResult<()> {
        let options = self.indexer.options(self.category)?;
        for option in sort {
            if let SortField::Field(label) = &option.field {
                if !options.contains(label) {
                    return Err(CoreError::invalid_query(format!(
                        "cannot sort {} by unknown field {label:?}",
                        self.category
                    )));
                }
            }
        }
        Ok(())
    }

    fn key(&self, id: &str, label: &str) -> CoreResult<Option<SortValue>> {
        let doc = self.indexer.document(self.category, id)?;
        Ok(doc.and_then(|doc| doc.get(label).first().map(SortValue::from)))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&FieldValue> for SortValue {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Bool(b) => Self::Bool(*b),
            FieldValue::Number(n) => Self::Number(*n),
            FieldValue::Text(s) => Self::Text(s.to_lowercase()),
        }
    }
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Number(_) => 1,
            Self::Text(_) => 2,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Applies a query's pagination to the unpaginated results of `inner`.
///
/// Sorting is stable: results equal under every sort key keep the inner
/// order. Documents without the sort field go last in either direction.
pub struct PaginatedSearcher {
    inner: Arc<dyn Searcher>,
    sort_source: Option<SortSource>,
}

impl PaginatedSearcher {
    /// Wraps `inner`; field sorts need a `sort_source`.
    #[must_use]
    pub fn new(inner: Arc<dyn Searcher>, sort_source: Option<SortSource>) -> Self {
        Self { inner, sort_source }
    }

    fn sort(&self, results: Vec<SearchResult>, sort: &[SortOption]) -> CoreResult<Vec<SearchResult>> {
        let has_fields = sort.iter().any(|o| matches!(o.field, SortField::Field(_)));
        if has_fields {
            match &self.sort_source {
                Some(source) => source.validate(sort)?,
                None => {
                    return Err(CoreError::invalid_query(
                        "field sort requested on a searcher without sortable fields",
                    ))
                }
            }
        }

        let mut keyed = Vec::with_capacity(results.len());
        for result in results {
            let mut keys = Vec::with_capacity(sort.len());
            for option in sort {
                keys.push(match (&option.field, &self.sort_source) {
                    (SortField::Field(label), Some(source)) => source.key(&result.id, label)?,
                    _ => None,
                });
            }
            keyed.push((result, keys));
        }

        keyed.sort_by(|(a, a_keys), (b, b_keys)| {
            for (i, option) in sort.iter().enumerate() {
                let ord = match option.field {
                    SortField::Score => {
                        let ord = b.score.total_cmp(&a.score);
                        if option.reversed {
                            ord.reverse()
                        } else {
                            ord
                        }
                    }
                    SortField::Field(_) => match (&a_keys[i], &b_keys[i]) {
                        (Some(x), Some(y)) if option.reversed => y.compare(x),
                        (Some(x), Some(y)) => x.compare(y),
                        (Some(_), None) => Ordering::Less,
                        (None, Some(_)) => Ordering::Greater,
                        (None, None) => Ordering::Equal,
                    },
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(result, _)| result).collect())
    }
}

impl Searcher for PaginatedSearcher {
    fn search(&self, ctx: &RequestContext, query: &Query) -> CoreResult<Vec<SearchResult>> {
        let Some(pagination) = &query.pagination else {
            return self.inner.search(ctx, query);
        };
        let mut results = self.inner.search(ctx, &query.without_pagination())?;
        if !pagination.sort.is_empty() {
            results = self.sort(results, &pagination.sort)?;
        }
        Ok(results
            .into_iter()
            .skip(pagination.offset)
            .take(pagination.limit.unwrap_or(usize::MAX))
            .collect())
    }

    fn count(&self, ctx: &RequestContext, query: &Query) -> CoreResult<usize> {
        self.inner.count(ctx, &query.without_pagination())
    }
}

impl fmt::Debug for PaginatedSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaginatedSearcher")
            .field("sort_source", &self.sort_source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, FieldKind, Schema};
    use crate::search::{ids, CategorySearcher, Pagination, Predicate};

    const DEPLOYMENT: Category = Category::new("deployment");

    fn none(_: &u32) -> Vec<FieldValue> {
        Vec::new()
    }

    fn searcher() -> PaginatedSearcher {
        let indexer = Arc::new(Indexer::new());
        let options = Schema::<u32>::new(DEPLOYMENT)
            .field("Deployment", FieldKind::Keyword, none)
            .field("Priority", FieldKind::Numeric, none)
            .validate()
            .unwrap();
        indexer.register(options).unwrap();
        indexer
            .add_documents(
                DEPLOYMENT,
                vec![
                    Document::new("d1")
                        .with("Deployment", vec!["Web".into()])
                        .with("Priority", vec![3i64.into()]),
                    Document::new("d2")
                        .with("Deployment", vec!["api".into()])
                        .with("Priority", vec![1i64.into()]),
                    Document::new("d3").with("Deployment", vec!["db".into()]),
                    Document::new("d4")
                        .with("Deployment", vec!["cache".into()])
                        .with("Priority", vec![2i64.into()]),
                ],
            )
            .unwrap();
        PaginatedSearcher::new(
            Arc::new(CategorySearcher::new(indexer.clone(), DEPLOYMENT)),
            Some(SortSource::new(indexer, DEPLOYMENT)),
        )
    }

    fn run(searcher: &PaginatedSearcher, pagination: Pagination) -> CoreResult<Vec<String>> {
        let query = Query::match_all().with_pagination(pagination);
        Ok(ids(&searcher.search(&RequestContext::unrestricted(), &query)?))
    }

    #[test]
    fn sorts_by_field_with_missing_last() {
        let searcher = searcher();
        let unbounded = Pagination::default();
        assert_eq!(
            run(&searcher, unbounded.clone().sort_by(SortOption::field("Priority"))).unwrap(),
            vec!["d2", "d4", "d1", "d3"]
        );
        assert_eq!(
            run(
                &searcher,
                unbounded.clone().sort_by(SortOption::field("priority").reversed())
            )
            .unwrap(),
            vec!["d1", "d4", "d2", "d3"]
        );
        assert_eq!(
            run(&searcher, unbounded.sort_by(SortOption::field("Deployment"))).unwrap(),
            vec!["d2", "d4", "d3", "d1"]
        );
    }

    #[test]
    fn slices_after_sorting() {
        let searcher = searcher();
        let page = Pagination::page(1, 2).sort_by(SortOption::field("Priority"));
        assert_eq!(run(&searcher, page).unwrap(), vec!["d4", "d1"]);
        assert!(run(&searcher, Pagination::page(10, 2)).unwrap().is_empty());
        assert_eq!(
            searcher
                .count(
                    &RequestContext::unrestricted(),
                    &Query::match_all().with_pagination(Pagination::page(0, 1))
                )
                .unwrap(),
            4
        );
    }

    #[test]
    fn unknown_sort_field_is_rejected() {
        let searcher = searcher();
        let err = run(&searcher, Pagination::default().sort_by(SortOption::field("Bogus"))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery { .. }));

        let bare = PaginatedSearcher::new(Arc::clone(&searcher.inner), None);
        let err = run(&bare, Pagination::default().sort_by(SortOption::field("Priority"))).unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery { .. }));
        let query = Query::new(Predicate::MatchAll).with_pagination(Pagination::page(0, 2));
        assert_eq!(bare.search(&RequestContext::unrestricted(), &query).unwrap().len(), 2);
    }
}
