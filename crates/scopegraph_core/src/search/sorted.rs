//! Default ordering for queries that bring none.

use crate::context::RequestContext;
use crate::error::CoreResult;
use crate::search::{Query, SearchResult, Searcher, SortOption};
use std::fmt;
use std::sync::Arc;

/// Fills in `default` sort keys when a query has no sort of its own.
pub struct DefaultSortSearcher {
    inner: Arc<dyn Searcher>,
    default: Vec<SortOption>,
}

impl DefaultSortSearcher {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Searcher>, default: Vec<SortOption>) -> Self {
        Self { inner, default }
    }

    fn with_default(&self, query: &Query) -> Query {
        if self.default.is_empty() {
            return query.clone();
        }
        let mut pagination = query.pagination.clone().unwrap_or_default();
        if pagination.sort.is_empty() {
            pagination.sort.clone_from(&self.default);
        }
        query.clone().with_pagination(pagination)
    }
}

impl Searcher for DefaultSortSearcher {
    fn search(&self, ctx: &RequestContext, query: &Query) -> CoreResult<Vec<SearchResult>> {
        self.inner.search(ctx, &self.with_default(query))
    }

    fn count(&self, ctx: &RequestContext, query: &Query) -> CoreResult<usize> {
        self.inner.count(ctx, query)
    }
}

impl fmt::Debug for DefaultSortSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSortSearcher")
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::Pagination;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Option<Pagination>>>,
    }

    impl Searcher for Recorder {
        fn search(&self, _: &RequestContext, query: &Query) -> CoreResult<Vec<SearchResult>> {
            self.seen.lock().push(query.pagination.clone());
            Ok(Vec::new())
        }
    }

    #[test]
    fn default_applies_only_without_explicit_sort() {
        let recorder = Arc::new(Recorder::default());
        let searcher = DefaultSortSearcher::new(recorder.clone(), vec![SortOption::field("Name")]);
        let ctx = RequestContext::unrestricted();

        searcher.search(&ctx, &Query::match_all()).unwrap();
        searcher
            .search(
                &ctx,
                &Query::match_all().with_pagination(Pagination::page(2, 5)),
            )
            .unwrap();
        searcher
            .search(
                &ctx,
                &Query::match_all()
                    .with_pagination(Pagination::default().sort_by(SortOption::score())),
            )
            .unwrap();

        let seen = recorder.seen.lock();
        assert_eq!(seen[0], Some(Pagination::default().sort_by(SortOption::field("Name"))));
        assert_eq!(seen[1], Some(Pagination::page(2, 5).sort_by(SortOption::field("Name"))));
        assert_eq!(seen[2], Some(Pagination::default().sort_by(SortOption::score())));
    }
}
