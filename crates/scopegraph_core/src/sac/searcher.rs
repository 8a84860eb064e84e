//! Scope filtering of search results.

use crate::context::RequestContext;
use crate::error::CoreResult;
use crate::sac::{AccessMode, ScopeFilter};
use crate::search::{Query, SearchResult, Searcher};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Drops results the caller may not read.
///
/// Callers with global read access get the inner results untouched. For
/// everyone else the inner search runs without pagination and hidden ids are
/// removed, keeping the inner order.
pub struct FilteredSearcher {
    inner: Arc<dyn Searcher>,
    filter: Arc<ScopeFilter>,
}

impl FilteredSearcher {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Searcher>, filter: Arc<ScopeFilter>) -> Self {
        Self { inner, filter }
    }
}

impl Searcher for FilteredSearcher {
    fn search(&self, ctx: &RequestContext, query: &Query) -> CoreResult<Vec<SearchResult>> {
        if self.filter.is_globally_allowed(ctx, AccessMode::Read) {
            return self.inner.search(ctx, query);
        }
        let results = self.inner.search(ctx, &query.without_pagination())?;
        let ids: Vec<String> = results.iter().map(|r| r.id.clone()).collect();
        let visible: BTreeSet<String> = self
            .filter
            .filter(ctx, &ids, AccessMode::Read)?
            .into_iter()
            .collect();
        Ok(results
            .into_iter()
            .filter(|result| visible.contains(&result.id))
            .collect())
    }

    fn count(&self, ctx: &RequestContext, query: &Query) -> CoreResult<usize> {
        if self.filter.is_globally_allowed(ctx, AccessMode::Read) {
            return self.inner.count(ctx, query);
        }
        Ok(self.search(ctx, &query.without_pagination())?.len())
    }
}

impl fmt::Debug for FilteredSearcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredSearcher")
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}
