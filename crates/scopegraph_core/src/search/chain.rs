//! Assembles the decorator stack of a category searcher.

use crate::error::{CoreError, CoreResult};
use crate::sac::{FilteredSearcher, ScopeFilter};
use crate::search::{DefaultSortSearcher, PaginatedSearcher, Searcher, SortField, SortOption, SortSource};
use std::sync::Arc;

/// Builds `DefaultSort(Paginated(Filtered(base)))`.
///
/// Scope filtering always runs on the full result set, before any slicing
/// or sorting, so a page never contains hidden ids and never comes up short
/// because of them.
pub struct SearcherChain {
    base: Arc<dyn Searcher>,
    filter: Option<Arc<ScopeFilter>>,
    sort_source: Option<SortSource>,
    default_sort: Vec<SortOption>,
}

impl SearcherChain {
    /// Starts a chain over `base`.
    #[must_use]
    pub fn new(base: Arc<dyn Searcher>) -> Self {
        Self {
            base,
            filter: None,
            sort_source: None,
            default_sort: Vec::new(),
        }
    }

    /// Restricts results to ids visible to the caller.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<ScopeFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Enables field sorts.
    #[must_use]
    pub fn with_sort_source(mut self, source: SortSource) -> Self {
        self.sort_source = Some(source);
        self
    }

    /// Appends a default sort key.
    #[must_use]
    pub fn with_default_sort(mut self, option: SortOption) -> Self {
        self.default_sort.push(option);
        self
    }

    /// Builds the stack.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] if a default sort names
    /// a field that the sort source does not index.
    pub fn build(self) -> CoreResult<Arc<dyn Searcher>> {
        let sorts_fields = self
            .default_sort
            .iter()
            .any(|o| matches!(o.field, SortField::Field(_)));
        match &self.sort_source {
            Some(source) => source
                .validate(&self.default_sort)
                .map_err(|err| CoreError::invalid_configuration(err.to_string()))?,
            None if sorts_fields => {
                return Err(CoreError::invalid_configuration(
                    "default field sort without a sort source",
                ))
            }
            None => {}
        }

        let mut searcher = self.base;
        if let Some(filter) = self.filter {
            searcher = Arc::new(FilteredSearcher::new(searcher, filter));
        }
        searcher = Arc::new(PaginatedSearcher::new(searcher, self.sort_source));
        if !self.default_sort.is_empty() {
            searcher = Arc::new(DefaultSortSearcher::new(searcher, self.default_sort));
        }
        Ok(searcher)
    }
}
