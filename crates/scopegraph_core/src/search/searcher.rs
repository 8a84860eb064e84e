//! The searcher contract and the per-category searcher.

use crate::context::RequestContext;
use crate::error::CoreResult;
use crate::index::Indexer;
use crate::search::{Query, SearchResult};
use crate::types::Category;
use std::sync::Arc;

/// Executes queries against one category's id space.
pub trait Searcher: Send + Sync {
    /// Runs `query`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`](crate::CoreError::InvalidQuery)
    /// for unknown fields or bad values, and
    /// [`CoreError::Cancelled`](crate::CoreError::Cancelled) once the
    /// context is cancelled.
    fn search(&self, ctx: &RequestContext, query: &Query) -> CoreResult<Vec<SearchResult>>;

    /// Counts the results of `query`, ignoring pagination.
    ///
    /// # Errors
    ///
    /// Same as [`Searcher::search`].
    fn count(&self, ctx: &RequestContext, query: &Query) -> CoreResult<usize> {
        Ok(self.search(ctx, &query.without_pagination())?.len())
    }
}

/// Searches one category of an [`Indexer`].
///
/// Pagination is left to the decorators; results come back ordered by
/// score, then id.
#[derive(Debug, Clone)]
pub struct CategorySearcher {
    indexer: Arc<Indexer>,
    category: Category,
}

impl CategorySearcher {
    /// A searcher over `category`.
    #[must_use]
    pub fn new(indexer: Arc<Indexer>, category: Category) -> Self {
        Self { indexer, category }
    }

    /// The searched category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }
}

impl Searcher for CategorySearcher {
    fn search(&self, ctx: &RequestContext, query: &Query) -> CoreResult<Vec<SearchResult>> {
        self.indexer.search(ctx, self.category, &query.predicate)
    }

    fn count(&self, ctx: &RequestContext, query: &Query) -> CoreResult<usize> {
        self.indexer.count(ctx, self.category, &query.predicate)
    }
}
