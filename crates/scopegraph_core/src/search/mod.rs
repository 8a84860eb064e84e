//! Queries and the searcher stack.
//!
//! A category searcher is a [`CategorySearcher`] or [`CompoundSearcher`]
//! wrapped by [`SearcherChain`]: scope filtering innermost, then
//! pagination, then default sorting.

mod chain;
mod compound;
mod paginated;
mod query;
mod result;
mod searcher;
mod sorted;
mod transformation;

pub use chain::SearcherChain;
pub use compound::{CompoundSearcher, SearchSpec};
pub use paginated::{PaginatedSearcher, SortSource};
pub use query::{Pagination, Predicate, Query, QueryBuilder, SortField, SortOption};
pub use result::{by_score, ids, SearchResult};
pub use searcher::{CategorySearcher, Searcher};
pub use sorted::DefaultSortSearcher;
pub use transformation::{GraphTransformation, Step, TransformMemo};
