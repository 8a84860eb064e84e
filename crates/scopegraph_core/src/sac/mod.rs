//! Scoped access control.
//!
//! Every record maps, through one or more graph walks, onto the cluster and
//! namespace scopes it lives in. A caller sees a record when any of those
//! scopes is allowed by the caller's [`AccessScopeChecker`].

mod filter;
mod resolver;
mod scope;
mod searcher;
mod store;

pub use filter::ScopeFilter;
pub use resolver::{ClusterScopeResolver, RecordScopeResolver, ScopeResolver, ScopeTransform};
pub use scope::{
    AccessMode, AccessScope, AccessScopeChecker, AllowAllChecker, DenyAllChecker, FixedScopeChecker,
    ResourceScope,
};
pub use searcher::FilteredSearcher;
pub use store::FilteredStore;
