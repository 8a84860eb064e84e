//! Turning graph ids into access scopes.

use crate::crud::{Entity, Reader};
use crate::error::CoreResult;
use crate::graph::Transaction;
use crate::sac::AccessScope;
use crate::search::GraphTransformation;
use scopegraph_codec::BucketHandler;
use std::fmt;
use std::sync::Arc;

/// Maps an id of some category onto the scope it denotes.
pub trait ScopeResolver: Send + Sync {
    /// The scope of `id`, or `None` when `id` has no stored record.
    ///
    /// # Errors
    ///
    /// Fails on undecodable records.
    fn resolve(&self, txn: &Transaction<'_>, id: &str) -> CoreResult<Option<AccessScope>>;
}

/// Resolves cluster ids to cluster scopes.
#[derive(Debug, Clone, Copy)]
pub struct ClusterScopeResolver {
    bucket: BucketHandler,
}

impl ClusterScopeResolver {
    /// Resolver over the cluster records of `bucket`.
    #[must_use]
    pub const fn new(bucket: BucketHandler) -> Self {
        Self { bucket }
    }
}

impl ScopeResolver for ClusterScopeResolver {
    fn resolve(&self, txn: &Transaction<'_>, id: &str) -> CoreResult<Option<AccessScope>> {
        if txn.exists(&self.bucket.get_key(id))? {
            Ok(Some(AccessScope::Cluster(id.to_string())))
        } else {
            Ok(None)
        }
    }
}

/// Resolves ids by reading their record and projecting its scope.
pub struct RecordScopeResolver<T> {
    reader: Reader<T>,
    scope: fn(&T) -> AccessScope,
}

impl<T: Entity> RecordScopeResolver<T> {
    /// Resolver reading records of `bucket`.
    #[must_use]
    pub fn new(bucket: BucketHandler, scope: fn(&T) -> AccessScope) -> Self {
        Self {
            reader: Reader::new(bucket),
            scope,
        }
    }
}

impl<T: Entity> ScopeResolver for RecordScopeResolver<T> {
    fn resolve(&self, txn: &Transaction<'_>, id: &str) -> CoreResult<Option<AccessScope>> {
        Ok(self.reader.read_in(txn, id)?.map(|record| (self.scope)(&record)))
    }
}

impl<T> fmt::Debug for RecordScopeResolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordScopeResolver")
            .field("reader", &self.reader)
            .finish_non_exhaustive()
    }
}

/// A path from resource ids to scope-bearing ids plus the resolver for the
/// latter.
#[derive(Clone)]
pub struct ScopeTransform {
    /// Walk from the resource to scope-bearing records.
    pub path: GraphTransformation,
    /// Resolves the ids the walk ends on.
    pub resolver: Arc<dyn ScopeResolver>,
}

impl ScopeTransform {
    /// Pairs a path with a resolver.
    #[must_use]
    pub fn new(path: GraphTransformation, resolver: Arc<dyn ScopeResolver>) -> Self {
        Self { path, resolver }
    }
}

impl fmt::Debug for ScopeTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeTransform")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
