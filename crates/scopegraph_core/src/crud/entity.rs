//! Entity categories and their declared relations.

use crate::index::Schema;
use crate::types::Category;
use scopegraph_codec::BucketHandler;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// A record type stored in the graph.
///
/// Records are serialized as CBOR; `id` must be stable for the lifetime of
/// the record.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The record's identifier within its category.
    fn id(&self) -> &str;
}

/// Ids extracted from a record.
pub type IdsFn<T> = fn(&T) -> Vec<String>;

/// How a record contributes edges to the graph.
pub enum Relation<T> {
    /// The record points to these ids of `bucket`.
    ///
    /// On upsert the record's forward edges into `bucket` are replaced.
    Children {
        /// Bucket of the children.
        bucket: BucketHandler,
        /// Child ids.
        ids: IdsFn<T>,
    },
    /// These ids of `bucket` point to the record.
    ///
    /// On upsert the record's backward edges from `bucket` are replaced.
    Parents {
        /// Bucket of the parents.
        bucket: BucketHandler,
        /// Parent ids.
        ids: IdsFn<T>,
    },
    /// The record is an edge whose id is an
    /// [`EdgeId`](scopegraph_codec::EdgeId): upserting it adds
    /// `parent -> child`, deleting it removes that edge.
    Link {
        /// Bucket of the edge's parent endpoint.
        parent: BucketHandler,
        /// Bucket of the edge's child endpoint.
        child: BucketHandler,
    },
}

impl<T> Clone for Relation<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Relation<T> {}

impl<T> fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Children { bucket, .. } => f.debug_struct("Children").field("bucket", bucket).finish(),
            Self::Parents { bucket, .. } => f.debug_struct("Parents").field("bucket", bucket).finish(),
            Self::Link { parent, child } => f
                .debug_struct("Link")
                .field("parent", parent)
                .field("child", child)
                .finish(),
        }
    }
}

/// Everything needed to store and index one category.
pub struct CategoryDef<T> {
    /// The category.
    pub category: Category,
    /// Bucket holding the records.
    pub bucket: BucketHandler,
    /// Edges the records contribute.
    pub relations: Vec<Relation<T>>,
    /// Searchable fields; `None` leaves the category unindexed.
    pub schema: Option<Schema<T>>,
}

impl<T> CategoryDef<T> {
    /// A category without relations or index.
    #[must_use]
    pub fn new(category: Category, bucket: BucketHandler) -> Self {
        Self {
            category,
            bucket,
            relations: Vec::new(),
            schema: None,
        }
    }

    /// Adds a relation.
    #[must_use]
    pub fn relation(mut self, relation: Relation<T>) -> Self {
        self.relations.push(relation);
        self
    }

    /// Attaches a search schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema<T>) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl<T> fmt::Debug for CategoryDef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CategoryDef")
            .field("category", &self.category)
            .field("bucket", &self.bucket)
            .field("relations", &self.relations)
            .field("indexed", &self.schema.is_some())
            .finish()
    }
}
