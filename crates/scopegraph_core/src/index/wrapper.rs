//! Projection of graph writes into index updates.

use crate::crud::Entity;
use crate::error::CoreResult;
use crate::index::{Document, Indexer, Schema};
use crate::types::Category;
use scopegraph_codec::BucketHandler;
use std::fmt;
use std::sync::Arc;

/// Turns a stored record into its index document.
pub trait Wrapper<T>: Send + Sync {
    /// Category of the produced documents.
    fn category(&self) -> Category;

    /// Projects the record stored at `key`. A `None` entity yields a `None`
    /// document, which removes the id from the index.
    ///
    /// # Errors
    ///
    /// Fails if `key` does not belong to the category's bucket.
    fn wrap(&self, key: &[u8], entity: Option<&T>) -> CoreResult<(String, Option<Document>)>;
}

/// A [`Wrapper`] driven by a [`Schema`].
pub struct SchemaWrapper<T> {
    bucket: BucketHandler,
    schema: Schema<T>,
}

impl<T> SchemaWrapper<T> {
    /// Wraps records of `bucket` with `schema`.
    #[must_use]
    pub fn new(bucket: BucketHandler, schema: Schema<T>) -> Self {
        Self { bucket, schema }
    }

    /// The schema.
    #[must_use]
    pub fn schema(&self) -> &Schema<T> {
        &self.schema
    }
}

impl<T: Entity> Wrapper<T> for SchemaWrapper<T> {
    fn category(&self) -> Category {
        self.schema.category()
    }

    fn wrap(&self, key: &[u8], entity: Option<&T>) -> CoreResult<(String, Option<Document>)> {
        let id = self.bucket.get_id(key)?;
        let doc = entity.map(|entity| self.schema.project(&id, entity));
        Ok((id, doc))
    }
}

/// One committed change to mirror into the index.
#[derive(Debug)]
pub enum IndexChange<'a, T> {
    /// The record at `key` now holds `entity`.
    Upsert {
        /// Record key.
        key: Vec<u8>,
        /// New record.
        entity: &'a T,
    },
    /// The record at `key` was deleted.
    Delete {
        /// Record key.
        key: Vec<u8>,
    },
}

/// Applies a category's writes to the shared [`Indexer`].
pub struct IndexWrapper<T> {
    indexer: Arc<Indexer>,
    wrapper: Arc<dyn Wrapper<T>>,
}

impl<T: Entity> IndexWrapper<T> {
    /// Binds `wrapper` to `indexer`.
    pub fn new(indexer: Arc<Indexer>, wrapper: Arc<dyn Wrapper<T>>) -> Self {
        Self { indexer, wrapper }
    }

    /// The indexed category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.wrapper.category()
    }

    /// Indexes one record.
    ///
    /// # Errors
    ///
    /// Fails if wrapping fails or the category is not registered.
    pub fn add(&self, key: &[u8], entity: &T) -> CoreResult<()> {
        self.apply(&[IndexChange::Upsert {
            key: key.to_vec(),
            entity,
        }])
    }

    /// Removes one record from the index.
    ///
    /// # Errors
    ///
    /// Fails if wrapping fails or the category is not registered.
    pub fn delete(&self, key: &[u8]) -> CoreResult<()> {
        self.apply(&[IndexChange::Delete { key: key.to_vec() }])
    }

    /// Mirrors `changes`, in order.
    ///
    /// # Errors
    ///
    /// Fails if wrapping fails or the category is not registered; nothing
    /// is applied in that case.
    pub fn apply(&self, changes: &[IndexChange<'_, T>]) -> CoreResult<()> {
        let updates = changes
            .iter()
            .map(|change| match change {
                IndexChange::Upsert { key, entity } => self.wrapper.wrap(key, Some(*entity)),
                IndexChange::Delete { key } => self.wrapper.wrap(key, None),
            })
            .collect::<CoreResult<Vec<_>>>()?;
        self.indexer.apply(self.category(), updates)
    }

    /// Replaces the category's documents with `entries`.
    ///
    /// # Errors
    ///
    /// Fails if wrapping fails or the category is not registered.
    pub fn rebuild(&self, entries: &[(Vec<u8>, T)]) -> CoreResult<usize> {
        let docs = entries
            .iter()
            .filter_map(|(key, entity)| match self.wrapper.wrap(key, Some(entity)) {
                Ok((_, doc)) => doc.map(Ok),
                Err(err) => Some(Err(err)),
            })
            .collect::<CoreResult<Vec<_>>>()?;
        self.indexer.rebuild(self.category(), docs)
    }
}

impl<T> fmt::Debug for IndexWrapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexWrapper")
            .field("category", &self.wrapper.category())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestContext;
    use crate::index::FieldKind;
    use crate::search::Predicate;
    use serde::{Deserialize, Serialize};

    const NODES: BucketHandler = BucketHandler::new("node");
    const NODE: Category = Category::new("node");

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Node {
        id: String,
        os: String,
    }

    impl Entity for Node {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn wrapper() -> (Arc<Indexer>, IndexWrapper<Node>) {
        let schema = Schema::new(NODE).field("Operating System", FieldKind::Keyword, |n: &Node| {
            vec![n.os.as_str().into()]
        });
        let indexer = Arc::new(Indexer::new());
        indexer.register(schema.validate().unwrap()).unwrap();
        let wrapper = IndexWrapper::new(indexer.clone(), Arc::new(SchemaWrapper::new(NODES, schema)));
        (indexer, wrapper)
    }

    #[test]
    fn wrap_projects_and_signals_deletion() {
        let wrapper = SchemaWrapper::new(
            NODES,
            Schema::new(NODE).field("Operating System", FieldKind::Keyword, |n: &Node| {
                vec![n.os.as_str().into()]
            }),
        );
        let node = Node {
            id: "n1".into(),
            os: "linux".into(),
        };
        let (id, doc) = wrapper.wrap(&NODES.get_key("n1"), Some(&node)).unwrap();
        assert_eq!(id, "n1");
        assert_eq!(doc.unwrap().get("operating system").len(), 1);

        let (id, doc) = wrapper.wrap(&NODES.get_key("n1"), None).unwrap();
        assert_eq!(id, "n1");
        assert!(doc.is_none());

        assert!(wrapper.wrap(b"image\0n1", None).is_err());
    }

    #[test]
    fn apply_keeps_change_order() {
        let (indexer, wrapper) = wrapper();
        let node = Node {
            id: "n1".into(),
            os: "rhel".into(),
        };
        let key = NODES.get_key("n1");
        wrapper
            .apply(&[
                IndexChange::Delete { key: key.clone() },
                IndexChange::Upsert {
                    key: key.clone(),
                    entity: &node,
                },
            ])
            .unwrap();
        let hits = indexer
            .search(
                &RequestContext::unrestricted(),
                NODE,
                &Predicate::field("Operating System", "rhel"),
            )
            .unwrap();
        assert_eq!(hits.len(), 1);

        wrapper.delete(&key).unwrap();
        assert_eq!(indexer.len(NODE).unwrap(), 0);
    }
}
