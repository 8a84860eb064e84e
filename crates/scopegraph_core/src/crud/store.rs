//! Typed per-category stores.

use crate::context::RequestContext;
use crate::crud::{CategoryDef, Deleter, Entity, Reader, Upserter};
use crate::error::{CoreError, CoreResult};
use crate::graph::{GraphStore, Transaction};
use crate::index::{IndexChange, IndexWrapper};
use crate::types::Category;
use parking_lot::Mutex;
use scopegraph_codec::BucketHandler;
use std::fmt;
use std::sync::Arc;

/// CRUD contract of one entity category.
pub trait Store<T: Entity>: Send + Sync {
    /// Reads one record.
    ///
    /// # Errors
    ///
    /// Fails on undecodable records or a cancelled context.
    fn get(&self, ctx: &RequestContext, id: &str) -> CoreResult<Option<T>>;

    /// Reads many records.
    ///
    /// Returns the found records in input order and the positions of the
    /// ids that were not found.
    ///
    /// # Errors
    ///
    /// Fails on undecodable records or a cancelled context.
    fn get_batch(&self, ctx: &RequestContext, ids: &[String]) -> CoreResult<(Vec<T>, Vec<usize>)>;

    /// Whether a record exists.
    ///
    /// # Errors
    ///
    /// Fails on a cancelled context.
    fn exists(&self, ctx: &RequestContext, id: &str) -> CoreResult<bool>;

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Fails on a cancelled context.
    fn count(&self, ctx: &RequestContext) -> CoreResult<usize>;

    /// Ids of every record, ascending.
    ///
    /// # Errors
    ///
    /// Fails on a cancelled context.
    fn get_ids(&self, ctx: &RequestContext) -> CoreResult<Vec<String>>;

    /// Visits every record; an error from `f` stops the walk.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, a decode failure, or
    /// [`CoreError::Cancelled`].
    fn walk(&self, ctx: &RequestContext, f: &mut dyn FnMut(&T) -> CoreResult<()>) -> CoreResult<()>;

    /// Writes records and their edges in one transaction.
    ///
    /// # Errors
    ///
    /// Any failure rolls back the whole batch.
    fn upsert_batch(&self, ctx: &RequestContext, entities: &[T]) -> CoreResult<()>;

    /// Deletes records and every edge touching them; absent ids are ignored.
    ///
    /// # Errors
    ///
    /// Any failure rolls back the whole batch.
    fn delete_batch(&self, ctx: &RequestContext, ids: &[String]) -> CoreResult<()>;

    /// Writes a record that must not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyExists`] if the id is taken.
    fn add(&self, ctx: &RequestContext, entity: &T) -> CoreResult<()>;

    /// Overwrites a record that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the id is absent.
    fn update(&self, ctx: &RequestContext, entity: &T) -> CoreResult<()>;
}

/// Something whose index can be rebuilt from the graph.
pub trait Reindex: Send + Sync {
    /// Category being rebuilt.
    fn category(&self) -> Category;

    /// Rebuilds the index from the records visible to `txn`; returns the
    /// number of documents indexed.
    ///
    /// # Errors
    ///
    /// Fails on undecodable records or a cancelled context.
    fn reindex_in(&self, ctx: &RequestContext, txn: &Transaction<'_>) -> CoreResult<usize>;
}

/// The graph-backed [`Store`] of one category.
///
/// Every write runs in one graph transaction framed by the dirty/valid
/// marker: the marker goes dirty before the transaction, and returns to
/// valid only once the index reflects the commit.
pub struct EntityStore<T: Entity> {
    category: Category,
    graph: Arc<GraphStore>,
    reader: Reader<T>,
    upserter: Upserter<T>,
    deleter: Deleter<T>,
    index: Option<IndexWrapper<T>>,
    bulk_lock: Mutex<()>,
}

impl<T: Entity> EntityStore<T> {
    /// Creates a store for `def` over `graph`.
    ///
    /// The schema of `def` is ignored; indexing is configured through
    /// `index`.
    #[must_use]
    pub fn new(def: CategoryDef<T>, graph: Arc<GraphStore>, index: Option<IndexWrapper<T>>) -> Self {
        Self {
            category: def.category,
            graph,
            reader: Reader::new(def.bucket),
            upserter: Upserter::new(def.bucket, def.relations.clone()),
            deleter: Deleter::new(def.bucket, def.relations),
            index,
            bulk_lock: Mutex::new(()),
        }
    }

    /// The category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// The bucket holding the records.
    #[must_use]
    pub fn bucket(&self) -> BucketHandler {
        self.reader.bucket()
    }

    /// The underlying graph.
    #[must_use]
    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    /// Replaces the whole category with `entities` in one transaction.
    ///
    /// Records not in `entities` are deleted. Concurrent bulk rewrites of
    /// the same store are serialized.
    ///
    /// # Errors
    ///
    /// Any failure rolls back the whole rewrite.
    pub fn replace_all(&self, ctx: &RequestContext, entities: &[T]) -> CoreResult<()> {
        let _bulk = self.bulk_lock.lock();
        self.write(ctx, |store, txn| {
            let mut changes = Vec::new();
            for id in store.reader.read_ids_in(ctx, txn)? {
                store.deleter.delete_in(txn, &id)?;
                changes.push(IndexChange::Delete {
                    key: store.bucket().get_key(&id),
                });
            }
            for entity in entities {
                ctx.check_cancelled()?;
                let key = store.upserter.upsert_in(txn, entity)?;
                changes.push(IndexChange::Upsert { key, entity });
            }
            Ok(changes)
        })
    }

    /// Rebuilds this category's index in its own transaction.
    ///
    /// # Errors
    ///
    /// Fails on undecodable records or a cancelled context.
    pub fn reindex(&self, ctx: &RequestContext) -> CoreResult<usize> {
        let txn = self.graph.new_transaction();
        self.reindex_in(ctx, &txn)
    }

    fn write<'e, F>(&self, ctx: &RequestContext, apply: F) -> CoreResult<()>
    where
        F: FnOnce(&Self, &mut Transaction<'_>) -> CoreResult<Vec<IndexChange<'e, T>>>,
    {
        ctx.check_cancelled()?;
        let mut txn = self.graph.new_transaction();
        let was_dirty = self.graph.is_dirty();
        self.graph.mark_dirty()?;

        let changes = match apply(self, &mut txn).and_then(|changes| {
            txn.commit()?;
            Ok(changes)
        }) {
            Ok(changes) => changes,
            Err(err) => {
                txn.discard();
                if !was_dirty {
                    if let Err(marker) = self.graph.mark_valid() {
                        tracing::warn!(error = %marker, "failed to restore valid marker");
                    }
                }
                return Err(err);
            }
        };

        if let Some(index) = &self.index {
            index.apply(&changes)?;
        }
        if !was_dirty {
            self.graph.mark_valid()?;
        }
        tracing::debug!(
            category = %self.category,
            changes = changes.len(),
            seq = %self.graph.committed_sequence(),
            "applied write batch"
        );
        Ok(())
    }
}

impl<T: Entity> Store<T> for EntityStore<T> {
    fn get(&self, ctx: &RequestContext, id: &str) -> CoreResult<Option<T>> {
        ctx.check_cancelled()?;
        let txn = self.graph.new_read_only_transaction();
        self.reader.read_in(&txn, id)
    }

    fn get_batch(&self, ctx: &RequestContext, ids: &[String]) -> CoreResult<(Vec<T>, Vec<usize>)> {
        let txn = self.graph.new_read_only_transaction();
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for (position, id) in ids.iter().enumerate() {
            ctx.check_cancelled()?;
            match self.reader.read_in(&txn, id)? {
                Some(entity) => found.push(entity),
                None => missing.push(position),
            }
        }
        Ok((found, missing))
    }

    fn exists(&self, ctx: &RequestContext, id: &str) -> CoreResult<bool> {
        ctx.check_cancelled()?;
        let txn = self.graph.new_read_only_transaction();
        self.reader.exists_in(&txn, id)
    }

    fn count(&self, ctx: &RequestContext) -> CoreResult<usize> {
        let txn = self.graph.new_read_only_transaction();
        self.reader.count_in(ctx, &txn)
    }

    fn get_ids(&self, ctx: &RequestContext) -> CoreResult<Vec<String>> {
        let txn = self.graph.new_read_only_transaction();
        self.reader.read_ids_in(ctx, &txn)
    }

    fn walk(&self, ctx: &RequestContext, f: &mut dyn FnMut(&T) -> CoreResult<()>) -> CoreResult<()> {
        let txn = self.graph.new_read_only_transaction();
        self.reader.walk_in(ctx, &txn, f)
    }

    fn upsert_batch(&self, ctx: &RequestContext, entities: &[T]) -> CoreResult<()> {
        if entities.is_empty() {
            return Ok(());
        }
        self.write(ctx, |store, txn| {
            let mut changes = Vec::with_capacity(entities.len());
            for entity in entities {
                ctx.check_cancelled()?;
                let key = store.upserter.upsert_in(txn, entity)?;
                changes.push(IndexChange::Upsert { key, entity });
            }
            Ok(changes)
        })
    }

    fn delete_batch(&self, ctx: &RequestContext, ids: &[String]) -> CoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.write(ctx, |store, txn| {
            let mut changes = Vec::with_capacity(ids.len());
            for id in ids {
                ctx.check_cancelled()?;
                if store.deleter.delete_in(txn, id)? {
                    changes.push(IndexChange::Delete {
                        key: store.bucket().get_key(id),
                    });
                }
            }
            Ok(changes)
        })
    }

    fn add(&self, ctx: &RequestContext, entity: &T) -> CoreResult<()> {
        self.write(ctx, |store, txn| {
            if store.reader.exists_in(txn, entity.id())? {
                return Err(CoreError::already_exists(store.category.name(), entity.id()));
            }
            let key = store.upserter.upsert_in(txn, entity)?;
            Ok(vec![IndexChange::Upsert { key, entity }])
        })
    }

    fn update(&self, ctx: &RequestContext, entity: &T) -> CoreResult<()> {
        self.write(ctx, |store, txn| {
            if !store.reader.exists_in(txn, entity.id())? {
                return Err(CoreError::not_found(store.category.name(), entity.id()));
            }
            let key = store.upserter.upsert_in(txn, entity)?;
            Ok(vec![IndexChange::Upsert { key, entity }])
        })
    }
}

impl<T: Entity> Reindex for EntityStore<T> {
    fn category(&self) -> Category {
        self.category
    }

    fn reindex_in(&self, ctx: &RequestContext, txn: &Transaction<'_>) -> CoreResult<usize> {
        let Some(index) = &self.index else {
            return Ok(0);
        };
        let mut entries = Vec::new();
        let bucket = self.bucket();
        self.reader.walk_in(ctx, txn, &mut |entity: &T| {
            entries.push((bucket.get_key(entity.id()), entity.clone()));
            Ok(())
        })?;
        index.rebuild(&entries)
    }
}

impl<T: Entity> fmt::Debug for EntityStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityStore")
            .field("category", &self.category)
            .field("bucket", &self.bucket())
            .field("indexed", &self.index.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crud::Relation;
    use crate::graph::forward_key;
    use serde::{Deserialize, Serialize};

    const PARENTS: BucketHandler = BucketHandler::new("parent");
    const CHILDREN: BucketHandler = BucketHandler::new("child");

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Parent {
        id: String,
        children: Vec<String>,
    }

    impl Entity for Parent {
        fn id(&self) -> &str {
            &self.id
        }
    }

    fn parent(id: &str, children: &[&str]) -> Parent {
        Parent {
            id: id.to_string(),
            children: children.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn store() -> EntityStore<Parent> {
        let graph = Arc::new(GraphStore::open_in_memory(Config::default()));
        let def = CategoryDef::new(Category::new("parent"), PARENTS).relation(Relation::Children {
            bucket: CHILDREN,
            ids: |p: &Parent| p.children.clone(),
        });
        EntityStore::new(def, graph, None)
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        let p = parent("p1", &["c1", "c2"]);
        store.upsert_batch(&ctx, &[p.clone()]).unwrap();

        assert_eq!(store.get(&ctx, "p1").unwrap(), Some(p));
        assert!(store.exists(&ctx, "p1").unwrap());
        assert_eq!(store.count(&ctx).unwrap(), 1);
        assert!(!store.graph().is_dirty());
    }

    #[test]
    fn empty_ids_are_rejected() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        let err = store.upsert_batch(&ctx, &[parent("", &[])]).unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation { .. }), "{err}");
        assert_eq!(store.count(&ctx).unwrap(), 0);
    }

    #[test]
    fn get_batch_reports_missing_positions() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        store
            .upsert_batch(&ctx, &[parent("a", &[]), parent("c", &[])])
            .unwrap();

        let ids: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        let (found, missing) = store.get_batch(&ctx, &ids).unwrap();
        assert_eq!(found.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(missing, vec![1, 3]);
    }

    #[test]
    fn children_relation_tracks_updates() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        store.upsert_batch(&ctx, &[parent("p1", &["c1", "c2"])]).unwrap();
        store.upsert_batch(&ctx, &[parent("p1", &["c2", "c3"])]).unwrap();

        let txn = store.graph().new_read_only_transaction();
        let forward = txn.get_forward(&PARENTS.get_key("p1")).unwrap();
        assert_eq!(
            CHILDREN.filtered_ids(&forward).unwrap(),
            vec!["c2".to_string(), "c3".to_string()]
        );
        assert!(txn.get_backward(&CHILDREN.get_key("c1")).unwrap().is_empty());
    }

    #[test]
    fn delete_is_idempotent_and_clears_edges() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        store.upsert_batch(&ctx, &[parent("p1", &["c1"])]).unwrap();

        let ids = vec!["p1".to_string()];
        store.delete_batch(&ctx, &ids).unwrap();
        store.delete_batch(&ctx, &ids).unwrap();
        store.delete_batch(&ctx, &[]).unwrap();
        store
            .delete_batch(&ctx, &["nope".to_string(), "never".to_string()])
            .unwrap();

        assert_eq!(store.get(&ctx, "p1").unwrap(), None);
        let txn = store.graph().new_read_only_transaction();
        assert!(txn.get(&forward_key(&PARENTS.get_key("p1"))).unwrap().is_none());
        assert!(txn.get_backward(&CHILDREN.get_key("c1")).unwrap().is_empty());
    }

    #[test]
    fn add_and_update_check_existence() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        assert!(matches!(
            store.update(&ctx, &parent("p1", &[])),
            Err(CoreError::NotFound { .. })
        ));
        store.add(&ctx, &parent("p1", &[])).unwrap();
        assert!(matches!(
            store.add(&ctx, &parent("p1", &[])),
            Err(CoreError::AlreadyExists { .. })
        ));
        store.update(&ctx, &parent("p1", &["c9"])).unwrap();
        assert_eq!(store.get(&ctx, "p1").unwrap().unwrap().children, vec!["c9"]);
        assert!(!store.graph().is_dirty());
    }

    #[test]
    fn replace_all_rewrites_the_bucket() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        store
            .upsert_batch(&ctx, &[parent("a", &["c1"]), parent("b", &[])])
            .unwrap();
        store
            .replace_all(&ctx, &[parent("b", &["c2"]), parent("c", &[])])
            .unwrap();

        assert_eq!(store.get_ids(&ctx).unwrap(), vec!["b", "c"]);
        let txn = store.graph().new_read_only_transaction();
        assert!(txn.get_backward(&CHILDREN.get_key("c1")).unwrap().is_empty());
    }

    #[test]
    fn walk_short_circuits_on_error() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        store
            .upsert_batch(&ctx, &[parent("a", &[]), parent("b", &[]), parent("c", &[])])
            .unwrap();

        let mut seen = Vec::new();
        let result = store.walk(&ctx, &mut |p: &Parent| {
            seen.push(p.id.clone());
            if p.id == "b" {
                return Err(CoreError::invalid_query("stop"));
            }
            Ok(())
        });
        assert!(matches!(result, Err(CoreError::InvalidQuery { .. })));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn cancelled_write_changes_nothing() {
        let store = store();
        let token = crate::context::CancellationToken::new();
        token.cancel();
        let ctx = RequestContext::unrestricted().with_cancellation(token);
        assert!(matches!(
            store.upsert_batch(&ctx, &[parent("a", &[])]),
            Err(CoreError::Cancelled)
        ));
        assert_eq!(store.count(&RequestContext::unrestricted()).unwrap(), 0);
        assert!(!store.graph().is_dirty());
    }
}
