//! Record writes plus the edges they imply.

use crate::crud::{Entity, Relation};
use crate::error::{CoreError, CoreResult};
use crate::graph::Transaction;
use scopegraph_codec::{to_record, BucketHandler, EdgeId, SortedKeys};

/// Writes records of one bucket and maintains their relations.
#[derive(Debug)]
pub struct Upserter<T> {
    bucket: BucketHandler,
    relations: Vec<Relation<T>>,
}

impl<T: Entity> Upserter<T> {
    /// Creates an upserter for `bucket` with the given relations.
    #[must_use]
    pub fn new(bucket: BucketHandler, relations: Vec<Relation<T>>) -> Self {
        Self { bucket, relations }
    }

    /// Writes `entity` and its edges; returns its key.
    ///
    /// # Errors
    ///
    /// Fails if the id is empty, the record cannot be encoded, the id of a
    /// linked record is not an edge id, or an adjacency list is undecodable.
    pub fn upsert_in(&self, txn: &mut Transaction<'_>, entity: &T) -> CoreResult<Vec<u8>> {
        if entity.id().is_empty() {
            return Err(CoreError::invariant_violation(format!(
                "empty id in bucket {}",
                self.bucket.prefix()
            )));
        }
        let key = self.bucket.get_key(entity.id());
        let record = to_record(entity).map_err(|err| {
            CoreError::invariant_violation(format!(
                "record {} is unencodable: {err}",
                crate::graph::render(&key)
            ))
        })?;
        txn.put(&key, record)?;

        for relation in &self.relations {
            match *relation {
                Relation::Children { bucket, ids } => {
                    let current = txn.get_forward(&key)?;
                    let mut wanted: SortedKeys = current
                        .iter()
                        .filter(|child| !bucket.owns(child))
                        .cloned()
                        .collect();
                    for child in bucket.get_keys(ids(entity)) {
                        wanted.insert(child);
                    }
                    txn.set_refs(&key, wanted)?;
                }
                Relation::Parents { bucket, ids } => {
                    let wanted: SortedKeys = bucket.get_keys(ids(entity)).into_iter().collect();
                    let current: SortedKeys = bucket
                        .filter_keys(&txn.get_backward(&key)?)
                        .into_iter()
                        .collect();
                    for stale in &current.difference(&wanted) {
                        txn.remove_refs(stale, std::slice::from_ref(&key))?;
                    }
                    for parent in &wanted.difference(&current) {
                        txn.add_refs(parent, std::slice::from_ref(&key))?;
                    }
                }
                Relation::Link { parent, child } => {
                    let edge = EdgeId::parse(entity.id())?;
                    txn.add_refs(&parent.get_key(&edge.parent), &[child.get_key(&edge.child)])?;
                }
            }
        }
        Ok(key)
    }
}
