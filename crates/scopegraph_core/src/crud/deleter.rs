//! Record deletes.

use crate::crud::Relation;
use crate::error::CoreResult;
use crate::graph::Transaction;
use scopegraph_codec::{BucketHandler, EdgeId};

/// Deletes records of one bucket along with all their edges.
#[derive(Debug)]
pub struct Deleter<T> {
    bucket: BucketHandler,
    relations: Vec<Relation<T>>,
}

impl<T> Deleter<T> {
    /// Creates a deleter for `bucket` with the given relations.
    #[must_use]
    pub fn new(bucket: BucketHandler, relations: Vec<Relation<T>>) -> Self {
        Self { bucket, relations }
    }

    /// Deletes record `id`; returns whether it existed.
    ///
    /// Absent ids are not an error.
    ///
    /// # Errors
    ///
    /// Fails if a stored linked record's id is not an edge id or an
    /// adjacency list is undecodable.
    pub fn delete_in(&self, txn: &mut Transaction<'_>, id: &str) -> CoreResult<bool> {
        let key = self.bucket.get_key(id);
        let existed = txn.exists(&key)?;
        // An absent edge record has no links to drop, and its id may not
        // parse as an edge id.
        let relations = if existed { self.relations.as_slice() } else { &[] };
        for relation in relations {
            if let Relation::Link { parent, child } = *relation {
                let edge = EdgeId::parse(id)?;
                txn.remove_refs(&parent.get_key(&edge.parent), &[child.get_key(&edge.child)])?;
            }
        }
        txn.delete(&key)?;
        Ok(existed)
    }
}
