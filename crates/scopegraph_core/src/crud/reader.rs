//! Point reads and scans of one category.

use crate::context::RequestContext;
use crate::crud::Entity;
use crate::error::{CoreError, CoreResult};
use crate::graph::Transaction;
use scopegraph_codec::{from_record, BucketHandler};
use std::fmt;
use std::marker::PhantomData;

/// Reads records of one bucket inside a transaction.
pub struct Reader<T> {
    bucket: BucketHandler,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Reader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reader").field("bucket", &self.bucket).finish()
    }
}

impl<T: Entity> Reader<T> {
    /// Creates a reader for `bucket`.
    #[must_use]
    pub fn new(bucket: BucketHandler) -> Self {
        Self {
            bucket,
            _marker: PhantomData,
        }
    }

    /// The bucket being read.
    #[must_use]
    pub fn bucket(&self) -> BucketHandler {
        self.bucket
    }

    fn decode(&self, key: &[u8], bytes: &[u8]) -> CoreResult<T> {
        from_record(bytes).map_err(|err| {
            CoreError::invariant_violation(format!(
                "record {} is undecodable: {err}",
                crate::graph::render(key)
            ))
        })
    }

    /// Reads the record `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] if the stored bytes do not
    /// decode.
    pub fn read_in(&self, txn: &Transaction<'_>, id: &str) -> CoreResult<Option<T>> {
        let key = self.bucket.get_key(id);
        match txn.get(&key)? {
            Some(bytes) => Ok(Some(self.decode(&key, &bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether record `id` exists.
    ///
    /// # Errors
    ///
    /// Fails only if the transaction is closed.
    pub fn exists_in(&self, txn: &Transaction<'_>, id: &str) -> CoreResult<bool> {
        txn.exists(&self.bucket.get_key(id))
    }

    /// Keys of every record in the bucket.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if `ctx` is cancelled.
    pub fn read_keys_in(&self, ctx: &RequestContext, txn: &Transaction<'_>) -> CoreResult<Vec<Vec<u8>>> {
        txn.keys_with_prefix(ctx, &self.bucket.key_prefix())
    }

    /// Ids of every record in the bucket.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if `ctx` is cancelled.
    pub fn read_ids_in(&self, ctx: &RequestContext, txn: &Transaction<'_>) -> CoreResult<Vec<String>> {
        let keys = self.read_keys_in(ctx, txn)?;
        Ok(self.bucket.filtered_ids(&keys)?)
    }

    /// Number of records in the bucket.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] if `ctx` is cancelled.
    pub fn count_in(&self, ctx: &RequestContext, txn: &Transaction<'_>) -> CoreResult<usize> {
        txn.count_prefix(ctx, &self.bucket.key_prefix())
    }

    /// Decodes every record in key order and hands it to `f`.
    ///
    /// # Errors
    ///
    /// Returns the first error from `f`, a decode failure, or
    /// [`CoreError::Cancelled`].
    pub fn walk_in(
        &self,
        ctx: &RequestContext,
        txn: &Transaction<'_>,
        f: &mut dyn FnMut(&T) -> CoreResult<()>,
    ) -> CoreResult<()> {
        txn.for_each_key(ctx, &self.bucket.key_prefix(), |key| {
            let Some(bytes) = txn.get(key)? else {
                return Ok(());
            };
            f(&self.decode(key, &bytes)?)
        })
    }
}
