//! Graph transactions.

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::graph::log::Mutation;
use crate::graph::store::GraphStore;
use crate::types::{SequenceNumber, TransactionId};
use bytes::Bytes;
use parking_lot::MutexGuard;
use scopegraph_codec::SortedKeys;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Prefix of forward adjacency lists (`from -> [to]`).
pub const FORWARD_PREFIX: &[u8] = b"__fwd\0";
/// Prefix of backward adjacency lists (`to -> [from]`).
pub const BACKWARD_PREFIX: &[u8] = b"__bwd\0";
/// Keys starting with this are reserved for the store.
pub const RESERVED_PREFIX: &[u8] = b"__";

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Open for reads (and writes, for read-write transactions).
    Active,
    /// Committed.
    Committed,
    /// Discarded or failed to commit.
    Discarded,
}

enum Mode<'a> {
    ReadOnly,
    ReadWrite(MutexGuard<'a, ()>),
}

/// A scoped handle onto the graph store.
///
/// Read-only transactions observe the snapshot taken when they began.
/// Read-write transactions hold the store's write lock until dropped and
/// buffer every mutation until [`Transaction::commit`]; a transaction
/// dropped without committing leaves no trace.
///
/// Every edge is recorded twice, as a forward list on its source and a
/// backward list on its target, and both lists change in the same commit.
pub struct Transaction<'a> {
    store: &'a GraphStore,
    id: TransactionId,
    snapshot: SequenceNumber,
    mode: Mode<'a>,
    pending: BTreeMap<Vec<u8>, Option<Bytes>>,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    pub(crate) fn read_only(
        store: &'a GraphStore,
        id: TransactionId,
        snapshot: SequenceNumber,
    ) -> Self {
        Self {
            store,
            id,
            snapshot,
            mode: Mode::ReadOnly,
            pending: BTreeMap::new(),
            state: TransactionState::Active,
        }
    }

    pub(crate) fn read_write(
        store: &'a GraphStore,
        id: TransactionId,
        snapshot: SequenceNumber,
        guard: MutexGuard<'a, ()>,
    ) -> Self {
        Self {
            store,
            id,
            snapshot,
            mode: Mode::ReadWrite(guard),
            pending: BTreeMap::new(),
            state: TransactionState::Active,
        }
    }

    /// The transaction id.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The snapshot this transaction reads.
    #[must_use]
    pub fn snapshot(&self) -> SequenceNumber {
        self.snapshot
    }

    /// The lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Whether the transaction rejects writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self.mode, Mode::ReadOnly)
    }

    /// The store this transaction belongs to.
    #[must_use]
    pub fn store(&self) -> &'a GraphStore {
        self.store
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.state == TransactionState::Active {
            Ok(())
        } else {
            Err(CoreError::TransactionClosed)
        }
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_active()?;
        if self.is_read_only() {
            return Err(CoreError::ReadOnlyTransaction);
        }
        Ok(())
    }

    fn read(&self, key: &[u8]) -> Option<Bytes> {
        match self.pending.get(key) {
            Some(value) => value.clone(),
            None => self.store.keyspace.read().get(key, self.snapshot),
        }
    }

    // === Records ===

    /// Reads the value stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionClosed`] after commit or discard.
    pub fn get(&self, key: &[u8]) -> CoreResult<Option<Bytes>> {
        self.ensure_active()?;
        Ok(self.read(key))
    }

    /// Whether a value is stored at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionClosed`] after commit or discard.
    pub fn exists(&self, key: &[u8]) -> CoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Stores `value` at `key`.
    ///
    /// # Errors
    ///
    /// Fails on read-only or closed transactions and on reserved keys.
    pub fn put(&mut self, key: &[u8], value: impl Into<Bytes>) -> CoreResult<()> {
        self.ensure_writable()?;
        reject_reserved(key)?;
        self.pending.insert(key.to_vec(), Some(value.into()));
        Ok(())
    }

    /// Deletes the record at `key` and every edge touching it.
    ///
    /// Deleting an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Fails on read-only or closed transactions and on reserved keys.
    pub fn delete(&mut self, key: &[u8]) -> CoreResult<()> {
        self.ensure_writable()?;
        reject_reserved(key)?;
        self.delete_refs_from(key)?;
        self.delete_refs_to(key)?;
        self.pending.insert(key.to_vec(), None);
        Ok(())
    }

    // === Scans ===

    /// Calls `f` for every live key starting with `prefix`, in key order.
    ///
    /// The context is checked for cancellation before the scan and every
    /// [`Config::cancellation_check_interval`](crate::Config) keys.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] once `ctx` is cancelled, or the
    /// first error returned by `f`.
    pub fn for_each_key<F>(&self, ctx: &RequestContext, prefix: &[u8], mut f: F) -> CoreResult<()>
    where
        F: FnMut(&[u8]) -> CoreResult<()>,
    {
        self.ensure_active()?;
        ctx.check_cancelled()?;
        let interval = self.store.config().cancellation_check_interval.max(1);
        for (visited, key) in self.scan(prefix).iter().enumerate() {
            if visited > 0 && visited % interval == 0 {
                ctx.check_cancelled()?;
            }
            f(key)?;
        }
        Ok(())
    }

    /// Collects the live keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::for_each_key`].
    pub fn keys_with_prefix(&self, ctx: &RequestContext, prefix: &[u8]) -> CoreResult<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        self.for_each_key(ctx, prefix, |key| {
            keys.push(key.to_vec());
            Ok(())
        })?;
        Ok(keys)
    }

    /// Counts the live keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::for_each_key`].
    pub fn count_prefix(&self, ctx: &RequestContext, prefix: &[u8]) -> CoreResult<usize> {
        let mut count = 0;
        self.for_each_key(ctx, prefix, |_| {
            count += 1;
            Ok(())
        })?;
        Ok(count)
    }

    fn scan(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let base = self
            .store
            .keyspace
            .read()
            .keys_with_prefix(prefix, self.snapshot);
        if self.pending.is_empty() {
            return base;
        }
        let mut keys: BTreeSet<Vec<u8>> = base.into_iter().collect();
        for (key, value) in self
            .pending
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
        {
            if value.is_some() {
                keys.insert(key.clone());
            } else {
                keys.remove(key);
            }
        }
        keys.into_iter().collect()
    }

    // === Adjacency ===

    fn read_list(&self, list_key: &[u8]) -> CoreResult<SortedKeys> {
        match self.read(list_key) {
            Some(bytes) => SortedKeys::unmarshal(&bytes).map_err(|err| {
                CoreError::invariant_violation(format!(
                    "adjacency list {} is undecodable: {err}",
                    String::from_utf8_lossy(list_key)
                ))
            }),
            None => Ok(SortedKeys::new()),
        }
    }

    fn write_list(&mut self, list_key: Vec<u8>, keys: &SortedKeys) {
        let value = if keys.is_empty() {
            None
        } else {
            Some(Bytes::from(keys.marshal()))
        };
        self.pending.insert(list_key, value);
    }

    /// Keys `key` points to.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] for an undecodable list.
    pub fn get_forward(&self, key: &[u8]) -> CoreResult<SortedKeys> {
        self.ensure_active()?;
        self.read_list(&forward_key(key))
    }

    /// Keys pointing to `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvariantViolation`] for an undecodable list.
    pub fn get_backward(&self, key: &[u8]) -> CoreResult<SortedKeys> {
        self.ensure_active()?;
        self.read_list(&backward_key(key))
    }

    /// Number of keys `key` points to.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::get_forward`].
    pub fn count_refs_from(&self, key: &[u8]) -> CoreResult<usize> {
        Ok(self.get_forward(key)?.len())
    }

    /// Number of keys pointing to `key`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::get_backward`].
    pub fn count_refs_to(&self, key: &[u8]) -> CoreResult<usize> {
        Ok(self.get_backward(key)?.len())
    }

    /// Replaces the forward set of `from` with `to`, keeping every
    /// backward list in sync.
    ///
    /// # Errors
    ///
    /// Fails on read-only or closed transactions and undecodable lists.
    pub fn set_refs(&mut self, from: &[u8], to: SortedKeys) -> CoreResult<()> {
        self.ensure_writable()?;
        let current = self.read_list(&forward_key(from))?;
        let removed = current.difference(&to);
        let added = to.difference(&current);
        for target in &removed {
            self.unlink_backward(target, from)?;
        }
        for target in &added {
            self.link_backward(target, from)?;
        }
        self.write_list(forward_key(from), &to);
        Ok(())
    }

    /// Adds edges `from -> to[i]`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::set_refs`].
    pub fn add_refs(&mut self, from: &[u8], to: &[Vec<u8>]) -> CoreResult<()> {
        self.ensure_writable()?;
        let mut forward = self.read_list(&forward_key(from))?;
        for target in to {
            if forward.insert(target.clone()) {
                self.link_backward(target, from)?;
            }
        }
        self.write_list(forward_key(from), &forward);
        Ok(())
    }

    /// Removes edges `from -> to[i]`; absent edges are ignored.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::set_refs`].
    pub fn remove_refs(&mut self, from: &[u8], to: &[Vec<u8>]) -> CoreResult<()> {
        self.ensure_writable()?;
        let mut forward = self.read_list(&forward_key(from))?;
        for target in to {
            if forward.remove(target) {
                self.unlink_backward(target, from)?;
            }
        }
        self.write_list(forward_key(from), &forward);
        Ok(())
    }

    /// Removes every edge leaving `from`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::set_refs`].
    pub fn delete_refs_from(&mut self, from: &[u8]) -> CoreResult<()> {
        self.set_refs(from, SortedKeys::new())
    }

    /// Removes every edge arriving at `to`.
    ///
    /// # Errors
    ///
    /// Same as [`Transaction::set_refs`].
    pub fn delete_refs_to(&mut self, to: &[u8]) -> CoreResult<()> {
        self.ensure_writable()?;
        let sources = self.read_list(&backward_key(to))?;
        for source in &sources {
            let mut forward = self.read_list(&forward_key(source))?;
            forward.remove(to);
            self.write_list(forward_key(source), &forward);
        }
        self.write_list(backward_key(to), &SortedKeys::new());
        Ok(())
    }

    fn link_backward(&mut self, target: &[u8], source: &[u8]) -> CoreResult<()> {
        let mut backward = self.read_list(&backward_key(target))?;
        backward.insert(source.to_vec());
        self.write_list(backward_key(target), &backward);
        Ok(())
    }

    fn unlink_backward(&mut self, target: &[u8], source: &[u8]) -> CoreResult<()> {
        let mut backward = self.read_list(&backward_key(target))?;
        backward.remove(source);
        self.write_list(backward_key(target), &backward);
        Ok(())
    }

    // === Lifecycle ===

    /// Commits buffered mutations atomically.
    ///
    /// The write lock is held until the transaction is dropped, so callers
    /// can finish dependent work (index updates, markers) before another
    /// writer starts. On failure nothing is applied and the transaction is
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionClosed`] if already closed, or the
    /// storage error that prevented the commit.
    pub fn commit(&mut self) -> CoreResult<SequenceNumber> {
        self.ensure_active()?;
        if self.is_read_only() {
            self.state = TransactionState::Committed;
            return Ok(self.snapshot);
        }
        let mutations: Vec<Mutation> = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(key, value)| Mutation { key, value })
            .collect();
        match self.store.commit(mutations) {
            Ok(seq) => {
                self.state = TransactionState::Committed;
                Ok(seq)
            }
            Err(err) => {
                self.state = TransactionState::Discarded;
                Err(err)
            }
        }
    }

    /// Drops buffered mutations. Idempotent.
    pub fn discard(&mut self) {
        if self.state == TransactionState::Active {
            self.pending.clear();
            self.state = TransactionState::Discarded;
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.discard();
        if let Mode::ReadOnly = self.mode {
            self.store.unpin(self.snapshot);
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("snapshot", &self.snapshot)
            .field("read_only", &self.is_read_only())
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .finish()
    }
}

fn reject_reserved(key: &[u8]) -> CoreResult<()> {
    if key.starts_with(RESERVED_PREFIX) {
        return Err(CoreError::invariant_violation(format!(
            "key {} uses a reserved prefix",
            String::from_utf8_lossy(key)
        )));
    }
    Ok(())
}

/// Key of the forward adjacency list of `key`.
#[must_use]
pub fn forward_key(key: &[u8]) -> Vec<u8> {
    [FORWARD_PREFIX, key].concat()
}

/// Key of the backward adjacency list of `key`.
#[must_use]
pub fn backward_key(key: &[u8]) -> Vec<u8> {
    [BACKWARD_PREFIX, key].concat()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::CancellationToken;

    fn keys(items: &[&str]) -> SortedKeys {
        items.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    fn store() -> GraphStore {
        GraphStore::open_in_memory(Config::default())
    }

    #[test]
    fn set_refs_keeps_inverse_in_sync() {
        let store = store();
        let mut txn = store.new_transaction();
        txn.set_refs(b"img\0a", keys(&["comp\0x", "comp\0y"])).unwrap();
        txn.set_refs(b"img\0b", keys(&["comp\0y"])).unwrap();
        txn.commit().unwrap();
        drop(txn);

        let mut txn = store.new_transaction();
        txn.set_refs(b"img\0a", keys(&["comp\0y", "comp\0z"])).unwrap();
        txn.commit().unwrap();
        drop(txn);

        let read = store.new_read_only_transaction();
        assert_eq!(read.get_backward(b"comp\0x").unwrap(), SortedKeys::new());
        assert_eq!(
            read.get_backward(b"comp\0y").unwrap(),
            keys(&["img\0a", "img\0b"])
        );
        assert_eq!(read.get_backward(b"comp\0z").unwrap(), keys(&["img\0a"]));
        assert_eq!(read.count_refs_from(b"img\0a").unwrap(), 2);
    }

    #[test]
    fn delete_removes_both_directions() {
        let store = store();
        let mut txn = store.new_transaction();
        txn.put(b"comp\0y", Bytes::from_static(b"c")).unwrap();
        txn.set_refs(b"img\0a", keys(&["comp\0y"])).unwrap();
        txn.set_refs(b"comp\0y", keys(&["cve\01"])).unwrap();
        txn.commit().unwrap();
        drop(txn);

        let mut txn = store.new_transaction();
        txn.delete(b"comp\0y").unwrap();
        txn.delete(b"comp\0absent").unwrap();
        txn.commit().unwrap();
        drop(txn);

        let read = store.new_read_only_transaction();
        assert!(!read.exists(b"comp\0y").unwrap());
        assert!(read.get_forward(b"img\0a").unwrap().is_empty());
        assert!(read.get_backward(b"cve\01").unwrap().is_empty());
        assert!(read.get_forward(b"comp\0y").unwrap().is_empty());
    }

    #[test]
    fn discarded_writes_leave_no_trace() {
        let store = store();
        {
            let mut txn = store.new_transaction();
            txn.put(b"img\0a", Bytes::from_static(b"v")).unwrap();
            txn.add_refs(b"img\0a", &[b"comp\0x".to_vec()]).unwrap();
        }
        let read = store.new_read_only_transaction();
        assert!(!read.exists(b"img\0a").unwrap());
        assert!(read.get_backward(b"comp\0x").unwrap().is_empty());
        assert_eq!(store.committed_sequence(), SequenceNumber::new(0));
    }

    #[test]
    fn scans_see_pending_writes() {
        let store = store();
        let ctx = RequestContext::unrestricted();
        let mut txn = store.new_transaction();
        txn.put(b"img\0a", Bytes::from_static(b"1")).unwrap();
        txn.put(b"img\0b", Bytes::from_static(b"2")).unwrap();
        txn.commit().unwrap();
        drop(txn);

        let mut txn = store.new_transaction();
        txn.delete(b"img\0a").unwrap();
        txn.put(b"img\0c", Bytes::from_static(b"3")).unwrap();
        assert_eq!(
            txn.keys_with_prefix(&ctx, b"img\0").unwrap(),
            vec![b"img\0b".to_vec(), b"img\0c".to_vec()]
        );
        assert_eq!(txn.count_prefix(&ctx, b"__fwd\0").unwrap(), 0);
    }

    #[test]
    fn cancelled_scan_stops() {
        let store = GraphStore::open_in_memory(Config::default().cancellation_check_interval(2));
        let mut txn = store.new_transaction();
        for i in 0..10 {
            txn.put(format!("img\0{i}").as_bytes(), Bytes::from_static(b"v"))
                .unwrap();
        }
        txn.commit().unwrap();
        drop(txn);

        let token = CancellationToken::new();
        let ctx = RequestContext::unrestricted().with_cancellation(token.clone());
        let read = store.new_read_only_transaction();
        let mut seen = 0;
        let result = read.for_each_key(&ctx, b"img\0", |_| {
            seen += 1;
            if seen == 3 {
                token.cancel();
            }
            Ok(())
        });
        assert!(matches!(result, Err(CoreError::Cancelled)));
        assert_eq!(seen, 4);
    }

    #[test]
    fn read_only_rejects_writes_and_reserved_keys_are_guarded() {
        let store = store();
        let mut read = store.new_read_only_transaction();
        assert!(matches!(
            read.put(b"img\0a", Bytes::from_static(b"v")),
            Err(CoreError::ReadOnlyTransaction)
        ));

        let mut txn = store.new_transaction();
        assert!(matches!(
            txn.put(b"__fwd\0x", Bytes::from_static(b"v")),
            Err(CoreError::InvariantViolation { .. })
        ));
        txn.discard();
        assert!(matches!(txn.get(b"img\0a"), Err(CoreError::TransactionClosed)));
    }
}
