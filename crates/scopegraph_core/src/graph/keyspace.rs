//! Multi-version in-memory keyspace.
//!
//! Each key keeps a chain of versions ordered by commit sequence. A reader
//! pinned at sequence `s` sees, per key, the newest version with
//! `seq <= s`; a `None` value is a tombstone.

use crate::graph::log::Mutation;
use crate::types::SequenceNumber;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Clone)]
struct Version {
    seq: u64,
    value: Option<Bytes>,
}

/// Counters describing the keyspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyspaceStats {
    /// Keys with at least one retained version.
    pub keys: usize,
    /// Retained versions across all keys, tombstones included.
    pub versions: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Keyspace {
    entries: BTreeMap<Vec<u8>, Vec<Version>>,
}

impl Keyspace {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get(&self, key: &[u8], snapshot: SequenceNumber) -> Option<Bytes> {
        self.entries
            .get(key)
            .and_then(|chain| visible(chain, snapshot))
            .cloned()
    }

    /// Live keys starting with `prefix` at `snapshot`, in key order.
    pub(crate) fn keys_with_prefix(&self, prefix: &[u8], snapshot: SequenceNumber) -> Vec<Vec<u8>> {
        self.entries
            .range::<[u8], _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(_, chain)| visible(chain, snapshot).is_some())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub(crate) fn apply(&mut self, seq: SequenceNumber, mutations: &[Mutation]) {
        for mutation in mutations {
            self.entries
                .entry(mutation.key.clone())
                .or_default()
                .push(Version {
                    seq: seq.as_u64(),
                    value: mutation.value.clone(),
                });
        }
    }

    /// Drops versions no reader at or after `horizon` can observe.
    pub(crate) fn prune<'a, I>(&mut self, keys: I, horizon: SequenceNumber)
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        for key in keys {
            let remove = match self.entries.get_mut(key) {
                Some(chain) => prune_chain(chain, horizon.as_u64()),
                None => false,
            };
            if remove {
                self.entries.remove(key);
            }
        }
    }

    pub(crate) fn prune_all(&mut self, horizon: SequenceNumber) {
        self.entries
            .retain(|_, chain| !prune_chain(chain, horizon.as_u64()));
    }

    /// The latest live value of every key, as put mutations.
    pub(crate) fn live_mutations(&self, snapshot: SequenceNumber) -> Vec<Mutation> {
        self.entries
            .iter()
            .filter_map(|(key, chain)| {
                visible(chain, snapshot).map(|value| Mutation {
                    key: key.clone(),
                    value: Some(value.clone()),
                })
            })
            .collect()
    }

    pub(crate) fn stats(&self) -> KeyspaceStats {
        KeyspaceStats {
            keys: self.entries.len(),
            versions: self.entries.values().map(Vec::len).sum(),
        }
    }
}

fn visible(chain: &[Version], snapshot: SequenceNumber) -> Option<&Bytes> {
    chain
        .iter()
        .rev()
        .find(|version| version.seq <= snapshot.as_u64())
        .and_then(|version| version.value.as_ref())
}

/// Prunes one chain in place; returns true when the key can be dropped.
fn prune_chain(chain: &mut Vec<Version>, horizon: u64) -> bool {
    // Newest version a reader at `horizon` would see.
    if let Some(base) = chain.iter().rposition(|version| version.seq <= horizon) {
        chain.drain(..base);
    }
    chain.len() == 1 && chain[0].seq <= horizon && chain[0].value.is_none()
}
