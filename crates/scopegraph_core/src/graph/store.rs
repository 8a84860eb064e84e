//! The graph store: a transactional keyspace with adjacency and a marker.

use crate::config::Config;
use crate::dir::GraphDir;
use crate::error::{CoreError, CoreResult};
use crate::graph::keyspace::{Keyspace, KeyspaceStats};
use crate::graph::log::{encode_commit, replay, LogRecord, Mutation};
use crate::graph::transaction::Transaction;
use crate::types::{SequenceNumber, TransactionId};
use parking_lot::{Mutex, RwLock};
use scopegraph_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Summary of the store's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphStats {
    /// Sequence of the last committed write transaction.
    pub committed_seq: SequenceNumber,
    /// Whether the dirty/valid marker is dirty.
    pub dirty: bool,
    /// Keyspace counters.
    pub keyspace: KeyspaceStats,
    /// Commit log size in bytes.
    pub log_size: u64,
    /// Read-only transactions currently holding a snapshot.
    pub pinned_snapshots: usize,
}

/// A transactional key-value store holding entity records and adjacency.
///
/// Writers are serialized by a store-wide mutex; readers take a snapshot
/// of the last committed sequence and never block writers. Every commit is
/// one log record, so a batch is either fully replayed or not at all.
pub struct GraphStore {
    config: Config,
    pub(crate) keyspace: RwLock<Keyspace>,
    log: Mutex<Box<dyn StorageBackend>>,
    pub(crate) write_lock: Mutex<()>,
    committed_seq: AtomicU64,
    /// Pinned snapshot sequence -> reader count.
    snapshots: Mutex<BTreeMap<u64, usize>>,
    dirty: AtomicBool,
    next_txn_id: AtomicU64,
    dir: Option<GraphDir>,
}

impl GraphStore {
    /// Opens a store over `backend`, replaying its commit log.
    ///
    /// A torn trailing record is truncated away.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LogCorruption`] if the log is damaged before its
    /// tail, or a storage error if it cannot be read.
    pub fn open(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        Self::open_inner(backend, config, None)
    }

    /// Opens an empty in-memory store.
    #[must_use]
    pub fn open_in_memory(config: Config) -> Self {
        Self::from_parts(
            Box::new(InMemoryBackend::new()),
            config,
            Keyspace::new(),
            SequenceNumber::default(),
            false,
            None,
        )
    }

    /// Opens the store persisted in directory `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseLocked`] if another process holds the
    /// directory, or any error from [`GraphStore::open`].
    pub fn open_dir(path: &Path, config: Config) -> CoreResult<Self> {
        let dir = GraphDir::open(path, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.log_path())?;
        Self::open_inner(Box::new(backend), config, Some(dir))
    }

    fn open_inner(
        mut backend: Box<dyn StorageBackend>,
        config: Config,
        dir: Option<GraphDir>,
    ) -> CoreResult<Self> {
        let data = backend.read_all()?;
        let replayed = replay(&data)?;

        if replayed.valid_len < data.len() as u64 {
            tracing::warn!(
                valid_len = replayed.valid_len,
                size = data.len(),
                "truncating torn commit log tail"
            );
            backend.truncate(replayed.valid_len)?;
        }

        let mut keyspace = Keyspace::new();
        let mut committed = SequenceNumber::default();
        let mut dirty = false;
        let mut commits = 0usize;
        for (offset, record) in replayed.records {
            match record {
                LogRecord::Commit { seq, mutations } => {
                    if seq <= committed {
                        return Err(CoreError::log_corruption(
                            offset,
                            format!("{seq} does not follow {committed}"),
                        ));
                    }
                    keyspace.apply(seq, &mutations);
                    committed = seq;
                    commits += 1;
                }
                LogRecord::Marker { dirty: state } => dirty = state,
            }
        }
        keyspace.prune_all(committed);

        tracing::info!(
            commits,
            committed = %committed,
            dirty,
            "graph store opened"
        );
        Ok(Self::from_parts(backend, config, keyspace, committed, dirty, dir))
    }

    fn from_parts(
        backend: Box<dyn StorageBackend>,
        config: Config,
        keyspace: Keyspace,
        committed: SequenceNumber,
        dirty: bool,
        dir: Option<GraphDir>,
    ) -> Self {
        Self {
            config,
            keyspace: RwLock::new(keyspace),
            log: Mutex::new(backend),
            write_lock: Mutex::new(()),
            committed_seq: AtomicU64::new(committed.as_u64()),
            snapshots: Mutex::new(BTreeMap::new()),
            dirty: AtomicBool::new(dirty),
            next_txn_id: AtomicU64::new(1),
            dir,
        }
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn dir(&self) -> Option<&GraphDir> {
        self.dir.as_ref()
    }

    /// Begins a read-only transaction on the latest committed snapshot.
    ///
    /// Never blocks; the snapshot stays readable until the transaction is
    /// dropped.
    pub fn new_read_only_transaction(&self) -> Transaction<'_> {
        let snapshot = {
            let mut pins = self.snapshots.lock();
            let seq = self.committed_seq.load(Ordering::SeqCst);
            *pins.entry(seq).or_insert(0) += 1;
            SequenceNumber::new(seq)
        };
        Transaction::read_only(self, self.next_txn_id(), snapshot)
    }

    /// Begins a write transaction, blocking while another one is open.
    pub fn new_transaction(&self) -> Transaction<'_> {
        let guard = self.write_lock.lock();
        let snapshot = self.committed_sequence();
        Transaction::read_write(self, self.next_txn_id(), snapshot, guard)
    }

    fn next_txn_id(&self) -> TransactionId {
        TransactionId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst))
    }

    pub(crate) fn unpin(&self, snapshot: SequenceNumber) {
        let mut pins = self.snapshots.lock();
        if let Some(count) = pins.get_mut(&snapshot.as_u64()) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&snapshot.as_u64());
            }
        }
    }

    /// Sequence of the last committed write transaction.
    #[must_use]
    pub fn committed_sequence(&self) -> SequenceNumber {
        SequenceNumber::new(self.committed_seq.load(Ordering::SeqCst))
    }

    /// Whether the dirty/valid marker is dirty.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Persists the dirty marker before a write batch.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the marker cannot be written.
    pub fn mark_dirty(&self) -> CoreResult<()> {
        self.set_marker(true)
    }

    /// Persists the valid marker after a write batch fully applied.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the marker cannot be written.
    pub fn mark_valid(&self) -> CoreResult<()> {
        self.set_marker(false)
    }

    fn set_marker(&self, dirty: bool) -> CoreResult<()> {
        let mut log = self.log.lock();
        if self.dirty.load(Ordering::SeqCst) == dirty {
            return Ok(());
        }
        let offset = log.size()?;
        let record = LogRecord::Marker { dirty }.encode();
        if let Err(err) = log.append(&record).and_then(|_| log.flush()) {
            let _ = log.truncate(offset);
            return Err(err.into());
        }
        self.dirty.store(dirty, Ordering::SeqCst);
        Ok(())
    }

    /// Logs and applies a write batch. The caller holds the write lock.
    pub(crate) fn commit(&self, mutations: Vec<Mutation>) -> CoreResult<SequenceNumber> {
        let committed = self.committed_sequence();
        if mutations.is_empty() {
            return Ok(committed);
        }
        let seq = committed.next();
        let encoded = encode_commit(seq, &mutations);

        let log_size = {
            let mut log = self.log.lock();
            let offset = log.size()?;
            let written = log.append(&encoded).and_then(|_| {
                if self.config.sync_on_commit {
                    log.sync()
                } else {
                    log.flush()
                }
            });
            if let Err(err) = written {
                let _ = log.truncate(offset);
                return Err(err.into());
            }
            offset + encoded.len() as u64
        };

        let mut keyspace = self.keyspace.write();
        keyspace.apply(seq, &mutations);
        self.committed_seq.store(seq.as_u64(), Ordering::SeqCst);
        let horizon = {
            let pins = self.snapshots.lock();
            pins.keys()
                .next()
                .map_or(seq, |oldest| SequenceNumber::new(*oldest).min(seq))
        };
        keyspace.prune(mutations.iter().map(|m| m.key.as_slice()), horizon);
        drop(keyspace);

        tracing::debug!(seq = %seq, ops = mutations.len(), "committed graph transaction");

        // The commit is durable and applied; a failed rewrite leaves the
        // longer log in place.
        if self.config.max_log_size > 0 && log_size > self.config.max_log_size {
            if let Err(err) = self.compact_locked() {
                tracing::warn!(seq = %seq, error = %err, "automatic log compaction failed");
            }
        }
        Ok(seq)
    }

    /// Rewrites the commit log as one record holding the current state.
    ///
    /// Blocks while a write transaction is open; calling it from the thread
    /// holding one deadlocks.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log cannot be replaced.
    pub fn compact(&self) -> CoreResult<()> {
        let _guard = self.write_lock.lock();
        self.compact_locked()
    }

    fn compact_locked(&self) -> CoreResult<()> {
        let committed = self.committed_sequence();
        let mutations = self.keyspace.read().live_mutations(committed);
        let keys = mutations.len();

        let mut data = Vec::new();
        if committed.as_u64() > 0 {
            data.extend(
                LogRecord::Commit {
                    seq: committed,
                    mutations,
                }
                .encode(),
            );
        }
        let mut log = self.log.lock();
        if self.dirty.load(Ordering::SeqCst) {
            data.extend(LogRecord::Marker { dirty: true }.encode());
        }
        let before = log.size()?;
        log.replace(&data)?;

        tracing::info!(
            before,
            after = data.len(),
            keys,
            committed = %committed,
            "compacted commit log"
        );
        Ok(())
    }

    /// Commit log size in bytes.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the size cannot be read.
    pub fn log_size(&self) -> CoreResult<u64> {
        Ok(self.log.lock().size()?)
    }

    /// Current store counters.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the log size cannot be read.
    pub fn stats(&self) -> CoreResult<GraphStats> {
        Ok(GraphStats {
            committed_seq: self.committed_sequence(),
            dirty: self.is_dirty(),
            keyspace: self.keyspace.read().stats(),
            log_size: self.log_size()?,
            pinned_snapshots: self.snapshots.lock().values().sum(),
        })
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("committed_seq", &self.committed_sequence())
            .field("dirty", &self.is_dirty())
            .field("dir", &self.dir.as_ref().map(GraphDir::path))
            .finish_non_exhaustive()
    }
}
