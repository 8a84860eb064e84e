//! Wiring of the graph store, the indexer and the typed stores.

use crate::config::Config;
use crate::context::RequestContext;
use crate::crud::{CategoryDef, Entity, EntityStore, Reindex};
use crate::error::{CoreError, CoreResult};
use crate::graph::{GraphStore, RESERVED_PREFIX};
use crate::index::{IndexWrapper, Indexer, SchemaWrapper};
use crate::types::Category;
use parking_lot::RwLock;
use scopegraph_storage::StorageBackend;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// How [`GraphDatabase::ensure_index`] brought the indexes up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// Loaded from a snapshot matching the committed sequence.
    Restored,
    /// Rebuilt from the graph.
    Rebuilt {
        /// Documents indexed.
        documents: usize,
    },
}

/// A graph store plus the categories registered on it.
///
/// Categories are registered once at startup with [`GraphDatabase::register`];
/// afterwards [`GraphDatabase::ensure_index`] loads or rebuilds the indexes.
pub struct GraphDatabase {
    graph: Arc<GraphStore>,
    indexer: Arc<Indexer>,
    stores: RwLock<Vec<Arc<dyn Reindex>>>,
    /// bucket prefix -> category
    buckets: RwLock<BTreeMap<&'static str, Category>>,
    closed: RwLock<bool>,
}

impl GraphDatabase {
    /// Opens a database kept only in memory.
    #[must_use]
    pub fn open_in_memory(config: Config) -> Self {
        Self::from_graph(GraphStore::open_in_memory(config))
    }

    /// Opens (or creates) a database directory, holding its lock until
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseLocked`] if another process holds the
    /// directory, or a log error if the commit log cannot be replayed.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        Ok(Self::from_graph(GraphStore::open_dir(path, config)?))
    }

    /// Opens a database over an arbitrary log backend.
    ///
    /// # Errors
    ///
    /// Returns a log error if the backend content cannot be replayed.
    pub fn with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        Ok(Self::from_graph(GraphStore::open(backend, config)?))
    }

    fn from_graph(graph: GraphStore) -> Self {
        Self {
            graph: Arc::new(graph),
            indexer: Arc::new(Indexer::new()),
            stores: RwLock::new(Vec::new()),
            buckets: RwLock::new(BTreeMap::new()),
            closed: RwLock::new(false),
        }
    }

    /// The shared graph store.
    #[must_use]
    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    /// The shared indexer.
    #[must_use]
    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    /// The configuration the graph was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.graph.config()
    }

    /// Registered categories by bucket prefix.
    #[must_use]
    pub fn buckets(&self) -> BTreeMap<&'static str, Category> {
        self.buckets.read().clone()
    }

    /// Registers a category and returns its store.
    ///
    /// When the definition carries a schema, the schema is validated, its
    /// options map is registered with the indexer and every write through
    /// the returned store keeps the index in step.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] for an empty, reserved or
    /// already registered bucket, an already registered category, or an
    /// invalid schema.
    pub fn register<T: Entity>(&self, mut def: CategoryDef<T>) -> CoreResult<Arc<EntityStore<T>>> {
        let prefix = def.bucket.prefix();
        if prefix.is_empty() || prefix.as_bytes().starts_with(RESERVED_PREFIX) {
            return Err(CoreError::invalid_configuration(format!(
                "bucket prefix {prefix:?} is reserved"
            )));
        }
        let mut buckets = self.buckets.write();
        if let Some(owner) = buckets.get(prefix) {
            return Err(CoreError::invalid_configuration(format!(
                "bucket {prefix:?} already registered by {owner}"
            )));
        }
        if buckets.values().any(|c| *c == def.category) {
            return Err(CoreError::invalid_configuration(format!(
                "category {} registered twice",
                def.category
            )));
        }

        let index = match def.schema.take() {
            Some(schema) => {
                if schema.category() != def.category {
                    return Err(CoreError::invalid_configuration(format!(
                        "schema for {} attached to {}",
                        schema.category(),
                        def.category
                    )));
                }
                self.indexer.register(schema.validate()?)?;
                Some(IndexWrapper::new(
                    Arc::clone(&self.indexer),
                    Arc::new(SchemaWrapper::new(def.bucket, schema)),
                ))
            }
            None => None,
        };

        buckets.insert(prefix, def.category);
        let category = def.category;
        let store = Arc::new(EntityStore::new(def, Arc::clone(&self.graph), index));
        self.stores.write().push(store.clone());
        tracing::debug!(%category, bucket = prefix, "registered category");
        Ok(store)
    }

    /// Brings every index up to date with the graph.
    ///
    /// A snapshot is used only when the marker is valid, re-indexing on open
    /// is not forced, and the snapshot was taken at the committed sequence.
    /// Otherwise every index is rebuilt and the marker is reset.
    ///
    /// # Errors
    ///
    /// Fails on undecodable records, a cancelled context, or when the marker
    /// cannot be written.
    pub fn ensure_index(&self, ctx: &RequestContext) -> CoreResult<IndexState> {
        let config = self.graph.config();
        if !config.verify_index_on_open && config.persist_index && !self.graph.is_dirty() {
            if let Some(dir) = self.graph.dir() {
                if let Some(data) = dir.read_snapshot()? {
                    if self.indexer.restore(&data, self.graph.committed_sequence()) {
                        return Ok(IndexState::Restored);
                    }
                }
            }
        }
        if self.graph.is_dirty() {
            tracing::warn!("dirty marker found; index may lag the graph");
        }
        let documents = self.reindex_all(ctx)?;
        Ok(IndexState::Rebuilt { documents })
    }

    /// Rebuilds every index from one consistent view of the graph and marks
    /// the graph valid. Writers are blocked for the duration.
    ///
    /// # Errors
    ///
    /// Fails on undecodable records, a cancelled context, or when the marker
    /// cannot be written.
    pub fn reindex_all(&self, ctx: &RequestContext) -> CoreResult<usize> {
        let stores = self.stores.read().clone();
        let txn = self.graph.new_transaction();
        let mut documents = 0;
        for store in &stores {
            documents += store.reindex_in(ctx, &txn)?;
        }
        self.graph.mark_valid()?;
        drop(txn);
        tracing::info!(
            categories = stores.len(),
            documents,
            seq = %self.graph.committed_sequence(),
            "re-indexed graph"
        );
        Ok(documents)
    }

    /// Writes an index snapshot at the committed sequence.
    ///
    /// Returns false when there is nowhere to write it (in-memory graph) or
    /// the marker is dirty.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the snapshot file cannot be written.
    pub fn persist_index(&self) -> CoreResult<bool> {
        let Some(dir) = self.graph.dir() else {
            return Ok(false);
        };
        let _writer = self.graph.write_lock.lock();
        if self.graph.is_dirty() {
            return Ok(false);
        }
        let seq = self.graph.committed_sequence();
        let snapshot = self.indexer.snapshot(seq)?;
        dir.write_snapshot(&snapshot)?;
        tracing::info!(%seq, bytes = snapshot.len(), "persisted index snapshot");
        Ok(true)
    }

    /// Closes the database, persisting the index snapshot when configured.
    /// Further calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the snapshot cannot be written.
    pub fn close(&self) -> CoreResult<()> {
        let mut closed = self.closed.write();
        if *closed {
            return Ok(());
        }
        if self.graph.config().persist_index {
            self.persist_index()?;
        }
        *closed = true;
        Ok(())
    }
}

impl std::fmt::Debug for GraphDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDatabase")
            .field("graph", &self.graph)
            .field("buckets", &*self.buckets.read())
            .finish_non_exhaustive()
    }
}
