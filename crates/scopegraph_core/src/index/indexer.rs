//! The process-wide inverted-index engine.

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::index::category::CategoryIndex;
use crate::index::{Document, OptionsMap};
use crate::search::{Predicate, SearchResult};
use crate::types::{Category, SequenceNumber};
use parking_lot::RwLock;
use scopegraph_codec::{from_record, to_record};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Magic bytes of an index snapshot.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"SGIX";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

const SNAPSHOT_HEADER: usize = 4 + 2 + 8;

/// Holds one inverted index per registered category.
///
/// Categories are registered once at startup; afterwards each category has
/// its own lock, so writes to one category never block searches of
/// another.
#[derive(Debug, Default)]
pub struct Indexer {
    categories: RwLock<BTreeMap<Category, Arc<RwLock<CategoryIndex>>>>,
}

impl Indexer {
    /// An indexer without categories.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a category with its options map.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] if the category is
    /// already registered.
    pub fn register(&self, options: OptionsMap) -> CoreResult<()> {
        let mut categories = self.categories.write();
        let category = options.category();
        if categories.contains_key(&category) {
            return Err(CoreError::invalid_configuration(format!(
                "index for {category} registered twice"
            )));
        }
        categories.insert(category, Arc::new(RwLock::new(CategoryIndex::new(options))));
        Ok(())
    }

    /// Registered categories, sorted by name.
    #[must_use]
    pub fn categories(&self) -> Vec<Category> {
        self.categories.read().keys().copied().collect()
    }

    fn index(&self, category: Category) -> CoreResult<Arc<RwLock<CategoryIndex>>> {
        self.categories
            .read()
            .get(&category)
            .cloned()
            .ok_or_else(|| CoreError::unknown_category(category.name()))
    }

    /// The options map of `category`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn options(&self, category: Category) -> CoreResult<OptionsMap> {
        Ok(self.index(category)?.read().options().clone())
    }

    /// Adds or replaces a document.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn add_document(&self, category: Category, doc: Document) -> CoreResult<()> {
        self.add_documents(category, vec![doc])
    }

    /// Adds or replaces documents.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn add_documents(&self, category: Category, docs: Vec<Document>) -> CoreResult<()> {
        self.apply(category, docs.into_iter().map(|doc| (doc.id.clone(), Some(doc))))
    }

    /// Removes a document; absent ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn delete_document(&self, category: Category, id: &str) -> CoreResult<()> {
        self.delete_documents(category, &[id.to_string()])
    }

    /// Removes documents; absent ids are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn delete_documents(&self, category: Category, ids: &[String]) -> CoreResult<()> {
        self.apply(category, ids.iter().map(|id| (id.clone(), None)))
    }

    /// Applies upserts (`Some`) and deletes (`None`) in order, under one
    /// lock acquisition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn apply<I>(&self, category: Category, updates: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (String, Option<Document>)>,
    {
        let index = self.index(category)?;
        let mut index = index.write();
        let (mut upserts, mut deletes) = (0usize, 0usize);
        for (id, doc) in updates {
            match doc {
                Some(doc) => {
                    index.upsert(doc);
                    upserts += 1;
                }
                None => {
                    index.remove(&id);
                    deletes += 1;
                }
            }
        }
        tracing::debug!(%category, upserts, deletes, "applied index updates");
        Ok(())
    }

    /// The stored document `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn document(&self, category: Category, id: &str) -> CoreResult<Option<Document>> {
        Ok(self.index(category)?.read().get(id).cloned())
    }

    /// Runs `predicate` against `category`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidQuery`] for unknown fields or bad values,
    /// [`CoreError::Cancelled`], or [`CoreError::UnknownCategory`].
    pub fn search(
        &self,
        ctx: &RequestContext,
        category: Category,
        predicate: &Predicate,
    ) -> CoreResult<Vec<SearchResult>> {
        self.index(category)?.read().search(ctx, predicate)
    }

    /// Counts matches of `predicate` in `category`.
    ///
    /// # Errors
    ///
    /// Same as [`Indexer::search`].
    pub fn count(&self, ctx: &RequestContext, category: Category, predicate: &Predicate) -> CoreResult<usize> {
        Ok(self.search(ctx, category, predicate)?.len())
    }

    /// Number of documents in `category`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn len(&self, category: Category) -> CoreResult<usize> {
        Ok(self.index(category)?.read().len())
    }

    /// Removes every document of `category`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn clear(&self, category: Category) -> CoreResult<()> {
        self.index(category)?.write().clear();
        Ok(())
    }

    /// Replaces every document of `category`; returns the new count.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownCategory`] for unregistered categories.
    pub fn rebuild(&self, category: Category, docs: Vec<Document>) -> CoreResult<usize> {
        let index = self.index(category)?;
        let mut index = index.write();
        index.clear();
        for doc in docs {
            index.upsert(doc);
        }
        tracing::info!(%category, documents = index.len(), "rebuilt index");
        Ok(index.len())
    }

    /// Serializes every category, stamped with the graph sequence the
    /// documents reflect.
    ///
    /// # Errors
    ///
    /// Returns a codec error if serialization fails.
    pub fn snapshot(&self, seq: SequenceNumber) -> CoreResult<Vec<u8>> {
        let mut docs: BTreeMap<String, Vec<Document>> = BTreeMap::new();
        for (category, index) in self.categories.read().iter() {
            docs.insert(
                category.name().to_string(),
                index.read().documents().cloned().collect(),
            );
        }
        let body = to_record(&docs)?;
        let mut out = Vec::with_capacity(SNAPSHOT_HEADER + body.len());
        out.extend_from_slice(&SNAPSHOT_MAGIC);
        out.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        out.extend_from_slice(&seq.as_u64().to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Loads a snapshot taken at `expected`.
    ///
    /// Returns false, leaving the indexes untouched, when the snapshot is
    /// stale, malformed, or does not cover exactly the registered
    /// categories.
    pub fn restore(&self, data: &[u8], expected: SequenceNumber) -> bool {
        if data.len() < SNAPSHOT_HEADER || data[0..4] != SNAPSHOT_MAGIC {
            tracing::warn!("index snapshot has no valid header");
            return false;
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        let mut raw_seq = [0u8; 8];
        raw_seq.copy_from_slice(&data[6..14]);
        let seq = SequenceNumber::new(u64::from_le_bytes(raw_seq));
        if version != SNAPSHOT_VERSION || seq != expected {
            tracing::info!(version, snapshot = %seq, expected = %expected, "index snapshot is stale");
            return false;
        }
        let docs: BTreeMap<String, Vec<Document>> = match from_record(&data[SNAPSHOT_HEADER..]) {
            Ok(docs) => docs,
            Err(err) => {
                tracing::warn!(error = %err, "index snapshot is undecodable");
                return false;
            }
        };

        let categories = self.categories.read();
        let names: Vec<&str> = categories.keys().map(|c| c.name()).collect();
        if docs.len() != names.len() || !names.iter().all(|name| docs.contains_key(*name)) {
            tracing::info!("index snapshot covers different categories");
            return false;
        }
        for (category, index) in categories.iter() {
            let mut index = index.write();
            index.clear();
            for doc in docs.get(category.name()).into_iter().flatten() {
                index.upsert(doc.clone());
            }
        }
        tracing::info!(snapshot = %seq, categories = names.len(), "restored index snapshot");
        true
    }
}
