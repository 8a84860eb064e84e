//! The composition root of the security graph.

use crate::config::Config;
use crate::context::RequestContext;
use crate::crud::{Entity, EntityStore};
use crate::database::{GraphDatabase, IndexState};
use crate::error::{CoreError, CoreResult};
use crate::index::Indexer;
use crate::sac::{AccessScope, FilteredStore, ScopeFilter};
use crate::schema::categories::{self as defs, categories};
use crate::schema::model::{
    ActiveComponent, Cluster, Component, ComponentCveEdge, Cve, Deployment, Image, ImageComponentEdge,
    ImageCveEdge, Namespace, Node, NodeComponentEdge,
};
use crate::schema::pipelines::compound_searcher;
use crate::schema::scopes::scope_transforms;
use crate::search::{CategorySearcher, Searcher, SearcherChain, SortOption, SortSource};
use crate::types::Category;
use scopegraph_storage::StorageBackend;
use std::path::Path;
use std::sync::Arc;

/// Unfiltered stores, for ingestion and maintenance.
#[derive(Debug)]
#[allow(missing_docs)]
pub struct Stores {
    pub clusters: Arc<EntityStore<Cluster>>,
    pub namespaces: Arc<EntityStore<Namespace>>,
    pub deployments: Arc<EntityStore<Deployment>>,
    pub images: Arc<EntityStore<Image>>,
    pub components: Arc<EntityStore<Component>>,
    pub cves: Arc<EntityStore<Cve>>,
    pub nodes: Arc<EntityStore<Node>>,
    pub image_component_edges: Arc<EntityStore<ImageComponentEdge>>,
    pub component_cve_edges: Arc<EntityStore<ComponentCveEdge>>,
    pub image_cve_edges: Arc<EntityStore<ImageCveEdge>>,
    pub node_component_edges: Arc<EntityStore<NodeComponentEdge>>,
    pub active_components: Arc<EntityStore<ActiveComponent>>,
}

/// Stores filtered by the caller's access scopes.
#[derive(Debug)]
#[allow(missing_docs)]
pub struct ScopedStores {
    pub clusters: Arc<FilteredStore<Cluster>>,
    pub namespaces: Arc<FilteredStore<Namespace>>,
    pub deployments: Arc<FilteredStore<Deployment>>,
    pub images: Arc<FilteredStore<Image>>,
    pub components: Arc<FilteredStore<Component>>,
    pub cves: Arc<FilteredStore<Cve>>,
    pub nodes: Arc<FilteredStore<Node>>,
    pub image_component_edges: Arc<FilteredStore<ImageComponentEdge>>,
    pub component_cve_edges: Arc<FilteredStore<ComponentCveEdge>>,
    pub image_cve_edges: Arc<FilteredStore<ImageCveEdge>>,
    pub node_component_edges: Arc<FilteredStore<NodeComponentEdge>>,
    pub active_components: Arc<FilteredStore<ActiveComponent>>,
}

/// Scope-filtered, paginated searchers.
#[allow(missing_docs)]
pub struct Searchers {
    pub clusters: Arc<dyn Searcher>,
    pub namespaces: Arc<dyn Searcher>,
    pub nodes: Arc<dyn Searcher>,
    pub deployments: Arc<dyn Searcher>,
    pub images: Arc<dyn Searcher>,
    pub components: Arc<dyn Searcher>,
    pub cves: Arc<dyn Searcher>,
    pub component_cve_edges: Arc<dyn Searcher>,
    pub active_components: Arc<dyn Searcher>,
}

impl std::fmt::Debug for Searchers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Searchers").finish_non_exhaustive()
    }
}

/// Every store and searcher of the security graph, built once over one
/// [`GraphDatabase`].
#[derive(Debug)]
pub struct SecurityGraph {
    db: GraphDatabase,
    stores: Stores,
    scoped: ScopedStores,
    searchers: Searchers,
    index_state: IndexState,
}

fn filter_for(db: &GraphDatabase, category: Category) -> CoreResult<Arc<ScopeFilter>> {
    let (level, transforms) =
        scope_transforms(category).ok_or_else(|| CoreError::unknown_category(category.name()))?;
    Ok(Arc::new(ScopeFilter::new(
        Arc::clone(db.graph()),
        category,
        level,
        transforms,
    )?))
}

fn scoped<T: Entity>(db: &GraphDatabase, store: &Arc<EntityStore<T>>) -> CoreResult<FilteredStore<T>> {
    Ok(FilteredStore::new(store.clone(), filter_for(db, store.category())?))
}

fn cluster_scope(cluster: &Cluster) -> Option<AccessScope> {
    Some(AccessScope::Cluster(cluster.id.clone()))
}

fn namespace_scope(namespace: &Namespace) -> Option<AccessScope> {
    Some(AccessScope::namespace(&namespace.cluster_id, &namespace.name))
}

fn deployment_scope(deployment: &Deployment) -> Option<AccessScope> {
    Some(AccessScope::namespace(&deployment.cluster_id, &deployment.namespace))
}

fn node_scope(node: &Node) -> Option<AccessScope> {
    Some(AccessScope::Cluster(node.cluster_id.clone()))
}

fn chain(
    db: &GraphDatabase,
    base: Arc<dyn Searcher>,
    category: Category,
    default_sort: Option<SortOption>,
) -> CoreResult<Arc<dyn Searcher>> {
    let indexer: &Arc<Indexer> = db.indexer();
    let mut chain = SearcherChain::new(base)
        .with_filter(filter_for(db, category)?)
        .with_sort_source(SortSource::new(Arc::clone(indexer), category));
    if let Some(sort) = default_sort {
        chain = chain.with_default_sort(sort);
    }
    chain.build()
}

fn plain(db: &GraphDatabase, category: Category, default_sort: Option<SortOption>) -> CoreResult<Arc<dyn Searcher>> {
    let base = Arc::new(CategorySearcher::new(Arc::clone(db.indexer()), category));
    chain(db, base, category, default_sort)
}

fn compound(db: &GraphDatabase, category: Category, default_sort: Option<SortOption>) -> CoreResult<Arc<dyn Searcher>> {
    let base = Arc::new(compound_searcher(Arc::clone(db.graph()), db.indexer(), category)?);
    chain(db, base, category, default_sort)
}

impl SecurityGraph {
    /// Opens (or creates) the graph in a directory.
    ///
    /// # Errors
    ///
    /// Fails when the directory is locked, the log is corrupt, or the index
    /// cannot be brought up to date.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        Self::build(GraphDatabase::open(path, config)?)
    }

    /// Opens a graph kept only in memory.
    ///
    /// # Errors
    ///
    /// Fails only on inconsistent wiring.
    pub fn open_in_memory(config: Config) -> CoreResult<Self> {
        Self::build(GraphDatabase::open_in_memory(config))
    }

    /// Opens the graph over an arbitrary log backend.
    ///
    /// # Errors
    ///
    /// Fails when the log is corrupt or the index cannot be brought up to
    /// date.
    pub fn with_backend(backend: Box<dyn StorageBackend>, config: Config) -> CoreResult<Self> {
        Self::build(GraphDatabase::with_backend(backend, config)?)
    }

    fn build(db: GraphDatabase) -> CoreResult<Self> {
        let stores = Stores {
            clusters: db.register(defs::cluster())?,
            namespaces: db.register(defs::namespace())?,
            deployments: db.register(defs::deployment())?,
            images: db.register(defs::image())?,
            components: db.register(defs::component())?,
            cves: db.register(defs::cve())?,
            nodes: db.register(defs::node())?,
            image_component_edges: db.register(defs::image_component_edge())?,
            component_cve_edges: db.register(defs::component_cve_edge())?,
            image_cve_edges: db.register(defs::image_cve_edge())?,
            node_component_edges: db.register(defs::node_component_edge())?,
            active_components: db.register(defs::active_component())?,
        };

        let scoped = ScopedStores {
            clusters: Arc::new(scoped(&db, &stores.clusters)?.with_own_scope(cluster_scope)),
            namespaces: Arc::new(scoped(&db, &stores.namespaces)?.with_own_scope(namespace_scope)),
            deployments: Arc::new(scoped(&db, &stores.deployments)?.with_own_scope(deployment_scope)),
            images: Arc::new(scoped(&db, &stores.images)?),
            components: Arc::new(scoped(&db, &stores.components)?),
            cves: Arc::new(scoped(&db, &stores.cves)?),
            nodes: Arc::new(scoped(&db, &stores.nodes)?.with_own_scope(node_scope)),
            image_component_edges: Arc::new(scoped(&db, &stores.image_component_edges)?),
            component_cve_edges: Arc::new(scoped(&db, &stores.component_cve_edges)?),
            image_cve_edges: Arc::new(scoped(&db, &stores.image_cve_edges)?),
            node_component_edges: Arc::new(scoped(&db, &stores.node_component_edges)?),
            active_components: Arc::new(scoped(&db, &stores.active_components)?),
        };

        let searchers = Searchers {
            clusters: plain(&db, categories::CLUSTER, Some(SortOption::field("Cluster")))?,
            namespaces: plain(&db, categories::NAMESPACE, Some(SortOption::field("Namespace")))?,
            nodes: plain(&db, categories::NODE, Some(SortOption::field("Node")))?,
            active_components: plain(&db, categories::ACTIVE_COMPONENT, None)?,
            deployments: compound(
                &db,
                categories::DEPLOYMENT,
                Some(SortOption::field("Deployment Risk Priority")),
            )?,
            images: compound(&db, categories::IMAGE, Some(SortOption::field("Image Risk Priority")))?,
            components: compound(
                &db,
                categories::COMPONENT,
                Some(SortOption::field("Component Risk Score").reversed()),
            )?,
            cves: compound(&db, categories::CVE, Some(SortOption::field("CVSS").reversed()))?,
            component_cve_edges: compound(&db, categories::COMPONENT_CVE_EDGE, None)?,
        };

        let index_state = db.ensure_index(&RequestContext::unrestricted())?;
        tracing::info!(
            categories = db.buckets().len(),
            seq = %db.graph().committed_sequence(),
            index = ?index_state,
            "opened security graph"
        );
        Ok(Self {
            db,
            stores,
            scoped,
            searchers,
            index_state,
        })
    }

    /// The underlying database.
    #[must_use]
    pub fn database(&self) -> &GraphDatabase {
        &self.db
    }

    /// Unfiltered stores.
    #[must_use]
    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Scope-filtered stores.
    #[must_use]
    pub fn scoped(&self) -> &ScopedStores {
        &self.scoped
    }

    /// Scope-filtered searchers.
    #[must_use]
    pub fn searchers(&self) -> &Searchers {
        &self.searchers
    }

    /// How the indexes were brought up to date at open.
    #[must_use]
    pub fn index_state(&self) -> IndexState {
        self.index_state
    }

    /// Closes the underlying database.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the index snapshot cannot be written.
    pub fn close(&self) -> CoreResult<()> {
        self.db.close()
    }
}
