//! Test graphs and the two-cluster security fixture.
//!
//! ```text
//! cluster-1 ── namespace-a ── deployment-1 ── image-1 ══ component-1..4
//!     └── node-1
//! cluster-2 ── namespace-b ── deployment-2 ── image-2 ══ component-3, component-5
//!     └── node-2 ══ component-6
//! ```
//!
//! Component to CVE links:
//!
//! | component   | CVEs                                       |
//! |-------------|--------------------------------------------|
//! | component-1 | CVE-1234-0001, CVE-4567-0002               |
//! | component-2 | CVE-1234-0003                              |
//! | component-3 | CVE-3456-0004, CVE-3456-0005               |
//! | component-4 | -                                          |
//! | component-5 | CVE-4567-0002, CVE-2345-0006, CVE-2345-0007|
//! | component-6 | CVE-1234-0001                              |

use scopegraph_codec::EdgeId;
use scopegraph_core::schema::model::{
    ActiveComponent, Cluster, Component, ComponentCveEdge, Cve, Deployment, Image, ImageComponentEdge,
    ImageCveEdge, Namespace, Node, NodeComponentEdge,
};
use scopegraph_core::{Config, CoreResult, RequestContext, SecurityGraph, Store};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Ids used by the fixture.
pub mod ids {
    #![allow(missing_docs)]

    pub const CLUSTER1: &str = "cluster-1";
    pub const CLUSTER2: &str = "cluster-2";
    pub const NAMESPACE_A: &str = "ns-a";
    pub const NAMESPACE_B: &str = "ns-b";
    pub const DEPLOYMENT1: &str = "deployment-1";
    pub const DEPLOYMENT2: &str = "deployment-2";
    pub const IMAGE1: &str = "sha256:image-1";
    pub const IMAGE2: &str = "sha256:image-2";
    pub const NODE1: &str = "node-1";
    pub const NODE2: &str = "node-2";
    pub const COMPONENT1: &str = "component-1";
    pub const COMPONENT2: &str = "component-2";
    pub const COMPONENT3: &str = "component-3";
    pub const COMPONENT4: &str = "component-4";
    pub const COMPONENT5: &str = "component-5";
    pub const COMPONENT6: &str = "component-6";
    pub const CVE1: &str = "CVE-1234-0001";
    pub const CVE2: &str = "CVE-4567-0002";
    pub const CVE3: &str = "CVE-1234-0003";
    pub const CVE4: &str = "CVE-3456-0004";
    pub const CVE5: &str = "CVE-3456-0005";
    pub const CVE6: &str = "CVE-2345-0006";
    pub const CVE7: &str = "CVE-2345-0007";
}

/// Namespace name (not id) of `ns-a`.
pub const NAMESPACE_A_NAME: &str = "namespace-a";
/// Namespace name (not id) of `ns-b`.
pub const NAMESPACE_B_NAME: &str = "namespace-b";

/// Id of the edge record linking `parent` to `child`.
#[must_use]
pub fn edge_id(parent: &str, child: &str) -> String {
    EdgeId::new(parent, child).to_string()
}

/// A security graph with automatic cleanup.
pub struct TestGraph {
    /// The graph.
    pub graph: SecurityGraph,
    config: Config,
    temp_dir: Option<TempDir>,
}

impl TestGraph {
    /// An empty in-memory graph.
    pub fn memory() -> Self {
        Self::memory_with_config(Config::default())
    }

    /// An empty in-memory graph with `config`.
    pub fn memory_with_config(config: Config) -> Self {
        Self {
            graph: SecurityGraph::open_in_memory(config.clone()).expect("Failed to open in-memory graph"),
            config,
            temp_dir: None,
        }
    }

    /// An empty graph persisted in a temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// An empty temp-dir graph with `config`.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let graph =
            SecurityGraph::open(&temp_dir.path().join("graph"), config.clone()).expect("Failed to open file graph");
        Self {
            graph,
            config,
            temp_dir: Some(temp_dir),
        }
    }

    /// An in-memory graph loaded with the fixture.
    pub fn with_fixture() -> Self {
        let graph = Self::memory();
        Fixture::security().load(&graph).expect("Failed to load fixture");
        graph
    }

    /// The graph directory if file-based.
    pub fn path(&self) -> Option<PathBuf> {
        self.temp_dir.as_ref().map(|d| d.path().join("graph"))
    }

    /// Closes the graph and opens it again from its directory.
    ///
    /// # Panics
    ///
    /// Panics for in-memory graphs.
    #[must_use]
    pub fn reopen(self) -> Self {
        let path = self.path().expect("Only file graphs can be reopened");
        let Self {
            graph,
            config,
            temp_dir,
        } = self;
        graph.close().expect("Failed to close graph");
        drop(graph);
        Self {
            graph: SecurityGraph::open(&path, config.clone()).expect("Failed to reopen graph"),
            config,
            temp_dir,
        }
    }
}

impl std::ops::Deref for TestGraph {
    type Target = SecurityGraph;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

/// Runs a test with a temporary in-memory graph.
pub fn with_temp_graph<F, R>(f: F) -> R
where
    F: FnOnce(&SecurityGraph) -> R,
{
    let test_graph = TestGraph::memory();
    f(&test_graph.graph)
}

/// Runs a test with a temporary file-based graph.
pub fn with_file_graph<F, R>(f: F) -> R
where
    F: FnOnce(&SecurityGraph, &Path) -> R,
{
    let test_graph = TestGraph::file();
    let path = test_graph.path().expect("File graph should have a path");
    f(&test_graph.graph, &path)
}

/// Every record of a security graph, ready to load.
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct Fixture {
    pub clusters: Vec<Cluster>,
    pub namespaces: Vec<Namespace>,
    pub deployments: Vec<Deployment>,
    pub images: Vec<Image>,
    pub components: Vec<Component>,
    pub cves: Vec<Cve>,
    pub nodes: Vec<Node>,
    pub image_component_edges: Vec<ImageComponentEdge>,
    pub component_cve_edges: Vec<ComponentCveEdge>,
    pub image_cve_edges: Vec<ImageCveEdge>,
    pub node_component_edges: Vec<NodeComponentEdge>,
    pub active_components: Vec<ActiveComponent>,
}

fn cluster(id: &str, name: &str) -> Cluster {
    Cluster {
        id: id.into(),
        name: name.into(),
    }
}

fn namespace(id: &str, name: &str, cluster_id: &str) -> Namespace {
    Namespace {
        id: id.into(),
        name: name.into(),
        cluster_id: cluster_id.into(),
    }
}

fn component(id: &str, name: &str, version: &str, risk_score: f32) -> Component {
    Component {
        id: id.into(),
        name: name.into(),
        version: version.into(),
        risk_score,
    }
}

fn cve(id: &str, cvss: f32, summary: &str) -> Cve {
    Cve {
        id: id.into(),
        cvss,
        summary: summary.into(),
    }
}

impl Fixture {
    /// The two-cluster fixture described in the module docs.
    #[must_use]
    pub fn security() -> Self {
        use ids::*;

        let image_components: [(&str, &[&str]); 2] = [
            (IMAGE1, &[COMPONENT1, COMPONENT2, COMPONENT3, COMPONENT4]),
            (IMAGE2, &[COMPONENT3, COMPONENT5]),
        ];
        let component_cves: [(&str, &[&str]); 6] = [
            (COMPONENT1, &[CVE1, CVE2]),
            (COMPONENT2, &[CVE3]),
            (COMPONENT3, &[CVE4, CVE5]),
            (COMPONENT4, &[]),
            (COMPONENT5, &[CVE2, CVE6, CVE7]),
            (COMPONENT6, &[CVE1]),
        ];

        let mut fixture = Self {
            clusters: vec![cluster(CLUSTER1, "prod"), cluster(CLUSTER2, "staging")],
            namespaces: vec![
                namespace(NAMESPACE_A, NAMESPACE_A_NAME, CLUSTER1),
                namespace(NAMESPACE_B, NAMESPACE_B_NAME, CLUSTER2),
            ],
            deployments: vec![
                Deployment {
                    id: DEPLOYMENT1.into(),
                    name: "frontend".into(),
                    namespace_id: NAMESPACE_A.into(),
                    namespace: NAMESPACE_A_NAME.into(),
                    cluster_id: CLUSTER1.into(),
                    image_ids: vec![IMAGE1.into()],
                    risk_priority: 2,
                },
                Deployment {
                    id: DEPLOYMENT2.into(),
                    name: "cache".into(),
                    namespace_id: NAMESPACE_B.into(),
                    namespace: NAMESPACE_B_NAME.into(),
                    cluster_id: CLUSTER2.into(),
                    image_ids: vec![IMAGE2.into()],
                    risk_priority: 1,
                },
            ],
            images: vec![
                Image {
                    id: IMAGE1.into(),
                    name: "nginx:1.25".into(),
                    os: "debian:12".into(),
                    risk_priority: 1,
                },
                Image {
                    id: IMAGE2.into(),
                    name: "redis:7.2".into(),
                    os: "alpine:3.19".into(),
                    risk_priority: 2,
                },
            ],
            components: vec![
                component(COMPONENT1, "openssl", "3.0.11", 5.0),
                component(COMPONENT2, "zlib", "1.2.13", 2.0),
                component(COMPONENT3, "glibc", "2.36", 9.0),
                component(COMPONENT4, "tzdata", "2024a", 1.0),
                component(COMPONENT5, "musl", "1.2.4", 7.0),
                component(COMPONENT6, "kernel", "6.1.0", 3.0),
            ],
            cves: vec![
                cve(CVE1, 7.5, "buffer overflow in certificate parsing"),
                cve(CVE2, 5.0, "denial of service via crafted input"),
                cve(CVE3, 9.8, "heap overflow in inflate"),
                cve(CVE4, 4.3, "information leak in resolver"),
                cve(CVE5, 6.1, "integer overflow in iconv"),
                cve(CVE6, 8.8, "use after free in allocator"),
                cve(CVE7, 3.1, "timing side channel in printf"),
            ],
            nodes: vec![
                Node {
                    id: NODE1.into(),
                    name: "worker-1".into(),
                    cluster_id: CLUSTER1.into(),
                },
                Node {
                    id: NODE2.into(),
                    name: "worker-2".into(),
                    cluster_id: CLUSTER2.into(),
                },
            ],
            node_component_edges: vec![NodeComponentEdge {
                id: edge_id(NODE2, COMPONENT6),
            }],
            active_components: vec![ActiveComponent {
                id: edge_id(DEPLOYMENT1, COMPONENT1),
                deployment_id: DEPLOYMENT1.into(),
                component_id: COMPONENT1.into(),
                containers: vec!["web".into()],
            }],
            ..Self::default()
        };

        for (image, components) in image_components {
            for component in components {
                fixture.image_component_edges.push(ImageComponentEdge {
                    id: edge_id(image, component),
                    location: format!("/usr/lib/{component}"),
                });
                let cves = component_cves
                    .iter()
                    .find(|(c, _)| c == component)
                    .map_or(&[][..], |(_, cves)| *cves);
                for cve in cves {
                    let id = edge_id(image, cve);
                    if fixture.image_cve_edges.iter().all(|e| e.id != id) {
                        fixture.image_cve_edges.push(ImageCveEdge {
                            id,
                            state: "OBSERVED".into(),
                        });
                    }
                }
            }
        }
        for (component, cves) in component_cves {
            for cve in cves {
                fixture.component_cve_edges.push(ComponentCveEdge {
                    id: edge_id(component, cve),
                    is_fixable: *cve != CVE7,
                    fixed_by: if *cve == CVE7 { String::new() } else { "next".into() },
                });
            }
        }
        fixture
    }

    /// Writes every record through the unfiltered stores.
    ///
    /// # Errors
    ///
    /// Returns the first store error.
    pub fn load(&self, graph: &SecurityGraph) -> CoreResult<()> {
        let ctx = RequestContext::unrestricted();
        let stores = graph.stores();
        stores.clusters.upsert_batch(&ctx, &self.clusters)?;
        stores.namespaces.upsert_batch(&ctx, &self.namespaces)?;
        stores.deployments.upsert_batch(&ctx, &self.deployments)?;
        stores.images.upsert_batch(&ctx, &self.images)?;
        stores.components.upsert_batch(&ctx, &self.components)?;
        stores.cves.upsert_batch(&ctx, &self.cves)?;
        stores.nodes.upsert_batch(&ctx, &self.nodes)?;
        stores
            .image_component_edges
            .upsert_batch(&ctx, &self.image_component_edges)?;
        stores
            .component_cve_edges
            .upsert_batch(&ctx, &self.component_cve_edges)?;
        stores.image_cve_edges.upsert_batch(&ctx, &self.image_cve_edges)?;
        stores
            .node_component_edges
            .upsert_batch(&ctx, &self.node_component_edges)?;
        stores
            .active_components
            .upsert_batch(&ctx, &self.active_components)?;
        Ok(())
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clusters.len()
            + self.namespaces.len()
            + self.deployments.len()
            + self.images.len()
            + self.components.len()
            + self.cves.len()
            + self.nodes.len()
            + self.image_component_edges.len()
            + self.component_cve_edges.len()
            + self.image_cve_edges.len()
            + self.node_component_edges.len()
            + self.active_components.len()
    }

    /// Whether the fixture holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopegraph_core::search::{self, Query, Searcher};

    #[test]
    fn fixture_shape() {
        let fixture = Fixture::security();
        assert_eq!(fixture.image_component_edges.len(), 6);
        assert_eq!(fixture.component_cve_edges.len(), 9);
        // image-1: CVE1..CVE5; image-2: CVE4, CVE5, CVE2, CVE6, CVE7
        assert_eq!(fixture.image_cve_edges.len(), 10);
        assert_eq!(fixture.len(), 50);
    }

    #[test]
    fn fixture_loads_and_indexes() {
        let graph = TestGraph::with_fixture();
        let ctx = RequestContext::unrestricted();
        assert_eq!(graph.stores().cves.count(&ctx).unwrap(), 7);
        let found = graph
            .searchers()
            .images
            .search(&ctx, &Query::match_all())
            .unwrap();
        assert_eq!(search::ids(&found), vec![ids::IMAGE1, ids::IMAGE2]);
    }

    #[test]
    fn file_graph_survives_reopen() {
        let graph = TestGraph::file();
        Fixture::security().load(&graph).unwrap();
        let graph = graph.reopen();
        let ctx = RequestContext::unrestricted();
        assert_eq!(graph.stores().components.count(&ctx).unwrap(), 6);
        assert_eq!(
            graph.stores().deployments.get(&ctx, ids::DEPLOYMENT1).unwrap().map(|d| d.name),
            Some("frontend".to_string())
        );
    }

    #[test]
    fn with_temp_graph_works() {
        let count = with_temp_graph(|graph| {
            graph
                .stores()
                .clusters
                .count(&RequestContext::unrestricted())
                .unwrap()
        });
        assert_eq!(count, 0);
    }
}
