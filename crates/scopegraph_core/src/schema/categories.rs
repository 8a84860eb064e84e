//! Buckets, categories and relations of the security graph.
//!
//! ```text
//! Cluster ─▶ Namespace ─▶ Deployment ─▶ Image ─▶ Component ─▶ CVE
//!    │                        │           └──────────────────▶ CVE
//!    └─▶ Node ─▶ Component    └─▶ ActiveComponent ─▶ Component
//! ```

use crate::crud::{CategoryDef, Relation};
use crate::schema::fields;
use crate::schema::model::{
    ActiveComponent, Cluster, Component, ComponentCveEdge, Cve, Deployment, Image, ImageComponentEdge,
    ImageCveEdge, Namespace, Node, NodeComponentEdge,
};
use crate::types::Category;
use scopegraph_codec::BucketHandler;

/// Bucket prefixes.
pub mod buckets {
    use scopegraph_codec::BucketHandler;

    /// Clusters.
    pub const CLUSTER: BucketHandler = BucketHandler::new("cluster");
    /// Namespaces.
    pub const NAMESPACE: BucketHandler = BucketHandler::new("namespace");
    /// Deployments.
    pub const DEPLOYMENT: BucketHandler = BucketHandler::new("deployment");
    /// Images.
    pub const IMAGE: BucketHandler = BucketHandler::new("image");
    /// Components.
    pub const COMPONENT: BucketHandler = BucketHandler::new("image_component");
    /// CVEs.
    pub const CVE: BucketHandler = BucketHandler::new("image_vuln");
    /// Nodes.
    pub const NODE: BucketHandler = BucketHandler::new("node");
    /// Image to component edges.
    pub const IMAGE_COMPONENT_EDGE: BucketHandler = BucketHandler::new("image_to_comp");
    /// Component to CVE edges.
    pub const COMPONENT_CVE_EDGE: BucketHandler = BucketHandler::new("comp_to_vuln");
    /// Image to CVE edges.
    pub const IMAGE_CVE_EDGE: BucketHandler = BucketHandler::new("image_to_cve");
    /// Node to component edges.
    pub const NODE_COMPONENT_EDGE: BucketHandler = BucketHandler::new("node_to_comp");
    /// Active components.
    pub const ACTIVE_COMPONENT: BucketHandler = BucketHandler::new("active_components");
}

/// Category names.
pub mod categories {
    use crate::types::Category;

    /// Clusters.
    pub const CLUSTER: Category = Category::new("cluster");
    /// Namespaces.
    pub const NAMESPACE: Category = Category::new("namespace");
    /// Deployments.
    pub const DEPLOYMENT: Category = Category::new("deployment");
    /// Images.
    pub const IMAGE: Category = Category::new("image");
    /// Components.
    pub const COMPONENT: Category = Category::new("component");
    /// CVEs.
    pub const CVE: Category = Category::new("cve");
    /// Nodes.
    pub const NODE: Category = Category::new("node");
    /// Image to component edges.
    pub const IMAGE_COMPONENT_EDGE: Category = Category::new("image_component_edge");
    /// Component to CVE edges.
    pub const COMPONENT_CVE_EDGE: Category = Category::new("component_cve_edge");
    /// Image to CVE edges.
    pub const IMAGE_CVE_EDGE: Category = Category::new("image_cve_edge");
    /// Node to component edges.
    pub const NODE_COMPONENT_EDGE: Category = Category::new("node_component_edge");
    /// Active components.
    pub const ACTIVE_COMPONENT: Category = Category::new("active_component");
}

/// Every category with its bucket.
pub const ALL: [(Category, BucketHandler); 12] = [
    (categories::CLUSTER, buckets::CLUSTER),
    (categories::NAMESPACE, buckets::NAMESPACE),
    (categories::DEPLOYMENT, buckets::DEPLOYMENT),
    (categories::IMAGE, buckets::IMAGE),
    (categories::COMPONENT, buckets::COMPONENT),
    (categories::CVE, buckets::CVE),
    (categories::NODE, buckets::NODE),
    (categories::IMAGE_COMPONENT_EDGE, buckets::IMAGE_COMPONENT_EDGE),
    (categories::COMPONENT_CVE_EDGE, buckets::COMPONENT_CVE_EDGE),
    (categories::IMAGE_CVE_EDGE, buckets::IMAGE_CVE_EDGE),
    (categories::NODE_COMPONENT_EDGE, buckets::NODE_COMPONENT_EDGE),
    (categories::ACTIVE_COMPONENT, buckets::ACTIVE_COMPONENT),
];

fn def<T: crate::crud::Entity>(category: Category, bucket: BucketHandler) -> CategoryDef<T> {
    CategoryDef::new(category, bucket)
}

/// Clusters: roots of the graph.
#[must_use]
pub fn cluster() -> CategoryDef<Cluster> {
    def(categories::CLUSTER, buckets::CLUSTER).schema(fields::cluster())
}

/// Namespaces hang off their cluster.
#[must_use]
pub fn namespace() -> CategoryDef<Namespace> {
    def(categories::NAMESPACE, buckets::NAMESPACE)
        .relation(Relation::Parents {
            bucket: buckets::CLUSTER,
            ids: |ns: &Namespace| vec![ns.cluster_id.clone()],
        })
        .schema(fields::namespace())
}

/// Deployments hang off their namespace and point at their images.
#[must_use]
pub fn deployment() -> CategoryDef<Deployment> {
    def(categories::DEPLOYMENT, buckets::DEPLOYMENT)
        .relation(Relation::Parents {
            bucket: buckets::NAMESPACE,
            ids: |d: &Deployment| vec![d.namespace_id.clone()],
        })
        .relation(Relation::Children {
            bucket: buckets::IMAGE,
            ids: |d: &Deployment| d.image_ids.clone(),
        })
        .schema(fields::deployment())
}

/// Images; their components and CVEs are attached by edge records.
#[must_use]
pub fn image() -> CategoryDef<Image> {
    def(categories::IMAGE, buckets::IMAGE).schema(fields::image())
}

/// Components.
#[must_use]
pub fn component() -> CategoryDef<Component> {
    def(categories::COMPONENT, buckets::COMPONENT).schema(fields::component())
}

/// CVEs.
#[must_use]
pub fn cve() -> CategoryDef<Cve> {
    def(categories::CVE, buckets::CVE).schema(fields::cve())
}

/// Nodes hang off their cluster.
#[must_use]
pub fn node() -> CategoryDef<Node> {
    def(categories::NODE, buckets::NODE)
        .relation(Relation::Parents {
            bucket: buckets::CLUSTER,
            ids: |n: &Node| vec![n.cluster_id.clone()],
        })
        .schema(fields::node())
}

/// Image to component edges.
#[must_use]
pub fn image_component_edge() -> CategoryDef<ImageComponentEdge> {
    def(categories::IMAGE_COMPONENT_EDGE, buckets::IMAGE_COMPONENT_EDGE)
        .relation(Relation::Link {
            parent: buckets::IMAGE,
            child: buckets::COMPONENT,
        })
        .schema(fields::image_component_edge())
}

/// Component to CVE edges.
#[must_use]
pub fn component_cve_edge() -> CategoryDef<ComponentCveEdge> {
    def(categories::COMPONENT_CVE_EDGE, buckets::COMPONENT_CVE_EDGE)
        .relation(Relation::Link {
            parent: buckets::COMPONENT,
            child: buckets::CVE,
        })
        .schema(fields::component_cve_edge())
}

/// Image to CVE edges.
#[must_use]
pub fn image_cve_edge() -> CategoryDef<ImageCveEdge> {
    def(categories::IMAGE_CVE_EDGE, buckets::IMAGE_CVE_EDGE)
        .relation(Relation::Link {
            parent: buckets::IMAGE,
            child: buckets::CVE,
        })
        .schema(fields::image_cve_edge())
}

/// Node to component edges; not indexed.
#[must_use]
pub fn node_component_edge() -> CategoryDef<NodeComponentEdge> {
    def(categories::NODE_COMPONENT_EDGE, buckets::NODE_COMPONENT_EDGE).relation(Relation::Link {
        parent: buckets::NODE,
        child: buckets::COMPONENT,
    })
}

/// Active components sit between their deployment and component.
#[must_use]
pub fn active_component() -> CategoryDef<ActiveComponent> {
    def(categories::ACTIVE_COMPONENT, buckets::ACTIVE_COMPONENT)
        .relation(Relation::Parents {
            bucket: buckets::DEPLOYMENT,
            ids: |ac: &ActiveComponent| vec![ac.deployment_id.clone()],
        })
        .relation(Relation::Children {
            bucket: buckets::COMPONENT,
            ids: |ac: &ActiveComponent| vec![ac.component_id.clone()],
        })
        .schema(fields::active_component())
}
