//! Records of the security graph.

use crate::crud::Entity;
use serde::{Deserialize, Serialize};

macro_rules! entity {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Entity for $ty {
                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

/// A managed cluster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cluster {
    /// Cluster id.
    pub id: String,
    /// Display name.
    pub name: String,
}

/// A namespace of a cluster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace id.
    pub id: String,
    /// Namespace name, unique within its cluster.
    pub name: String,
    /// Owning cluster.
    pub cluster_id: String,
}

/// A workload running images in a namespace.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment id.
    pub id: String,
    /// Deployment name.
    pub name: String,
    /// Owning namespace id.
    pub namespace_id: String,
    /// Owning namespace name.
    pub namespace: String,
    /// Owning cluster id.
    pub cluster_id: String,
    /// Images run by the deployment's containers.
    pub image_ids: Vec<String>,
    /// Risk ranking, 1 is riskiest.
    pub risk_priority: i64,
}

/// A container image, keyed by digest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Image {
    /// Image digest.
    pub id: String,
    /// Full image name.
    pub name: String,
    /// Base operating system.
    pub os: String,
    /// Risk ranking, 1 is riskiest.
    pub risk_priority: i64,
}

/// A software component found in images or on nodes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Component {
    /// Component id.
    pub id: String,
    /// Package name.
    pub name: String,
    /// Package version.
    pub version: String,
    /// Risk score.
    pub risk_score: f32,
}

/// A vulnerability.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Cve {
    /// CVE identifier, e.g. `CVE-2021-44228`.
    pub id: String,
    /// CVSS score.
    pub cvss: f32,
    /// Free text summary.
    pub summary: String,
}

/// A cluster node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    /// Node id.
    pub id: String,
    /// Node name.
    pub name: String,
    /// Owning cluster.
    pub cluster_id: String,
}

/// Image contains component. `id` is the `image:component` edge id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageComponentEdge {
    /// Edge id.
    pub id: String,
    /// Path of the component inside the image.
    pub location: String,
}

/// Component is affected by CVE. `id` is the `component:cve` edge id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComponentCveEdge {
    /// Edge id.
    pub id: String,
    /// Whether a fixed version exists.
    pub is_fixable: bool,
    /// First fixed version, empty when not fixable.
    pub fixed_by: String,
}

/// Image is affected by CVE. `id` is the `image:cve` edge id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageCveEdge {
    /// Edge id.
    pub id: String,
    /// Triage state such as `observed` or `deferred`.
    pub state: String,
}

/// Node runs component. `id` is the `node:component` edge id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeComponentEdge {
    /// Edge id.
    pub id: String,
}

/// A component observed executing inside a deployment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActiveComponent {
    /// Active component id.
    pub id: String,
    /// Deployment the component runs in.
    pub deployment_id: String,
    /// The active component.
    pub component_id: String,
    /// Containers the component was seen in.
    pub containers: Vec<String>,
}

entity!(
    Cluster,
    Namespace,
    Deployment,
    Image,
    Component,
    Cve,
    Node,
    ImageComponentEdge,
    ComponentCveEdge,
    ImageCveEdge,
    NodeComponentEdge,
    ActiveComponent,
);
