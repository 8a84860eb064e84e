//! How each category resolves into cluster and namespace scopes.

use crate::sac::{
    AccessScope, ClusterScopeResolver, RecordScopeResolver, ResourceScope, ScopeResolver, ScopeTransform,
};
use crate::schema::categories::{buckets, categories};
use crate::schema::model::{Namespace, Node};
use crate::search::GraphTransformation;
use crate::types::Category;
use std::sync::Arc;

fn namespace_resolver() -> Arc<dyn ScopeResolver> {
    Arc::new(RecordScopeResolver::new(buckets::NAMESPACE, |ns: &Namespace| {
        AccessScope::namespace(ns.cluster_id.clone(), ns.name.clone())
    }))
}

fn node_resolver() -> Arc<dyn ScopeResolver> {
    Arc::new(RecordScopeResolver::new(buckets::NODE, |node: &Node| {
        AccessScope::Cluster(node.cluster_id.clone())
    }))
}

/// Continues a walk that ends on deployments up to their namespace.
fn via_deployments(path: GraphTransformation) -> ScopeTransform {
    ScopeTransform::new(path.backward(buckets::NAMESPACE), namespace_resolver())
}

/// Continues a walk that ends on components to the images running them.
fn via_images(path: GraphTransformation) -> ScopeTransform {
    via_deployments(path.backward(buckets::IMAGE).backward(buckets::DEPLOYMENT))
}

/// Continues a walk that ends on components to the nodes running them.
fn via_nodes(path: GraphTransformation) -> ScopeTransform {
    ScopeTransform::new(path.backward(buckets::NODE), node_resolver())
}

fn from(bucket: scopegraph_codec::BucketHandler) -> GraphTransformation {
    GraphTransformation::starting_at(bucket)
}

/// Scope level and transforms of `category`; `None` for unknown
/// categories.
///
/// Components and CVEs are visible through images (namespace scopes) and
/// through nodes (cluster scopes).
#[must_use]
pub fn scope_transforms(category: Category) -> Option<(ResourceScope, Vec<ScopeTransform>)> {
    let scoped = match category {
        categories::CLUSTER => (
            ResourceScope::Cluster,
            vec![ScopeTransform::new(
                from(buckets::CLUSTER),
                Arc::new(ClusterScopeResolver::new(buckets::CLUSTER)),
            )],
        ),
        categories::NODE => (
            ResourceScope::Cluster,
            vec![ScopeTransform::new(from(buckets::NODE), node_resolver())],
        ),
        categories::NODE_COMPONENT_EDGE => (
            ResourceScope::Cluster,
            vec![ScopeTransform::new(
                from(buckets::NODE_COMPONENT_EDGE).edge_parent(buckets::NODE),
                node_resolver(),
            )],
        ),
        categories::NAMESPACE => (
            ResourceScope::Namespace,
            vec![ScopeTransform::new(from(buckets::NAMESPACE), namespace_resolver())],
        ),
        categories::DEPLOYMENT => (
            ResourceScope::Namespace,
            vec![via_deployments(from(buckets::DEPLOYMENT))],
        ),
        categories::ACTIVE_COMPONENT => (
            ResourceScope::Namespace,
            vec![via_deployments(
                from(buckets::ACTIVE_COMPONENT).backward(buckets::DEPLOYMENT),
            )],
        ),
        categories::IMAGE => (
            ResourceScope::Namespace,
            vec![via_deployments(from(buckets::IMAGE).backward(buckets::DEPLOYMENT))],
        ),
        categories::IMAGE_COMPONENT_EDGE => (
            ResourceScope::Namespace,
            vec![via_deployments(
                from(buckets::IMAGE_COMPONENT_EDGE)
                    .edge_parent(buckets::IMAGE)
                    .backward(buckets::DEPLOYMENT),
            )],
        ),
        categories::IMAGE_CVE_EDGE => (
            ResourceScope::Namespace,
            vec![via_deployments(
                from(buckets::IMAGE_CVE_EDGE)
                    .edge_parent(buckets::IMAGE)
                    .backward(buckets::DEPLOYMENT),
            )],
        ),
        categories::COMPONENT => (
            ResourceScope::Namespace,
            vec![
                via_images(from(buckets::COMPONENT)),
                via_nodes(from(buckets::COMPONENT)),
            ],
        ),
        categories::COMPONENT_CVE_EDGE => {
            let component = from(buckets::COMPONENT_CVE_EDGE).edge_parent(buckets::COMPONENT);
            (
                ResourceScope::Namespace,
                vec![via_images(component.clone()), via_nodes(component)],
            )
        }
        categories::CVE => (
            ResourceScope::Namespace,
            vec![
                via_images(from(buckets::CVE).backward(buckets::COMPONENT)),
                via_deployments(
                    from(buckets::CVE)
                        .backward(buckets::IMAGE)
                        .backward(buckets::DEPLOYMENT),
                ),
                via_nodes(from(buckets::CVE).backward(buckets::COMPONENT)),
            ],
        ),
        _ => return None,
    };
    Some(scoped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_scopes() {
        for category in [
            categories::CLUSTER,
            categories::NAMESPACE,
            categories::DEPLOYMENT,
            categories::IMAGE,
            categories::COMPONENT,
            categories::CVE,
            categories::NODE,
            categories::IMAGE_COMPONENT_EDGE,
            categories::COMPONENT_CVE_EDGE,
            categories::IMAGE_CVE_EDGE,
            categories::NODE_COMPONENT_EDGE,
            categories::ACTIVE_COMPONENT,
        ] {
            let (level, transforms) = scope_transforms(category).unwrap();
            assert_ne!(level, ResourceScope::Global);
            assert!(!transforms.is_empty());
            for transform in &transforms {
                let end = transform.path.target();
                assert!(
                    end == buckets::NAMESPACE || end == buckets::NODE || end == buckets::CLUSTER,
                    "{category} ends on {end}"
                );
            }
        }
        assert!(scope_transforms(Category::new("unknown")).is_none());
    }
}
