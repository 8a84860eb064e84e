//! Searchable fields of each category.

use crate::index::{FieldKind, FieldValue, Schema};
use crate::schema::categories::categories;
use crate::schema::model::{
    ActiveComponent, Cluster, Component, ComponentCveEdge, Cve, Deployment, Image, ImageComponentEdge,
    ImageCveEdge, Namespace, Node,
};
use FieldKind::{Bool, Keyword, Numeric, Text};

fn one(value: impl Into<FieldValue>) -> Vec<FieldValue> {
    vec![value.into()]
}

fn non_empty(value: &str) -> Vec<FieldValue> {
    if value.is_empty() {
        Vec::new()
    } else {
        one(value)
    }
}

pub(crate) fn cluster() -> Schema<Cluster> {
    Schema::<Cluster>::new(categories::CLUSTER)
        .field("Cluster", Keyword, |c| one(&c.name))
        .field("Cluster ID", Keyword, |c| one(&c.id))
}

pub(crate) fn namespace() -> Schema<Namespace> {
    Schema::<Namespace>::new(categories::NAMESPACE)
        .field("Namespace", Keyword, |ns| one(&ns.name))
        .field("Namespace ID", Keyword, |ns| one(&ns.id))
        .field("Cluster ID", Keyword, |ns| one(&ns.cluster_id))
}

pub(crate) fn deployment() -> Schema<Deployment> {
    Schema::<Deployment>::new(categories::DEPLOYMENT)
        .field("Deployment", Keyword, |d| one(&d.name))
        .field("Deployment ID", Keyword, |d| one(&d.id))
        .field("Namespace", Keyword, |d| one(&d.namespace))
        .field("Namespace ID", Keyword, |d| one(&d.namespace_id))
        .field("Cluster ID", Keyword, |d| one(&d.cluster_id))
        .field("Deployment Risk Priority", Numeric, |d| one(d.risk_priority))
}

pub(crate) fn image() -> Schema<Image> {
    Schema::<Image>::new(categories::IMAGE)
        .field("Image", Keyword, |i| one(&i.name))
        .field("Image Sha", Keyword, |i| one(&i.id))
        .field("Image OS", Keyword, |i| non_empty(&i.os))
        .field("Image Risk Priority", Numeric, |i| one(i.risk_priority))
}

pub(crate) fn component() -> Schema<Component> {
    Schema::<Component>::new(categories::COMPONENT)
        .field("Component", Keyword, |c| one(&c.name))
        .field("Component ID", Keyword, |c| one(&c.id))
        .field("Component Version", Keyword, |c| non_empty(&c.version))
        .field("Component Risk Score", Numeric, |c| one(c.risk_score))
}

pub(crate) fn cve() -> Schema<Cve> {
    Schema::<Cve>::new(categories::CVE)
        .field("CVE", Keyword, |v| one(&v.id))
        .field("CVSS", Numeric, |v| one(v.cvss))
        .field("CVE Summary", Text, |v| non_empty(&v.summary))
}

pub(crate) fn node() -> Schema<Node> {
    Schema::<Node>::new(categories::NODE)
        .field("Node", Keyword, |n| one(&n.name))
        .field("Node ID", Keyword, |n| one(&n.id))
        .field("Cluster ID", Keyword, |n| one(&n.cluster_id))
}

pub(crate) fn image_component_edge() -> Schema<ImageComponentEdge> {
    Schema::<ImageComponentEdge>::new(categories::IMAGE_COMPONENT_EDGE)
        .field("Component Location", Keyword, |e| non_empty(&e.location))
}

pub(crate) fn component_cve_edge() -> Schema<ComponentCveEdge> {
    Schema::<ComponentCveEdge>::new(categories::COMPONENT_CVE_EDGE)
        .field("Fixable", Bool, |e| one(e.is_fixable))
        .field("Fixed By", Keyword, |e| non_empty(&e.fixed_by))
}

pub(crate) fn image_cve_edge() -> Schema<ImageCveEdge> {
    Schema::<ImageCveEdge>::new(categories::IMAGE_CVE_EDGE)
        .field("Vulnerability State", Keyword, |e| non_empty(&e.state))
}

pub(crate) fn active_component() -> Schema<ActiveComponent> {
    Schema::<ActiveComponent>::new(categories::ACTIVE_COMPONENT)
        .field("Deployment ID", Keyword, |ac| one(&ac.deployment_id))
        .field("Component ID", Keyword, |ac| one(&ac.component_id))
        .field("Container Name", Keyword, |ac| {
            ac.containers.iter().map(FieldValue::from).collect()
        })
}
