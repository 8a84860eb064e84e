//! Property-based test generators using proptest.
//!
//! Provides strategies for security-graph records whose ids and fields
//! stay within what the stores and indexes accept.

use proptest::prelude::*;
use scopegraph_core::schema::model::{Cluster, Component, Cve, Namespace};

/// Strategy for record ids.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9-]{0,15}").expect("Invalid regex")
}

/// Strategy for CVE ids like `CVE-2023-01234`.
pub fn cve_id_strategy() -> impl Strategy<Value = String> {
    (1999u32..2030, 1u32..100_000).prop_map(|(year, n)| format!("CVE-{year}-{n:05}"))
}

/// Strategy for single-token names.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_.]{0,11}").expect("Invalid regex")
}

/// Strategy for free text of a few lowercase words.
pub fn summary_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::string::string_regex("[a-z]{3,8}").expect("Invalid regex"), 1..6)
        .prop_map(|words| words.join(" "))
}

/// Strategy for clusters.
pub fn cluster_strategy() -> impl Strategy<Value = Cluster> {
    (id_strategy(), name_strategy()).prop_map(|(id, name)| Cluster { id, name })
}

/// Strategy for namespaces of `cluster_id`.
pub fn namespace_strategy(cluster_id: String) -> impl Strategy<Value = Namespace> {
    (id_strategy(), name_strategy()).prop_map(move |(id, name)| Namespace {
        id,
        name,
        cluster_id: cluster_id.clone(),
    })
}

/// Strategy for components.
pub fn component_strategy() -> impl Strategy<Value = Component> {
    (id_strategy(), name_strategy(), name_strategy(), 0u8..100).prop_map(|(id, name, version, score)| {
        Component {
            id,
            name,
            version,
            risk_score: f32::from(score) / 10.0,
        }
    })
}

/// Strategy for CVEs.
pub fn cve_strategy() -> impl Strategy<Value = Cve> {
    (cve_id_strategy(), 0u8..=100, summary_strategy()).prop_map(|(id, cvss, summary)| Cve {
        id,
        cvss: f32::from(cvss) / 10.0,
        summary,
    })
}

/// A write or read against one store.
#[derive(Debug, Clone)]
pub enum StoreOperation<T> {
    /// Upsert a record.
    Upsert(T),
    /// Delete by id.
    Delete(String),
    /// Read by id.
    Get(String),
}

/// Strategy for CVE store operations over a small id pool, so that
/// deletes and reads hit existing records.
pub fn cve_operation_strategy() -> impl Strategy<Value = StoreOperation<Cve>> {
    let pooled_id = (0u8..8).prop_map(|n| format!("CVE-2024-{n:05}"));
    prop_oneof![
        3 => (pooled_id.clone(), cve_strategy()).prop_map(|(id, cve)| StoreOperation::Upsert(Cve { id, ..cve })),
        1 => pooled_id.clone().prop_map(StoreOperation::Delete),
        2 => pooled_id.prop_map(StoreOperation::Get),
    ]
}

/// Strategy for a sequence of CVE store operations.
pub fn cve_operation_sequence(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation<Cve>>> {
    prop::collection::vec(cve_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn ids_are_plain(id in id_strategy()) {
            prop_assert!(!id.is_empty());
            prop_assert!(!id.contains(':'));
            prop_assert!(id.chars().next().is_some_and(|c| c.is_ascii_lowercase()));
        }

        #[test]
        fn cves_are_well_formed(cve in cve_strategy()) {
            prop_assert!(cve.id.starts_with("CVE-"));
            prop_assert!((0.0..=10.0).contains(&cve.cvss));
            prop_assert!(!cve.summary.is_empty());
        }
    }
}
