//! End-to-end scenarios over the security fixture.
//!
//! The helpers collect what a caller can see through the scoped searchers;
//! the tests pin down store, index, access-control and compound-search
//! behavior across the whole stack.

use scopegraph_core::search::{Query, Searcher};
use scopegraph_core::{CoreResult, RequestContext};

/// Sorted ids `searcher` returns for a match-all query.
///
/// # Errors
///
/// Returns the searcher's error.
pub fn visible_ids(searcher: &dyn Searcher, ctx: &RequestContext) -> CoreResult<Vec<String>> {
    let mut ids: Vec<String> = searcher
        .search(ctx, &Query::match_all())?
        .into_iter()
        .map(|hit| hit.id)
        .collect();
    ids.sort();
    Ok(ids)
}

/// Sorted copies of `ids`.
#[must_use]
pub fn sorted(ids: &[&str]) -> Vec<String> {
    let mut ids: Vec<String> = ids.iter().map(|id| (*id).to_string()).collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contexts::*;
    use crate::fixtures::{edge_id, ids::*, Fixture, TestGraph, NAMESPACE_B_NAME};
    use crate::generators::{cve_operation_sequence, cve_strategy, PropTestConfig, StoreOperation};
    use proptest::prelude::*;
    use scopegraph_codec::BucketHandler;
    use scopegraph_core::schema::categories::buckets;
    use scopegraph_core::schema::model::Cve;
    use scopegraph_core::search::{self, Pagination, Predicate, QueryBuilder, SortOption};
    use scopegraph_core::{CancellationToken, CoreError, Store};
    use std::collections::BTreeMap;

    fn key(bucket: BucketHandler, id: &str) -> Vec<u8> {
        bucket.get_key(id)
    }

    // === Store properties ===

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn upserted_records_read_back(cve in cve_strategy()) {
            let graph = TestGraph::memory();
            let ctx = RequestContext::unrestricted();
            graph.stores().cves.upsert_batch(&ctx, &[cve.clone()]).unwrap();
            prop_assert_eq!(graph.stores().cves.get(&ctx, &cve.id).unwrap(), Some(cve));
        }

        #[test]
        fn store_matches_a_map_model(ops in cve_operation_sequence(1, 40)) {
            let graph = TestGraph::memory();
            let ctx = RequestContext::unrestricted();
            let store = &graph.stores().cves;
            let mut model: BTreeMap<String, Cve> = BTreeMap::new();

            for op in ops {
                match op {
                    StoreOperation::Upsert(cve) => {
                        store.upsert_batch(&ctx, &[cve.clone()]).unwrap();
                        model.insert(cve.id.clone(), cve);
                    }
                    StoreOperation::Delete(id) => {
                        store.delete_batch(&ctx, &[id.clone()]).unwrap();
                        model.remove(&id);
                    }
                    StoreOperation::Get(id) => {
                        prop_assert_eq!(store.get(&ctx, &id).unwrap(), model.get(&id).cloned());
                    }
                }
            }

            let expected: Vec<String> = model.keys().cloned().collect();
            prop_assert_eq!(store.get_ids(&ctx).unwrap(), expected.clone());
            let indexed = visible_ids(graph.searchers().cves.as_ref(), &ctx).unwrap();
            prop_assert_eq!(indexed, expected);
        }
    }

    #[test]
    fn deletes_are_idempotent() {
        let graph = TestGraph::with_fixture();
        let ctx = RequestContext::unrestricted();
        let cves = &graph.stores().cves;
        cves.delete_batch(&ctx, &[CVE7.into()]).unwrap();
        assert!(cves.get(&ctx, CVE7).unwrap().is_none());
        cves.delete_batch(&ctx, &[CVE7.into()]).unwrap();
        assert!(cves.get(&ctx, CVE7).unwrap().is_none());
    }

    #[test]
    fn empty_and_unknown_deletes_succeed() {
        let graph = TestGraph::with_fixture();
        let ctx = RequestContext::unrestricted();
        graph.stores().components.delete_batch(&ctx, &[]).unwrap();
        graph
            .stores()
            .components
            .delete_batch(&ctx, &["nope-1".into(), "nope-2".into()])
            .unwrap();
        assert_eq!(graph.stores().components.count(&ctx).unwrap(), 6);

        // Same through the scoped store, for a caller without any grant.
        graph
            .scoped()
            .components
            .delete_batch(&no_access(), &["nope-1".into()])
            .unwrap();
    }

    #[test]
    fn unknown_edge_deletes_succeed() {
        let graph = TestGraph::with_fixture();
        let ctx = RequestContext::unrestricted();
        let edges = &graph.stores().component_cve_edges;
        let before = edges.count(&ctx).unwrap();

        edges
            .delete_batch(&ctx, &["nope-1".into(), "nope-2".into()])
            .unwrap();
        edges
            .delete_batch(&ctx, &[edge_id(COMPONENT1, CVE7)])
            .unwrap();
        assert_eq!(edges.count(&ctx).unwrap(), before);

        let report = graph
            .database()
            .graph()
            .verify(&RequestContext::unrestricted())
            .unwrap();
        assert!(report.is_consistent(), "{:?}", report.issues);
    }

    // === Graph properties ===

    #[test]
    fn edges_are_symmetric() {
        let graph = TestGraph::with_fixture();
        let store = graph.database().graph();
        let report = store.verify(&RequestContext::unrestricted()).unwrap();
        assert!(report.is_consistent(), "{:?}", report.issues);

        let txn = store.new_read_only_transaction();
        let cases = [
            (key(buckets::CLUSTER, CLUSTER1), key(buckets::NAMESPACE, NAMESPACE_A)),
            (key(buckets::NAMESPACE, NAMESPACE_B), key(buckets::DEPLOYMENT, DEPLOYMENT2)),
            (key(buckets::DEPLOYMENT, DEPLOYMENT1), key(buckets::IMAGE, IMAGE1)),
            (key(buckets::IMAGE, IMAGE2), key(buckets::COMPONENT, COMPONENT5)),
            (key(buckets::COMPONENT, COMPONENT3), key(buckets::CVE, CVE4)),
            (key(buckets::IMAGE, IMAGE1), key(buckets::CVE, CVE1)),
            (key(buckets::NODE, NODE2), key(buckets::COMPONENT, COMPONENT6)),
            (key(buckets::CLUSTER, CLUSTER2), key(buckets::NODE, NODE2)),
        ];
        for (from, to) in &cases {
            assert!(txn.get_forward(from).unwrap().contains(to));
            assert!(txn.get_backward(to).unwrap().contains(from));
        }
        assert!(!txn
            .get_forward(&key(buckets::IMAGE, IMAGE2))
            .unwrap()
            .contains(&key(buckets::COMPONENT, COMPONENT1)));
    }

    #[test]
    fn deleting_an_edge_record_unlinks_its_endpoints() {
        let graph = TestGraph::with_fixture();
        let ctx = RequestContext::unrestricted();
        graph
            .stores()
            .image_component_edges
            .delete_batch(&ctx, &[edge_id(IMAGE2, COMPONENT3)])
            .unwrap();

        let txn = graph.database().graph().new_read_only_transaction();
        let image2 = key(buckets::IMAGE, IMAGE2);
        let component3 = key(buckets::COMPONENT, COMPONENT3);
        assert!(!txn.get_forward(&image2).unwrap().contains(&component3));
        assert!(!txn.get_backward(&component3).unwrap().contains(&image2));
        drop(txn);

        // component-3 is no longer reachable from namespace-b.
        let components = visible_ids(graph.searchers().components.as_ref(), &namespace_b_reader()).unwrap();
        assert_eq!(components, sorted(&[COMPONENT5]));
    }

    #[test]
    fn deleting_a_record_removes_all_its_adjacency() {
        let graph = TestGraph::with_fixture();
        let ctx = RequestContext::unrestricted();
        graph
            .stores()
            .images
            .delete_batch(&ctx, &[IMAGE1.into()])
            .unwrap();

        let txn = graph.database().graph().new_read_only_transaction();
        let image1 = key(buckets::IMAGE, IMAGE1);
        assert!(txn.get_forward(&image1).unwrap().is_empty());
        assert!(txn.get_backward(&image1).unwrap().is_empty());
        assert!(!txn
            .get_forward(&key(buckets::DEPLOYMENT, DEPLOYMENT1))
            .unwrap()
            .contains(&image1));
        drop(txn);

        let images = visible_ids(graph.searchers().images.as_ref(), &global_reader()).unwrap();
        assert_eq!(images, sorted(&[IMAGE2]));
    }

    // === Index properties ===

    #[test]
    fn index_follows_writes() {
        let graph = TestGraph::with_fixture();
        let ctx = RequestContext::unrestricted();
        let cve = Cve {
            id: "CVE-2024-9999".into(),
            cvss: 9.1,
            summary: "remote code execution in parser".into(),
        };
        let query = QueryBuilder::new().add_exact_match("CVE", &cve.id).build();

        graph.stores().cves.upsert_batch(&ctx, &[cve.clone()]).unwrap();
        let found = graph.searchers().cves.search(&ctx, &query).unwrap();
        assert_eq!(search::ids(&found), vec![cve.id.clone()]);

        let by_text = Query::new(Predicate::field("CVE Summary", "Remote Parser"));
        assert_eq!(graph.searchers().cves.count(&ctx, &by_text).unwrap(), 1);

        graph.stores().cves.delete_batch(&ctx, &[cve.id.clone()]).unwrap();
        assert!(graph.searchers().cves.search(&ctx, &query).unwrap().is_empty());
        assert_eq!(graph.searchers().cves.count(&ctx, &by_text).unwrap(), 0);
    }

    #[test]
    fn index_is_rebuilt_after_reopen() {
        let graph = TestGraph::file();
        Fixture::security().load(&graph).unwrap();
        let graph = graph.reopen();
        let ctx = RequestContext::unrestricted();
        let query = QueryBuilder::new().add_exact_match("Component", "glibc").build();
        let found = graph.searchers().components.search(&ctx, &query).unwrap();
        assert_eq!(search::ids(&found), vec![COMPONENT3]);
    }

    // === Scoped access ===

    #[test]
    fn namespace_reader_sees_only_its_namespace() {
        let graph = TestGraph::with_fixture();
        let ctx = namespace_a_reader();
        let s = graph.searchers();

        assert_eq!(visible_ids(s.namespaces.as_ref(), &ctx).unwrap(), sorted(&[NAMESPACE_A]));
        assert_eq!(visible_ids(s.deployments.as_ref(), &ctx).unwrap(), sorted(&[DEPLOYMENT1]));
        assert_eq!(visible_ids(s.images.as_ref(), &ctx).unwrap(), sorted(&[IMAGE1]));
        assert_eq!(
            visible_ids(s.components.as_ref(), &ctx).unwrap(),
            sorted(&[COMPONENT1, COMPONENT2, COMPONENT3, COMPONENT4])
        );
        assert_eq!(
            visible_ids(s.cves.as_ref(), &ctx).unwrap(),
            sorted(&[CVE1, CVE2, CVE3, CVE4, CVE5])
        );
        // Clusters and nodes need a cluster grant.
        assert!(visible_ids(s.clusters.as_ref(), &ctx).unwrap().is_empty());
        assert!(visible_ids(s.nodes.as_ref(), &ctx).unwrap().is_empty());
        assert_eq!(
            visible_ids(s.active_components.as_ref(), &ctx).unwrap(),
            vec![edge_id(DEPLOYMENT1, COMPONENT1)]
        );

        let stores = graph.scoped();
        assert_eq!(stores.images.get_ids(&ctx).unwrap(), vec![IMAGE1]);
        assert!(stores.cves.get(&ctx, CVE6).unwrap().is_none());
        assert!(stores.cves.get(&ctx, CVE1).unwrap().is_some());
        assert_eq!(stores.component_cve_edges.count(&ctx).unwrap(), 5);
        assert_eq!(stores.image_cve_edges.count(&ctx).unwrap(), 5);
        assert_eq!(stores.node_component_edges.count(&ctx).unwrap(), 0);
    }

    #[test]
    fn cluster_reader_sees_nodes_and_node_components() {
        let graph = TestGraph::with_fixture();
        let ctx = cluster2_reader();
        let s = graph.searchers();

        assert_eq!(visible_ids(s.clusters.as_ref(), &ctx).unwrap(), sorted(&[CLUSTER2]));
        assert_eq!(visible_ids(s.nodes.as_ref(), &ctx).unwrap(), sorted(&[NODE2]));
        assert_eq!(
            visible_ids(s.components.as_ref(), &ctx).unwrap(),
            sorted(&[COMPONENT3, COMPONENT5, COMPONENT6])
        );
        assert_eq!(
            visible_ids(s.cves.as_ref(), &ctx).unwrap(),
            sorted(&[CVE1, CVE2, CVE4, CVE5, CVE6, CVE7])
        );
        assert_eq!(graph.scoped().node_component_edges.count(&ctx).unwrap(), 1);

        // Node-only components stay hidden from namespace-scoped callers.
        assert_eq!(
            visible_ids(s.components.as_ref(), &namespace_b_reader()).unwrap(),
            sorted(&[COMPONENT3, COMPONENT5])
        );
    }

    #[test]
    fn global_reader_sees_everything() {
        let graph = TestGraph::with_fixture();
        let ctx = global_reader();
        let s = graph.searchers();
        let fixture = Fixture::security();

        assert_eq!(visible_ids(s.clusters.as_ref(), &ctx).unwrap().len(), fixture.clusters.len());
        assert_eq!(visible_ids(s.images.as_ref(), &ctx).unwrap().len(), fixture.images.len());
        assert_eq!(
            visible_ids(s.components.as_ref(), &ctx).unwrap().len(),
            fixture.components.len()
        );
        assert_eq!(visible_ids(s.cves.as_ref(), &ctx).unwrap().len(), fixture.cves.len());
        assert_eq!(
            visible_ids(s.component_cve_edges.as_ref(), &ctx).unwrap().len(),
            fixture.component_cve_edges.len()
        );
        assert!(visible_ids(s.cves.as_ref(), &no_access()).unwrap().is_empty());
    }

    #[test]
    fn component_edges_follow_component_scope() {
        let graph = TestGraph::with_fixture();
        let query = QueryBuilder::new()
            .add_exact_match("Component ID", COMPONENT1)
            .build();
        let edges = &graph.searchers().component_cve_edges;

        let mut seen = search::ids(&edges.search(&namespace_a_reader(), &query).unwrap());
        seen.sort();
        assert_eq!(
            seen,
            sorted(&[edge_id(COMPONENT1, CVE1).as_str(), edge_id(COMPONENT1, CVE2).as_str()])
        );

        assert!(edges.search(&namespace_b_reader(), &query).unwrap().is_empty());
        assert!(edges.search(&cluster2_reader(), &query).unwrap().is_empty());
        assert_eq!(edges.count(&namespace_b_reader(), &query).unwrap(), 0);

        // component-3 runs in both namespaces.
        let shared = QueryBuilder::new()
            .add_exact_match("Component ID", COMPONENT3)
            .build();
        assert_eq!(edges.count(&namespace_a_reader(), &shared).unwrap(), 2);
        assert_eq!(edges.count(&namespace_b_reader(), &shared).unwrap(), 2);
    }

    #[test]
    fn scoped_writes_are_checked() {
        let graph = TestGraph::with_fixture();
        let ctx = namespace_a_writer();
        let images = &graph.scoped().images;

        let mut image = graph
            .stores()
            .images
            .get(&RequestContext::unrestricted(), IMAGE1)
            .unwrap()
            .unwrap();
        image.os = "debian:12.5".into();
        images.upsert_batch(&ctx, &[image]).unwrap();

        assert!(matches!(
            images.delete_batch(&ctx, &[IMAGE2.into()]),
            Err(CoreError::AccessDenied { .. })
        ));
        assert!(matches!(
            images.delete_batch(&namespace_a_reader(), &[IMAGE1.into()]),
            Err(CoreError::AccessDenied { .. })
        ));
        images.delete_batch(&global_writer(), &[IMAGE2.into()]).unwrap();
        assert_eq!(images.get_ids(&global_reader()).unwrap(), vec![IMAGE1]);
    }

    #[test]
    fn write_checks_follow_reparenting() {
        let graph = TestGraph::with_fixture();
        let admin = RequestContext::unrestricted();
        let image = graph.stores().images.get(&admin, IMAGE1).unwrap().unwrap();
        graph
            .scoped()
            .images
            .upsert_batch(&namespace_a_writer(), &[image.clone()])
            .unwrap();

        let mut deployment = graph
            .stores()
            .deployments
            .get(&admin, DEPLOYMENT1)
            .unwrap()
            .unwrap();
        deployment.namespace_id = NAMESPACE_B.into();
        deployment.namespace = NAMESPACE_B_NAME.into();
        deployment.cluster_id = CLUSTER2.into();
        graph
            .stores()
            .deployments
            .upsert_batch(&admin, &[deployment])
            .unwrap();

        // image-1 now only reaches namespace-b.
        assert!(matches!(
            graph
                .scoped()
                .images
                .upsert_batch(&namespace_a_writer(), &[image]),
            Err(CoreError::AccessDenied { .. })
        ));
        assert_eq!(
            visible_ids(graph.searchers().images.as_ref(), &namespace_b_reader()).unwrap(),
            sorted(&[IMAGE1, IMAGE2])
        );
    }

    // === Compound search ===

    #[test]
    fn compound_queries_cross_categories() {
        let graph = TestGraph::with_fixture();
        let s = graph.searchers();
        let by_cve = QueryBuilder::new().add_exact_match("CVE", CVE4).build();

        let images = s.images.search(&global_reader(), &by_cve).unwrap();
        assert_eq!(search::ids(&images), vec![IMAGE1, IMAGE2]);
        let images = s.images.search(&namespace_a_reader(), &by_cve).unwrap();
        assert_eq!(search::ids(&images), vec![IMAGE1]);

        let by_component = QueryBuilder::new()
            .add_exact_match("Component", "openssl")
            .build();
        let deployments = s.deployments.search(&global_reader(), &by_component).unwrap();
        assert_eq!(search::ids(&deployments), vec![DEPLOYMENT1]);

        // Conjunction across two specs: image-2 CVEs fixed by "next".
        let fixable = QueryBuilder::new()
            .add_exact_match("Image Sha", IMAGE2)
            .add_bool("Fixable", false)
            .build();
        let edges = s.component_cve_edges.search(&global_reader(), &fixable).unwrap();
        assert_eq!(search::ids(&edges), vec![edge_id(COMPONENT5, CVE7)]);

        let cves_by_node = QueryBuilder::new().add_exact_match("Node", "worker-2").build();
        let cves = s.cves.search(&global_reader(), &cves_by_node).unwrap();
        assert_eq!(search::ids(&cves), vec![CVE1]);
    }

    #[test]
    fn compound_results_are_deterministic() {
        let graph = TestGraph::with_fixture();
        let query = Query::new(Predicate::Or(vec![
            Predicate::field("CVE Summary", "overflow"),
            Predicate::field("Component", "musl"),
            Predicate::field("Image OS", "debian"),
        ]))
        .with_pagination(Pagination::default().sort_by(SortOption::score()));
        let ctx = global_reader();

        let first = graph.searchers().images.search(&ctx, &query).unwrap();
        for _ in 0..5 {
            let again = graph.searchers().images.search(&ctx, &query).unwrap();
            assert_eq!(search::ids(&again), search::ids(&first));
            let scores: Vec<f64> = again.iter().map(|r| r.score).collect();
            let expected: Vec<f64> = first.iter().map(|r| r.score).collect();
            assert_eq!(scores, expected);
        }
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let graph = TestGraph::with_fixture();
        let query = Query::new(Predicate::field("Shoe Size", "42"));
        let err = graph
            .searchers()
            .images
            .search(&global_reader(), &query)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidQuery { .. }), "{err:?}");
    }

    #[test]
    fn default_sort_and_pagination() {
        let graph = TestGraph::with_fixture();
        let cves = &graph.searchers().cves;

        let all = cves.search(&global_reader(), &Query::match_all()).unwrap();
        assert_eq!(search::ids(&all), vec![CVE3, CVE6, CVE1, CVE5, CVE2, CVE4, CVE7]);

        let page = Query::match_all().with_pagination(Pagination::page(1, 2));
        assert_eq!(search::ids(&cves.search(&global_reader(), &page).unwrap()), vec![CVE6, CVE1]);

        // Pagination applies after scope filtering.
        let scoped = Query::match_all().with_pagination(Pagination::page(0, 2));
        assert_eq!(
            search::ids(&cves.search(&namespace_a_reader(), &scoped).unwrap()),
            vec![CVE3, CVE1]
        );
        assert_eq!(cves.count(&namespace_a_reader(), &scoped).unwrap(), 5);

        let by_name = Query::match_all()
            .with_pagination(Pagination::default().sort_by(SortOption::field("Component").reversed()));
        let components = graph
            .searchers()
            .components
            .search(&global_reader(), &by_name)
            .unwrap();
        assert_eq!(
            search::ids(&components),
            vec![COMPONENT2, COMPONENT4, COMPONENT1, COMPONENT5, COMPONENT6, COMPONENT3]
        );
    }

    #[test]
    fn cancelled_requests_fail() {
        let graph = TestGraph::with_fixture();
        let token = CancellationToken::new();
        let ctx = namespace_a_reader().with_cancellation(token.clone());
        token.cancel();

        let query = QueryBuilder::new().add_exact_match("CVE", CVE1).build();
        assert!(graph.searchers().images.search(&ctx, &query).unwrap_err().is_cancelled());
        assert!(graph.scoped().cves.get_ids(&ctx).unwrap_err().is_cancelled());
    }
}
