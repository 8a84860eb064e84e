//! Id translation across categories by walking the graph.

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::graph::Transaction;
use scopegraph_codec::{BucketHandler, EdgeId};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// One hop of a [`GraphTransformation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Follow forward edges, keeping targets in the bucket.
    Forward(BucketHandler),
    /// Follow backward edges, keeping sources in the bucket.
    Backward(BucketHandler),
    /// From edge records to the parent half of their id.
    EdgeParent(BucketHandler),
    /// From edge records to the child half of their id.
    EdgeChild(BucketHandler),
    /// From parents to the stored edge records leading to their children.
    EdgesFromParent {
        /// Bucket of the children.
        child: BucketHandler,
        /// Bucket of the edge records.
        edge: BucketHandler,
    },
    /// From children to the stored edge records leading from their parents.
    EdgesToChild {
        /// Bucket of the parents.
        parent: BucketHandler,
        /// Bucket of the edge records.
        edge: BucketHandler,
    },
}

impl Step {
    /// Bucket of the keys this step produces.
    #[must_use]
    pub fn target(&self) -> BucketHandler {
        match *self {
            Self::Forward(bucket)
            | Self::Backward(bucket)
            | Self::EdgeParent(bucket)
            | Self::EdgeChild(bucket) => bucket,
            Self::EdgesFromParent { edge, .. } | Self::EdgesToChild { edge, .. } => edge,
        }
    }

    fn apply(
        &self,
        txn: &Transaction<'_>,
        source: BucketHandler,
        key: &[u8],
    ) -> CoreResult<Vec<Vec<u8>>> {
        match *self {
            Self::Forward(bucket) => Ok(bucket.filter_keys(&txn.get_forward(key)?)),
            Self::Backward(bucket) => Ok(bucket.filter_keys(&txn.get_backward(key)?)),
            Self::EdgeParent(bucket) => {
                let edge = EdgeId::parse(&source.get_id(key)?)?;
                Ok(vec![bucket.get_key(&edge.parent)])
            }
            Self::EdgeChild(bucket) => {
                let edge = EdgeId::parse(&source.get_id(key)?)?;
                Ok(vec![bucket.get_key(&edge.child)])
            }
            Self::EdgesFromParent { child, edge } => {
                let parent_id = source.get_id(key)?;
                let mut out = Vec::new();
                for child_id in child.filtered_ids(&txn.get_forward(key)?)? {
                    let edge_key = edge.get_key(&EdgeId::new(parent_id.clone(), child_id).to_string());
                    if txn.exists(&edge_key)? {
                        out.push(edge_key);
                    }
                }
                Ok(out)
            }
            Self::EdgesToChild { parent, edge } => {
                let child_id = source.get_id(key)?;
                let mut out = Vec::new();
                for parent_id in parent.filtered_ids(&txn.get_backward(key)?)? {
                    let edge_key = edge.get_key(&EdgeId::new(parent_id, child_id.clone()).to_string());
                    if txn.exists(&edge_key)? {
                        out.push(edge_key);
                    }
                }
                Ok(out)
            }
        }
    }
}

/// Per-step cache of already expanded keys.
///
/// Share one memo across calls on the same transaction to avoid walking
/// common intermediates twice.
#[derive(Debug, Default)]
pub struct TransformMemo {
    levels: Vec<HashMap<Vec<u8>, Vec<Vec<u8>>>>,
}

impl TransformMemo {
    /// An empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// A path through the graph that maps ids of one category onto ids of
/// another.
///
/// ```
/// use scopegraph_codec::BucketHandler;
/// use scopegraph_core::search::GraphTransformation;
///
/// const IMAGES: BucketHandler = BucketHandler::new("image");
/// const DEPLOYMENTS: BucketHandler = BucketHandler::new("deployment");
/// const NAMESPACES: BucketHandler = BucketHandler::new("namespace");
///
/// let to_namespace = GraphTransformation::starting_at(IMAGES)
///     .backward(DEPLOYMENTS)
///     .backward(NAMESPACES);
/// assert_eq!(to_namespace.target(), NAMESPACES);
/// ```
#[derive(Debug, Clone)]
pub struct GraphTransformation {
    start: BucketHandler,
    steps: Vec<Step>,
}

impl GraphTransformation {
    /// An empty path over ids of `bucket`.
    #[must_use]
    pub fn starting_at(bucket: BucketHandler) -> Self {
        Self {
            start: bucket,
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn then(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Appends [`Step::Forward`].
    #[must_use]
    pub fn forward(self, bucket: BucketHandler) -> Self {
        self.then(Step::Forward(bucket))
    }

    /// Appends [`Step::Backward`].
    #[must_use]
    pub fn backward(self, bucket: BucketHandler) -> Self {
        self.then(Step::Backward(bucket))
    }

    /// Appends [`Step::EdgeParent`].
    #[must_use]
    pub fn edge_parent(self, bucket: BucketHandler) -> Self {
        self.then(Step::EdgeParent(bucket))
    }

    /// Appends [`Step::EdgeChild`].
    #[must_use]
    pub fn edge_child(self, bucket: BucketHandler) -> Self {
        self.then(Step::EdgeChild(bucket))
    }

    /// Appends [`Step::EdgesFromParent`].
    #[must_use]
    pub fn edges_from_parent(self, child: BucketHandler, edge: BucketHandler) -> Self {
        self.then(Step::EdgesFromParent { child, edge })
    }

    /// Appends [`Step::EdgesToChild`].
    #[must_use]
    pub fn edges_to_child(self, parent: BucketHandler, edge: BucketHandler) -> Self {
        self.then(Step::EdgesToChild { parent, edge })
    }

    /// Bucket of the input ids.
    #[must_use]
    pub fn source(&self) -> BucketHandler {
        self.start
    }

    /// Bucket of the output ids.
    #[must_use]
    pub fn target(&self) -> BucketHandler {
        self.steps.last().map_or(self.start, Step::target)
    }

    /// The steps in order.
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Ids reachable from any of `ids`, ascending and deduplicated.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] once `ctx` is cancelled, or an
    /// invariant violation on undecodable adjacency or edge ids.
    pub fn apply(
        &self,
        ctx: &RequestContext,
        txn: &Transaction<'_>,
        ids: &[String],
    ) -> CoreResult<Vec<String>> {
        let mut frontier: BTreeSet<Vec<u8>> = ids.iter().map(|id| self.start.get_key(id)).collect();
        let mut source = self.start;
        for step in &self.steps {
            ctx.check_cancelled()?;
            let mut next = BTreeSet::new();
            for key in &frontier {
                next.extend(step.apply(txn, source, key).map_err(invalid_path)?);
            }
            frontier = next;
            source = step.target();
        }
        let out = source.filtered_ids(&frontier)?;
        tracing::trace!(inputs = ids.len(), outputs = out.len(), "applied graph transformation");
        Ok(out)
    }

    /// Ids reachable from each of `ids` separately.
    ///
    /// # Errors
    ///
    /// Same as [`GraphTransformation::apply`].
    pub fn map_each(
        &self,
        ctx: &RequestContext,
        txn: &Transaction<'_>,
        ids: &[String],
    ) -> CoreResult<BTreeMap<String, Vec<String>>> {
        let mut memo = TransformMemo::new();
        let mut out = BTreeMap::new();
        for id in ids {
            if out.contains_key(id) {
                continue;
            }
            let mapped = self.map_one(ctx, txn, id, &mut memo)?;
            out.insert(id.clone(), mapped);
        }
        Ok(out)
    }

    /// Ids reachable from `id`, reusing expansions cached in `memo`.
    ///
    /// # Errors
    ///
    /// Same as [`GraphTransformation::apply`].
    pub fn map_one(
        &self,
        ctx: &RequestContext,
        txn: &Transaction<'_>,
        id: &str,
        memo: &mut TransformMemo,
    ) -> CoreResult<Vec<String>> {
        ctx.check_cancelled()?;
        if memo.levels.len() < self.steps.len() {
            memo.levels.resize_with(self.steps.len(), HashMap::new);
        }
        let mut frontier = BTreeSet::from([self.start.get_key(id)]);
        let mut source = self.start;
        for (level, step) in self.steps.iter().enumerate() {
            let mut next = BTreeSet::new();
            for key in &frontier {
                if let Some(cached) = memo.levels[level].get(key) {
                    next.extend(cached.iter().cloned());
                    continue;
                }
                let expanded = step.apply(txn, source, key).map_err(invalid_path)?;
                next.extend(expanded.iter().cloned());
                memo.levels[level].insert(key.clone(), expanded);
            }
            frontier = next;
            source = step.target();
        }
        Ok(source.filtered_ids(&frontier)?)
    }
}

fn invalid_path(err: CoreError) -> CoreError {
    match err {
        CoreError::Codec(codec) => CoreError::invariant_violation(format!("graph walk: {codec}")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::graph::GraphStore;

    const IMAGES: BucketHandler = BucketHandler::new("image");
    const COMPONENTS: BucketHandler = BucketHandler::new("image_component");
    const CVES: BucketHandler = BucketHandler::new("image_vuln");
    const COMP_CVE: BucketHandler = BucketHandler::new("comp_to_vuln");

    fn link(txn: &mut Transaction<'_>, from: &[u8], to: &[u8]) {
        txn.add_refs(from, &[to.to_vec()]).unwrap();
    }

    fn graph() -> GraphStore {
        let store = GraphStore::open_in_memory(Config::default());
        let mut txn = store.new_transaction();
        for id in ["i1", "i2"] {
            txn.put(&IMAGES.get_key(id), &b"x"[..]).unwrap();
        }
        link(&mut txn, &IMAGES.get_key("i1"), &COMPONENTS.get_key("c1"));
        link(&mut txn, &IMAGES.get_key("i1"), &COMPONENTS.get_key("c2"));
        link(&mut txn, &IMAGES.get_key("i2"), &COMPONENTS.get_key("c2"));
        link(&mut txn, &COMPONENTS.get_key("c1"), &CVES.get_key("v1"));
        link(&mut txn, &COMPONENTS.get_key("c2"), &CVES.get_key("v2"));
        let edge = EdgeId::new("c1", "v1").to_string();
        txn.put(&COMP_CVE.get_key(&edge), &b"e"[..]).unwrap();
        txn.commit().unwrap();
        drop(txn);
        store
    }

    #[test]
    fn forward_and_backward_walks() {
        let store = graph();
        let txn = store.new_read_only_transaction();
        let ctx = RequestContext::unrestricted();

        let to_cves = GraphTransformation::starting_at(IMAGES)
            .forward(COMPONENTS)
            .forward(CVES);
        assert_eq!(to_cves.apply(&ctx, &txn, &["i1".into()]).unwrap(), vec!["v1", "v2"]);
        assert_eq!(to_cves.apply(&ctx, &txn, &["i2".into()]).unwrap(), vec!["v2"]);

        let to_images = GraphTransformation::starting_at(CVES)
            .backward(COMPONENTS)
            .backward(IMAGES);
        let mapped = to_images
            .map_each(&ctx, &txn, &["v1".into(), "v2".into(), "v1".into()])
            .unwrap();
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped["v1"], vec!["i1"]);
        assert_eq!(mapped["v2"], vec!["i1", "i2"]);
    }

    #[test]
    fn edge_steps_only_yield_stored_edges() {
        let store = graph();
        let txn = store.new_read_only_transaction();
        let ctx = RequestContext::unrestricted();

        let edges = GraphTransformation::starting_at(CVES).edges_to_child(COMPONENTS, COMP_CVE);
        let edge_ids = edges
            .apply(&ctx, &txn, &["v1".into(), "v2".into()])
            .unwrap();
        assert_eq!(edge_ids, vec![EdgeId::new("c1", "v1").to_string()]);

        let parents = GraphTransformation::starting_at(COMP_CVE).edge_parent(COMPONENTS);
        assert_eq!(parents.apply(&ctx, &txn, &edge_ids).unwrap(), vec!["c1"]);
        let children = GraphTransformation::starting_at(COMP_CVE).edge_child(CVES);
        assert_eq!(children.apply(&ctx, &txn, &edge_ids).unwrap(), vec!["v1"]);
    }

    #[test]
    fn malformed_edge_id_is_an_invariant_violation() {
        let store = graph();
        let txn = store.new_read_only_transaction();
        let err = GraphTransformation::starting_at(COMP_CVE)
            .edge_parent(COMPONENTS)
            .apply(&RequestContext::unrestricted(), &txn, &["not-an-edge".into()])
            .unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation { .. }));
    }

    #[test]
    fn cancelled_walk_stops() {
        let store = graph();
        let txn = store.new_read_only_transaction();
        let ctx = RequestContext::unrestricted();
        ctx.cancellation().cancel();
        let err = GraphTransformation::starting_at(IMAGES)
            .forward(COMPONENTS)
            .map_each(&ctx, &txn, &["i1".into()])
            .unwrap_err();
        assert!(err.is_cancelled());
    }
}
