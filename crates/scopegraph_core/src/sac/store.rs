//! Scope filtering of a typed store.

use crate::context::RequestContext;
use crate::crud::{Entity, Store};
use crate::error::{CoreError, CoreResult};
use crate::sac::{AccessMode, AccessScope, ScopeFilter};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// A [`Store`] that only shows and changes what the caller's scopes allow.
///
/// Reads degrade silently: hidden records look absent. Writes fail with
/// [`CoreError::AccessDenied`] unless the caller has global write access or
/// every touched record is write-allowed. When the store knows how to read
/// the scope a record declares about itself, that scope must be
/// write-allowed too; without it, records not stored yet need global write
/// access.
///
/// Scopes are checked against the latest commit before the write begins,
/// in a separate transaction. A record re-parented by a concurrent writer
/// between the check and the write is written under the scope it had at
/// check time.
pub struct FilteredStore<T: Entity> {
    inner: Arc<dyn Store<T>>,
    filter: Arc<ScopeFilter>,
    own_scope: Option<fn(&T) -> Option<AccessScope>>,
}

impl<T: Entity> FilteredStore<T> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Store<T>>, filter: Arc<ScopeFilter>) -> Self {
        Self {
            inner,
            filter,
            own_scope: None,
        }
    }

    /// Reads the scope a record declares about itself; upserts must be
    /// write-allowed in it.
    #[must_use]
    pub fn with_own_scope(mut self, own_scope: fn(&T) -> Option<AccessScope>) -> Self {
        self.own_scope = Some(own_scope);
        self
    }

    /// The filter in use.
    #[must_use]
    pub fn filter(&self) -> &Arc<ScopeFilter> {
        &self.filter
    }

    fn global(&self, ctx: &RequestContext, mode: AccessMode) -> bool {
        self.filter.is_globally_allowed(ctx, mode)
    }

    fn visible(&self, ctx: &RequestContext, id: &str) -> CoreResult<bool> {
        self.filter.is_allowed(ctx, id, AccessMode::Read)
    }

    fn check_upserts(&self, ctx: &RequestContext, entities: &[T]) -> CoreResult<()> {
        if self.global(ctx, AccessMode::ReadWrite) {
            return Ok(());
        }
        let mut stored = Vec::new();
        for entity in entities {
            let declared = self.own_scope.and_then(|own| own(entity));
            let exists = self.inner.exists(ctx, entity.id())?;
            let allowed = match &declared {
                Some(scope) => ctx.scope_checker().is_allowed(scope, AccessMode::ReadWrite),
                None => exists,
            };
            if !allowed {
                return Err(CoreError::access_denied(format!(
                    "no write access to {} {}",
                    self.filter.category(),
                    entity.id()
                )));
            }
            if exists {
                stored.push(entity.id().to_string());
            }
        }
        self.filter.check_write(ctx, &stored)
    }

    fn check_deletes(&self, ctx: &RequestContext, ids: &[String]) -> CoreResult<()> {
        if self.global(ctx, AccessMode::ReadWrite) {
            return Ok(());
        }
        let mut stored = Vec::with_capacity(ids.len());
        for id in ids {
            if self.inner.exists(ctx, id)? {
                stored.push(id.clone());
            }
        }
        self.filter.check_write(ctx, &stored)
    }
}

impl<T: Entity> Store<T> for FilteredStore<T> {
    fn get(&self, ctx: &RequestContext, id: &str) -> CoreResult<Option<T>> {
        if !self.global(ctx, AccessMode::Read) && !self.visible(ctx, id)? {
            return Ok(None);
        }
        self.inner.get(ctx, id)
    }

    fn get_batch(&self, ctx: &RequestContext, ids: &[String]) -> CoreResult<(Vec<T>, Vec<usize>)> {
        if self.global(ctx, AccessMode::Read) {
            return self.inner.get_batch(ctx, ids);
        }
        let visible: BTreeSet<String> = self
            .filter
            .filter(ctx, ids, AccessMode::Read)?
            .into_iter()
            .collect();
        let mut positions = Vec::new();
        let mut missing = Vec::new();
        let mut allowed = Vec::new();
        for (position, id) in ids.iter().enumerate() {
            if visible.contains(id) {
                positions.push(position);
                allowed.push(id.clone());
            } else {
                missing.push(position);
            }
        }
        let (found, inner_missing) = self.inner.get_batch(ctx, &allowed)?;
        missing.extend(inner_missing.into_iter().map(|i| positions[i]));
        missing.sort_unstable();
        Ok((found, missing))
    }

    fn exists(&self, ctx: &RequestContext, id: &str) -> CoreResult<bool> {
        if !self.global(ctx, AccessMode::Read) && !self.visible(ctx, id)? {
            return Ok(false);
        }
        self.inner.exists(ctx, id)
    }

    fn count(&self, ctx: &RequestContext) -> CoreResult<usize> {
        if self.global(ctx, AccessMode::Read) {
            return self.inner.count(ctx);
        }
        Ok(self.get_ids(ctx)?.len())
    }

    fn get_ids(&self, ctx: &RequestContext) -> CoreResult<Vec<String>> {
        let ids = self.inner.get_ids(ctx)?;
        if self.global(ctx, AccessMode::Read) {
            return Ok(ids);
        }
        self.filter.filter(ctx, &ids, AccessMode::Read)
    }

    fn walk(&self, ctx: &RequestContext, f: &mut dyn FnMut(&T) -> CoreResult<()>) -> CoreResult<()> {
        if self.global(ctx, AccessMode::Read) {
            return self.inner.walk(ctx, f);
        }
        let visible: BTreeSet<String> = self.get_ids(ctx)?.into_iter().collect();
        self.inner.walk(ctx, &mut |entity: &T| {
            if visible.contains(entity.id()) {
                f(entity)
            } else {
                Ok(())
            }
        })
    }

    fn upsert_batch(&self, ctx: &RequestContext, entities: &[T]) -> CoreResult<()> {
        self.check_upserts(ctx, entities)?;
        self.inner.upsert_batch(ctx, entities)
    }

    fn delete_batch(&self, ctx: &RequestContext, ids: &[String]) -> CoreResult<()> {
        self.check_deletes(ctx, ids)?;
        self.inner.delete_batch(ctx, ids)
    }

    fn add(&self, ctx: &RequestContext, entity: &T) -> CoreResult<()> {
        self.check_upserts(ctx, std::slice::from_ref(entity))?;
        self.inner.add(ctx, entity)
    }

    fn update(&self, ctx: &RequestContext, entity: &T) -> CoreResult<()> {
        self.check_upserts(ctx, std::slice::from_ref(entity))?;
        self.inner.update(ctx, entity)
    }
}

impl<T: Entity> fmt::Debug for FilteredStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilteredStore")
            .field("filter", &self.filter)
            .field("own_scope", &self.own_scope.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sac::FixedScopeChecker;
    use crate::schema::model::{Deployment, Namespace};
    use crate::schema::SecurityGraph;

    fn namespace(id: &str, name: &str, cluster: &str) -> Namespace {
        Namespace {
            id: id.into(),
            name: name.into(),
            cluster_id: cluster.into(),
        }
    }

    fn deployment(id: &str, ns: &Namespace) -> Deployment {
        Deployment {
            id: id.into(),
            name: id.into(),
            namespace_id: ns.id.clone(),
            namespace: ns.name.clone(),
            cluster_id: ns.cluster_id.clone(),
            ..Deployment::default()
        }
    }

    fn graph() -> (SecurityGraph, Namespace, Namespace) {
        let graph = SecurityGraph::open_in_memory(Config::default()).unwrap();
        let ctx = RequestContext::unrestricted();
        let prod = namespace("n1", "prod", "c1");
        let dev = namespace("n2", "dev", "c2");
        graph
            .stores()
            .namespaces
            .upsert_batch(&ctx, &[prod.clone(), dev.clone()])
            .unwrap();
        graph
            .stores()
            .deployments
            .upsert_batch(&ctx, &[deployment("d1", &prod), deployment("d2", &dev)])
            .unwrap();
        (graph, prod, dev)
    }

    fn ctx(checker: FixedScopeChecker) -> RequestContext {
        RequestContext::unrestricted().with_checker(Arc::new(checker))
    }

    #[test]
    fn reads_hide_other_scopes() {
        let (graph, _, _) = graph();
        let store = &graph.scoped().deployments;
        let prod = ctx(FixedScopeChecker::new().grant_namespace(AccessMode::Read, "c1", "prod"));

        assert_eq!(store.get_ids(&prod).unwrap(), vec!["d1"]);
        assert_eq!(store.count(&prod).unwrap(), 1);
        assert!(store.get(&prod, "d2").unwrap().is_none());
        assert!(!store.exists(&prod, "d2").unwrap());

        let ids = vec!["d2".to_string(), "d1".to_string(), "missing".to_string()];
        let (found, missing) = store.get_batch(&prod, &ids).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "d1");
        assert_eq!(missing, vec![0, 2]);

        let mut walked = Vec::new();
        store
            .walk(&prod, &mut |d: &Deployment| {
                walked.push(d.id.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(walked, vec!["d1"]);
    }

    #[test]
    fn writes_need_write_scope() {
        let (graph, prod, dev) = graph();
        let store = &graph.scoped().deployments;
        let reader = ctx(FixedScopeChecker::new().grant_global(AccessMode::Read));
        let writer = ctx(FixedScopeChecker::new().grant_namespace(AccessMode::ReadWrite, "c1", "prod"));

        let err = store.upsert_batch(&reader, &[deployment("d1", &prod)]).unwrap_err();
        assert!(matches!(err, CoreError::AccessDenied { .. }), "{err:?}");

        store.upsert_batch(&writer, &[deployment("d3", &prod)]).unwrap();
        store.upsert_batch(&writer, &[deployment("d1", &prod)]).unwrap();
        assert!(matches!(
            store.upsert_batch(&writer, &[deployment("d4", &dev)]),
            Err(CoreError::AccessDenied { .. })
        ));
        // Moving d1 into a namespace the caller cannot write is denied too.
        assert!(matches!(
            store.upsert_batch(&writer, &[deployment("d1", &dev)]),
            Err(CoreError::AccessDenied { .. })
        ));
        assert!(matches!(
            store.delete_batch(&writer, &["d1".into(), "d2".into()]),
            Err(CoreError::AccessDenied { .. })
        ));

        let all = RequestContext::unrestricted();
        assert!(graph.stores().deployments.exists(&all, "d2").unwrap());
        store.delete_batch(&writer, &["d1".into(), "gone".into()]).unwrap();
        assert!(!graph.stores().deployments.exists(&all, "d1").unwrap());
    }

    #[test]
    fn records_without_own_scope_need_global_write_when_new() {
        let graph = SecurityGraph::open_in_memory(Config::default()).unwrap();
        let writer = ctx(FixedScopeChecker::new().grant_cluster(AccessMode::ReadWrite, "c1"));
        let image = crate::schema::model::Image {
            id: "i1".into(),
            ..Default::default()
        };
        assert!(matches!(
            graph.scoped().images.upsert_batch(&writer, &[image.clone()]),
            Err(CoreError::AccessDenied { .. })
        ));

        let admin = ctx(FixedScopeChecker::new().grant_global(AccessMode::ReadWrite));
        graph.scoped().images.upsert_batch(&admin, &[image]).unwrap();
        assert_eq!(graph.scoped().images.count(&admin).unwrap(), 1);
    }
}
