//! Scope-based visibility of ids.

use crate::context::RequestContext;
use crate::error::{CoreError, CoreResult};
use crate::graph::{GraphStore, Transaction};
use crate::sac::{AccessMode, AccessScope, ResourceScope, ScopeTransform};
use crate::search::TransformMemo;
use crate::types::Category;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Decides which ids of one resource the caller may see or change.
///
/// An id is allowed when any scope reached through any of the transforms is
/// allowed for the mode. Ids reaching no scope are never allowed below
/// global access.
pub struct ScopeFilter {
    graph: Arc<GraphStore>,
    category: Category,
    level: ResourceScope,
    transforms: Vec<ScopeTransform>,
}

struct Walk<'t> {
    txn: Transaction<'t>,
    memos: Vec<TransformMemo>,
    scopes: HashMap<(usize, String), Option<AccessScope>>,
}

impl ScopeFilter {
    /// A filter for `category`, scoped at `level`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfiguration`] for globally scoped
    /// resources or an empty transform list.
    pub fn new(
        graph: Arc<GraphStore>,
        category: Category,
        level: ResourceScope,
        transforms: Vec<ScopeTransform>,
    ) -> CoreResult<Self> {
        if level == ResourceScope::Global {
            return Err(CoreError::invalid_configuration(format!(
                "{category} is globally scoped and cannot be filtered"
            )));
        }
        if transforms.is_empty() {
            return Err(CoreError::invalid_configuration(format!(
                "scope filter for {category} has no transforms"
            )));
        }
        Ok(Self {
            graph,
            category,
            level,
            transforms,
        })
    }

    /// The filtered category.
    #[must_use]
    pub fn category(&self) -> Category {
        self.category
    }

    /// The level the resource is scoped at.
    #[must_use]
    pub fn level(&self) -> ResourceScope {
        self.level
    }

    /// Whether the caller has global `mode` access.
    #[must_use]
    pub fn is_globally_allowed(&self, ctx: &RequestContext, mode: AccessMode) -> bool {
        ctx.scope_checker().is_allowed(&AccessScope::Global, mode)
    }

    /// The subset of `ids` allowed for `mode`, in input order without
    /// duplicates.
    ///
    /// Ids whose scopes cannot be resolved are logged and left out.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] once `ctx` is cancelled.
    pub fn filter(&self, ctx: &RequestContext, ids: &[String], mode: AccessMode) -> CoreResult<Vec<String>> {
        if self.is_globally_allowed(ctx, mode) {
            let mut seen = BTreeSet::new();
            return Ok(ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect());
        }
        let allowed = self.allowed_set(ctx, ids, mode, false)?;
        let mut emitted = BTreeSet::new();
        Ok(ids
            .iter()
            .filter(|id| allowed.contains(id.as_str()) && emitted.insert(id.as_str()))
            .cloned()
            .collect())
    }

    /// Whether one id is allowed for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`] once `ctx` is cancelled.
    pub fn is_allowed(&self, ctx: &RequestContext, id: &str, mode: AccessMode) -> CoreResult<bool> {
        Ok(!self.filter(ctx, &[id.to_string()], mode)?.is_empty())
    }

    /// Requires every id to be write-allowed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AccessDenied`] naming the first denied id, or
    /// the resolution error itself.
    pub fn check_write(&self, ctx: &RequestContext, ids: &[String]) -> CoreResult<()> {
        if self.is_globally_allowed(ctx, AccessMode::ReadWrite) {
            return Ok(());
        }
        let allowed = self.allowed_set(ctx, ids, AccessMode::ReadWrite, true)?;
        match ids.iter().find(|id| !allowed.contains(id.as_str())) {
            Some(denied) => Err(CoreError::access_denied(format!(
                "no write access to {} {denied}",
                self.category
            ))),
            None => Ok(()),
        }
    }

    fn allowed_set(
        &self,
        ctx: &RequestContext,
        ids: &[String],
        mode: AccessMode,
        strict: bool,
    ) -> CoreResult<BTreeSet<String>> {
        let mut walk = Walk {
            txn: self.graph.new_read_only_transaction(),
            memos: self.transforms.iter().map(|_| TransformMemo::new()).collect(),
            scopes: HashMap::new(),
        };
        let mut allowed = BTreeSet::new();
        for id in ids {
            if allowed.contains(id) {
                continue;
            }
            match self.id_allowed(ctx, &mut walk, id, mode) {
                Ok(true) => {
                    allowed.insert(id.clone());
                }
                Ok(false) => {}
                Err(err) if strict || err.is_cancelled() => return Err(err),
                Err(err) => {
                    tracing::warn!(
                        category = %self.category,
                        id = %id,
                        error = %err,
                        "scope resolution failed; hiding id"
                    );
                }
            }
        }
        tracing::trace!(
            category = %self.category,
            %mode,
            requested = ids.len(),
            allowed = allowed.len(),
            "filtered ids by scope"
        );
        Ok(allowed)
    }

    fn id_allowed(&self, ctx: &RequestContext, walk: &mut Walk<'_>, id: &str, mode: AccessMode) -> CoreResult<bool> {
        let checker = ctx.scope_checker();
        for (i, transform) in self.transforms.iter().enumerate() {
            let targets = transform.path.map_one(ctx, &walk.txn, id, &mut walk.memos[i])?;
            for target in targets {
                let scope = match walk.scopes.get(&(i, target.clone())) {
                    Some(scope) => scope.clone(),
                    None => {
                        let scope = transform.resolver.resolve(&walk.txn, &target)?;
                        walk.scopes.insert((i, target), scope.clone());
                        scope
                    }
                };
                let Some(scope) = scope else {
                    continue;
                };
                let scope = match self.level {
                    ResourceScope::Cluster => scope.to_cluster(),
                    _ => scope,
                };
                if checker.is_allowed(&scope, mode) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

impl fmt::Debug for ScopeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeFilter")
            .field("category", &self.category)
            .field("level", &self.level)
            .field("transforms", &self.transforms)
            .finish_non_exhaustive()
    }
}
