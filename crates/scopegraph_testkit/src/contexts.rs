//! Request contexts for callers with fixed access scopes.

use crate::fixtures::{ids, NAMESPACE_A_NAME, NAMESPACE_B_NAME};
use scopegraph_core::sac::{AccessMode, DenyAllChecker, FixedScopeChecker};
use scopegraph_core::RequestContext;
use std::sync::Arc;

/// A context for a caller holding exactly `checker`'s grants.
#[must_use]
pub fn scoped_context(checker: FixedScopeChecker) -> RequestContext {
    RequestContext::new(Arc::new(checker))
}

/// Reads everything, writes nothing.
#[must_use]
pub fn global_reader() -> RequestContext {
    scoped_context(FixedScopeChecker::new().grant_global(AccessMode::Read))
}

/// Reads and writes everything.
#[must_use]
pub fn global_writer() -> RequestContext {
    scoped_context(FixedScopeChecker::new().grant_global(AccessMode::ReadWrite))
}

/// Reads `cluster-1` / `namespace-a` only.
#[must_use]
pub fn namespace_a_reader() -> RequestContext {
    scoped_context(FixedScopeChecker::new().grant_namespace(AccessMode::Read, ids::CLUSTER1, NAMESPACE_A_NAME))
}

/// Reads and writes `cluster-1` / `namespace-a` only.
#[must_use]
pub fn namespace_a_writer() -> RequestContext {
    scoped_context(FixedScopeChecker::new().grant_namespace(
        AccessMode::ReadWrite,
        ids::CLUSTER1,
        NAMESPACE_A_NAME,
    ))
}

/// Reads `cluster-2` / `namespace-b` only.
#[must_use]
pub fn namespace_b_reader() -> RequestContext {
    scoped_context(FixedScopeChecker::new().grant_namespace(AccessMode::Read, ids::CLUSTER2, NAMESPACE_B_NAME))
}

/// Reads all of `cluster-2`, nodes included.
#[must_use]
pub fn cluster2_reader() -> RequestContext {
    scoped_context(FixedScopeChecker::new().grant_cluster(AccessMode::Read, ids::CLUSTER2))
}

/// Sees nothing.
#[must_use]
pub fn no_access() -> RequestContext {
    RequestContext::new(Arc::new(DenyAllChecker))
}
