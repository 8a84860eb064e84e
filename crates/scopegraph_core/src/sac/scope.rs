//! Access scopes and the checkers that grant them.

use std::collections::BTreeSet;
use std::fmt;

/// Kind of access being checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// Read access.
    Read,
    /// Read and write access.
    ReadWrite,
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::ReadWrite => f.write_str("read-write"),
        }
    }
}

/// A concrete scope a record lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AccessScope {
    /// Everything.
    Global,
    /// One cluster, by id.
    Cluster(String),
    /// One namespace, by cluster id and namespace name.
    Namespace {
        /// Cluster id.
        cluster: String,
        /// Namespace name.
        namespace: String,
    },
}

impl AccessScope {
    /// A namespace scope.
    pub fn namespace(cluster: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self::Namespace {
            cluster: cluster.into(),
            namespace: namespace.into(),
        }
    }

    /// Narrows this scope to cluster level.
    #[must_use]
    pub fn to_cluster(&self) -> Self {
        match self {
            Self::Namespace { cluster, .. } => Self::Cluster(cluster.clone()),
            other => other.clone(),
        }
    }
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Cluster(cluster) => write!(f, "cluster:{cluster}"),
            Self::Namespace { cluster, namespace } => write!(f, "namespace:{cluster}/{namespace}"),
        }
    }
}

/// Level at which a resource kind is scoped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceScope {
    /// Not scoped below global.
    Global,
    /// Scoped by cluster.
    Cluster,
    /// Scoped by cluster and namespace.
    Namespace,
}

/// Answers whether the caller may access a scope.
pub trait AccessScopeChecker: Send + Sync {
    /// Whether `scope` is allowed for `mode`.
    fn is_allowed(&self, scope: &AccessScope, mode: AccessMode) -> bool;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAllChecker;

impl AccessScopeChecker for AllowAllChecker {
    fn is_allowed(&self, _: &AccessScope, _: AccessMode) -> bool {
        true
    }
}

/// Allows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAllChecker;

impl AccessScopeChecker for DenyAllChecker {
    fn is_allowed(&self, _: &AccessScope, _: AccessMode) -> bool {
        false
    }
}

#[derive(Debug, Clone, Default)]
struct Grants {
    global: bool,
    clusters: BTreeSet<String>,
    namespaces: BTreeSet<(String, String)>,
}

impl Grants {
    fn allows(&self, scope: &AccessScope) -> bool {
        if self.global {
            return true;
        }
        match scope {
            AccessScope::Global => false,
            AccessScope::Cluster(cluster) => self.clusters.contains(cluster),
            AccessScope::Namespace { cluster, namespace } => {
                self.clusters.contains(cluster)
                    || self.namespaces.contains(&(cluster.clone(), namespace.clone()))
            }
        }
    }
}

/// A checker over a fixed set of grants.
///
/// A cluster grant covers every namespace in the cluster; a namespace grant
/// does not cover its cluster. Read-write grants imply read.
///
/// ```
/// use scopegraph_core::sac::{AccessMode, AccessScope, AccessScopeChecker, FixedScopeChecker};
///
/// let checker = FixedScopeChecker::new().grant_namespace(AccessMode::Read, "c1", "default");
/// assert!(checker.is_allowed(&AccessScope::namespace("c1", "default"), AccessMode::Read));
/// assert!(!checker.is_allowed(&AccessScope::Cluster("c1".into()), AccessMode::Read));
/// assert!(!checker.is_allowed(&AccessScope::namespace("c1", "default"), AccessMode::ReadWrite));
/// ```
#[derive(Debug, Clone, Default)]
pub struct FixedScopeChecker {
    read: Grants,
    write: Grants,
}

impl FixedScopeChecker {
    /// A checker with no grants.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn grants(&mut self, mode: AccessMode) -> Vec<&mut Grants> {
        match mode {
            AccessMode::Read => vec![&mut self.read],
            AccessMode::ReadWrite => vec![&mut self.read, &mut self.write],
        }
    }

    /// Grants everything for `mode`.
    #[must_use]
    pub fn grant_global(mut self, mode: AccessMode) -> Self {
        for grants in self.grants(mode) {
            grants.global = true;
        }
        self
    }

    /// Grants one cluster and all its namespaces for `mode`.
    #[must_use]
    pub fn grant_cluster(mut self, mode: AccessMode, cluster: &str) -> Self {
        for grants in self.grants(mode) {
            grants.clusters.insert(cluster.to_string());
        }
        self
    }

    /// Grants one namespace for `mode`.
    #[must_use]
    pub fn grant_namespace(mut self, mode: AccessMode, cluster: &str, namespace: &str) -> Self {
        for grants in self.grants(mode) {
            grants
                .namespaces
                .insert((cluster.to_string(), namespace.to_string()));
        }
        self
    }
}

impl AccessScopeChecker for FixedScopeChecker {
    fn is_allowed(&self, scope: &AccessScope, mode: AccessMode) -> bool {
        match mode {
            AccessMode::Read => self.read.allows(scope),
            AccessMode::ReadWrite => self.write.allows(scope),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_grant_covers_namespaces() {
        let checker = FixedScopeChecker::new().grant_cluster(AccessMode::Read, "c1");
        assert!(checker.is_allowed(&AccessScope::Cluster("c1".into()), AccessMode::Read));
        assert!(checker.is_allowed(&AccessScope::namespace("c1", "ns"), AccessMode::Read));
        assert!(!checker.is_allowed(&AccessScope::namespace("c2", "ns"), AccessMode::Read));
        assert!(!checker.is_allowed(&AccessScope::Global, AccessMode::Read));
    }

    #[test]
    fn read_write_implies_read() {
        let checker = FixedScopeChecker::new().grant_global(AccessMode::ReadWrite);
        assert!(checker.is_allowed(&AccessScope::Global, AccessMode::Read));
        assert!(checker.is_allowed(&AccessScope::Global, AccessMode::ReadWrite));

        let reader = FixedScopeChecker::new().grant_global(AccessMode::Read);
        assert!(!reader.is_allowed(&AccessScope::Cluster("c1".into()), AccessMode::ReadWrite));
    }

    #[test]
    fn narrowing_and_display() {
        let scope = AccessScope::namespace("c1", "prod");
        assert_eq!(scope.to_cluster(), AccessScope::Cluster("c1".into()));
        assert_eq!(scope.to_string(), "namespace:c1/prod");
        assert!(!DenyAllChecker.is_allowed(&AccessScope::Global, AccessMode::Read));
        assert!(AllowAllChecker.is_allowed(&scope, AccessMode::ReadWrite));
    }
}
