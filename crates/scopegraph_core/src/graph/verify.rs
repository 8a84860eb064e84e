//! Adjacency consistency checks.

use crate::context::RequestContext;
use crate::error::CoreResult;
use crate::graph::store::GraphStore;
use crate::graph::transaction::{backward_key, forward_key, BACKWARD_PREFIX, FORWARD_PREFIX};
use std::fmt;

/// One adjacency problem found by [`GraphStore::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjacencyIssue {
    /// `from -> to` has no matching backward entry on `to`.
    MissingBackward {
        /// Source key.
        from: Vec<u8>,
        /// Target key.
        to: Vec<u8>,
    },
    /// `to <- from` has no matching forward entry on `from`.
    MissingForward {
        /// Source key.
        from: Vec<u8>,
        /// Target key.
        to: Vec<u8>,
    },
    /// An adjacency list that cannot be decoded.
    Undecodable {
        /// Key of the list.
        key: Vec<u8>,
    },
}

impl fmt::Display for AdjacencyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBackward { from, to } => write!(
                f,
                "edge {} -> {} has no backward entry",
                render(from),
                render(to)
            ),
            Self::MissingForward { from, to } => write!(
                f,
                "backward entry {} <- {} has no forward edge",
                render(to),
                render(from)
            ),
            Self::Undecodable { key } => write!(f, "undecodable adjacency list {}", render(key)),
        }
    }
}

/// Result of a full adjacency scan.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Forward lists scanned.
    pub forward_lists: usize,
    /// Backward lists scanned.
    pub backward_lists: usize,
    /// Edges whose endpoints have no record (yet). Informational.
    pub dangling_refs: usize,
    /// Symmetry and decoding problems.
    pub issues: Vec<AdjacencyIssue>,
}

impl VerifyReport {
    /// Whether the adjacency is symmetric and decodable.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Renders a key with its separator shown as `/`.
pub(crate) fn render(key: &[u8]) -> String {
    String::from_utf8_lossy(key).replace('\0', "/")
}

impl GraphStore {
    /// Checks that every forward edge has its backward twin and vice versa.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Cancelled`](crate::CoreError::Cancelled) if `ctx`
    /// is cancelled mid-scan.
    pub fn verify(&self, ctx: &RequestContext) -> CoreResult<VerifyReport> {
        let txn = self.new_read_only_transaction();
        let mut report = VerifyReport::default();

        for list_key in txn.keys_with_prefix(ctx, FORWARD_PREFIX)? {
            report.forward_lists += 1;
            let from = &list_key[FORWARD_PREFIX.len()..];
            let Ok(targets) = txn.get_forward(from) else {
                report.issues.push(AdjacencyIssue::Undecodable { key: list_key });
                continue;
            };
            if !txn.exists(from)? {
                report.dangling_refs += 1;
            }
            for to in &targets {
                match txn.get_backward(to) {
                    Ok(sources) if sources.contains(from) => {}
                    Ok(_) => report.issues.push(AdjacencyIssue::MissingBackward {
                        from: from.to_vec(),
                        to: to.clone(),
                    }),
                    Err(_) => report.issues.push(AdjacencyIssue::Undecodable {
                        key: backward_key(to),
                    }),
                }
                if !txn.exists(to)? {
                    report.dangling_refs += 1;
                }
            }
        }

        for list_key in txn.keys_with_prefix(ctx, BACKWARD_PREFIX)? {
            report.backward_lists += 1;
            let to = &list_key[BACKWARD_PREFIX.len()..];
            let Ok(sources) = txn.get_backward(to) else {
                if !report.issues.contains(&AdjacencyIssue::Undecodable {
                    key: list_key.clone(),
                }) {
                    report.issues.push(AdjacencyIssue::Undecodable { key: list_key });
                }
                continue;
            };
            for from in &sources {
                match txn.get_forward(from) {
                    Ok(targets) if targets.contains(to) => {}
                    Ok(_) => report.issues.push(AdjacencyIssue::MissingForward {
                        from: from.clone(),
                        to: to.to_vec(),
                    }),
                    Err(_) => {
                        let issue = AdjacencyIssue::Undecodable {
                            key: forward_key(from),
                        };
                        if !report.issues.contains(&issue) {
                            report.issues.push(issue);
                        }
                    }
                }
            }
        }

        tracing::debug!(
            forward = report.forward_lists,
            backward = report.backward_lists,
            issues = report.issues.len(),
            "verified adjacency"
        );
        Ok(report)
    }
}
