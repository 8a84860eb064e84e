//! Graph store: transactional records plus bidirectional adjacency.
//!
//! Entity records and adjacency lists share one keyspace. Records live
//! under their bucket prefix; the forward and backward lists of a key live
//! under the reserved `__fwd\0` / `__bwd\0` prefixes. Each commit appends a
//! single record to the commit log, and the log is replayed on open.

mod keyspace;
mod log;
mod store;
mod transaction;
mod verify;

pub use keyspace::KeyspaceStats;
pub use log::{encode_commit, replay, LogRecord, LogRecordType, Mutation, Replay, LOG_MAGIC, LOG_VERSION};
pub use store::{GraphStats, GraphStore};
pub use transaction::{
    backward_key, forward_key, Transaction, TransactionState, BACKWARD_PREFIX, FORWARD_PREFIX,
    RESERVED_PREFIX,
};
pub use verify::{AdjacencyIssue, VerifyReport};

pub(crate) use verify::render;
