//! # ScopeGraph Core
//!
//! Graph-backed entity store with scoped access control and compound
//! search.
//!
//! This crate provides:
//! - A transactional graph store with bidirectional adjacency, persisted
//!   as a commit log
//! - Typed CRUD over entity categories, with index maintenance
//! - An inverted-index engine with per-category schemas
//! - Scoped access control over cluster and namespace scopes
//! - Compound search across related categories
//!
//! ## Example
//!
//! ```rust
//! use scopegraph_core::schema::model::Cluster;
//! use scopegraph_core::{Config, RequestContext, SecurityGraph, Store};
//!
//! let graph = SecurityGraph::open_in_memory(Config::default()).unwrap();
//! let ctx = RequestContext::unrestricted();
//! let cluster = Cluster {
//!     id: "c1".into(),
//!     name: "prod".into(),
//! };
//! graph.stores().clusters.upsert_batch(&ctx, &[cluster.clone()]).unwrap();
//! assert_eq!(graph.stores().clusters.get(&ctx, "c1").unwrap(), Some(cluster));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
pub mod crud;
mod database;
mod dir;
mod error;
pub mod graph;
pub mod index;
pub mod sac;
pub mod schema;
pub mod search;
mod types;

pub use config::Config;
pub use context::{CancellationToken, RequestContext};
pub use crud::{CategoryDef, Entity, EntityStore, Store};
pub use database::{GraphDatabase, IndexState};
pub use dir::{GraphDir, LOG_FILE, SNAPSHOT_FILE};
pub use error::{CoreError, CoreResult};
pub use graph::{GraphStore, Transaction, VerifyReport};
pub use schema::SecurityGraph;
pub use types::{Category, SequenceNumber, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
