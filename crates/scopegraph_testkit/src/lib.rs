//! # ScopeGraph Testkit
//!
//! Test utilities for ScopeGraph.
//!
//! This crate provides:
//! - [`TestGraph`], an in-memory or temp-dir security graph
//! - The two-cluster security fixture
//! - Scope-restricted request contexts
//! - Property-based test generators using proptest
//! - A fault-injecting storage backend
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use scopegraph_core::search::Query;
//! use scopegraph_testkit::prelude::*;
//!
//! let graph = TestGraph::with_fixture();
//! let visible = graph
//!     .searchers()
//!     .images
//!     .search(&namespace_a_reader(), &Query::match_all())
//!     .unwrap();
//! assert_eq!(visible.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod contexts;
pub mod faulty;
pub mod fixtures;
pub mod generators;
pub mod scenarios;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::contexts::*;
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use scopegraph_core::search::Searcher;
    pub use scopegraph_core::Store;
}

pub use contexts::*;
pub use faulty::*;
pub use fixtures::*;
pub use generators::*;
pub use stress::*;
