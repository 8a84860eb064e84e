//! The security graph: entity models, their categories, scope paths, and
//! compound search pipelines.
//!
//! ```text
//! cluster ── namespace ── deployment ── image ══ component ══ cve
//!    └─────── node ═════════════════════════════════┘
//! ```
//!
//! `══` links carry an edge record of their own (image→component,
//! component→cve, node→component), keyed by both endpoint ids.

pub mod categories;
pub(crate) mod fields;
pub mod model;
mod pipelines;
mod scopes;
mod security_graph;

pub use pipelines::{compound_searcher, COMPOUND_CATEGORIES};
pub use scopes::scope_transforms;
pub use security_graph::{ScopedStores, Searchers, SecurityGraph, Stores};
