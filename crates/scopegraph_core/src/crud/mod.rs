//! CRUD primitives over the graph store.
//!
//! A category is described once by a [`CategoryDef`]: its bucket, the
//! relations its records contribute to the graph, and an optional search
//! schema. [`Reader`], [`Upserter`] and [`Deleter`] work inside a caller's
//! transaction; [`EntityStore`] wraps them into the [`Store`] contract with
//! one transaction per call and index maintenance on every write.

mod deleter;
mod entity;
mod reader;
mod store;
mod upserter;

pub use deleter::Deleter;
pub use entity::{CategoryDef, Entity, IdsFn, Relation};
pub use reader::Reader;
pub use store::{EntityStore, Reindex, Store};
pub use upserter::Upserter;
