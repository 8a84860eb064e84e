//! Inverted-index engine.
//!
//! Every indexed category declares a [`Schema`]: an explicit table from
//! field label to value accessor, validated into an [`OptionsMap`] at
//! startup. The [`Indexer`] keeps one inverted index per category, and an
//! [`IndexWrapper`] mirrors every committed CRUD write into it.

mod category;
mod document;
mod indexer;
mod matcher;
mod schema;
mod tokenizer;
mod wrapper;

pub use document::{Document, FieldValue};
pub use indexer::{Indexer, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};
pub use schema::{ExtractFn, FieldDef, FieldKind, FieldOptions, OptionsMap, Schema};
pub use tokenizer::TokenizerConfig;
pub use wrapper::{IndexChange, IndexWrapper, SchemaWrapper, Wrapper};
