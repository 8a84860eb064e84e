//! # scopegraph storage
//!
//! Byte backends that hold the scopegraph commit log.
//!
//! Backends are append-only byte sinks with one bulk operation,
//! [`StorageBackend::replace`], used when the log is compacted. They know
//! nothing about records, keys or adjacency; the graph store owns the format.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral graphs and tests
//! - [`FileBackend`] - a single log file on disk
//!
//! ## Example
//!
//! ```rust
//! use scopegraph_storage::{StorageBackend, InMemoryBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! backend.append(b"commit-1").unwrap();
//! backend.append(b"commit-2").unwrap();
//! assert_eq!(backend.read_all().unwrap(), b"commit-1commit-2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
