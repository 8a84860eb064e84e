//! CLI command implementations.

pub mod compact;
pub mod inspect;
pub mod reindex;
pub mod verify;

use scopegraph_core::{Config, GraphStore};
use std::path::Path;

/// Opens an existing graph directory without touching its index snapshot.
pub(crate) fn open_store(path: &Path) -> Result<GraphStore, Box<dyn std::error::Error>> {
    let config = Config::new().create_if_missing(false).persist_index(false);
    Ok(GraphStore::open_dir(path, config)?)
}

/// Formats a byte count for humans.
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} bytes")
    }
}
