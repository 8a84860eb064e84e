//! Verify command implementation.

use super::open_store;
use scopegraph_core::graph::replay;
use scopegraph_core::{RequestContext, LOG_FILE};
use scopegraph_storage::{FileBackend, StorageBackend};
use std::path::Path;

/// Verification result.
#[derive(Debug, Default)]
pub struct VerifyResult {
    /// Log records with a valid checksum.
    pub valid_records: usize,
    /// Bytes after the last valid record; dropped on the next open.
    pub torn_bytes: u64,
    /// Forward adjacency lists checked.
    pub forward_lists: usize,
    /// Backward adjacency lists checked.
    pub backward_lists: usize,
    /// Edges pointing at keys without a record.
    pub dangling_refs: usize,
    /// Errors found.
    pub errors: Vec<String>,
}

impl VerifyResult {
    /// Whether the graph passed.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the verify command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying graph at {}", path.display());
    println!();

    let result = verify(path)?;
    println!(
        "  Log records: {}, torn tail: {} bytes",
        result.valid_records, result.torn_bytes
    );
    println!(
        "  Adjacency lists: {} forward, {} backward, {} dangling refs",
        result.forward_lists, result.backward_lists, result.dangling_refs
    );
    for error in &result.errors {
        println!("    ERROR: {error}");
    }

    println!();
    if result.is_ok() {
        println!("✓ Graph verification passed");
        Ok(())
    } else {
        println!("✗ Graph verification failed");
        Err("Verification failed".into())
    }
}

/// Checks log checksums, then adjacency symmetry.
pub fn verify(path: &Path) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let log_path = path.join(LOG_FILE);
    if !log_path.exists() {
        return Err(format!("No graph found at {}", path.display()).into());
    }

    let mut result = VerifyResult::default();
    let data = FileBackend::open(&log_path)?.read_all()?;
    match replay(&data) {
        Ok(replayed) => {
            result.valid_records = replayed.records.len();
            result.torn_bytes = data.len() as u64 - replayed.valid_len;
        }
        Err(err) => {
            // The store refuses to open a corrupt log.
            result.errors.push(err.to_string());
            return Ok(result);
        }
    }

    let store = open_store(path)?;
    let report = store.verify(&RequestContext::unrestricted())?;
    result.forward_lists = report.forward_lists;
    result.backward_lists = report.backward_lists;
    result.dangling_refs = report.dangling_refs;
    result
        .errors
        .extend(report.issues.iter().map(ToString::to_string));
    Ok(result)
}
