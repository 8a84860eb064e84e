//! Inspect command implementation.

use super::{format_size, open_store};
use scopegraph_core::graph::{replay, LogRecord};
use scopegraph_core::schema::categories;
use scopegraph_core::{RequestContext, LOG_FILE, SNAPSHOT_FILE};
use scopegraph_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::path::Path;

/// Graph inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Graph directory.
    pub path: String,
    /// Sequence of the last commit.
    pub committed_seq: u64,
    /// Whether the dirty/valid marker is dirty.
    pub dirty: bool,
    /// Commit log size in bytes.
    pub log_size: u64,
    /// Commit records in the log.
    pub commit_records: usize,
    /// Marker records in the log.
    pub marker_records: usize,
    /// Bytes after the last valid record.
    pub torn_bytes: u64,
    /// Index snapshot size, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_size: Option<u64>,
    /// Live keys, records and adjacency lists together.
    pub live_keys: usize,
    /// Records per bucket.
    pub buckets: Vec<BucketStats>,
}

/// Record count of one bucket.
#[derive(Debug, Serialize)]
pub struct BucketStats {
    /// Category name.
    pub category: String,
    /// Bucket prefix.
    pub prefix: String,
    /// Live records.
    pub records: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Collects the inspection result for the graph at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let log_path = path.join(LOG_FILE);
    if !log_path.exists() {
        return Err(format!("No graph found at {}", path.display()).into());
    }

    // The log is scanned before opening, which drops a torn tail.
    let data = FileBackend::open(&log_path)?.read_all()?;
    let replayed = replay(&data)?;
    let (mut commit_records, mut marker_records) = (0, 0);
    for (_, record) in &replayed.records {
        match record {
            LogRecord::Commit { .. } => commit_records += 1,
            LogRecord::Marker { .. } => marker_records += 1,
        }
    }

    let snapshot_path = path.join(SNAPSHOT_FILE);
    let snapshot_size = if snapshot_path.exists() {
        Some(std::fs::metadata(&snapshot_path)?.len())
    } else {
        None
    };

    let store = open_store(path)?;
    let stats = store.stats()?;
    let ctx = RequestContext::unrestricted();
    let txn = store.new_read_only_transaction();
    let mut buckets = Vec::with_capacity(categories::ALL.len());
    for (category, bucket) in categories::ALL {
        buckets.push(BucketStats {
            category: category.name().to_string(),
            prefix: bucket.prefix().to_string(),
            records: txn.count_prefix(&ctx, &bucket.key_prefix())?,
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        committed_seq: stats.committed_seq.as_u64(),
        dirty: stats.dirty,
        log_size: data.len() as u64,
        commit_records,
        marker_records,
        torn_bytes: data.len() as u64 - replayed.valid_len,
        snapshot_size,
        live_keys: stats.keyspace.keys,
        buckets,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("ScopeGraph Inspection");
    println!("=====================");
    println!();
    println!("Path: {}", result.path);
    println!();
    println!("Commit log:");
    println!("  Size:            {}", format_size(result.log_size));
    println!("  Commits:         {}", result.commit_records);
    println!("  Markers:         {}", result.marker_records);
    if result.torn_bytes > 0 {
        println!("  Torn tail:       {} bytes", result.torn_bytes);
    }
    println!("  Committed seq:   {}", result.committed_seq);
    println!(
        "  Marker:          {}",
        if result.dirty { "dirty" } else { "valid" }
    );
    match result.snapshot_size {
        Some(size) => println!("  Index snapshot:  {}", format_size(size)),
        None => println!("  Index snapshot:  none"),
    }
    println!();
    println!("Keyspace ({} live keys):", result.live_keys);
    for bucket in &result.buckets {
        println!(
            "  {:<22} {:<20} {:>8}",
            bucket.category, bucket.prefix, bucket.records
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopegraph_core::schema::model::Cluster;
    use scopegraph_core::{Config, SecurityGraph, Store};

    #[test]
    fn counts_records_per_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph");
        {
            let graph = SecurityGraph::open(&path, Config::default()).unwrap();
            let clusters = [
                Cluster {
                    id: "c1".into(),
                    name: "prod".into(),
                },
                Cluster {
                    id: "c2".into(),
                    name: "dev".into(),
                },
            ];
            graph
                .stores()
                .clusters
                .upsert_batch(&RequestContext::unrestricted(), &clusters)
                .unwrap();
            graph.close().unwrap();
        }

        let result = inspect(&path).unwrap();
        assert_eq!(result.committed_seq, 1);
        assert_eq!(result.commit_records, 1);
        assert!(!result.dirty);
        assert_eq!(result.torn_bytes, 0);
        assert!(result.snapshot_size.is_some());
        let clusters = result.buckets.iter().find(|b| b.category == "cluster").unwrap();
        assert_eq!(clusters.records, 2);
        assert!(result
            .buckets
            .iter()
            .filter(|b| b.category != "cluster")
            .all(|b| b.records == 0));
    }

    #[test]
    fn missing_graph_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(inspect(&dir.path().join("nothing")).is_err());
    }
}
