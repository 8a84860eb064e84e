//! Compact command implementation.

use super::{format_size, open_store};
use std::path::Path;

/// Compaction statistics.
#[derive(Debug)]
pub struct CompactStats {
    /// Log size before compaction.
    pub bytes_before: u64,
    /// Log size after compaction.
    pub bytes_after: u64,
    /// Live keys carried over.
    pub live_keys: usize,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Compacting commit log at {}", path.display());
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(path, dry_run)?;
    println!("  Live keys:   {}", stats.live_keys);
    println!("  Size before: {}", format_size(stats.bytes_before));
    if !dry_run {
        println!("  Size after:  {}", format_size(stats.bytes_after));
        println!(
            "  Space saved: {}",
            format_size(stats.bytes_before.saturating_sub(stats.bytes_after))
        );
    }
    Ok(())
}

/// Rewrites the log of the graph at `path` as a single state record.
pub fn compact(path: &Path, dry_run: bool) -> Result<CompactStats, Box<dyn std::error::Error>> {
    let store = open_store(path)?;
    let before = store.stats()?;
    if !dry_run {
        store.compact()?;
    }
    Ok(CompactStats {
        bytes_before: before.log_size,
        bytes_after: store.log_size()?,
        live_keys: before.keyspace.keys,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopegraph_core::schema::model::Cve;
    use scopegraph_core::{Config, RequestContext, SecurityGraph, Store};

    #[test]
    fn compaction_shrinks_overwritten_log() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph");
        {
            let graph = SecurityGraph::open(&path, Config::default()).unwrap();
            let ctx = RequestContext::unrestricted();
            for round in 0..20 {
                let cve = Cve {
                    id: "CVE-2024-0001".into(),
                    cvss: 5.0,
                    summary: format!("revision {round}"),
                };
                graph.stores().cves.upsert_batch(&ctx, &[cve]).unwrap();
            }
        }

        let dry = compact(&path, true).unwrap();
        assert_eq!(dry.bytes_before, dry.bytes_after);

        let stats = compact(&path, false).unwrap();
        assert!(stats.bytes_after < stats.bytes_before);

        let graph = SecurityGraph::open(&path, Config::default()).unwrap();
        let cve = graph
            .stores()
            .cves
            .get(&RequestContext::unrestricted(), "CVE-2024-0001")
            .unwrap()
            .unwrap();
        assert_eq!(cve.summary, "revision 19");
    }
}
