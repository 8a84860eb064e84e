//! Reindex command implementation.

use scopegraph_core::{Config, IndexState, SecurityGraph};
use std::path::Path;

/// Runs the reindex command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("Re-indexing graph at {}", path.display());
    let documents = reindex(path)?;
    println!("  Documents indexed: {documents}");
    println!("✓ Index snapshot written");
    Ok(())
}

/// Rebuilds every index from the graph and writes a fresh snapshot;
/// returns the number of documents indexed.
pub fn reindex(path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let config = Config::new()
        .create_if_missing(false)
        .verify_index_on_open(true)
        .persist_index(false);
    let graph = SecurityGraph::open(path, config)?;
    let documents = match graph.index_state() {
        IndexState::Rebuilt { documents } => documents,
        IndexState::Restored => return Err("index was restored instead of rebuilt".into()),
    };
    if !graph.database().persist_index()? {
        return Err("graph is dirty; snapshot not written".into());
    }
    tracing::info!(documents, "re-indexed graph");
    Ok(documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scopegraph_core::schema::model::Cluster;
    use scopegraph_core::{RequestContext, Store, SNAPSHOT_FILE};

    #[test]
    fn writes_a_fresh_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph");
        {
            let graph = SecurityGraph::open(&path, Config::new().persist_index(false)).unwrap();
            graph
                .stores()
                .clusters
                .upsert_batch(
                    &RequestContext::unrestricted(),
                    &[Cluster {
                        id: "c1".into(),
                        name: "prod".into(),
                    }],
                )
                .unwrap();
        }
        assert!(!path.join(SNAPSHOT_FILE).exists());

        assert_eq!(reindex(&path).unwrap(), 1);
        assert!(path.join(SNAPSHOT_FILE).exists());

        let graph = SecurityGraph::open(&path, Config::default()).unwrap();
        assert_eq!(graph.index_state(), IndexState::Restored);
    }
}
