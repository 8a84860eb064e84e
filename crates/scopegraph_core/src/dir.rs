//! Graph directory management.
//!
//! ```text
//! <graph_path>/
//! ├─ LOCK          # Advisory lock for single-process access
//! ├─ graph.log     # Commit log (records, adjacency, marker)
//! └─ index.snap    # Optional index snapshot
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
/// File name of the commit log inside a graph directory.
pub const LOG_FILE: &str = "graph.log";
/// File name of the index snapshot inside a graph directory.
pub const SNAPSHOT_FILE: &str = "index.snap";
const SNAPSHOT_TEMP: &str = "index.snap.tmp";

/// An opened graph directory holding the exclusive lock.
///
/// Only one `GraphDir` can exist per directory at a time; the lock is
/// released when the value is dropped.
#[derive(Debug)]
pub struct GraphDir {
    path: PathBuf,
    _lock_file: File,
}

impl GraphDir {
    /// Opens or creates a graph directory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another process holds the lock (`DatabaseLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_configuration(format!(
                    "graph directory does not exist: {}",
                    path.display()
                )));
            }
        }
        if !path.is_dir() {
            return Err(CoreError::invalid_configuration(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Root of the directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the commit log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }

    /// Path of the index snapshot.
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.path.join(SNAPSHOT_FILE)
    }

    /// Reads the index snapshot, `None` when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read_snapshot(&self) -> CoreResult<Option<Vec<u8>>> {
        let path = self.snapshot_path();
        if !path.exists() {
            return Ok(None);
        }
        let mut data = Vec::new();
        File::open(&path)?.read_to_end(&mut data)?;
        Ok(if data.is_empty() { None } else { Some(data) })
    }

    /// Writes the index snapshot atomically (write, sync, rename).
    ///
    /// # Errors
    ///
    /// Returns an error if any file operation fails.
    pub fn write_snapshot(&self, data: &[u8]) -> CoreResult<()> {
        let temp = self.path.join(SNAPSHOT_TEMP);
        let mut file = File::create(&temp)?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, self.snapshot_path())?;
        Ok(())
    }

    /// Deletes the index snapshot if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove_snapshot(&self) -> CoreResult<()> {
        let path = self.snapshot_path();
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_directory_and_lock() {
        let root = tempdir().unwrap();
        let path = root.path().join("graph");
        let dir = GraphDir::open(&path, true).unwrap();
        assert!(path.join(LOCK_FILE).exists());
        assert_eq!(dir.log_path(), path.join("graph.log"));
    }

    #[test]
    fn missing_directory_without_create_fails() {
        let root = tempdir().unwrap();
        let result = GraphDir::open(&root.path().join("absent"), false);
        assert!(matches!(
            result,
            Err(CoreError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn second_open_is_locked() {
        let root = tempdir().unwrap();
        let _first = GraphDir::open(root.path(), true).unwrap();
        assert!(matches!(
            GraphDir::open(root.path(), true),
            Err(CoreError::DatabaseLocked)
        ));
    }

    #[test]
    fn snapshot_round_trip() {
        let root = tempdir().unwrap();
        let dir = GraphDir::open(root.path(), true).unwrap();
        assert!(dir.read_snapshot().unwrap().is_none());

        dir.write_snapshot(b"SGIX-data").unwrap();
        assert_eq!(dir.read_snapshot().unwrap().unwrap(), b"SGIX-data");

        dir.remove_snapshot().unwrap();
        assert!(dir.read_snapshot().unwrap().is_none());
    }
}
