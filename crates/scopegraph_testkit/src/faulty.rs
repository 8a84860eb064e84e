//! A storage backend that fails on command.
//!
//! ```rust
//! use scopegraph_core::{Config, SecurityGraph};
//! use scopegraph_testkit::FaultyBackend;
//!
//! let (backend, faults) = FaultyBackend::empty();
//! let graph = SecurityGraph::with_backend(Box::new(backend), Config::default()).unwrap();
//! faults.fail_writes();
//! // every append now fails until `faults.heal()`
//! # drop(graph);
//! ```

use parking_lot::Mutex;
use scopegraph_storage::{StorageBackend, StorageError, StorageResult};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct FaultState {
    data: Mutex<Vec<u8>>,
    fail_writes: AtomicBool,
    crashed: AtomicBool,
    crash_at: AtomicU64,
}

/// Controls the faults of a [`FaultyBackend`] after it was handed to a
/// graph.
#[derive(Debug, Clone)]
pub struct FaultHandle {
    state: Arc<FaultState>,
}

impl FaultHandle {
    /// Makes every append, flush and replace fail.
    pub fn fail_writes(&self) {
        self.state.fail_writes.store(true, Ordering::SeqCst);
    }

    /// Clears injected failures, including a simulated crash.
    pub fn heal(&self) {
        self.state.fail_writes.store(false, Ordering::SeqCst);
        self.state.crashed.store(false, Ordering::SeqCst);
        self.state.crash_at.store(u64::MAX, Ordering::SeqCst);
    }

    /// Simulates a crash once the log reaches `size` bytes: the append that
    /// crosses it is cut short and the backend stops accepting writes, even
    /// truncation.
    pub fn crash_at(&self, size: u64) {
        self.state.crash_at.store(size, Ordering::SeqCst);
    }

    /// Whether a simulated crash happened.
    pub fn has_crashed(&self) -> bool {
        self.state.crashed.load(Ordering::SeqCst)
    }

    /// The bytes written so far, torn tail included.
    pub fn contents(&self) -> Vec<u8> {
        self.state.data.lock().clone()
    }

    /// Current log size.
    pub fn size(&self) -> u64 {
        self.state.data.lock().len() as u64
    }
}

/// An in-memory [`StorageBackend`] with injectable write failures.
#[derive(Debug)]
pub struct FaultyBackend {
    state: Arc<FaultState>,
}

impl FaultyBackend {
    /// An empty backend and its fault handle.
    pub fn empty() -> (Self, FaultHandle) {
        Self::with_data(Vec::new())
    }

    /// A backend preloaded with `data`, e.g. the contents of a crashed one.
    pub fn with_data(data: Vec<u8>) -> (Self, FaultHandle) {
        let state = Arc::new(FaultState {
            data: Mutex::new(data),
            fail_writes: AtomicBool::new(false),
            crashed: AtomicBool::new(false),
            crash_at: AtomicU64::new(u64::MAX),
        });
        (
            Self {
                state: Arc::clone(&state),
            },
            FaultHandle { state },
        )
    }

    fn check_writable(&self, op: &str) -> StorageResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(format!("simulated crash before {op}")));
        }
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }
}

impl StorageBackend for FaultyBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let data = self.state.data.lock();
        let size = data.len() as u64;
        let end = offset.checked_add(len as u64).filter(|end| *end <= size);
        match end {
            Some(end) => Ok(data[offset as usize..end as usize].to_vec()),
            None => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        self.check_writable("append")?;
        let mut data = self.state.data.lock();
        let offset = data.len() as u64;
        let crash_at = self.state.crash_at.load(Ordering::SeqCst);
        if offset + bytes.len() as u64 > crash_at {
            let partial = crash_at.saturating_sub(offset) as usize;
            data.extend_from_slice(&bytes[..partial.min(bytes.len())]);
            self.state.crashed.store(true, Ordering::SeqCst);
            return Err(StorageError::unavailable("simulated crash during append"));
        }
        data.extend_from_slice(bytes);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.check_writable("flush")
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.check_writable("sync")
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.state.data.lock().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if self.state.crashed.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable("simulated crash before truncate"));
        }
        let mut data = self.state.data.lock();
        let size = data.len() as u64;
        if new_size > size {
            return Err(StorageError::InvalidTruncate {
                requested: new_size,
                size,
            });
        }
        data.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, bytes: &[u8]) -> StorageResult<()> {
        self.check_writable("replace")?;
        *self.state.data.lock() = bytes.to_vec();
        Ok(())
    }
}
