//! Graph database configuration.

/// Configuration for opening a graph database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether to create the graph directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to flush the commit log on every commit.
    pub sync_on_commit: bool,

    /// Whether to write an index snapshot when the database is closed.
    pub persist_index: bool,

    /// Whether to rebuild every index on open even when the marker is clean.
    pub verify_index_on_open: bool,

    /// Log size that triggers an automatic compaction (0 = never).
    pub max_log_size: u64,

    /// Keys visited by a scan between two cancellation checks.
    pub cancellation_check_interval: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_commit: true,
            persist_index: true,
            verify_index_on_open: false,
            max_log_size: 64 * 1024 * 1024, // 64 MB
            cancellation_check_interval: 64,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the graph directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to flush the log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets whether to persist an index snapshot on close.
    #[must_use]
    pub const fn persist_index(mut self, value: bool) -> Self {
        self.persist_index = value;
        self
    }

    /// Sets whether to force a full re-index on open.
    #[must_use]
    pub const fn verify_index_on_open(mut self, value: bool) -> Self {
        self.verify_index_on_open = value;
        self
    }

    /// Sets the automatic compaction threshold.
    #[must_use]
    pub const fn max_log_size(mut self, size: u64) -> Self {
        self.max_log_size = size;
        self
    }

    /// Sets how many keys a scan visits between cancellation checks.
    #[must_use]
    pub const fn cancellation_check_interval(mut self, keys: usize) -> Self {
        self.cancellation_check_interval = if keys == 0 { 1 } else { keys };
        self
    }
}
