use std::path::{Path, PathBuf};

use fjall::{Config, PartitionCreateOptions};

/// Keyspace settings for a [`crate::FjallSnapshotProvider`].
#[derive(Debug, Clone)]
pub struct FjallImageConfig {
    path: PathBuf,
    cache_size: u64,
    max_write_buffer_size: u64,
    fsync_ms: Option<u16>,
}

impl FjallImageConfig {
    /// Defaults: 16 MB block cache, 64 MB write buffer, no periodic fsync
    /// (every image write is persisted with `SyncAll` anyway).
    pub fn new(path: impl AsRef<Path>) -> Self {
        FjallImageConfig {
            path: path.as_ref().to_path_buf(),
            cache_size: 16 * 1024 * 1024,
            max_write_buffer_size: 64 * 1024 * 1024,
            fsync_ms: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cache_size(mut self, bytes: u64) -> Self {
        self.cache_size = bytes;
        self
    }

    pub fn max_write_buffer_size(mut self, bytes: u64) -> Self {
        self.max_write_buffer_size = bytes;
        self
    }

    pub fn fsync_ms(mut self, interval: Option<u16>) -> Self {
        self.fsync_ms = interval;
        self
    }

    pub(crate) fn keyspace_config(&self) -> Config {
        Config::new(&self.path)
            .cache_size(self.cache_size)
            .max_write_buffer_size(self.max_write_buffer_size)
            .fsync_ms(self.fsync_ms)
    }

    pub(crate) fn partition_config(&self) -> PartitionCreateOptions {
        PartitionCreateOptions::default()
    }
}
