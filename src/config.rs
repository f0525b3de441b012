//! EMBERKV - Engine Configuration
//! Defines tunable parameters for the storage engine.

use std::path::PathBuf;

use crate::error::{EmberError, Result};

/// Configuration for the Ember storage engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base directory for all data files (WAL segments, snapshot).
    pub data_dir: PathBuf,

    /// Bytes of WAL growth since the last snapshot before a new
    /// snapshot is forced. Bounds recovery replay time.
    pub snapshot_threshold: u64,

    /// Whether to fsync the WAL on every append. Disabling trades
    /// durability of the most recent writes for throughput.
    pub sync_on_write: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            snapshot_threshold: 4 * 1024 * 1024, // 4 MB
            sync_on_write: true,
        }
    }
}

impl Config {
    /// Create a new Config with a custom data directory.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Set the WAL growth threshold that triggers a snapshot.
    pub fn with_snapshot_threshold(mut self, bytes: u64) -> Self {
        self.snapshot_threshold = bytes;
        self
    }

    /// Control whether every append is fsynced before it is acknowledged.
    pub fn with_sync_on_write(mut self, sync: bool) -> Self {
        self.sync_on_write = sync;
        self
    }

    /// Validate tunables before the engine opens.
    pub fn validate(&self) -> Result<()> {
        if self.snapshot_threshold == 0 {
            return Err(EmberError::Config(
                "snapshot_threshold must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Ensure the data directory exists.
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let config = Config::default().with_snapshot_threshold(0);
        assert!(config.validate().is_err());
    }
}
