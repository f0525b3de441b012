//! EMBERKV - Snapshot Store
//! Periodic full-state dump of the index, used to bound WAL replay time.
//!
//! ## On-Disk Format
//! A bincode-serialized [`Snapshot`] followed by a 4-byte CRC32 of the
//! body. The file is staged under a temporary name, fsynced, and then
//! atomically renamed over the published name, so a reader can never
//! observe a half-written snapshot.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EmberError, Result};
use crate::types::Entry;

const SNAPSHOT_FILE: &str = "index.snap";
const SNAPSHOT_TMP: &str = "index.snap.tmp";

/// A fully published point of recovery. `watermark` is the highest
/// sequence number the entry set reflects; WAL replay resumes after it.
/// Tombstones and expired entries are omitted by the index's view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub watermark: u64,
    pub entries: Vec<Entry>,
}

/// Writes and loads snapshots in a data directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    fn published_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    /// Serialize the entry set and atomically publish it.
    /// Only returns `Ok` once the snapshot is durable on disk.
    pub fn write(&self, watermark: u64, entries: &[Entry]) -> Result<()> {
        let snapshot = Snapshot {
            watermark,
            entries: entries.to_vec(),
        };
        let mut body = bincode::serialize(&snapshot)
            .map_err(|e| EmberError::Serialization(e.to_string()))?;
        let crc = crc32fast::hash(&body);
        body.extend_from_slice(&crc.to_le_bytes());

        let tmp_path = self.dir.join(SNAPSHOT_TMP);
        let mut tmp = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(&body)?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, self.published_path())?;
        // Make the rename itself durable.
        File::open(&self.dir)?.sync_all()?;

        log::info!(
            "published snapshot at watermark {} ({} entries)",
            watermark,
            snapshot.entries.len()
        );
        Ok(())
    }

    /// Load the most recent fully published snapshot.
    ///
    /// Returns `None` on first run (no snapshot yet) and also when the
    /// file is unreadable or damaged: the WAL alone can rebuild state
    /// from the beginning, so a bad snapshot is a warning, not a fault.
    pub fn load_latest(&self) -> Result<Option<Snapshot>> {
        let path = self.published_path();
        let body = match fs::read(&path) {
            Ok(body) => body,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                log::warn!("snapshot {:?} unreadable, ignoring: {}", path, err);
                return Ok(None);
            }
        };

        if body.len() < 4 {
            log::warn!("snapshot {:?} too short, ignoring", path);
            return Ok(None);
        }
        let (payload, crc_bytes) = body.split_at(body.len() - 4);
        let stored_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap_or_default());
        if crc32fast::hash(payload) != stored_crc {
            log::warn!("snapshot {:?} failed checksum, ignoring", path);
            return Ok(None);
        }

        match bincode::deserialize::<Snapshot>(payload) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(err) => {
                log::warn!("snapshot {:?} undecodable, ignoring: {}", path, err);
                Ok(None)
            }
        }
    }
}
