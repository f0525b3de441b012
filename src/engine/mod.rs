//! EMBERKV - Storage Engine Module
//! Top-level module composing the codec, WAL, snapshot store, index and
//! recovery coordinator into a durable key-value engine.

pub mod codec;
pub mod concurrent;
pub mod index;
pub mod metrics;
pub mod recovery;
pub mod snapshot;
pub mod wal;

use crate::config::Config;
use crate::error::Result;
use crate::types::{now_ms, Entry, Key, Value};

use self::index::Index;
use self::metrics::EngineMetrics;
use self::snapshot::SnapshotStore;
use self::wal::WriteAheadLog;

/// The core Ember storage engine.
///
/// Writes take the write-ahead path: encoded, appended and fsynced to
/// the WAL, then applied to the in-memory index, then acknowledged.
/// Reads are served from the index. Once WAL growth since the last
/// snapshot crosses the configured threshold, the engine dumps the
/// index, rotates the WAL and drops segments the snapshot covers.
#[derive(Debug)]
pub struct Ember {
    index: Index,
    wal: WriteAheadLog,
    snapshots: SnapshotStore,
    config: Config,
    metrics: EngineMetrics,
    /// Highest durably appended sequence number.
    last_sequence: u64,
    /// WAL bytes appended since the last published snapshot.
    bytes_since_snapshot: u64,
    /// True when mutations exist that no snapshot covers yet.
    dirty: bool,
}

impl Ember {
    /// Open or create an Ember storage engine at the configured path.
    /// Runs crash recovery before accepting any operation.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        config.ensure_dirs()?;

        let snapshots = SnapshotStore::new(&config.data_dir);
        let wal = WriteAheadLog::open(&config.data_dir, config.sync_on_write)?;
        let (index, report) = recovery::recover(&snapshots, &wal)?;

        let metrics = EngineMetrics::new();
        metrics.record_recovery(report.replayed);

        log::info!(
            "Ember engine opened at {:?} ({} entries, last sequence {})",
            config.data_dir,
            index.len(),
            report.last_sequence
        );

        // Replayed-but-unsnapshotted records count toward the trigger.
        let bytes_since_snapshot = wal.active_size();

        Ok(Self {
            index,
            wal,
            snapshots,
            config,
            metrics,
            last_sequence: report.last_sequence,
            bytes_since_snapshot,
            dirty: report.replayed > 0,
        })
    }

    /// The write-ahead discipline in one place: append durably, then
    /// apply to the index, then update snapshot accounting. No caller
    /// can reorder the two steps. Returns the assigned sequence and the
    /// record's WAL footprint in bytes.
    fn append_and_apply(&mut self, entry: Entry) -> Result<(u64, u64)> {
        let (sequence, encoded_len) = self.wal.append(&entry)?;

        match entry.value {
            Some(value) => self.index.put(entry.key, value, entry.expires_at),
            None => {
                self.index.delete(&entry.key);
            }
        }

        self.last_sequence = sequence;
        self.bytes_since_snapshot += encoded_len;
        self.dirty = true;
        Ok((sequence, encoded_len))
    }

    /// Durably apply a SET without running the snapshot policy. The
    /// concurrent wrapper drives the policy itself, outside its write
    /// lock.
    pub(crate) fn apply_set(&mut self, key: Key, value: Value) -> Result<()> {
        let (_, len) = self.append_and_apply(Entry::put(key, value))?;
        self.metrics.record_set(len);
        Ok(())
    }

    pub(crate) fn apply_set_with_ttl(&mut self, key: Key, value: Value, ttl_ms: u64) -> Result<()> {
        let entry = Entry::put_with_expiry(key, value, now_ms() + ttl_ms);
        let (_, len) = self.append_and_apply(entry)?;
        self.metrics.record_set(len);
        Ok(())
    }

    pub(crate) fn apply_delete(&mut self, key: Key) -> Result<()> {
        let (_, len) = self.append_and_apply(Entry::tombstone(key))?;
        self.metrics.record_delete(len);
        Ok(())
    }

    /// Store a key-value pair. Returns once the write is durable and
    /// visible.
    pub fn set(&mut self, key: Key, value: Value) -> Result<()> {
        self.apply_set(key, value)?;
        self.maybe_snapshot();
        Ok(())
    }

    /// Store a key-value pair that expires `ttl_ms` milliseconds from now.
    pub fn set_with_ttl(&mut self, key: Key, value: Value, ttl_ms: u64) -> Result<()> {
        self.apply_set_with_ttl(key, value, ttl_ms)?;
        self.maybe_snapshot();
        Ok(())
    }

    /// Delete a key by logging a tombstone. Idempotent: deleting a
    /// missing key still logs, so replay converges to the same state.
    pub fn delete(&mut self, key: Key) -> Result<()> {
        self.apply_delete(key)?;
        self.maybe_snapshot();
        Ok(())
    }

    /// Run the threshold policy after a mutation. A snapshot failure is
    /// logged, never surfaced through the mutation's result: the write
    /// that tripped the threshold is already durable and applied, and
    /// the untouched counters make the next write retry.
    fn maybe_snapshot(&mut self) {
        if self.wants_snapshot() {
            if let Err(err) = self.snapshot() {
                log::error!("threshold snapshot failed, retrying after next write: {}", err);
            }
        }
    }

    /// True once WAL growth since the last snapshot crosses the
    /// configured threshold.
    pub(crate) fn wants_snapshot(&self) -> bool {
        self.bytes_since_snapshot >= self.config.snapshot_threshold
    }

    /// Get a value by key. Expired entries read as absent and are
    /// opportunistically removed from the index.
    pub fn get(&mut self, key: &[u8]) -> Option<Value> {
        let value = self.fetch(key);
        self.metrics.record_get(value.as_ref().map(|v| v.len()));
        value
    }

    /// Lookup plus opportunistic purge, with no metrics side effect.
    /// The concurrent wrapper calls this after a counted `peek` miss so
    /// one logical lookup is recorded exactly once.
    pub(crate) fn fetch(&mut self, key: &[u8]) -> Option<Value> {
        match self.index.get(key) {
            Some(entry) => Some(entry.value.clone()),
            None => {
                // Lazy expiration: drop the entry now that a read saw it dead.
                self.index.remove_expired(key);
                None
            }
        }
    }

    /// Non-mutating lookup used where only shared access is held
    /// (e.g. concurrent readers). Leaves expired entries for the sweep.
    pub fn peek(&self, key: &[u8]) -> Option<Value> {
        let value = self.index.get(key).map(|entry| entry.value.clone());
        self.metrics.record_get(value.as_ref().map(|v| v.len()));
        value
    }

    /// Remaining TTL for a key in milliseconds. `None` if the key is
    /// absent, expired, or has no expiration.
    pub fn ttl(&self, key: &[u8]) -> Option<u64> {
        let entry = self.index.get(key)?;
        let expires_at = entry.expires_at?;
        Some(expires_at.saturating_sub(now_ms()))
    }

    /// All live key-value pairs in key order.
    pub fn scan(&self) -> Vec<(Key, Value)> {
        self.index.scan()
    }

    /// Sweep expired entries out of the index. Optional: reads already
    /// treat them as absent; this bounds memory held by abandoned keys.
    pub fn purge_expired(&mut self) -> usize {
        let purged = self.index.purge_expired();
        if purged > 0 {
            log::info!("purged {} expired entries", purged);
        }
        purged
    }

    /// Publish a snapshot now, rotate the WAL, and delete segments the
    /// snapshot covers. Called automatically by the threshold policy.
    pub fn snapshot(&mut self) -> Result<()> {
        let watermark = self.last_sequence;
        let view = self.index.snapshot_view();
        self.snapshots.write(watermark, &view)?;
        self.finish_snapshot(watermark)
    }

    /// Highest durably appended sequence number.
    pub(crate) fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Handle on the snapshot store, usable without borrowing the
    /// engine (it only carries the data directory).
    pub(crate) fn snapshot_store(&self) -> SnapshotStore {
        self.snapshots.clone()
    }

    /// Point-in-time copy of the live entries for the snapshot body.
    pub(crate) fn snapshot_view(&self) -> Vec<Entry> {
        self.index.snapshot_view()
    }

    /// Bookkeeping after a snapshot was published at `watermark`:
    /// rotate the WAL, retire covered segments, reset the threshold
    /// counter. Writes that landed after the view was taken stay
    /// replayable in the sealed segment and keep the engine dirty.
    pub(crate) fn finish_snapshot(&mut self, watermark: u64) -> Result<()> {
        self.wal.rotate()?;
        self.wal.remove_segments_below(watermark)?;
        self.bytes_since_snapshot = 0;
        self.dirty = self.last_sequence > watermark;
        self.metrics.record_snapshot();
        Ok(())
    }

    /// Number of entries in the index (including not-yet-purged expired
    /// ones).
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the engine holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Approximate index size in bytes.
    pub fn index_size(&self) -> usize {
        self.index.size()
    }

    /// Access engine operation counters.
    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Shut the engine down: publish a final snapshot if there are
    /// mutations no snapshot covers, then flush and release the WAL.
    /// File handles are released on every exit path when the engine is
    /// dropped; `close` additionally guarantees the snapshot and sync.
    pub fn close(mut self) -> Result<()> {
        if self.dirty {
            self.snapshot()?;
        }
        self.wal.sync()?;
        log::info!("Ember engine closed");
        Ok(())
    }
}
