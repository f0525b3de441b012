//! EMBERKV - Engine Metrics & Observability
//! Atomic counters for tracking engine operations in a lock-free,
//! thread-safe manner using `AtomicU64`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Atomic operation counters for the Ember engine.
///
/// All counters use `Ordering::Relaxed` since we only need eventual
/// consistency for observability, not synchronization.
#[derive(Debug)]
pub struct EngineMetrics {
    /// Total number of `set` operations.
    pub sets: AtomicU64,
    /// Total number of `get` operations.
    pub gets: AtomicU64,
    /// Total number of `delete` operations.
    pub deletes: AtomicU64,
    /// Total number of snapshots published.
    pub snapshots: AtomicU64,
    /// Total bytes appended to the WAL.
    pub bytes_written: AtomicU64,
    /// Total bytes read (values returned by get).
    pub bytes_read: AtomicU64,
    /// WAL records replayed during the last recovery.
    pub recovered_records: AtomicU64,
    /// Timestamp when the engine was opened.
    engine_started: Instant,
}

impl EngineMetrics {
    /// Create a new metrics instance with all counters at zero.
    pub fn new() -> Self {
        Self {
            sets: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            snapshots: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            bytes_read: AtomicU64::new(0),
            recovered_records: AtomicU64::new(0),
            engine_started: Instant::now(),
        }
    }

    /// Record a set operation and its WAL footprint.
    pub fn record_set(&self, wal_bytes: u64) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(wal_bytes, Ordering::Relaxed);
    }

    /// Record a get operation.
    pub fn record_get(&self, value_size: Option<usize>) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        if let Some(size) = value_size {
            self.bytes_read.fetch_add(size as u64, Ordering::Relaxed);
        }
    }

    /// Record a delete operation and its WAL footprint.
    pub fn record_delete(&self, wal_bytes: u64) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(wal_bytes, Ordering::Relaxed);
    }

    /// Record a published snapshot.
    pub fn record_snapshot(&self) {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how many WAL records recovery replayed.
    pub fn record_recovery(&self, replayed: u64) {
        self.recovered_records.store(replayed, Ordering::Relaxed);
    }

    /// Get engine uptime in seconds.
    pub fn uptime_secs(&self) -> f64 {
        self.engine_started.elapsed().as_secs_f64()
    }

    /// Get total number of operations (sets + gets + deletes).
    pub fn total_ops(&self) -> u64 {
        self.sets.load(Ordering::Relaxed)
            + self.gets.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
    }

    /// Get operations per second since engine start.
    pub fn ops_per_sec(&self) -> f64 {
        let uptime = self.uptime_secs();
        if uptime < 0.001 {
            return 0.0;
        }
        self.total_ops() as f64 / uptime
    }

    /// Format metrics as a human-readable report.
    pub fn report(&self) -> String {
        format!(
            "\n═══ EMBERKV Engine Metrics ═══\n\
             Operations:\n\
               sets:      {}\n\
               gets:      {}\n\
               deletes:   {}\n\
               snapshots: {}\n\
             Throughput:\n\
               total ops: {}\n\
               ops/sec:   {:.2}\n\
             I/O:\n\
               written:   {} bytes\n\
               read:      {} bytes\n\
             Recovery:\n\
               replayed records: {}\n\
             Uptime: {:.2}s",
            self.sets.load(Ordering::Relaxed),
            self.gets.load(Ordering::Relaxed),
            self.deletes.load(Ordering::Relaxed),
            self.snapshots.load(Ordering::Relaxed),
            self.total_ops(),
            self.ops_per_sec(),
            self.bytes_written.load(Ordering::Relaxed),
            self.bytes_read.load(Ordering::Relaxed),
            self.recovered_records.load(Ordering::Relaxed),
            self.uptime_secs(),
        )
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
