//! EMBERKV - Core Type Definitions
//! Defines fundamental types used across the storage engine.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Key type for the storage engine.
/// Using Vec<u8> allows arbitrary binary keys.
pub type Key = Vec<u8>;

/// Value type for the storage engine.
/// Using Vec<u8> allows arbitrary binary values.
pub type Value = Vec<u8>;

/// A single mutation as it appears in the WAL and in snapshots.
/// A `None` value indicates a tombstone (deletion marker); tombstones
/// never carry a value. `expires_at` is Unix epoch milliseconds,
/// `None` means the entry never expires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Key,
    pub value: Option<Value>,
    pub expires_at: Option<u64>,
}

impl Entry {
    /// Create a new entry with a value and no expiration (SET operation).
    pub fn put(key: Key, value: Value) -> Self {
        Self {
            key,
            value: Some(value),
            expires_at: None,
        }
    }

    /// Create a new entry that expires at an absolute timestamp.
    pub fn put_with_expiry(key: Key, value: Value, expires_at: u64) -> Self {
        Self {
            key,
            value: Some(value),
            expires_at: Some(expires_at),
        }
    }

    /// Create a tombstone entry (DELETE operation).
    pub fn tombstone(key: Key) -> Self {
        Self {
            key,
            value: None,
            expires_at: None,
        }
    }

    /// Returns true if this entry is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Returns true if this entry's expiration has passed.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        expired_at(self.expires_at, now_ms)
    }
}

/// The single expiry predicate shared by the read path, the background
/// sweep and the snapshot view. `None` never expires.
pub fn expired_at(expires_at: Option<u64>, now_ms: u64) -> bool {
    match expires_at {
        Some(expires_at) => now_ms >= expires_at,
        None => false,
    }
}

/// One durably logged mutation. Sequences start at 1, are strictly
/// increasing within a segment and contiguous across segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub sequence: u64,
    pub entry: Entry,
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
