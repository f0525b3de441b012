//! EMBERKV - In-Memory Index
//! The authoritative live table: key -> value plus expiration metadata.
//!
//! The index is pure memory state. Callers (the engine) must have
//! durably logged the corresponding WAL record before mutating it.
//! Expiration is lazy: reads treat expired entries as absent, and the
//! engine purges them opportunistically or via `purge_expired`.

use std::collections::BTreeMap;

use crate::types::{now_ms, Entry, Key, Value};

/// A live (non-tombstone) entry as stored in the index. Replaced as a
/// whole on overwrite so readers never observe a half-applied entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveEntry {
    pub value: Value,
    pub expires_at: Option<u64>,
}

impl LiveEntry {
    /// Delegates to the crate-wide expiry predicate so the read path,
    /// the sweep and the snapshot view can never disagree about time.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        crate::types::expired_at(self.expires_at, now_ms)
    }
}

/// In-memory key-value table backed by a BTreeMap.
/// Tombstones are not stored: deletion removes the key outright, since
/// the WAL and snapshots carry the deletion history.
#[derive(Debug)]
pub struct Index {
    entries: BTreeMap<Key, LiveEntry>,
    size_bytes: usize,
}

impl Index {
    /// Create a new, empty index.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            size_bytes: 0,
        }
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Approximate size of keys and values in bytes.
    pub fn size(&self) -> usize {
        self.size_bytes
    }

    /// Look up a key. Returns `None` if absent or expired; an expired
    /// entry is left in place for the purge paths.
    pub fn get(&self, key: &[u8]) -> Option<&LiveEntry> {
        let entry = self.entries.get(key)?;
        if entry.is_expired_at(now_ms()) {
            return None;
        }
        Some(entry)
    }

    /// Insert or replace a key. Pure in-memory mutation.
    pub fn put(&mut self, key: Key, value: Value, expires_at: Option<u64>) {
        if let Some(old) = self.entries.get(&key) {
            self.size_bytes = self.size_bytes.saturating_sub(key.len() + old.value.len());
        }
        self.size_bytes += key.len() + value.len();
        self.entries.insert(key, LiveEntry { value, expires_at });
    }

    /// Remove a key. Returns true if it was present.
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.entries.remove(key) {
            Some(old) => {
                self.size_bytes = self.size_bytes.saturating_sub(key.len() + old.value.len());
                true
            }
            None => false,
        }
    }

    /// Remove a key only if it is present and expired. Used by the
    /// engine's read path for opportunistic cleanup.
    pub fn remove_expired(&mut self, key: &[u8]) -> bool {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now_ms()),
            None => false,
        };
        if expired {
            self.delete(key);
        }
        expired
    }

    /// Sweep the whole table, dropping expired entries.
    /// Returns the number of entries purged.
    pub fn purge_expired(&mut self) -> usize {
        let now = now_ms();
        let expired: Vec<Key> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        let count = expired.len();
        for key in expired {
            self.delete(&key);
        }
        count
    }

    /// Consistent point-in-time copy for the snapshot store.
    /// Excludes expired entries; tombstones are never stored here.
    pub fn snapshot_view(&self) -> Vec<Entry> {
        let now = now_ms();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| Entry {
                key: key.clone(),
                value: Some(entry.value.clone()),
                expires_at: entry.expires_at,
            })
            .collect()
    }

    /// All live key-value pairs in key order.
    pub fn scan(&self) -> Vec<(Key, Value)> {
        let now = now_ms();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_get() {
        let mut index = Index::new();
        index.put(b"key1".to_vec(), b"value1".to_vec(), None);
        assert_eq!(index.get(b"key1").unwrap().value, b"value1".to_vec());
    }

    #[test]
    fn test_get_nonexistent() {
        let index = Index::new();
        assert!(index.get(b"missing").is_none());
    }

    #[test]
    fn test_overwrite() {
        let mut index = Index::new();
        index.put(b"key".to_vec(), b"old".to_vec(), None);
        index.put(b"key".to_vec(), b"new".to_vec(), None);
        assert_eq!(index.get(b"key").unwrap().value, b"new".to_vec());
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_delete_removes_key() {
        let mut index = Index::new();
        index.put(b"key".to_vec(), b"value".to_vec(), None);
        assert!(index.delete(b"key"));
        assert!(index.get(b"key").is_none());
        assert!(!index.delete(b"key"));
    }

    #[test]
    fn test_expired_entry_reads_as_absent() {
        let mut index = Index::new();
        index.put(b"key".to_vec(), b"value".to_vec(), Some(1));
        assert!(index.get(b"key").is_none());
        // Still physically present until purged.
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_expired_only_touches_expired() {
        let mut index = Index::new();
        index.put(b"old".to_vec(), b"v".to_vec(), Some(1));
        index.put(b"fresh".to_vec(), b"v".to_vec(), None);

        assert!(index.remove_expired(b"old"));
        assert!(!index.remove_expired(b"fresh"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_purge_expired() {
        let mut index = Index::new();
        index.put(b"old1".to_vec(), b"v".to_vec(), Some(1));
        index.put(b"old2".to_vec(), b"v".to_vec(), Some(1));
        index.put(b"fresh".to_vec(), b"v".to_vec(), Some(now_ms() + 60_000));

        assert_eq!(index.purge_expired(), 2);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_snapshot_view_excludes_expired() {
        let mut index = Index::new();
        index.put(b"live".to_vec(), b"v".to_vec(), None);
        index.put(b"dead".to_vec(), b"v".to_vec(), Some(1));

        let view = index.snapshot_view();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].key, b"live".to_vec());
        assert!(!view[0].is_tombstone());
    }

    #[test]
    fn test_size_tracking() {
        let mut index = Index::new();
        assert_eq!(index.size(), 0);
        index.put(b"abc".to_vec(), b"12345".to_vec(), None); // 3 + 5 = 8
        assert_eq!(index.size(), 8);
        index.delete(b"abc");
        assert_eq!(index.size(), 0);
    }

    #[test]
    fn test_scan_sorted_order() {
        let mut index = Index::new();
        index.put(b"charlie".to_vec(), b"3".to_vec(), None);
        index.put(b"alpha".to_vec(), b"1".to_vec(), None);
        index.put(b"bravo".to_vec(), b"2".to_vec(), None);

        let entries = index.scan();
        assert_eq!(entries[0].0, b"alpha");
        assert_eq!(entries[1].0, b"bravo");
        assert_eq!(entries[2].0, b"charlie");
    }
}
