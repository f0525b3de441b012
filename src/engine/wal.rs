//! EMBERKV - Write-Ahead Log (WAL)
//! Provides durability by logging every mutation to disk before it is
//! applied to the in-memory index.
//!
//! The log is a sequence of segment files named `{base:020}.wal`, where
//! `base` is the sequence number of the first record the segment holds.
//! Lexical order therefore equals sequence order, and the recovery path
//! can enumerate segments oldest-first. The highest-base segment is the
//! only one appended to; older segments are sealed.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::engine::codec::{self, DecodeOutcome};
use crate::error::{EmberError, Result};
use crate::types::{Entry, LogRecord};

const SEGMENT_SUFFIX: &str = ".wal";

fn segment_file_name(base: u64) -> String {
    format!("{:020}{}", base, SEGMENT_SUFFIX)
}

/// Enumerate `*.wal` files in `dir`, sorted by base sequence.
fn list_segments(dir: &Path) -> Result<Vec<(u64, PathBuf)>> {
    let mut segments = Vec::new();
    for dirent in fs::read_dir(dir)? {
        let path = dirent?.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        if let Some(stem) = name.strip_suffix(SEGMENT_SUFFIX) {
            match stem.parse::<u64>() {
                Ok(base) => segments.push((base, path)),
                Err(_) => log::warn!("ignoring unrecognized WAL file {:?}", path),
            }
        }
    }
    segments.sort_by_key(|(base, _)| *base);
    Ok(segments)
}

/// Segmented write-ahead log.
///
/// Appends are serialized by `&mut self`: sequence numbers are assigned
/// and written under the same exclusive access, which makes `append` the
/// linearization point for all mutations.
#[derive(Debug)]
pub struct WriteAheadLog {
    dir: PathBuf,
    active: File,
    active_base: u64,
    active_size: u64,
    next_sequence: u64,
    sync_on_write: bool,
}

impl WriteAheadLog {
    /// Open the WAL in `dir`, creating the first segment if none exist.
    ///
    /// The tail of the most recent segment is scanned on open: a torn
    /// trailing record (crash mid-append) is truncated away so that new
    /// appends can never land after garbage, and the sequence counter
    /// resumes right after the last intact record.
    pub fn open(dir: &Path, sync_on_write: bool) -> Result<Self> {
        let segments = list_segments(dir)?;

        let (active_base, active_path, active_size, next_sequence) = match segments.last() {
            None => {
                let base = 1;
                (base, dir.join(segment_file_name(base)), 0, base)
            }
            Some((base, path)) => {
                let (next_sequence, valid_len) = Self::scan_tail(path, *base)?;
                let file_len = fs::metadata(path)?.len();
                if valid_len < file_len {
                    log::warn!(
                        "truncating torn tail of {:?}: {} -> {} bytes",
                        path,
                        file_len,
                        valid_len
                    );
                    let file = OpenOptions::new().write(true).open(path)?;
                    file.set_len(valid_len)?;
                    file.sync_all()?;
                }
                (*base, path.clone(), valid_len, next_sequence)
            }
        };

        let active = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&active_path)?;

        Ok(Self {
            dir: dir.to_path_buf(),
            active,
            active_base,
            active_size,
            next_sequence,
            sync_on_write,
        })
    }

    /// Walk the records of the newest segment.
    ///
    /// Returns the next sequence number to assign and the byte offset of
    /// the last intact record boundary. Damage that is not confined to
    /// the trailing record is mid-log corruption and fatal.
    fn scan_tail(path: &Path, base: u64) -> Result<(u64, u64)> {
        let buf = fs::read(path)?;
        let mut offset = 0usize;
        let mut last_sequence = None;

        while offset < buf.len() {
            match codec::decode_record(&buf[offset..]) {
                DecodeOutcome::Record { record, consumed } => {
                    if let Some(last) = last_sequence {
                        if record.sequence != last + 1 {
                            return Err(EmberError::LogCorruption(format!(
                                "non-contiguous sequence in {:?}: {} after {}",
                                path, record.sequence, last
                            )));
                        }
                    }
                    last_sequence = Some(record.sequence);
                    offset += consumed;
                }
                // Declared extent runs past EOF: torn write, stop here.
                DecodeOutcome::Incomplete => break,
                DecodeOutcome::Corrupt { consumed, reason } => {
                    if offset + consumed == buf.len() {
                        // Damaged final record, same shape as a torn write.
                        break;
                    }
                    return Err(EmberError::LogCorruption(format!("{:?}: {}", path, reason)));
                }
            }
        }

        let next_sequence = last_sequence.map(|seq| seq + 1).unwrap_or(base);
        Ok((next_sequence, offset as u64))
    }

    /// Append an entry and force it to stable storage.
    ///
    /// Returns the assigned sequence number and the encoded length. If
    /// this returns `Ok`, the record survives any subsequent crash; if it
    /// fails, the caller must not apply the mutation to the index.
    pub fn append(&mut self, entry: &Entry) -> Result<(u64, u64)> {
        let sequence = self.next_sequence;
        let encoded = codec::encode_record(sequence, entry);
        self.active.write_all(&encoded)?;
        if self.sync_on_write {
            self.active.sync_all()?;
        }
        self.next_sequence += 1;
        self.active_size += encoded.len() as u64;
        Ok((sequence, encoded.len() as u64))
    }

    /// The sequence number the next append will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Bytes currently held by the active segment.
    pub fn active_size(&self) -> u64 {
        self.active_size
    }

    /// Flush any buffered log data to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.active.sync_all()?;
        Ok(())
    }

    /// Seal the active segment and start a new one based at the next
    /// sequence number, keeping the global sequence range contiguous.
    /// Called after a snapshot to bound future replay cost.
    pub fn rotate(&mut self) -> Result<u64> {
        self.active.sync_all()?;
        let base = self.next_sequence;
        let path = self.dir.join(segment_file_name(base));
        self.active = OpenOptions::new().create(true).append(true).open(&path)?;
        self.active_base = base;
        self.active_size = 0;
        log::info!("rotated WAL, new segment base {}", base);
        Ok(base)
    }

    /// Delete sealed segments whose entire sequence range is covered by
    /// a durable snapshot at `watermark`. The active segment is never
    /// removed. Returns the number of segments deleted.
    pub fn remove_segments_below(&mut self, watermark: u64) -> Result<usize> {
        let segments = list_segments(&self.dir)?;
        let mut removed = 0;
        for (idx, (base, path)) in segments.iter().enumerate() {
            if *base == self.active_base {
                continue;
            }
            // All records of segment i are below the base of segment i+1.
            let covered = match segments.get(idx + 1) {
                Some((next_base, _)) => *next_base <= watermark + 1,
                None => false,
            };
            if covered {
                fs::remove_file(path)?;
                removed += 1;
                log::info!("removed WAL segment {:?} (base {})", path, base);
            }
        }
        Ok(removed)
    }

    /// Lazily replay records with sequence numbers greater than
    /// `from_sequence`, oldest first.
    ///
    /// A torn record at the tail of the final segment ends the iteration
    /// without error; any other decode failure yields
    /// [`EmberError::LogCorruption`]. Sequence contiguity is enforced
    /// across the whole replay, so a missing or gutted middle segment
    /// cannot silently drop acknowledged writes.
    pub fn replay(&self, from_sequence: u64) -> Result<Replay> {
        let mut segments = list_segments(&self.dir)?;
        // A segment is skippable when its successor's base proves every
        // record in it has sequence <= from_sequence.
        while segments.len() > 1 {
            let next_base = segments[1].0;
            if next_base <= from_sequence + 1 {
                segments.remove(0);
            } else {
                break;
            }
        }
        Ok(Replay {
            pending: segments,
            cursor: None,
            from_sequence,
            expected: None,
            fatal: false,
        })
    }
}

struct SegmentCursor {
    path: PathBuf,
    buf: Vec<u8>,
    offset: usize,
    is_last: bool,
}

/// Iterator over WAL records in ascending sequence order.
/// Segments are loaded one at a time as iteration reaches them.
pub struct Replay {
    pending: Vec<(u64, PathBuf)>,
    cursor: Option<SegmentCursor>,
    from_sequence: u64,
    /// Next sequence every later record must carry, seeded by the first
    /// decoded record. A mismatch means records went missing.
    expected: Option<u64>,
    fatal: bool,
}

impl Iterator for Replay {
    type Item = Result<LogRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.fatal {
                return None;
            }

            let exhausted = match &self.cursor {
                Some(cursor) => cursor.offset >= cursor.buf.len(),
                None => true,
            };
            if exhausted {
                if self.pending.is_empty() {
                    return None;
                }
                let (base, path) = self.pending.remove(0);
                if let Some(expected) = self.expected {
                    if base != expected {
                        self.fatal = true;
                        return Some(Err(EmberError::LogCorruption(format!(
                            "segment gap: {:?} starts at sequence {}, expected {}",
                            path, base, expected
                        ))));
                    }
                }
                let is_last = self.pending.is_empty();
                let buf = match fs::read(&path) {
                    Ok(buf) => buf,
                    Err(err) => {
                        self.fatal = true;
                        return Some(Err(err.into()));
                    }
                };
                self.cursor = Some(SegmentCursor {
                    path,
                    buf,
                    offset: 0,
                    is_last,
                });
                continue;
            }
            let Some(cursor) = self.cursor.as_mut() else {
                continue;
            };

            match codec::decode_record(&cursor.buf[cursor.offset..]) {
                DecodeOutcome::Record { record, consumed } => {
                    cursor.offset += consumed;
                    if let Some(expected) = self.expected {
                        if record.sequence != expected {
                            self.fatal = true;
                            return Some(Err(EmberError::LogCorruption(format!(
                                "non-contiguous sequence in {:?}: {} where {} was expected",
                                cursor.path, record.sequence, expected
                            ))));
                        }
                    }
                    self.expected = Some(record.sequence + 1);
                    if record.sequence <= self.from_sequence {
                        continue;
                    }
                    return Some(Ok(record));
                }
                DecodeOutcome::Incomplete => {
                    if cursor.is_last {
                        log::warn!(
                            "stopping replay at torn tail of {:?} (offset {})",
                            cursor.path,
                            cursor.offset
                        );
                        return None;
                    }
                    self.fatal = true;
                    return Some(Err(EmberError::LogCorruption(format!(
                        "truncated record inside sealed segment {:?}",
                        cursor.path
                    ))));
                }
                DecodeOutcome::Corrupt { consumed, reason } => {
                    if cursor.is_last && cursor.offset + consumed == cursor.buf.len() {
                        log::warn!("stopping replay at damaged final record: {}", reason);
                        return None;
                    }
                    self.fatal = true;
                    return Some(Err(EmberError::LogCorruption(format!(
                        "{:?}: {}",
                        cursor.path, reason
                    ))));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};

    fn collect(replay: Replay) -> Vec<LogRecord> {
        replay.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_append_assigns_contiguous_sequences() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();

        let (s1, _) = wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
        let (s2, _) = wal.append(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
        assert_eq!(s1, 1);
        assert_eq!(s2, 2);
    }

    #[test]
    fn test_replay_returns_appended_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
        wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
        wal.append(&Entry::tombstone(b"a".to_vec())).unwrap();

        let records = collect(wal.replay(0).unwrap());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 1);
        assert!(records[1].entry.is_tombstone());
    }

    #[test]
    fn test_replay_from_sequence_skips_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
        for i in 0..5u8 {
            wal.append(&Entry::put(vec![i], vec![i])).unwrap();
        }

        let records = collect(wal.replay(3).unwrap());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sequence, 4);
        assert_eq!(records[1].sequence, 5);
    }

    #[test]
    fn test_sequence_resumes_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
            wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
            wal.append(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
        }
        let wal = WriteAheadLog::open(dir.path(), true).unwrap();
        assert_eq!(wal.next_sequence(), 3);
    }

    #[test]
    fn test_rotation_keeps_sequences_contiguous() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
        wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
        let base = wal.rotate().unwrap();
        assert_eq!(base, 2);
        let (seq, _) = wal.append(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
        assert_eq!(seq, 2);

        let records = collect(wal.replay(0).unwrap());
        assert_eq!(
            records.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn test_torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
            wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
            wal.append(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
            path = dir.path().join(segment_file_name(1));
        }

        // Chop 3 bytes off the final record, simulating a torn write.
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 3).unwrap();

        let wal = WriteAheadLog::open(dir.path(), true).unwrap();
        assert_eq!(wal.next_sequence(), 2);
        let records = collect(wal.replay(0).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry.key, b"a".to_vec());
    }

    #[test]
    fn test_mid_log_corruption_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path;
        {
            let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
            wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
            wal.append(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
            path = dir.path().join(segment_file_name(1));
        }

        // Damage the first record's key byte (offset 12: past the
        // sequence and key_len fields) while a valid record follows it.
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(12)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        drop(file);

        let err = WriteAheadLog::open(dir.path(), true).unwrap_err();
        assert!(matches!(err, EmberError::LogCorruption(_)));
    }

    #[test]
    fn test_replay_detects_missing_middle_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
        wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
        wal.append(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
        wal.rotate().unwrap();
        wal.append(&Entry::put(b"c".to_vec(), b"3".to_vec())).unwrap();
        wal.rotate().unwrap();
        wal.append(&Entry::put(b"d".to_vec(), b"4".to_vec())).unwrap();

        // Sequence 3 disappears with its segment; replay must refuse to
        // continue rather than resurface state that skips it.
        fs::remove_file(dir.path().join(segment_file_name(3))).unwrap();

        let mut replay = wal.replay(0).unwrap();
        assert_eq!(replay.next().unwrap().unwrap().sequence, 1);
        assert_eq!(replay.next().unwrap().unwrap().sequence, 2);
        let err = replay.next().unwrap().unwrap_err();
        assert!(matches!(err, EmberError::LogCorruption(_)));
        assert!(replay.next().is_none());
    }

    #[test]
    fn test_replay_detects_gap_inside_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
        wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();

        // Forge a record that jumps the sequence from 1 to 3. Each
        // record is individually valid, so only the contiguity check
        // can catch the hole.
        let path = dir.path().join(segment_file_name(1));
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&codec::encode_record(
            3,
            &Entry::put(b"c".to_vec(), b"3".to_vec()),
        ))
        .unwrap();
        drop(file);

        let mut replay = wal.replay(0).unwrap();
        assert_eq!(replay.next().unwrap().unwrap().sequence, 1);
        let err = replay.next().unwrap().unwrap_err();
        assert!(matches!(err, EmberError::LogCorruption(_)));
    }

    #[test]
    fn test_remove_segments_below_watermark() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
        wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
        wal.append(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
        wal.rotate().unwrap();
        wal.append(&Entry::put(b"c".to_vec(), b"3".to_vec())).unwrap();

        let removed = wal.remove_segments_below(2).unwrap();
        assert_eq!(removed, 1);

        let records = collect(wal.replay(2).unwrap());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].entry.key, b"c".to_vec());
    }

    #[test]
    fn test_remove_keeps_partially_covered_segment() {
        let dir = tempfile::tempdir().unwrap();
        let mut wal = WriteAheadLog::open(dir.path(), true).unwrap();
        wal.append(&Entry::put(b"a".to_vec(), b"1".to_vec())).unwrap();
        wal.append(&Entry::put(b"b".to_vec(), b"2".to_vec())).unwrap();
        wal.rotate().unwrap();

        // Watermark 1 covers only half of the sealed segment.
        let removed = wal.remove_segments_below(1).unwrap();
        assert_eq!(removed, 0);
    }
}
