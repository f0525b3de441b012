//! EMBERKV - Record Codec
//! Fixed binary layout shared by the WAL and snapshot replay path.
//!
//! ## Binary Format (per record)
//! ```text
//! [sequence: 8 bytes (LE)]
//! [key_len: 4 bytes (LE)][key: N bytes]
//! [val_len: 4 bytes (LE)][value: M bytes]   (val_len = 0 for tombstones)
//! [expires_at: 8 bytes (LE)]                (0 = no expiration)
//! [flags: 1 byte]                           (bit 0 = tombstone)
//! [crc: 4 bytes (LE)]                       (CRC32 of all preceding bytes)
//! ```

use bytes::{Buf, BufMut, BytesMut};

use crate::types::{Entry, LogRecord};

const FLAG_TOMBSTONE: u8 = 0b0000_0001;

/// Fixed bytes per record: sequence + key_len + val_len + expires_at + flags + crc.
const RECORD_OVERHEAD: usize = 8 + 4 + 4 + 8 + 1 + 4;

/// Result of decoding one record from the front of a buffer.
///
/// `Incomplete` and `Corrupt` are kept apart because the WAL treats them
/// differently: a short or damaged record at the very tail of the last
/// segment is the expected shape of a crash mid-append, while the same
/// damage followed by more data means the log itself is broken.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A valid record occupying `consumed` bytes.
    Record { record: LogRecord, consumed: usize },
    /// The declared record extent runs past the end of the buffer.
    Incomplete,
    /// The full extent is present but the record is damaged.
    /// `consumed` locates where the record claims to end.
    Corrupt { consumed: usize, reason: String },
}

/// Encode a record into the binary WAL format.
pub fn encode_record(sequence: u64, entry: &Entry) -> Vec<u8> {
    let value = entry.value.as_deref().unwrap_or(&[]);
    let mut buf = BytesMut::with_capacity(RECORD_OVERHEAD + entry.key.len() + value.len());

    buf.put_u64_le(sequence);
    buf.put_u32_le(entry.key.len() as u32);
    buf.put_slice(&entry.key);
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value);
    buf.put_u64_le(entry.expires_at.unwrap_or(0));
    let flags = if entry.is_tombstone() { FLAG_TOMBSTONE } else { 0 };
    buf.put_u8(flags);

    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);
    buf.to_vec()
}

/// Decode one record from the front of `buf`.
pub fn decode_record(buf: &[u8]) -> DecodeOutcome {
    // The length prefixes live in the first 16 bytes; without them the
    // record extent is unknowable.
    if buf.len() < 8 + 4 {
        return DecodeOutcome::Incomplete;
    }

    let mut cursor = buf;
    let sequence = cursor.get_u64_le();
    let key_len = cursor.get_u32_le() as usize;
    if cursor.remaining() < key_len + 4 {
        return DecodeOutcome::Incomplete;
    }
    let key = cursor.copy_to_bytes(key_len).to_vec();
    let val_len = cursor.get_u32_le() as usize;
    if cursor.remaining() < val_len + 8 + 1 + 4 {
        return DecodeOutcome::Incomplete;
    }
    let value = cursor.copy_to_bytes(val_len).to_vec();
    let expires_at = cursor.get_u64_le();
    let flags = cursor.get_u8();
    let stored_crc = cursor.get_u32_le();

    let consumed = buf.len() - cursor.remaining();
    let computed_crc = crc32fast::hash(&buf[..consumed - 4]);
    if stored_crc != computed_crc {
        return DecodeOutcome::Corrupt {
            consumed,
            reason: format!(
                "checksum mismatch for sequence {} (stored {:#010x}, computed {:#010x})",
                sequence, stored_crc, computed_crc
            ),
        };
    }

    let tombstone = flags & FLAG_TOMBSTONE != 0;
    if tombstone && val_len != 0 {
        return DecodeOutcome::Corrupt {
            consumed,
            reason: format!("tombstone for sequence {} declares a value", sequence),
        };
    }

    let entry = Entry {
        key,
        value: if tombstone { None } else { Some(value) },
        expires_at: if expires_at == 0 { None } else { Some(expires_at) },
    };
    DecodeOutcome::Record {
        record: LogRecord { sequence, entry },
        consumed,
    }
}
