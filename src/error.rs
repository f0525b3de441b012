//! EMBERKV - Custom Error Types
//! Defines the error hierarchy for the storage engine.

use thiserror::Error;

/// Custom Result type for the Ember engine.
pub type Result<T> = std::result::Result<T, EmberError>;

/// Error types for the Ember storage engine.
///
/// A missing key is not an error condition: reads return `Option`.
#[derive(Error, Debug)]
pub enum EmberError {
    /// I/O errors from file operations (WAL, snapshot).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors (snapshot body).
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Damage confined to a single record (CRC mismatch, impossible
    /// lengths). Tolerated only at the tail of the WAL during replay.
    #[error("Record corruption detected: {0}")]
    Corruption(String),

    /// Corruption in the middle of the log. Fatal: recovery refuses to
    /// open the engine rather than silently skip acknowledged writes.
    #[error("WAL corruption (mid-log): {0}")]
    LogCorruption(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
