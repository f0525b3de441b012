//! EMBERKV - Durable In-Memory Key-Value Store
//!
//! A single-node key-value engine that keeps its working set in memory
//! and persists every mutation to disk, so state survives restarts and
//! crashes at arbitrary points.
//!
//! ## Features
//! - **Write-Ahead Log (WAL)**: every mutation is fsynced to a segmented
//!   log with CRC32 integrity checks before it becomes visible
//! - **Snapshots**: periodic atomic dumps of the index bound replay time
//! - **Crash Recovery**: snapshot + WAL tail replay, with torn-write
//!   detection at the log tail and hard failure on mid-log corruption
//! - **TTL Support**: Redis-like key expiration, checked lazily on read
//! - **Metrics**: lock-free atomic counters for observability
//! - **Concurrency**: thread-safe Arc + RwLock wrapper
//!
//! ## Example
//! ```no_run
//! use emberkv::{config::Config, engine::Ember};
//!
//! let config = Config::new("./data");
//! let mut engine = Ember::open(config).unwrap();
//!
//! engine.set(b"key".to_vec(), b"value".to_vec()).unwrap();
//! assert_eq!(engine.get(b"key"), Some(b"value".to_vec()));
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod types;
