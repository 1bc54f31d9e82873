//! Ageline Core: RAM-first key-value store with a write-ahead log
//!
//! The storage layer underneath the Ageline ordered index. It knows nothing
//! about chains, sentinels or clocks; it only stores bytes.
//!
//! # Architecture
//!
//! - **Read path**: served from RAM hash tables
//! - **Write path**: WAL append (CRC32C framed) first, then RAM
//! - **Namespaces**: content entries plus a small reserved metadata space
//! - **Checkpoint**: collapse the WAL into the live state on demand
//!
//! Layers above depend only on the [`Store`] trait; [`StoreEngine`] is the
//! durable implementation and [`MemoryStore`] the volatile one.

pub mod action_log;
pub mod checkpoint;
pub mod config;
pub mod durability;
pub mod engine;
pub mod error;
pub mod format;
pub mod memory;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod wal;

// Re-export key types for convenience
pub use action_log::{Action, ActionLogEntry};
pub use checkpoint::CheckpointResult;
pub use config::{Config, SyncMode};
pub use engine::StoreEngine;
pub use error::{StoreError, StoreResult};
pub use format::{Namespace, Operation};
pub use memory::MemoryStore;
pub use store::{Store, Version};
#[cfg(any(test, feature = "test-support"))]
pub use testing::FailingStore;
pub use wal::{WalReader, WalWriter};
