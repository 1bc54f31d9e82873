//! Optional in-memory audit trail of store writes.
//!
//! The log is append-only and lives for the lifetime of the store handle;
//! it is not persisted and is not replayed on open.

use std::fmt;

use parking_lot::Mutex;

/// Kind of write recorded in the action log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Put,
    Delete,
    PutMeta,
    DeleteMeta,
}

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLogEntry {
    /// Position in the log, starting at 0
    pub seq: u64,
    pub action: Action,
    pub key: Vec<u8>,
    /// Length of the written value (0 for deletes)
    pub value_len: usize,
}

impl fmt::Display for ActionLogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {:?} ", self.seq, self.action)?;
        for b in &self.key {
            write!(f, "{:02x}", b)?;
        }
        write!(f, " ({} bytes)", self.value_len)
    }
}

/// Shared recorder used by every store implementation.
///
/// Unbounded: every write made while enabled stays in memory until the
/// handle is dropped. Enable it for debugging and tests, not for
/// long-running stores.
#[derive(Debug)]
pub struct ActionLog {
    enabled: bool,
    entries: Mutex<Vec<ActionLogEntry>>,
}

impl ActionLog {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, entries: Mutex::new(Vec::new()) }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append an entry; a no-op when disabled. Nothing is ever evicted.
    pub fn record(&self, action: Action, key: &[u8], value_len: usize) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries.lock();
        let seq = entries.len() as u64;
        entries.push(ActionLogEntry { seq, action, key: key.to_vec(), value_len });
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<ActionLogEntry> {
        self.entries.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
