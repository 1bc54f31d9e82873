//! Volatile store: the engine's RAM tables without a WAL.
//!
//! Useful for tests and for indexes that only need to live as long as the
//! process. Size limits and the action log behave as in StoreEngine.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::action_log::{Action, ActionLog, ActionLogEntry};
use crate::config::Config;
use crate::error::StoreResult;
use crate::format::check_sizes;
use crate::store::{Store, Version};

pub struct MemoryStore {
    content: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    meta: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    next_lsn: AtomicU64,
    action_log: ActionLog,
    config: Config,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            content: RwLock::new(HashMap::new()),
            meta: RwLock::new(HashMap::new()),
            next_lsn: AtomicU64::new(1),
            action_log: ActionLog::new(config.action_log_enabled),
            config,
        }
    }

    fn version(&self, key: &[u8], value: &[u8]) -> Version {
        let lsn = self.next_lsn.fetch_add(1, Ordering::Relaxed);
        let digest = crc32c::crc32c_append(crc32c::crc32c(key), value);
        Version { lsn, digest }
    }

    pub fn len(&self) -> usize {
        self.content.read().len()
    }

    /// Raw content keys, unordered. Handy for asserting on leftovers.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.content.read().keys().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self { Self::new() }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.content.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<Version> {
        check_sizes(key, value, &self.config)?;
        self.content.write().insert(key.to_vec(), value.to_vec());
        self.action_log.record(Action::Put, key, value.len());
        Ok(self.version(key, value))
    }

    fn delete(&self, key: &[u8]) -> StoreResult<Version> {
        self.content.write().remove(key);
        self.action_log.record(Action::Delete, key, 0);
        Ok(self.version(key, &[]))
    }

    fn get_meta(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.meta.read().get(key).cloned())
    }

    fn put_meta(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        check_sizes(key, value, &self.config)?;
        self.meta.write().insert(key.to_vec(), value.to_vec());
        self.action_log.record(Action::PutMeta, key, value.len());
        self.next_lsn.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete_meta(&self, key: &[u8]) -> StoreResult<()> {
        self.meta.write().remove(key);
        self.action_log.record(Action::DeleteMeta, key, 0);
        self.next_lsn.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.content.read().is_empty()
    }

    fn action_log_entries(&self) -> Vec<ActionLogEntry> {
        self.action_log.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put(b"k", b"v").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
        store.put(b"j", b"w").unwrap();
        store.delete(b"k").unwrap();
        assert_eq!(store.get(b"k").unwrap(), None);
        assert_eq!(store.keys(), vec![b"j".to_vec()]);
        store.delete(b"j").unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_meta_does_not_count_as_content() {
        let store = MemoryStore::new();
        store.put_meta(b"oldest", b"k").unwrap();
        assert!(store.is_empty());
        assert!(store.keys().is_empty());
        assert_eq!(store.get(b"oldest").unwrap(), None);
    }

    #[test]
    fn test_versions_increase_and_digest_tracks_content() {
        let store = MemoryStore::new();
        let a = store.put(b"k", b"one").unwrap();
        let b = store.put(b"k", b"two").unwrap();
        let c = store.put(b"k", b"two").unwrap();
        assert!(b.lsn > a.lsn);
        assert_ne!(a.digest, b.digest);
        assert_eq!(b.digest, c.digest);
    }

    #[test]
    fn test_size_limits_apply() {
        let mut config = Config::default();
        config.max_key_size = 2;
        let store = MemoryStore::with_config(config);
        assert!(matches!(store.put(b"abc", b"v"), Err(StoreError::OversizedEntry { .. })));
    }
}
