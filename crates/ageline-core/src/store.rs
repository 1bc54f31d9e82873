//! The persistence contract consumed by layers built on top of the store.

use std::sync::Arc;

use crate::action_log::ActionLogEntry;
use crate::error::StoreResult;

/// Opaque result of a write: where it landed in the store's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    /// Store-wide monotonic write sequence number
    pub lsn: u64,
    /// CRC32C of the persisted record
    pub digest: u32,
}

/// Key-addressed byte storage with a separate metadata namespace.
///
/// Content and metadata keys live in disjoint spaces: `put_meta(k, ..)`
/// never shadows `get(k)`. `is_empty` reports on content only.
pub trait Store {
    /// Content lookup. `Ok(None)` when the key is absent.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    /// Insert or overwrite a content entry.
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<Version>;

    /// Remove a content entry. Removing an absent key is not an error.
    fn delete(&self, key: &[u8]) -> StoreResult<Version>;

    /// Metadata lookup.
    fn get_meta(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;

    fn put_meta(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    fn delete_meta(&self, key: &[u8]) -> StoreResult<()>;

    /// True when no content entries exist.
    fn is_empty(&self) -> bool;

    /// Recorded writes, oldest first. Empty when the action log is disabled.
    fn action_log_entries(&self) -> Vec<ActionLogEntry>;

    /// Make every write issued so far durable.
    fn sync(&self) -> StoreResult<()> {
        Ok(())
    }
}

impl<S: Store + ?Sized> Store for &S {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> { (**self).get(key) }
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<Version> { (**self).put(key, value) }
    fn delete(&self, key: &[u8]) -> StoreResult<Version> { (**self).delete(key) }
    fn get_meta(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> { (**self).get_meta(key) }
    fn put_meta(&self, key: &[u8], value: &[u8]) -> StoreResult<()> { (**self).put_meta(key, value) }
    fn delete_meta(&self, key: &[u8]) -> StoreResult<()> { (**self).delete_meta(key) }
    fn is_empty(&self) -> bool { (**self).is_empty() }
    fn action_log_entries(&self) -> Vec<ActionLogEntry> { (**self).action_log_entries() }
    fn sync(&self) -> StoreResult<()> { (**self).sync() }
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> { (**self).get(key) }
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<Version> { (**self).put(key, value) }
    fn delete(&self, key: &[u8]) -> StoreResult<Version> { (**self).delete(key) }
    fn get_meta(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> { (**self).get_meta(key) }
    fn put_meta(&self, key: &[u8], value: &[u8]) -> StoreResult<()> { (**self).put_meta(key, value) }
    fn delete_meta(&self, key: &[u8]) -> StoreResult<()> { (**self).delete_meta(key) }
    fn is_empty(&self) -> bool { (**self).is_empty() }
    fn action_log_entries(&self) -> Vec<ActionLogEntry> { (**self).action_log_entries() }
    fn sync(&self) -> StoreResult<()> { (**self).sync() }
}
