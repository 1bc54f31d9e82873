//! Fault injection for tests of layers built on `Store`.

use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashSet;
use parking_lot::Mutex;

use crate::action_log::ActionLogEntry;
use crate::error::{StoreError, StoreResult};
use crate::store::{Store, Version};

/// Wraps a store and fails chosen operations with `StoreError::Injected`.
///
/// Writes (`put`, `delete`, `put_meta`, `delete_meta`) share one counter.
/// A failed write does not reach the inner store.
pub struct FailingStore<S> {
    inner: S,
    writes: AtomicUsize,
    fail_at: Mutex<Option<usize>>,
    poisoned_reads: Mutex<HashSet<Vec<u8>>>,
}

impl<S: Store> FailingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
            fail_at: Mutex::new(None),
            poisoned_reads: Mutex::new(HashSet::new()),
        }
    }

    /// Fail the `n`th write issued from now on (1-based). Only that write fails.
    pub fn fail_nth_write(&self, n: usize) {
        assert!(n > 0, "write positions are 1-based");
        let current = self.writes.load(Ordering::SeqCst);
        *self.fail_at.lock() = Some(current + n);
    }

    /// Make every content `get` of `key` fail.
    pub fn fail_reads_of(&self, key: &[u8]) {
        self.poisoned_reads.lock().insert(key.to_vec());
    }

    /// Drop all armed failures.
    pub fn clear(&self) {
        *self.fail_at.lock() = None;
        self.poisoned_reads.lock().clear();
    }

    /// Writes attempted so far, failed ones included.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn check_write(&self, what: &str, key: &[u8]) -> StoreResult<()> {
        let position = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let mut fail_at = self.fail_at.lock();
        if *fail_at == Some(position) {
            *fail_at = None;
            return Err(StoreError::Injected(format!("{} #{} of {:?}", what, position, key)));
        }
        Ok(())
    }
}

impl<S: Store> Store for FailingStore<S> {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        if self.poisoned_reads.lock().contains(key) {
            return Err(StoreError::Injected(format!("get of {:?}", key)));
        }
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<Version> {
        self.check_write("put", key)?;
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<Version> {
        self.check_write("delete", key)?;
        self.inner.delete(key)
    }

    fn get_meta(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get_meta(key)
    }

    fn put_meta(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.check_write("put_meta", key)?;
        self.inner.put_meta(key, value)
    }

    fn delete_meta(&self, key: &[u8]) -> StoreResult<()> {
        self.check_write("delete_meta", key)?;
        self.inner.delete_meta(key)
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn action_log_entries(&self) -> Vec<ActionLogEntry> {
        self.inner.action_log_entries()
    }

    fn sync(&self) -> StoreResult<()> {
        self.inner.sync()
    }
}
