//! The linked-order index: splice engine and sentinel bookkeeping.
//!
//! Every node lives in the store under its own key and names its
//! neighbours by key. Two metadata entries hold the chain ends:
//!
//! ```text
//!   oldest ─► [k1] ◄──► [k2] ◄──► [k3] ◄── newest
//!             prev=∅                next=∅
//! ```
//!
//! A mutation is a sequence of independent store writes. The order of those
//! writes is fixed below; nothing is rolled back if one of them fails.

use std::path::Path;

use ageline_core::{ActionLogEntry, CheckpointResult, Store, StoreEngine, Version};
use tracing::debug;

use crate::clock::LogicalClock;
use crate::config::IndexConfig;
use crate::error::{hex, IndexError, IndexResult};
use crate::node::LinkedNode;

/// Metadata key holding the oldest node's key.
pub const OLDEST_SENTINEL: &[u8] = &[0x00, 0x01, 0x02];
/// Metadata key holding the newest node's key.
pub const NEWEST_SENTINEL: &[u8] = &[0x00, 0x02, 0x04];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sentinel {
    Oldest,
    Newest,
}

impl Sentinel {
    fn storage_key(self) -> &'static [u8] {
        match self {
            Sentinel::Oldest => OLDEST_SENTINEL,
            Sentinel::Newest => NEWEST_SENTINEL,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Sentinel::Oldest => "oldest",
            Sentinel::Newest => "newest",
        }
    }
}

/// Insertion-ordered key-value index persisted in a [`Store`].
///
/// Mutations take `&mut self`: one writer per handle. The cached sentinels
/// are loaded at construction and written through on every change, so two
/// handles over the same store will silently disagree.
pub struct LinkedIndex<S, C> {
    store: S,
    clock: C,
    max_age: u64,
    oldest: Option<Vec<u8>>,
    newest: Option<Vec<u8>>,
}

impl<C: LogicalClock> LinkedIndex<StoreEngine, C> {
    /// Open (or create) a durable index at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: IndexConfig, clock: C) -> IndexResult<Self> {
        let store = StoreEngine::open(path, config.store.clone())?;
        Self::with_store(store, config, clock)
    }

    /// Compact the backing WAL down to the live nodes and sentinels.
    pub fn checkpoint(&self) -> IndexResult<CheckpointResult> {
        Ok(self.store.checkpoint()?)
    }
}

impl<S: Store, C: LogicalClock> LinkedIndex<S, C> {
    /// Build an index over an existing store, loading both sentinels.
    pub fn with_store(store: S, config: IndexConfig, clock: C) -> IndexResult<Self> {
        let oldest = store.get_meta(OLDEST_SENTINEL)?;
        let newest = store.get_meta(NEWEST_SENTINEL)?;
        debug!(
            oldest = ?oldest.as_deref().map(hex),
            newest = ?newest.as_deref().map(hex),
            max_age = config.max_age,
            "opened linked index"
        );

        let index = Self { store, clock, max_age: config.max_age, oldest, newest };
        if config.verify_on_open {
            index.verify()?;
        }
        Ok(index)
    }

    /// True when the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn oldest_key(&self) -> Option<&[u8]> {
        self.oldest.as_deref()
    }

    pub fn newest_key(&self) -> Option<&[u8]> {
        self.newest.as_deref()
    }

    pub fn max_age(&self) -> u64 {
        self.max_age
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Writes recorded by the store's action log, unmodified.
    pub fn action_log_entries(&self) -> Vec<ActionLogEntry> {
        self.store.action_log_entries()
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &[u8]) -> IndexResult<Vec<u8>> {
        Ok(self.get_node(key)?.value)
    }

    pub fn contains(&self, key: &[u8]) -> IndexResult<bool> {
        Ok(self.store.get(key)?.is_some())
    }

    /// Clock reading at the key's last successful put.
    pub fn last_modified(&self, key: &[u8]) -> IndexResult<u64> {
        Ok(self.get_node(key)?.last_modified)
    }

    /// Insert or update `key`, moving it to the newest position.
    ///
    /// Returns the store version of the node write itself.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> IndexResult<Version> {
        let result = self.put_unsynced(key, value);
        self.finish(result)
    }

    /// Remove `key` from the chain and the store.
    pub fn delete(&mut self, key: &[u8]) -> IndexResult<Version> {
        let result = self.delete_unsynced(key);
        self.finish(result)
    }

    /// Make the writes of a finished operation durable, surfacing the
    /// operation's own error first.
    pub(crate) fn finish<T>(&self, result: IndexResult<T>) -> IndexResult<T> {
        let synced = self.store.sync();
        let value = result?;
        synced?;
        Ok(value)
    }

    fn put_unsynced(&mut self, key: &[u8], value: &[u8]) -> IndexResult<Version> {
        if key.is_empty() {
            return Err(IndexError::InvalidKey);
        }
        let now = self.clock.now();
        let was_empty = self.newest.is_none();
        let is_newest = self.newest.as_deref() == Some(key);

        let mut next_oldest = None;
        let mut node = match self.find_node(key)? {
            None => LinkedNode::default(),
            // Already at the tail: nothing to unlink, neighbours stay as they are
            Some(node) if is_newest => node,
            Some(node) => {
                self.splice_out(key, &node)?;
                next_oldest = node.next.clone();
                node
            }
        };

        node.value = value.to_vec();
        node.last_modified = now;
        node.next = None;
        if !is_newest {
            node.prev = self.newest.clone();
        }
        let version = self.put_node(key, &node)?;

        if let Some(tail_key) = self.newest.clone().filter(|k| k.as_slice() != key) {
            let mut tail = self.get_node(&tail_key)?;
            tail.next = Some(key.to_vec());
            self.put_node(&tail_key, &tail)?;
        }

        if was_empty {
            self.set_sentinel(Sentinel::Oldest, Some(key.to_vec()))?;
        } else if self.oldest.as_deref() == Some(key) {
            if let Some(next) = next_oldest {
                self.set_sentinel(Sentinel::Oldest, Some(next))?;
            }
        }

        self.set_sentinel(Sentinel::Newest, Some(key.to_vec()))?;

        debug!(key = %hex(key), at = now, lsn = version.lsn, "put");
        Ok(version)
    }

    pub(crate) fn delete_unsynced(&mut self, key: &[u8]) -> IndexResult<Version> {
        if key.is_empty() {
            return Err(IndexError::InvalidKey);
        }
        let node = self.get_node(key)?;
        self.splice_out(key, &node)?;

        if self.newest.as_deref() == Some(key) {
            self.set_sentinel(Sentinel::Newest, node.prev.clone())?;
        }
        if self.oldest.as_deref() == Some(key) {
            self.set_sentinel(Sentinel::Oldest, node.next.clone())?;
        }

        let version = self.store.delete(key)?;
        debug!(key = %hex(key), lsn = version.lsn, "deleted");
        Ok(version)
    }

    /// Link the node's neighbours to each other, closing the gap it leaves.
    ///
    /// prev.next := node.next, then next.prev := node.prev. A failure on the
    /// second write leaves the first one in place.
    fn splice_out(&mut self, key: &[u8], node: &LinkedNode) -> IndexResult<()> {
        if let Some(prev_key) = &node.prev {
            let mut prev = self.get_node(prev_key)?;
            prev.next = node.next.clone();
            self.put_node(prev_key, &prev)?;
        }
        if let Some(next_key) = &node.next {
            let mut next = self.get_node(next_key)?;
            next.prev = node.prev.clone();
            self.put_node(next_key, &next)?;
        }
        debug!(
            key = %hex(key),
            prev = ?node.prev.as_deref().map(hex),
            next = ?node.next.as_deref().map(hex),
            "spliced out"
        );
        Ok(())
    }

    /// Durable write first, then the cached copy.
    fn set_sentinel(&mut self, which: Sentinel, key: Option<Vec<u8>>) -> IndexResult<()> {
        match &key {
            Some(k) => self.store.put_meta(which.storage_key(), k)?,
            None => self.store.delete_meta(which.storage_key())?,
        }
        debug!(sentinel = which.name(), key = ?key.as_deref().map(hex), "sentinel moved");
        match which {
            Sentinel::Oldest => self.oldest = key,
            Sentinel::Newest => self.newest = key,
        }
        Ok(())
    }

    /// Store lookup + decode. A missing key is `NotFound`.
    pub(crate) fn get_node(&self, key: &[u8]) -> IndexResult<LinkedNode> {
        self.find_node(key)?.ok_or_else(|| IndexError::NotFound { key: key.to_vec() })
    }

    fn find_node(&self, key: &[u8]) -> IndexResult<Option<LinkedNode>> {
        match self.store.get(key)? {
            Some(bytes) => LinkedNode::decode_for(key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn put_node(&self, key: &[u8], node: &LinkedNode) -> IndexResult<Version> {
        let bytes = node.encode()?;
        Ok(self.store.put(key, &bytes)?)
    }
}

impl<S, C> std::fmt::Debug for LinkedIndex<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkedIndex")
            .field("oldest", &self.oldest.as_deref().map(hex))
            .field("newest", &self.newest.as_deref().map(hex))
            .field("max_age", &self.max_age)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use ageline_core::{Action, FailingStore, MemoryStore, StoreError};

    type MemIndex = LinkedIndex<MemoryStore, ManualClock>;

    fn index() -> (MemIndex, ManualClock) {
        let clock = ManualClock::new(1);
        let idx = LinkedIndex::with_store(
            MemoryStore::new(),
            IndexConfig::new(100),
            clock.clone(),
        )
        .unwrap();
        (idx, clock)
    }

    fn values<S: Store, C: LogicalClock>(idx: &LinkedIndex<S, C>) -> Vec<Vec<u8>> {
        idx.iter().collect::<IndexResult<Vec<_>>>().unwrap()
    }

    fn node(idx: &MemIndex, key: &[u8]) -> LinkedNode {
        idx.get_node(key).unwrap()
    }

    #[test]
    fn test_first_put_sets_both_sentinels() {
        let (mut idx, _) = index();
        idx.put(b"k", b"v").unwrap();

        assert!(!idx.is_empty());
        assert_eq!(idx.oldest_key(), Some(&b"k"[..]));
        assert_eq!(idx.newest_key(), Some(&b"k"[..]));
        assert_eq!(values(&idx), vec![b"v".to_vec()]);

        let n = node(&idx, b"k");
        assert_eq!((n.prev, n.next), (None, None));
    }

    #[test]
    fn test_links_after_three_puts() {
        let (mut idx, _) = index();
        idx.put(b"a", b"1").unwrap();
        idx.put(b"b", b"2").unwrap();
        idx.put(b"c", b"3").unwrap();

        let a = node(&idx, b"a");
        let b = node(&idx, b"b");
        let c = node(&idx, b"c");
        assert_eq!((a.prev.as_deref(), a.next.as_deref()), (None, Some(&b"b"[..])));
        assert_eq!((b.prev.as_deref(), b.next.as_deref()), (Some(&b"a"[..]), Some(&b"c"[..])));
        assert_eq!((c.prev.as_deref(), c.next.as_deref()), (Some(&b"b"[..]), None));
    }

    #[test]
    fn test_reput_middle_moves_to_tail() {
        let (mut idx, _) = index();
        for k in [b"a", b"b", b"c"] {
            idx.put(k, k).unwrap();
        }
        idx.put(b"b", b"B").unwrap();

        assert_eq!(values(&idx), vec![b"a".to_vec(), b"c".to_vec(), b"B".to_vec()]);
        assert_eq!(idx.oldest_key(), Some(&b"a"[..]));
        assert_eq!(idx.newest_key(), Some(&b"b"[..]));
        assert_eq!(node(&idx, b"c").next.as_deref(), Some(&b"b"[..]));
        assert_eq!(node(&idx, b"a").next.as_deref(), Some(&b"c"[..]));
    }

    #[test]
    fn test_reput_oldest_advances_oldest() {
        let (mut idx, _) = index();
        idx.put(b"a", b"1").unwrap();
        idx.put(b"b", b"2").unwrap();
        idx.put(b"a", b"1b").unwrap();

        assert_eq!(idx.oldest_key(), Some(&b"b"[..]));
        assert_eq!(idx.newest_key(), Some(&b"a"[..]));
        assert_eq!(node(&idx, b"b").prev, None);
        assert_eq!(values(&idx), vec![b"2".to_vec(), b"1b".to_vec()]);
    }

    #[test]
    fn test_reput_newest_stays_in_place_and_refreshes() {
        let (mut idx, clock) = index();
        idx.put(b"a", b"1").unwrap();
        idx.put(b"b", b"2").unwrap();
        clock.set(50);
        idx.put(b"b", b"2b").unwrap();

        assert_eq!(values(&idx), vec![b"1".to_vec(), b"2b".to_vec()]);
        let b = node(&idx, b"b");
        assert_eq!(b.prev.as_deref(), Some(&b"a"[..]));
        assert_eq!(b.next, None);
        assert_eq!(b.last_modified, 50);
        assert_eq!(node(&idx, b"a").next.as_deref(), Some(&b"b"[..]));
        idx.verify().unwrap();
    }

    #[test]
    fn test_reput_sole_node() {
        let (mut idx, clock) = index();
        idx.put(b"only", b"1").unwrap();
        clock.set(9);
        idx.put(b"only", b"2").unwrap();

        assert_eq!(idx.oldest_key(), Some(&b"only"[..]));
        assert_eq!(idx.newest_key(), Some(&b"only"[..]));
        assert_eq!(values(&idx), vec![b"2".to_vec()]);
        assert_eq!(idx.last_modified(b"only").unwrap(), 9);
    }

    #[test]
    fn test_delete_middle_and_ends() {
        let (mut idx, _) = index();
        for k in [b"a", b"b", b"c", b"d"] {
            idx.put(k, k).unwrap();
        }

        idx.delete(b"b").unwrap();
        assert_eq!(node(&idx, b"a").next.as_deref(), Some(&b"c"[..]));
        assert_eq!(node(&idx, b"c").prev.as_deref(), Some(&b"a"[..]));

        idx.delete(b"a").unwrap();
        assert_eq!(idx.oldest_key(), Some(&b"c"[..]));
        assert_eq!(node(&idx, b"c").prev, None);

        idx.delete(b"d").unwrap();
        assert_eq!(idx.newest_key(), Some(&b"c"[..]));
        assert_eq!(node(&idx, b"c").next, None);

        idx.delete(b"c").unwrap();
        assert!(idx.is_empty());
        assert_eq!(idx.oldest_key(), None);
        assert_eq!(idx.newest_key(), None);
        assert_eq!(idx.store().get_meta(OLDEST_SENTINEL).unwrap(), None);
        assert_eq!(idx.store().get_meta(NEWEST_SENTINEL).unwrap(), None);
    }

    #[test]
    fn test_delete_missing_and_empty_keys() {
        let (mut idx, _) = index();
        assert!(matches!(idx.delete(b""), Err(IndexError::InvalidKey)));
        assert!(idx.delete(b"ghost").unwrap_err().is_not_found());
        assert!(matches!(idx.put(b"", b"v"), Err(IndexError::InvalidKey)));
    }

    #[test]
    fn test_get_after_delete_is_not_found() {
        let (mut idx, _) = index();
        idx.put(b"k", b"v").unwrap();
        idx.delete(b"k").unwrap();
        assert!(idx.get(b"k").unwrap_err().is_not_found());
        assert!(!idx.contains(b"k").unwrap());
    }

    #[test]
    fn test_corrupt_node_is_decode_error_not_not_found() {
        let (mut idx, _) = index();
        idx.put(b"k", b"v").unwrap();
        idx.store().put(b"k", b"garbage").unwrap();
        assert!(matches!(idx.get(b"k"), Err(IndexError::Decode { .. })));
        assert!(matches!(idx.put(b"k", b"v2"), Err(IndexError::Decode { .. })));
    }

    #[test]
    fn test_sentinels_reload_from_store() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let clock = ManualClock::new(1);
        {
            let mut idx = LinkedIndex::with_store(
                store.clone(),
                IndexConfig::new(10),
                clock.clone(),
            )
            .unwrap();
            idx.put(b"x", b"1").unwrap();
            idx.put(b"y", b"2").unwrap();
        }
        let idx = LinkedIndex::with_store(store, IndexConfig::new(10), clock).unwrap();
        assert_eq!(idx.oldest_key(), Some(&b"x"[..]));
        assert_eq!(idx.newest_key(), Some(&b"y"[..]));
        assert_eq!(values(&idx), vec![b"1".to_vec(), b"2".to_vec()]);
    }

    #[test]
    fn test_action_log_passes_through() {
        let store = MemoryStore::with_config(ageline_core::Config::default().with_action_log(true));
        let mut idx =
            LinkedIndex::with_store(store, IndexConfig::new(10), ManualClock::new(0)).unwrap();
        idx.put(b"k", b"v").unwrap();

        let actions: Vec<_> = idx.action_log_entries().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![Action::Put, Action::PutMeta, Action::PutMeta]);
    }

    #[test]
    fn test_failed_node_write_leaves_sentinels_untouched() {
        let store = FailingStore::new(MemoryStore::new());
        let mut idx =
            LinkedIndex::with_store(store, IndexConfig::new(10), ManualClock::new(0)).unwrap();
        idx.put(b"a", b"1").unwrap();

        // put(b) writes: node b, tail a, newest sentinel
        idx.store().fail_nth_write(1);
        let err = idx.put(b"b", b"2").unwrap_err();
        assert!(matches!(err, IndexError::Store(StoreError::Injected(_))));
        assert_eq!(idx.newest_key(), Some(&b"a"[..]));
        assert!(!idx.contains(b"b").unwrap());
        idx.verify().unwrap();
    }

    #[test]
    fn test_failed_sentinel_write_keeps_cache_at_durable_value() {
        let store = FailingStore::new(MemoryStore::new());
        let mut idx =
            LinkedIndex::with_store(store, IndexConfig::new(10), ManualClock::new(0)).unwrap();
        idx.put(b"a", b"1").unwrap();

        idx.store().fail_nth_write(3);
        assert!(idx.put(b"b", b"2").is_err());

        let durable = idx.store().get_meta(NEWEST_SENTINEL).unwrap();
        assert_eq!(idx.newest_key(), durable.as_deref());
        assert_eq!(idx.newest_key(), Some(&b"a"[..]));
        // The links were rewritten before the sentinel failed
        assert_eq!(node_of(&idx, b"a").next.as_deref(), Some(&b"b"[..]));
        assert!(idx.verify().is_err());
    }

    fn node_of<S: Store>(idx: &LinkedIndex<S, ManualClock>, key: &[u8]) -> LinkedNode {
        idx.get_node(key).unwrap()
    }
}
