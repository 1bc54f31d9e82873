//! Read-only chain verification.
//!
//! Mutations are not atomic, so a failed write can leave a dangling link or
//! a sentinel that disagrees with the chain. `verify` detects that; it never
//! repairs anything.

use ageline_core::Store;
use hashbrown::HashSet;
use tracing::warn;

use crate::clock::LogicalClock;
use crate::error::{hex, IndexError, IndexResult};
use crate::iter::Walk;
use crate::linked::LinkedIndex;

/// Summary of a healthy chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub nodes: usize,
    pub oldest: Option<Vec<u8>>,
    pub newest: Option<Vec<u8>>,
}

fn corrupt(key: &[u8], reason: impl Into<String>) -> IndexError {
    let err = IndexError::CorruptChain { key: key.to_vec(), reason: reason.into() };
    warn!(error = %err, "chain verification failed");
    err
}

impl<S: Store, C: LogicalClock> LinkedIndex<S, C> {
    /// Walk oldest→newest and check every link against its neighbour.
    ///
    /// Checks: both sentinels set or both empty; empty sentinels mean an
    /// empty store; every `next` resolves; every `prev` names the node
    /// walked just before; no key repeats; the walk ends at `newest`.
    pub fn verify(&self) -> IndexResult<ChainReport> {
        let report = |nodes| ChainReport {
            nodes,
            oldest: self.oldest_key().map(<[u8]>::to_vec),
            newest: self.newest_key().map(<[u8]>::to_vec),
        };

        match (self.oldest_key(), self.newest_key()) {
            (None, None) => {
                if !self.is_empty() {
                    return Err(corrupt(&[], "sentinels are empty but the store holds nodes"));
                }
                return Ok(report(0));
            }
            (Some(oldest), None) => {
                return Err(corrupt(oldest, "oldest is set but newest is empty"));
            }
            (None, Some(newest)) => {
                return Err(corrupt(newest, "newest is set but oldest is empty"));
            }
            (Some(_), Some(_)) => {}
        }

        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut previous: Option<Vec<u8>> = None;

        for step in Walk::new(self) {
            let (key, node) = match step {
                Ok(step) => step,
                Err(IndexError::NotFound { key }) => {
                    let from = previous.unwrap_or_default();
                    return Err(corrupt(&key, format!("dangling link from {}", hex(&from))));
                }
                Err(e) => return Err(e),
            };

            if !seen.insert(key.clone()) {
                return Err(corrupt(&key, "key visited twice: chain has a cycle"));
            }
            if node.prev != previous {
                return Err(corrupt(
                    &key,
                    format!(
                        "prev is {:?}, expected {:?}",
                        node.prev.as_deref().map(hex),
                        previous.as_deref().map(hex)
                    ),
                ));
            }
            previous = Some(key);
        }

        if previous.as_deref() != self.newest_key() {
            let last = previous.unwrap_or_default();
            return Err(corrupt(&last, "walk ended at a key other than the newest sentinel"));
        }

        Ok(report(seen.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::IndexConfig;
    use crate::linked::{NEWEST_SENTINEL, OLDEST_SENTINEL};
    use crate::node::LinkedNode;
    use ageline_core::MemoryStore;

    fn chain(keys: &[&[u8]]) -> LinkedIndex<MemoryStore, ManualClock> {
        let mut idx = LinkedIndex::with_store(
            MemoryStore::new(),
            IndexConfig::new(1),
            ManualClock::new(0),
        )
        .unwrap();
        for k in keys {
            idx.put(k, b"v").unwrap();
        }
        idx
    }

    fn rewrite(
        idx: &LinkedIndex<MemoryStore, ManualClock>,
        key: &[u8],
        edit: impl FnOnce(&mut LinkedNode),
    ) {
        let mut node = LinkedNode::decode(&idx.store().get(key).unwrap().unwrap()).unwrap();
        edit(&mut node);
        idx.store().put(key, &node.encode().unwrap()).unwrap();
    }

    #[test]
    fn test_healthy_chain() {
        let idx = chain(&[b"a", b"b", b"c"]);
        let report = idx.verify().unwrap();
        assert_eq!(report.nodes, 3);
        assert_eq!(report.oldest.as_deref(), Some(&b"a"[..]));
        assert_eq!(report.newest.as_deref(), Some(&b"c"[..]));
    }

    #[test]
    fn test_empty_chain() {
        assert_eq!(chain(&[]).verify().unwrap().nodes, 0);
    }

    #[test]
    fn test_dangling_next() {
        let idx = chain(&[b"a", b"b"]);
        rewrite(&idx, b"a", |n| n.next = Some(b"zz".to_vec()));
        let err = idx.verify().unwrap_err();
        assert!(matches!(&err, IndexError::CorruptChain { key, .. } if key == b"zz"));
        assert!(err.to_string().contains("dangling"));
    }

    #[test]
    fn test_mismatched_prev() {
        let idx = chain(&[b"a", b"b", b"c"]);
        rewrite(&idx, b"c", |n| n.prev = Some(b"a".to_vec()));
        let err = idx.verify().unwrap_err();
        assert!(matches!(err, IndexError::CorruptChain { key, .. } if key == b"c"));
    }

    #[test]
    fn test_cycle() {
        let idx = chain(&[b"a", b"b"]);
        rewrite(&idx, b"b", |n| n.next = Some(b"a".to_vec()));
        let err = idx.verify().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_half_set_sentinels() {
        let store = MemoryStore::new();
        store.put_meta(OLDEST_SENTINEL, b"a").unwrap();
        let idx = LinkedIndex::with_store(store, IndexConfig::new(1), ManualClock::new(0)).unwrap();
        assert!(idx.verify().is_err());
    }

    #[test]
    fn test_orphan_nodes_without_sentinels() {
        let store = MemoryStore::new();
        store.put(b"orphan", &LinkedNode::detached(b"v".to_vec(), 0).encode().unwrap()).unwrap();
        let idx = LinkedIndex::with_store(store, IndexConfig::new(1), ManualClock::new(0)).unwrap();
        assert!(idx.verify().is_err());
    }

    #[test]
    fn test_verify_on_open_refuses_broken_chain() {
        let store = std::sync::Arc::new(MemoryStore::new());
        {
            let mut idx = LinkedIndex::with_store(
                store.clone(),
                IndexConfig::new(1),
                ManualClock::new(0),
            )
            .unwrap();
            idx.put(b"a", b"1").unwrap();
            idx.put(b"b", b"2").unwrap();
        }
        store.put_meta(NEWEST_SENTINEL, b"a").unwrap();

        let result = LinkedIndex::with_store(
            store,
            IndexConfig::new(1).verify_on_open(true),
            ManualClock::new(0),
        );
        assert!(matches!(result, Err(IndexError::CorruptChain { .. })));
    }
}
