//! Oldest→newest traversal.
//!
//! The cursor starts at the oldest sentinel and follows `next` links, one
//! store read per step. A failed read is yielded once as `Err` and ends the
//! walk; callers that do not care about the difference between "done" and
//! "broken" can use `.map_while(Result::ok)`.

use ageline_core::Store;

use crate::clock::LogicalClock;
use crate::error::IndexResult;
use crate::linked::LinkedIndex;
use crate::node::LinkedNode;

/// Step-by-step walk over the stored chain.
pub(crate) struct Walk<'a, S, C> {
    index: &'a LinkedIndex<S, C>,
    cursor: Option<Vec<u8>>,
}

impl<'a, S: Store, C: LogicalClock> Walk<'a, S, C> {
    pub(crate) fn new(index: &'a LinkedIndex<S, C>) -> Self {
        Self { index, cursor: index.oldest_key().map(<[u8]>::to_vec) }
    }
}

impl<S: Store, C: LogicalClock> Iterator for Walk<'_, S, C> {
    type Item = IndexResult<(Vec<u8>, LinkedNode)>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.cursor.take()?;
        match self.index.get_node(&key) {
            Ok(node) => {
                self.cursor = node.next.clone();
                Some(Ok((key, node)))
            }
            // cursor stays None: the walk is over
            Err(e) => Some(Err(e)),
        }
    }
}

/// Values in oldest→newest order. Created by [`LinkedIndex::iter`].
pub struct Iter<'a, S, C> {
    walk: Walk<'a, S, C>,
}

impl<S: Store, C: LogicalClock> Iterator for Iter<'_, S, C> {
    type Item = IndexResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk.next().map(|step| step.map(|(_, node)| node.value))
    }
}

impl<S: Store, C: LogicalClock> std::iter::FusedIterator for Iter<'_, S, C> {}

/// `(key, value)` pairs in oldest→newest order. Created by [`LinkedIndex::entries`].
pub struct Entries<'a, S, C> {
    walk: Walk<'a, S, C>,
}

impl<S: Store, C: LogicalClock> Iterator for Entries<'_, S, C> {
    type Item = IndexResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk.next().map(|step| step.map(|(key, node)| (key, node.value)))
    }
}

impl<S: Store, C: LogicalClock> std::iter::FusedIterator for Entries<'_, S, C> {}

impl<S: Store, C: LogicalClock> LinkedIndex<S, C> {
    /// Lazily stream values from oldest to newest.
    ///
    /// Borrows the index, so the chain cannot change mid-walk.
    pub fn iter(&self) -> Iter<'_, S, C> {
        Iter { walk: Walk::new(self) }
    }

    /// Like [`iter`](Self::iter), with keys.
    pub fn entries(&self) -> Entries<'_, S, C> {
        Entries { walk: Walk::new(self) }
    }
}
