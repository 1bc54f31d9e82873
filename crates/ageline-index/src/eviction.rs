//! Age-based eviction sweep.
//!
//! Nodes are stamped with the logical clock on every put and the chain is
//! ordered by that stamp, so the sweep only ever looks at the oldest end:
//! it deletes while the oldest node is too old and stops at the first one
//! that is not. Cost is proportional to the number of evicted nodes.

use ageline_core::Store;
use tracing::info;

use crate::clock::LogicalClock;
use crate::error::{hex, IndexResult};
use crate::linked::LinkedIndex;

/// What a sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Nodes deleted
    pub removed: usize,
    /// Oldest key left in the chain, if any
    pub retained_oldest: Option<Vec<u8>>,
    /// Clock reading the sweep compared against
    pub now: u64,
}

impl<S: Store, C: LogicalClock> LinkedIndex<S, C> {
    /// Delete, oldest first, every node with `now - last_modified > max_age`.
    ///
    /// Reads the clock once per sweep. Call it periodically, not per write.
    pub fn remove_old_nodes(&mut self) -> IndexResult<EvictionReport> {
        let now = self.clock().now();
        let result = self.sweep(now);
        self.finish(result)
    }

    fn sweep(&mut self, now: u64) -> IndexResult<EvictionReport> {
        let max_age = self.max_age();
        let mut removed = 0;

        while let Some(oldest) = self.oldest_key().map(<[u8]>::to_vec) {
            let node = self.get_node(&oldest)?;
            // A clock that went backwards yields age 0: nothing is stale
            if now.saturating_sub(node.last_modified) <= max_age {
                break;
            }
            self.delete_unsynced(&oldest)?;
            removed += 1;
        }

        let report = EvictionReport {
            removed,
            retained_oldest: self.oldest_key().map(<[u8]>::to_vec),
            now,
        };
        if removed > 0 {
            info!(
                removed,
                now,
                max_age,
                oldest = ?report.retained_oldest.as_deref().map(hex),
                "evicted stale nodes"
            );
        }
        Ok(report)
    }
}
