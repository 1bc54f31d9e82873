//! Ageline Index: insertion-ordered keys with logical-clock eviction
//!
//! A persistent doubly linked chain layered over an [`ageline_core::Store`].
//! Each node is stored under its own key and names its neighbours by key;
//! two reserved metadata entries record the oldest and newest ends.
//!
//! # Operations
//!
//! - [`LinkedIndex::put`] inserts or refreshes a key and moves it to the newest end
//! - [`LinkedIndex::delete`] unlinks and removes a key
//! - [`LinkedIndex::iter`] streams values oldest→newest
//! - [`LinkedIndex::remove_old_nodes`] evicts from the oldest end while
//!   `now - last_modified > max_age`
//! - [`LinkedIndex::verify`] checks the stored chain without changing it
//!
//! Time is whatever the supplied [`LogicalClock`] says it is (typically a
//! block height), never the wall clock.
//!
//! # Example
//!
//! ```
//! use ageline_core::MemoryStore;
//! use ageline_index::{IndexConfig, LinkedIndex, ManualClock};
//!
//! let clock = ManualClock::new(5);
//! let mut index =
//!     LinkedIndex::with_store(MemoryStore::new(), IndexConfig::new(100), clock.clone()).unwrap();
//! index.put(b"a", b"first").unwrap();
//! clock.set(200);
//! index.put(b"b", b"second").unwrap();
//!
//! assert_eq!(index.remove_old_nodes().unwrap().removed, 1);
//! let values: Vec<_> = index.iter().map_while(Result::ok).collect();
//! assert_eq!(values, vec![b"second".to_vec()]);
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod eviction;
pub mod iter;
pub mod linked;
pub mod node;
pub mod verify;

pub use clock::{LogicalClock, ManualClock};
pub use config::IndexConfig;
pub use error::{IndexError, IndexResult};
pub use eviction::EvictionReport;
pub use iter::{Entries, Iter};
pub use linked::{LinkedIndex, NEWEST_SENTINEL, OLDEST_SENTINEL};
pub use node::LinkedNode;
pub use verify::ChainReport;
