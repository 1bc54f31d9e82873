//! Construction parameters for a [`LinkedIndex`](crate::LinkedIndex).

use ageline_core::Config;

/// Index configuration.
///
/// `store` is handed to `StoreEngine::open` unchanged; the action log flag
/// lives there and is never interpreted by the index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Nodes whose age (now - last_modified) exceeds this are evicted
    pub max_age: u64,
    /// Backing store settings
    pub store: Config,
    /// Run `verify()` during construction and refuse a broken chain
    pub verify_on_open: bool,
}

impl IndexConfig {
    pub fn new(max_age: u64) -> Self {
        Self { max_age, store: Config::default(), verify_on_open: false }
    }

    pub fn with_action_log(mut self, enabled: bool) -> Self {
        self.store.action_log_enabled = enabled;
        self
    }

    pub fn with_store_config(mut self, store: Config) -> Self {
        self.store = store;
        self
    }

    pub fn verify_on_open(mut self, verify: bool) -> Self {
        self.verify_on_open = verify;
        self
    }
}
