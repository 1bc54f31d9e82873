//! Configuration for the Ageline store
//!
//! Provides hardware-class presets and field-level validation.

/// How each WAL append reaches persistent media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// `durable_sync` after every append.
    Durable,
    /// Append to the OS page cache only; durability is reached on `Store::sync`.
    Deferred,
}

/// Store configuration with hardware-class presets
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum key size in bytes
    pub max_key_size: usize,
    /// Maximum value size in bytes
    pub max_value_size: usize,
    /// WAL segment rotation threshold (bytes)
    pub wal_rotation_size_bytes: u64,
    /// Per-append sync behaviour
    pub sync_mode: SyncMode,
    /// Record every write in the in-memory action log
    pub action_log_enabled: bool,
}

impl Config {
    /// Server-class: large values, big WAL segments
    pub fn server() -> Self {
        Self {
            max_key_size: 128,
            max_value_size: 32 * 1024 * 1024,
            wal_rotation_size_bytes: 100 * 1024 * 1024,
            sync_mode: SyncMode::Durable,
            action_log_enabled: false,
        }
    }

    /// Phone-class: 16GB device
    pub fn phone() -> Self {
        Self {
            max_key_size: 128,
            max_value_size: 16 * 1024 * 1024,
            wal_rotation_size_bytes: 50 * 1024 * 1024,
            sync_mode: SyncMode::Durable,
            action_log_enabled: false,
        }
    }

    /// Budget-class: 4GB device, batches syncs per logical operation
    pub fn budget() -> Self {
        Self {
            max_key_size: 64,
            max_value_size: 8 * 1024 * 1024,
            wal_rotation_size_bytes: 25 * 1024 * 1024,
            sync_mode: SyncMode::Deferred,
            action_log_enabled: false,
        }
    }

    /// Builder-style toggle for the action log.
    pub fn with_action_log(mut self, enabled: bool) -> Self {
        self.action_log_enabled = enabled;
        self
    }

    /// Builder-style override for the sync mode.
    pub fn with_sync_mode(mut self, mode: SyncMode) -> Self {
        self.sync_mode = mode;
        self
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.max_key_size == 0 || self.max_key_size > u16::MAX as usize {
            return Err(format!("max_key_size must be in [1, {}]", u16::MAX));
        }
        if self.max_value_size == 0 || self.max_value_size > 128 * 1024 * 1024 {
            return Err("max_value_size must be in [1, 128MB]".into());
        }
        if self.wal_rotation_size_bytes < 64 * 1024 {
            return Err("wal_rotation_size_bytes must be >= 64KB".into());
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self { Self::server() }
}
