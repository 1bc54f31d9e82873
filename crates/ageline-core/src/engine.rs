//! Durable store engine.
//!
//! StoreEngine keeps two RAM hash tables (content and metadata) in front of
//! a crash-safe WAL.
//!
//! **Read path**: RAM only (RwLock read guard)
//! **Write path**: WAL append first, then RAM, then the action log
//! **Open**: replay every WAL segment in order to rebuild both tables

use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::action_log::{Action, ActionLog, ActionLogEntry};
use crate::checkpoint::{self, CheckpointResult};
use crate::config::{Config, SyncMode};
use crate::error::{StoreError, StoreResult};
use crate::format::{Namespace, Operation};
use crate::store::{Store, Version};
use crate::wal::{WalReader, WalWriter};

type Table = HashMap<Vec<u8>, Vec<u8>>;

/// RAM tables + WAL.
///
/// All methods take `&self`. Readers share the table locks; writers
/// serialize through the WAL mutex and then briefly hold a table write lock.
pub struct StoreEngine {
    content: RwLock<Table>,
    meta: RwLock<Table>,
    wal: Mutex<WalWriter>,
    action_log: ActionLog,
    path: PathBuf,
    config: Config,
}

impl StoreEngine {
    /// Open or create a store at `path`, replaying its WAL.
    pub fn open<P: AsRef<Path>>(path: P, config: Config) -> StoreResult<Self> {
        config.validate().map_err(StoreError::InvalidConfig)?;

        let path = path.as_ref().to_path_buf();
        let wal_dir = path.join("wal");
        std::fs::create_dir_all(&wal_dir)
            .map_err(|e| StoreError::io_at(&wal_dir, &e, "Failed to create WAL directory"))?;

        let mut content = Table::new();
        let mut meta = Table::new();
        let mut max_lsn = 0u64;

        for record in WalReader::new(&wal_dir).recover()? {
            max_lsn = max_lsn.max(record.lsn);
            let table = match record.namespace {
                Namespace::Content => &mut content,
                Namespace::Meta => &mut meta,
            };
            match record.operation {
                Operation::Put => {
                    table.insert(record.key, record.value);
                }
                Operation::Delete => {
                    table.remove(&record.key);
                }
            }
        }

        if !content.is_empty() || !meta.is_empty() {
            info!(
                content = content.len(),
                meta = meta.len(),
                last_lsn = max_lsn,
                wal = %wal_dir.display(),
                "recovered store from WAL"
            );
        }

        let wal = WalWriter::new(&wal_dir, max_lsn + 1, config.clone())?;

        Ok(Self {
            content: RwLock::new(content),
            meta: RwLock::new(meta),
            wal: Mutex::new(wal),
            action_log: ActionLog::new(config.action_log_enabled),
            path,
            config,
        })
    }

    fn table(&self, namespace: Namespace) -> &RwLock<Table> {
        match namespace {
            Namespace::Content => &self.content,
            Namespace::Meta => &self.meta,
        }
    }

    fn write(
        &self,
        namespace: Namespace,
        op: Operation,
        key: &[u8],
        value: &[u8],
    ) -> StoreResult<Version> {
        // RAM is updated under the WAL mutex: a checkpoint never sees an
        // appended record missing from the tables, and RAM applies writes in
        // LSN order
        let mut wal = self.wal.lock();
        // WAL first: if the append fails, RAM is never touched
        let version = wal.append(namespace, op, key, value)?;
        {
            let mut table = self.table(namespace).write();
            match op {
                Operation::Put => {
                    table.insert(key.to_vec(), value.to_vec());
                }
                Operation::Delete => {
                    table.remove(key);
                }
            }
        }
        let action = match (namespace, op) {
            (Namespace::Content, Operation::Put) => Action::Put,
            (Namespace::Content, Operation::Delete) => Action::Delete,
            (Namespace::Meta, Operation::Put) => Action::PutMeta,
            (Namespace::Meta, Operation::Delete) => Action::DeleteMeta,
        };
        self.action_log.record(action, key, value.len());
        drop(wal);
        Ok(version)
    }

    /// Content lookup from RAM.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.content.read().get(key).cloned())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<Version> {
        self.write(Namespace::Content, Operation::Put, key, value)
    }

    pub fn delete(&self, key: &[u8]) -> StoreResult<Version> {
        self.write(Namespace::Content, Operation::Delete, key, &[])
    }

    pub fn get_meta(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.meta.read().get(key).cloned())
    }

    pub fn put_meta(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.write(Namespace::Meta, Operation::Put, key, value).map(|_| ())
    }

    pub fn delete_meta(&self, key: &[u8]) -> StoreResult<()> {
        self.write(Namespace::Meta, Operation::Delete, key, &[]).map(|_| ())
    }

    /// Sync the WAL. Needed after writes made under `SyncMode::Deferred`.
    pub fn sync_wal(&self) -> StoreResult<()> {
        self.wal.lock().sync()
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.content.read().contains_key(key)
    }

    /// Number of content entries.
    pub fn len(&self) -> usize {
        self.content.read().len()
    }

    /// True when no content entries exist (metadata is not counted).
    pub fn is_empty(&self) -> bool {
        self.content.read().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn action_log_entries(&self) -> Vec<ActionLogEntry> {
        self.action_log.entries()
    }

    /// Rewrite the live state of both tables into a fresh WAL segment and
    /// drop every older segment.
    ///
    /// Holds the WAL mutex for the whole rewrite, so writers wait.
    pub fn checkpoint(&self) -> StoreResult<CheckpointResult> {
        let mut wal = self.wal.lock();
        let content = self.content.read();
        let meta = self.meta.read();

        let result = checkpoint::rewrite_wal(&mut wal, &content, &meta)?;
        debug!(
            live = result.live_entries,
            removed_segments = result.removed_segments,
            "checkpoint complete"
        );
        Ok(result)
    }
}

impl Store for StoreEngine {
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> { StoreEngine::get(self, key) }
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<Version> { StoreEngine::put(self, key, value) }
    fn delete(&self, key: &[u8]) -> StoreResult<Version> { StoreEngine::delete(self, key) }
    fn get_meta(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> { StoreEngine::get_meta(self, key) }
    fn put_meta(&self, key: &[u8], value: &[u8]) -> StoreResult<()> { StoreEngine::put_meta(self, key, value) }
    fn delete_meta(&self, key: &[u8]) -> StoreResult<()> { StoreEngine::delete_meta(self, key) }
    fn is_empty(&self) -> bool { StoreEngine::is_empty(self) }
    fn action_log_entries(&self) -> Vec<ActionLogEntry> { StoreEngine::action_log_entries(self) }
    fn sync(&self) -> StoreResult<()> {
        // Durable mode already synced every append
        match self.config.sync_mode {
            SyncMode::Deferred => self.sync_wal(),
            SyncMode::Durable => Ok(()),
        }
    }
}

impl std::fmt::Debug for StoreEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEngine")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}
