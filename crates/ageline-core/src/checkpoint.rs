//! WAL checkpoint: collapse the log into the live state.
//!
//! A long-running index deletes as much as it writes, so the WAL fills with
//! dead records. A checkpoint rewrites only the live entries of both
//! namespaces into a fresh segment using the atomic rename pattern:
//! 1. Write live records to `wal-{next}.agl.compact`
//! 2. durable_sync the temp file
//! 3. Rename it to `wal-{next}.agl` (atomic on POSIX)
//! 4. Sync the directory, then delete every older segment
//!
//! A crash before step 3 leaves an orphaned temp file that replay ignores.
//! A crash between 3 and 4 replays the old segments and then the checkpoint,
//! which converges to the same state.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use hashbrown::HashMap;
use tracing::{info, warn};

use crate::durability::{durable_sync, sync_dir};
use crate::error::{StoreError, StoreResult};
use crate::format::{encode_record, Namespace, Operation};
use crate::wal::{list_segments, segment_path, WalWriter};

/// Outcome of a checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointResult {
    /// Segment holding the checkpointed state
    pub segment: PathBuf,
    /// Records written (content + metadata)
    pub live_entries: usize,
    /// Older segments deleted
    pub removed_segments: usize,
    /// Size of the checkpoint segment
    pub bytes_written: u64,
}

pub(crate) fn rewrite_wal(
    wal: &mut WalWriter,
    content: &HashMap<Vec<u8>, Vec<u8>>,
    meta: &HashMap<Vec<u8>, Vec<u8>>,
) -> StoreResult<CheckpointResult> {
    // Everything appended so far must be durable before older segments go away
    wal.sync()?;

    let wal_dir = wal.wal_dir().to_path_buf();
    let next_segment = wal.segment() + 1;
    let final_path = segment_path(&wal_dir, next_segment);
    let temp_path = final_path.with_extension("agl.compact");

    let mut bytes_written = 0u64;
    let mut live_entries = 0usize;
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| StoreError::io_at(&temp_path, &e, "Failed to create checkpoint file"))?;

        let tables = [(Namespace::Meta, meta), (Namespace::Content, content)];
        for (namespace, table) in tables {
            for (key, value) in table.iter() {
                let lsn = wal.take_lsn();
                let (bytes, _) =
                    encode_record(lsn, namespace, Operation::Put, key, value, wal.config())?;
                file.write_all(&bytes)
                    .map_err(|e| StoreError::io_at(&temp_path, &e, "Checkpoint write failed"))?;
                bytes_written += bytes.len() as u64;
                live_entries += 1;
            }
        }

        durable_sync(&file)
            .map_err(|e| StoreError::io_at(&temp_path, &e, "Checkpoint durable_sync failed"))?;
    }

    fs::rename(&temp_path, &final_path)
        .map_err(|e| StoreError::io_at(&final_path, &e, "Failed to install checkpoint segment"))?;
    sync_dir(&wal_dir).map_err(|e| StoreError::io_at(&wal_dir, &e, "Directory sync failed"))?;

    wal.switch_to(next_segment)?;

    let mut removed_segments = 0;
    for (seq, path) in list_segments(&wal_dir)? {
        if seq >= next_segment {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed_segments += 1,
            // Left behind segments replay harmlessly before the checkpoint
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove old WAL segment"),
        }
    }
    sync_dir(&wal_dir).map_err(|e| StoreError::io_at(&wal_dir, &e, "Directory sync failed"))?;

    info!(
        segment = next_segment,
        live_entries,
        removed_segments,
        bytes = bytes_written,
        "WAL checkpoint installed"
    );

    Ok(CheckpointResult { segment: final_path, live_entries, removed_segments, bytes_written })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::wal::WalReader;
    use tempfile::TempDir;

    #[test]
    fn test_rewrite_keeps_only_live_state() {
        let temp = TempDir::new().unwrap();
        let mut wal = WalWriter::new(temp.path(), 1, Config::default()).unwrap();
        for i in 0..10u8 {
            wal.append(Namespace::Content, Operation::Put, &[i], b"old").unwrap();
        }

        let mut content = HashMap::new();
        content.insert(vec![9u8], b"new".to_vec());
        let mut meta = HashMap::new();
        meta.insert(b"newest".to_vec(), vec![9u8]);

        let result = rewrite_wal(&mut wal, &content, &meta).unwrap();
        assert_eq!(result.live_entries, 2);
        assert_eq!(result.removed_segments, 1);
        assert_eq!(wal.segment(), 1);

        let records = WalReader::new(temp.path()).recover().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.lsn > 10));
        assert!(records.iter().any(|r| r.namespace == Namespace::Meta));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let mut wal = WalWriter::new(temp.path(), 1, Config::default()).unwrap();
        rewrite_wal(&mut wal, &HashMap::new(), &HashMap::new()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".compact"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
