//! Write-ahead log for the Ageline store
//!
//! Write ordering for every mutation:
//! 1. Encode the record (CRC32C over header fields + payload)
//! 2. Append it to the current segment
//! 3. `durable_sync` (SyncMode::Durable) or defer to an explicit `sync()`
//! 4. Return; only then does the engine touch its RAM tables
//!
//! Segments are named `wal-{seq:016x}.agl` and replayed in sequence order.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::{Config, SyncMode};
use crate::durability::durable_sync;
use crate::error::{StoreError, StoreResult};
use crate::format::{
    decode_record, encode_record, Namespace, Operation, WalRecord, HEADER_SIZE, MAGIC_ARRAY,
};
use crate::store::Version;

const SEGMENT_PREFIX: &str = "wal-";
const SEGMENT_SUFFIX: &str = ".agl";

/// Path of segment `seq` inside `wal_dir`.
pub fn segment_path(wal_dir: &Path, seq: u64) -> PathBuf {
    wal_dir.join(format!("{}{:016x}{}", SEGMENT_PREFIX, seq, SEGMENT_SUFFIX))
}

fn parse_segment_name(name: &str) -> Option<u64> {
    let hex = name.strip_prefix(SEGMENT_PREFIX)?.strip_suffix(SEGMENT_SUFFIX)?;
    u64::from_str_radix(hex, 16).ok()
}

/// All segments in `wal_dir`, sorted by sequence number.
pub fn list_segments(wal_dir: &Path) -> StoreResult<Vec<(u64, PathBuf)>> {
    let entries = std::fs::read_dir(wal_dir)
        .map_err(|e| StoreError::io_at(wal_dir, &e, "Failed to read WAL directory"))?;

    let mut segments = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| StoreError::io_at(wal_dir, &e, "Failed to read directory entry"))?;
        if let Some(seq) = entry.file_name().to_str().and_then(parse_segment_name) {
            segments.push((seq, entry.path()));
        }
    }
    segments.sort_by_key(|(seq, _)| *seq);
    Ok(segments)
}

fn open_append(path: &Path) -> StoreResult<(File, u64)> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| StoreError::io_at(path, &e, "Failed to open WAL segment"))?;
    let size = file
        .metadata()
        .map_err(|e| StoreError::io_at(path, &e, "Failed to stat WAL segment"))?
        .len();
    Ok((file, size))
}

/// Appends records to the current segment and hands out sequence numbers.
///
/// INVARIANT: `append` returns only after the record is in the segment
/// (and synced, in Durable mode). Callers update RAM after that.
pub struct WalWriter {
    file: File,
    path: PathBuf,
    size: u64,
    wal_dir: PathBuf,
    /// Segment sequence number of `file`
    segment: u64,
    /// LSN given to the next record
    next_lsn: u64,
    config: Config,
}

impl WalWriter {
    /// Open the highest existing segment (or segment 0) for appending.
    ///
    /// `next_lsn` must be one past the highest LSN seen during recovery.
    pub fn new<P: AsRef<Path>>(wal_dir: P, next_lsn: u64, config: Config) -> StoreResult<Self> {
        let wal_dir = wal_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&wal_dir)
            .map_err(|e| StoreError::io_at(&wal_dir, &e, "Failed to create WAL directory"))?;

        let segment = list_segments(&wal_dir)?.last().map(|(seq, _)| *seq).unwrap_or(0);
        let path = segment_path(&wal_dir, segment);
        let (file, size) = open_append(&path)?;

        Ok(Self { file, path, size, wal_dir, segment, next_lsn, config })
    }

    /// Encode and append one record.
    pub fn append(
        &mut self,
        namespace: Namespace,
        op: Operation,
        key: &[u8],
        value: &[u8],
    ) -> StoreResult<Version> {
        let lsn = self.next_lsn;
        let (bytes, checksum) = encode_record(lsn, namespace, op, key, value, &self.config)?;

        if self.size > 0 && self.size + bytes.len() as u64 > self.config.wal_rotation_size_bytes {
            self.rotate()?;
        }

        self.file
            .write_all(&bytes)
            .map_err(|e| StoreError::io_at(&self.path, &e, "WAL write failed"))?;

        if self.config.sync_mode == SyncMode::Durable {
            durable_sync(&self.file)
                .map_err(|e| StoreError::io_at(&self.path, &e, "WAL durable_sync failed"))?;
        }

        self.size += bytes.len() as u64;
        self.next_lsn += 1;
        Ok(Version { lsn, digest: checksum })
    }

    /// Sync the current segment without appending anything.
    pub fn sync(&self) -> StoreResult<()> {
        durable_sync(&self.file).map_err(|e| StoreError::io_at(&self.path, &e, "WAL sync failed"))
    }

    /// Seal the current segment and start `segment + 1`.
    fn rotate(&mut self) -> StoreResult<()> {
        self.sync()?;
        let next = self.segment + 1;
        self.switch_to(next)?;
        debug!(segment = next, "rotated WAL segment");
        Ok(())
    }

    /// Continue appending at segment `seq`, which may already hold data.
    pub(crate) fn switch_to(&mut self, seq: u64) -> StoreResult<()> {
        let path = segment_path(&self.wal_dir, seq);
        let (file, size) = open_append(&path)?;
        self.file = file;
        self.path = path;
        self.size = size;
        self.segment = seq;
        Ok(())
    }

    /// Reserve an LSN without writing (used by checkpoints that encode records themselves).
    pub(crate) fn take_lsn(&mut self) -> u64 {
        let lsn = self.next_lsn;
        self.next_lsn += 1;
        lsn
    }

    pub fn current_path(&self) -> &Path {
        &self.path
    }

    pub fn current_size(&self) -> u64 {
        self.size
    }

    pub fn segment(&self) -> u64 {
        self.segment
    }

    pub fn wal_dir(&self) -> &Path {
        &self.wal_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Replays segments in sequence order.
pub struct WalReader {
    wal_dir: PathBuf,
}

impl WalReader {
    pub fn new<P: AsRef<Path>>(wal_dir: P) -> Self {
        Self { wal_dir: wal_dir.as_ref().to_path_buf() }
    }

    /// Recover every readable record from every segment.
    ///
    /// Per segment:
    /// 1. Check magic at the cursor; on mismatch, scan to the next magic
    /// 2. If the declared length runs past EOF, stop (crash point)
    /// 3. Decode + verify CRC; on failure, resync at the next magic
    pub fn recover(&self) -> StoreResult<Vec<WalRecord>> {
        let mut records = Vec::new();
        for (_, path) in list_segments(&self.wal_dir)? {
            records.extend(self.recover_segment(&path)?);
        }
        Ok(records)
    }

    fn recover_segment(&self, path: &Path) -> StoreResult<Vec<WalRecord>> {
        let mut buffer = Vec::new();
        File::open(path)
            .and_then(|mut f| f.read_to_end(&mut buffer))
            .map_err(|e| StoreError::io_at(path, &e, "Failed to read WAL segment"))?;

        let mut records = Vec::new();
        let mut offset = 0;

        while offset + HEADER_SIZE <= buffer.len() {
            if buffer[offset..offset + 4] != MAGIC_ARRAY {
                warn!(path = %path.display(), offset, "bad magic in WAL, scanning for next record");
                match find_next_magic(&buffer, offset + 1) {
                    Some(next) => {
                        offset = next;
                        continue;
                    }
                    None => break,
                }
            }

            let length = u32::from_le_bytes([
                buffer[offset + 4], buffer[offset + 5],
                buffer[offset + 6], buffer[offset + 7],
            ]) as usize;
            let total = HEADER_SIZE + length;

            if offset + total > buffer.len() {
                warn!(
                    path = %path.display(), offset,
                    needed = total, available = buffer.len() - offset,
                    "torn write at WAL tail"
                );
                break;
            }

            match decode_record(&buffer[offset..offset + total]) {
                Ok(record) => {
                    records.push(record);
                    offset += total;
                }
                Err(e) => {
                    warn!(path = %path.display(), offset, error = %e, "corrupt WAL record skipped");
                    match find_next_magic(&buffer, offset + 1) {
                        Some(next) => {
                            offset = next;
                            continue;
                        }
                        None => break,
                    }
                }
            }
        }

        Ok(records)
    }
}

/// Scan forward for the next occurrence of the record magic.
fn find_next_magic(buffer: &[u8], start: usize) -> Option<usize> {
    buffer
        .windows(4)
        .skip(start)
        .position(|w| w == MAGIC_ARRAY)
        .map(|pos| pos + start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn writer(dir: &Path) -> WalWriter {
        WalWriter::new(dir, 1, Config::default()).unwrap()
    }

    #[test]
    fn test_write_then_recover() {
        let temp = TempDir::new().unwrap();
        let mut w = writer(temp.path());
        let v1 = w.append(Namespace::Content, Operation::Put, b"key1", b"value1").unwrap();
        let v2 = w.append(Namespace::Meta, Operation::Put, b"oldest", b"key1").unwrap();
        w.append(Namespace::Content, Operation::Delete, b"key1", b"").unwrap();
        drop(w);

        assert_eq!(v1.lsn, 1);
        assert_eq!(v2.lsn, 2);

        let records = WalReader::new(temp.path()).recover().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].key, b"key1");
        assert_eq!(records[1].namespace, Namespace::Meta);
        assert_eq!(records[2].operation, Operation::Delete);
        assert_eq!(records[2].lsn, 3);
    }

    #[test]
    fn test_corruption_skips_bad_record() {
        let temp = TempDir::new().unwrap();
        let mut w = writer(temp.path());
        w.append(Namespace::Content, Operation::Put, b"good1", b"val1").unwrap();
        let first_len = w.current_size() as usize;
        w.append(Namespace::Content, Operation::Put, b"good2", b"val2").unwrap();
        w.append(Namespace::Content, Operation::Put, b"good3", b"val3").unwrap();
        let path = w.current_path().to_path_buf();
        drop(w);

        // Flip a payload byte inside the second record
        let mut data = std::fs::read(&path).unwrap();
        data[first_len + HEADER_SIZE + 2] ^= 0xFF;
        std::fs::write(&path, data).unwrap();

        let records = WalReader::new(temp.path()).recover().unwrap();
        let keys: Vec<_> = records.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![b"good1".to_vec(), b"good3".to_vec()]);
    }

    #[test]
    fn test_torn_tail_stops_cleanly() {
        let temp = TempDir::new().unwrap();
        let mut w = writer(temp.path());
        w.append(Namespace::Content, Operation::Put, b"complete", b"entry").unwrap();
        let path = w.current_path().to_path_buf();
        drop(w);

        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(&MAGIC_ARRAY);
        data.extend_from_slice(&[0xFF, 0x00, 0x00, 0x00]);
        data.extend_from_slice(&[0u8; HEADER_SIZE]);
        std::fs::write(&path, data).unwrap();

        let records = WalReader::new(temp.path()).recover().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, b"complete");
    }

    #[test]
    fn test_rotation_creates_new_segment() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.wal_rotation_size_bytes = 64 * 1024;
        let mut w = WalWriter::new(temp.path(), 1, config).unwrap();

        let value = vec![7u8; 20 * 1024];
        for i in 0..8u8 {
            w.append(Namespace::Content, Operation::Put, &[i], &value).unwrap();
        }
        assert!(w.segment() > 0);
        drop(w);

        let segments = list_segments(temp.path()).unwrap();
        assert!(segments.len() > 1);
        let records = WalReader::new(temp.path()).recover().unwrap();
        assert_eq!(records.len(), 8);
        assert!(records.windows(2).all(|p| p[0].lsn < p[1].lsn));
    }

    #[test]
    fn test_resume_appends_to_highest_segment() {
        let temp = TempDir::new().unwrap();
        {
            let mut w = writer(temp.path());
            w.switch_to(3).unwrap();
            w.append(Namespace::Content, Operation::Put, b"a", b"1").unwrap();
        }
        let w = writer(temp.path());
        assert_eq!(w.segment(), 3);
        assert!(w.current_size() > 0);
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();
        assert!(WalReader::new(temp.path()).recover().unwrap().is_empty());
    }

    #[test]
    fn test_segment_naming() {
        let temp = TempDir::new().unwrap();
        let w = writer(temp.path());
        let name = w.current_path().file_name().unwrap().to_str().unwrap().to_string();
        assert_eq!(name, "wal-0000000000000000.agl");
        assert_eq!(parse_segment_name(&name), Some(0));
        assert_eq!(parse_segment_name("wal-zz.agl"), None);
    }
}
