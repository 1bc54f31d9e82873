//! Binary format for Ageline WAL records
//!
//! Every record is a fixed 32-byte header followed by a payload:
//! RecordHeader (32 bytes) + key_len(u16) + value_len(u32) + key_bytes + value_bytes
//!
//! The checksum covers header bytes [12..24] (operation, namespace, lsn) and
//! the whole payload, so a flipped namespace or sequence number is caught too.

use std::path::PathBuf;

use crate::config::Config;
use crate::error::{StoreError, StoreResult};

/// Magic bytes identifying Ageline WAL records: 'A','G','L','N'
pub const MAGIC_ARRAY: [u8; 4] = [0x41, 0x47, 0x4C, 0x4E];

/// Header size in bytes
pub const HEADER_SIZE: usize = 32;

/// key_len(2) + value_len(4)
const PAYLOAD_PREFIX: usize = 6;

/// WAL operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Operation {
    /// Insert or update a key-value pair
    Put = 1,
    /// Delete a key
    Delete = 2,
}

impl Operation {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Operation::Put),
            2 => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// Key space a record belongs to.
///
/// Content holds caller data; Meta holds a handful of reserved entries
/// (the index sentinels). The two never share keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Namespace {
    Content = 0,
    Meta = 1,
}

impl Namespace {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Namespace::Content),
            1 => Some(Namespace::Meta),
            _ => None,
        }
    }
}

/// Fixed-size header for each WAL record
///
/// Layout:
///   [0..4]   magic:     "AGLN"
///   [4..8]   length:    u32  - payload length in bytes
///   [8..12]  checksum:  u32  - CRC32C of [12..24] ++ payload
///   [12]     operation: u8
///   [13]     namespace: u8
///   [14..16] reserved:  must be zero
///   [16..24] lsn:       u64  - store-wide write sequence number
///   [24..32] padding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: [u8; 4],
    pub length: u32,
    pub checksum: u32,
    pub operation: u8,
    pub namespace: u8,
    pub lsn: u64,
}

impl RecordHeader {
    /// Serialize header to bytes for writing
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..8].copy_from_slice(&self.length.to_le_bytes());
        buf[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        buf[12] = self.operation;
        buf[13] = self.namespace;
        buf[16..24].copy_from_slice(&self.lsn.to_le_bytes());
        buf
    }

    /// Parse header from bytes
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        let mut lsn = [0u8; 8];
        lsn.copy_from_slice(&bytes[16..24]);

        Self {
            magic,
            length: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            checksum: u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            operation: bytes[12],
            namespace: bytes[13],
            lsn: u64::from_le_bytes(lsn),
        }
    }
}

/// A decoded WAL record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalRecord {
    pub lsn: u64,
    pub namespace: Namespace,
    pub operation: Operation,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    /// Checksum stored in the header, reused as the write's digest
    pub checksum: u32,
}

fn buffer_path() -> PathBuf {
    PathBuf::from("<buffer>")
}

fn record_checksum(header_bytes: &[u8; HEADER_SIZE], payload: &[u8]) -> u32 {
    let crc = crc32c::crc32c(&header_bytes[12..24]);
    crc32c::crc32c_append(crc, payload)
}

/// Check key and value sizes against the configured limits.
pub fn check_sizes(key: &[u8], value: &[u8], config: &Config) -> StoreResult<()> {
    if key.len() > config.max_key_size {
        return Err(StoreError::OversizedEntry {
            entry_size: key.len() as u64,
            max_size: config.max_key_size as u64,
            component: "key".to_string(),
        });
    }
    if value.len() > config.max_value_size {
        return Err(StoreError::OversizedEntry {
            entry_size: value.len() as u64,
            max_size: config.max_value_size as u64,
            component: "value".to_string(),
        });
    }
    Ok(())
}

/// Serialize one write into a complete WAL record.
///
/// Returns the record bytes and the checksum written into its header.
pub fn encode_record(
    lsn: u64,
    namespace: Namespace,
    op: Operation,
    key: &[u8],
    value: &[u8],
    config: &Config,
) -> StoreResult<(Vec<u8>, u32)> {
    // Sizes are validated before any allocation
    check_sizes(key, value, config)?;

    let payload_size = PAYLOAD_PREFIX + key.len() + value.len();
    let mut payload = Vec::with_capacity(payload_size);
    payload.extend_from_slice(&(key.len() as u16).to_le_bytes());
    payload.extend_from_slice(&(value.len() as u32).to_le_bytes());
    payload.extend_from_slice(key);
    payload.extend_from_slice(value);

    let mut header = RecordHeader {
        magic: MAGIC_ARRAY,
        length: payload.len() as u32,
        checksum: 0,
        operation: op as u8,
        namespace: namespace as u8,
        lsn,
    };
    header.checksum = record_checksum(&header.to_bytes(), &payload);

    let mut buffer = Vec::with_capacity(HEADER_SIZE + payload_size);
    buffer.extend_from_slice(&header.to_bytes());
    buffer.extend_from_slice(&payload);
    Ok((buffer, header.checksum))
}

/// Deserialize a WAL record from the start of `data`.
pub fn decode_record(data: &[u8]) -> StoreResult<WalRecord> {
    if data.len() < HEADER_SIZE {
        return Err(StoreError::WalCorrupted {
            path: buffer_path(),
            offset: 0,
            reason: format!(
                "Record too short: {} bytes, need at least {}",
                data.len(),
                HEADER_SIZE
            ),
        });
    }

    let mut header_bytes = [0u8; HEADER_SIZE];
    header_bytes.copy_from_slice(&data[..HEADER_SIZE]);
    let header = RecordHeader::from_bytes(&header_bytes);

    if header.magic != MAGIC_ARRAY {
        return Err(StoreError::NoMagicFound {
            path: buffer_path(),
            offset: 0,
            found_bytes: header.magic,
        });
    }

    let payload_end = HEADER_SIZE + header.length as usize;
    if data.len() < payload_end {
        return Err(StoreError::TornWrite {
            path: buffer_path(),
            expected_size: header.length,
            available_bytes: (data.len() - HEADER_SIZE) as u64,
            offset: HEADER_SIZE as u64,
        });
    }

    let payload = &data[HEADER_SIZE..payload_end];
    let computed = record_checksum(&header_bytes, payload);
    if computed != header.checksum {
        return Err(StoreError::ChecksumMismatch {
            path: buffer_path(),
            expected: header.checksum,
            actual: computed,
            offset: HEADER_SIZE as u64,
        });
    }

    let operation = Operation::from_byte(header.operation).ok_or_else(|| StoreError::WalCorrupted {
        path: buffer_path(),
        offset: 12,
        reason: format!("Invalid operation type: {}", header.operation),
    })?;
    let namespace = Namespace::from_byte(header.namespace).ok_or_else(|| StoreError::WalCorrupted {
        path: buffer_path(),
        offset: 13,
        reason: format!("Invalid namespace: {}", header.namespace),
    })?;

    if payload.len() < PAYLOAD_PREFIX {
        return Err(StoreError::WalCorrupted {
            path: buffer_path(),
            offset: HEADER_SIZE as u64,
            reason: "Payload too short for length fields".to_string(),
        });
    }

    let key_len = u16::from_le_bytes([payload[0], payload[1]]) as usize;
    let value_len = u32::from_le_bytes([payload[2], payload[3], payload[4], payload[5]]) as usize;
    let key_end = PAYLOAD_PREFIX + key_len;
    let value_end = key_end + value_len;

    if payload.len() != value_end {
        return Err(StoreError::WalCorrupted {
            path: buffer_path(),
            offset: HEADER_SIZE as u64,
            reason: format!(
                "Payload is {} bytes but key({}) + value({}) need {}",
                payload.len(), key_len, value_len, value_end
            ),
        });
    }

    Ok(WalRecord {
        lsn: header.lsn,
        namespace,
        operation,
        key: payload[PAYLOAD_PREFIX..key_end].to_vec(),
        value: payload[key_end..value_end].to_vec(),
        checksum: header.checksum,
    })
}
