//! Persisted node record and its byte codec.
//!
//! Record layout (little-endian):
//!
//! ```text
//! [0..4]   magic "ALNK"
//! [4]      format version
//! [5]      flags: bit0 = next present, bit1 = prev present
//! [6..10]  CRC32C of bytes [10..]
//! [10..18] last_modified u64
//! [..]     next_len u16 + next   (if bit0)
//! [..]     prev_len u16 + prev   (if bit1)
//! [..]     value_len u32 + value
//! ```

use crate::error::{IndexError, IndexResult};

const NODE_MAGIC: [u8; 4] = *b"ALNK";
const NODE_VERSION: u8 = 1;
const FLAG_NEXT: u8 = 0b01;
const FLAG_PREV: u8 = 0b10;
const FIXED_LEN: usize = 18;
const CHECKSUM_START: usize = 10;

/// One entry of the chain.
///
/// `next` points toward the more recently written neighbour, `prev` toward
/// the less recently written one. Both are store keys, never references.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedNode {
    pub next: Option<Vec<u8>>,
    pub prev: Option<Vec<u8>>,
    pub value: Vec<u8>,
    /// Logical clock reading at the last successful put
    pub last_modified: u64,
}

impl LinkedNode {
    /// A node not yet linked into any chain.
    pub fn detached(value: Vec<u8>, last_modified: u64) -> Self {
        Self { next: None, prev: None, value, last_modified }
    }

    /// Deterministic encoding; equal nodes always produce equal bytes.
    pub fn encode(&self) -> IndexResult<Vec<u8>> {
        let mut flags = 0u8;
        let mut body = Vec::with_capacity(
            8 + self.value.len() + 4
                + self.next.as_ref().map_or(0, |k| k.len() + 2)
                + self.prev.as_ref().map_or(0, |k| k.len() + 2),
        );
        body.extend_from_slice(&self.last_modified.to_le_bytes());

        if let Some(next) = &self.next {
            flags |= FLAG_NEXT;
            put_link(&mut body, next, "next")?;
        }
        if let Some(prev) = &self.prev {
            flags |= FLAG_PREV;
            put_link(&mut body, prev, "prev")?;
        }

        let value_len = u32::try_from(self.value.len()).map_err(|_| IndexError::Encode {
            reason: format!("value of {} bytes exceeds u32 length field", self.value.len()),
        })?;
        body.extend_from_slice(&value_len.to_le_bytes());
        body.extend_from_slice(&self.value);

        let mut out = Vec::with_capacity(CHECKSUM_START + body.len());
        out.extend_from_slice(&NODE_MAGIC);
        out.push(NODE_VERSION);
        out.push(flags);
        out.extend_from_slice(&crc32c::crc32c(&body).to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Inverse of [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> IndexResult<Self> {
        Self::decode_for(&[], bytes)
    }

    /// Decode, attributing any failure to the store key the bytes came from.
    pub(crate) fn decode_for(key: &[u8], bytes: &[u8]) -> IndexResult<Self> {
        decode_inner(bytes).map_err(|reason| IndexError::Decode { key: key.to_vec(), reason })
    }
}

fn put_link(body: &mut Vec<u8>, key: &[u8], which: &str) -> IndexResult<()> {
    if key.is_empty() {
        return Err(IndexError::Encode { reason: format!("{} link is an empty key", which) });
    }
    let len = u16::try_from(key.len()).map_err(|_| IndexError::Encode {
        reason: format!("{} link of {} bytes exceeds u16 length field", which, key.len()),
    })?;
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(key);
    Ok(())
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8], String> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len()).ok_or_else(|| {
            format!(
                "truncated {} at offset {}: need {} bytes, have {}",
                what,
                self.pos,
                n,
                self.buf.len() - self.pos
            )
        })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn link(&mut self, what: &str) -> Result<Vec<u8>, String> {
        let len = self.take(2, what)?;
        let len = u16::from_le_bytes([len[0], len[1]]) as usize;
        if len == 0 {
            return Err(format!("{} link is an empty key", what));
        }
        Ok(self.take(len, what)?.to_vec())
    }
}

fn decode_inner(bytes: &[u8]) -> Result<LinkedNode, String> {
    if bytes.len() < FIXED_LEN {
        return Err(format!("record too short: {} bytes, need at least {}", bytes.len(), FIXED_LEN));
    }
    if bytes[0..4] != NODE_MAGIC {
        return Err(format!("bad magic {:02x?}", &bytes[0..4]));
    }
    if bytes[4] != NODE_VERSION {
        return Err(format!("unsupported record version {}", bytes[4]));
    }
    let flags = bytes[5];
    if flags & !(FLAG_NEXT | FLAG_PREV) != 0 {
        return Err(format!("unknown flags 0x{:02x}", flags));
    }

    let stored = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
    let actual = crc32c::crc32c(&bytes[CHECKSUM_START..]);
    if stored != actual {
        return Err(format!("checksum mismatch: expected 0x{:08x}, got 0x{:08x}", stored, actual));
    }

    let mut cur = Cursor { buf: bytes, pos: CHECKSUM_START };
    let ts = cur.take(8, "last_modified")?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(ts);
    let last_modified = u64::from_le_bytes(raw);

    let next = if flags & FLAG_NEXT != 0 { Some(cur.link("next")?) } else { None };
    let prev = if flags & FLAG_PREV != 0 { Some(cur.link("prev")?) } else { None };

    let len = cur.take(4, "value length")?;
    let value_len = u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize;
    let value = cur.take(value_len, "value")?.to_vec();

    if cur.pos != bytes.len() {
        return Err(format!("{} trailing bytes after value", bytes.len() - cur.pos));
    }

    Ok(LinkedNode { next, prev, value, last_modified })
}
