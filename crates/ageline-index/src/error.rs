//! Error types for the ordered index.

use ageline_core::StoreError;
use thiserror::Error;

/// Index error types.
///
/// `NotFound` and `Decode` are distinct on purpose: a missing node is a
/// normal outcome, a node that exists but cannot be read is damage.
#[derive(Debug, Clone, Error)]
pub enum IndexError {
    /// No node stored under this key
    #[error("key not found: {}", hex(.key))]
    NotFound { key: Vec<u8> },

    /// Empty key passed where a node key is required
    #[error("invalid key: node keys must be non-empty")]
    InvalidKey,

    /// Stored bytes are not a valid node record
    #[error("failed to decode node {}: {reason}", hex(.key))]
    Decode { key: Vec<u8>, reason: String },

    /// Node cannot be represented in the record format
    #[error("failed to encode node: {reason}")]
    Encode { reason: String },

    /// Chain verification found a broken link
    #[error("corrupt chain at {}: {reason}", hex(.key))]
    CorruptChain { key: Vec<u8>, reason: String },

    /// Error surfaced by the backing store
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl IndexError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexError::NotFound { .. })
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Result type alias for index operations
pub type IndexResult<T> = Result<T, IndexError>;
