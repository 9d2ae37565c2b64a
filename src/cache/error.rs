//! Error types for cache entry encoding and decoding

use thiserror::Error;

/// Reasons a cache entry cannot be written or read back
///
/// The cache manager treats every variant as a miss; the detail only reaches callers
/// that use the [`Serializer`](super::Serializer) directly.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Entry does not start with the `COQU` magic bytes
    #[error("Bad magic: not a coqu cache entry")]
    BadMagic,

    /// Input ended before a complete header or payload
    #[error("Truncated cache entry: {0}")]
    Truncated(&'static str),

    /// Entry written by a different format version
    #[error("Cache format version {found} does not match {expected}")]
    VersionMismatch {
        /// Version stored in the entry
        found: u64,
        /// Version this build reads and writes
        expected: u64,
    },

    /// Structurally invalid entry framing
    #[error("Malformed cache payload: {0}")]
    Malformed(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Program tree could not be encoded as MessagePack
    #[error("Cache encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// Payload is not a MessagePack program tree
    #[error("Cache decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl CacheError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        CacheError::Malformed(message.into())
    }
}
