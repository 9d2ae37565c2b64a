//! Persistent cache of parsed program trees.
//!
//! - [`serializer`]: `COQU` header around a versioned MessagePack program tree
//! - [`manager`]: content-hash keyed files, counters and eviction

pub mod error;
pub mod manager;
pub mod serializer;

pub use error::CacheError;
pub use manager::{CacheManager, CacheStats, CachedEntry, CACHE_EXTENSION};
pub use serializer::{Serializer, FORMAT_VERSION, MAGIC};
