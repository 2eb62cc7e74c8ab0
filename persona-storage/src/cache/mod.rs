//! Person cache layer.
//!
//! Cache entries are field hashes keyed by [`CacheKey`]. The layer has no
//! expiry and no eviction: entries are written and removed explicitly by the
//! cache-aside store.
//!
//! Two backends ship with the crate: [`LmdbCacheBackend`] (persistent,
//! memory-mapped) and [`InMemoryCacheBackend`].

pub mod key;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use key::CacheKey;
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory::InMemoryCacheBackend;
pub use traits::{CacheBackend, CacheStats};
