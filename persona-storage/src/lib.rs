//! Persona Storage - Codec, Queries and Cache-Aside Store
//!
//! - [`record`]: lossless Person <-> Record <-> cache hash mapping
//! - [`query`]: parameterized SQL for the `persons` table
//! - [`cache`]: hash cache backends (LMDB, in-memory)
//! - [`cached`]: the cache-aside store over any durable [`PersonRepository`]
//! - [`memory_store`]: in-memory durable store
//!
//! The Postgres adapter lives in `persona-service`.
//!
//! [`PersonRepository`]: persona_core::PersonRepository

pub mod cache;
pub mod cached;
pub mod memory_store;
pub mod query;
pub mod record;

pub use cache::{
    CacheBackend, CacheKey, CacheStats, InMemoryCacheBackend, LmdbCacheBackend, LmdbCacheError,
};
pub use cached::{CachedPersonStore, DEFAULT_CACHE_TIMEOUT};
pub use memory_store::InMemoryPersonStore;
pub use query::{collect_statement, update_statement, QueryArg, Statement};
pub use record::{meta_patch, CacheHash, Record};
