//! Cache backend trait and statistics.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use persona_core::{PersonaResult, StorageError};

use super::key::CacheKey;
use crate::record::CacheHash;

/// Hash-valued key/value cache.
///
/// Values are field maps with hash-set semantics: writes merge fields into
/// whatever is already stored. There is no expiry or eviction; entries stay
/// until deleted.
///
/// A missing key is `Ok(None)`, never an error.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read the full hash and when it was last written.
    async fn get(&self, key: &CacheKey) -> PersonaResult<Option<(CacheHash, DateTime<Utc>)>>;

    /// Merge `fields` into the hash at `key`, creating it if absent.
    async fn put(
        &self,
        key: &CacheKey,
        fields: &CacheHash,
        cached_at: DateTime<Utc>,
    ) -> PersonaResult<()>;

    /// Merge `fields` only if a hash already exists at `key`.
    ///
    /// Returns whether the entry existed. Used for partial updates, where
    /// creating a hash from a subset of fields would leave a truncated
    /// entry behind.
    async fn patch_existing(
        &self,
        key: &CacheKey,
        fields: &CacheHash,
        cached_at: DateTime<Utc>,
    ) -> PersonaResult<bool>;

    /// Remove the entry. Returns whether it existed.
    async fn delete(&self, key: &CacheKey) -> PersonaResult<bool>;

    async fn stats(&self) -> PersonaResult<CacheStats>;
}

#[async_trait]
impl<T: CacheBackend + ?Sized> CacheBackend for std::sync::Arc<T> {
    async fn get(&self, key: &CacheKey) -> PersonaResult<Option<(CacheHash, DateTime<Utc>)>> {
        (**self).get(key).await
    }

    async fn put(
        &self,
        key: &CacheKey,
        fields: &CacheHash,
        cached_at: DateTime<Utc>,
    ) -> PersonaResult<()> {
        (**self).put(key, fields, cached_at).await
    }

    async fn patch_existing(
        &self,
        key: &CacheKey,
        fields: &CacheHash,
        cached_at: DateTime<Utc>,
    ) -> PersonaResult<bool> {
        (**self).patch_existing(key, fields, cached_at).await
    }

    async fn delete(&self, key: &CacheKey) -> PersonaResult<bool> {
        (**self).delete(key).await
    }

    async fn stats(&self) -> PersonaResult<CacheStats> {
        (**self).stats().await
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Build a cache error tagged with the failing operation.
pub(crate) fn cache_error(operation: &'static str, reason: impl ToString) -> StorageError {
    StorageError::Cache {
        operation,
        reason: reason.to_string(),
    }
}
