//! In-process cache backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use persona_core::PersonaResult;

use super::key::CacheKey;
use super::traits::{cache_error, CacheBackend, CacheStats};
use crate::record::CacheHash;

/// HashMap-backed cache for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<CacheKey, (CacheHash, DateTime<Utc>)>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, for assertions in tests.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn merge(
        &self,
        key: &CacheKey,
        fields: &CacheHash,
        cached_at: DateTime<Utc>,
        create: bool,
        operation: &'static str,
    ) -> PersonaResult<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| cache_error(operation, e))?;

        match entries.get_mut(key) {
            Some((hash, at)) => {
                hash.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                *at = cached_at;
                Ok(true)
            }
            None if create => {
                entries.insert(key.clone(), (fields.clone(), cached_at));
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn get(&self, key: &CacheKey) -> PersonaResult<Option<(CacheHash, DateTime<Utc>)>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| cache_error("cache.get", e))?;
        let found = entries.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn put(
        &self,
        key: &CacheKey,
        fields: &CacheHash,
        cached_at: DateTime<Utc>,
    ) -> PersonaResult<()> {
        self.merge(key, fields, cached_at, true, "cache.put")
            .map(|_| ())
    }

    async fn patch_existing(
        &self,
        key: &CacheKey,
        fields: &CacheHash,
        cached_at: DateTime<Utc>,
    ) -> PersonaResult<bool> {
        self.merge(key, fields, cached_at, false, "cache.patch")
    }

    async fn delete(&self, key: &CacheKey) -> PersonaResult<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| cache_error("cache.delete", e))?;
        Ok(entries.remove(key).is_some())
    }

    async fn stats(&self) -> PersonaResult<CacheStats> {
        let entries = self
            .entries
            .read()
            .map_err(|e| cache_error("cache.stats", e))?;
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count: entries.len() as u64,
        })
    }
}
