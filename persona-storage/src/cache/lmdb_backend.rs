//! LMDB-backed cache implementation.
//!
//! Uses the heed crate (Rust bindings for LMDB) as a memory-mapped,
//! process-local key-value store for person hashes.
//!
//! # Value Format
//!
//! `[cached_at millis: 8 bytes LE][json field map]`
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `put`, `patch_existing` and `delete`, so a
//!   read-merge-write of one hash is atomic
//! - Hit/miss statistics are tracked with atomic counters

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RwTxn};
use persona_core::PersonaResult;

use super::key::CacheKey;
use super::traits::{cache_error, CacheBackend, CacheStats};
use crate::record::CacheHash;

/// Error type for opening the LMDB environment.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbCacheError> for persona_core::PersonaError {
    fn from(e: LmdbCacheError) -> Self {
        persona_core::StorageError::Cache {
            operation: "cache.open",
            reason: e.to_string(),
        }
        .into()
    }
}

/// LMDB-backed person cache.
///
/// ```ignore
/// let backend = LmdbCacheBackend::new("/var/lib/persona/cache", 64)?;
/// backend.put(&CacheKey::person(&id), &record.to_hash(), Utc::now()).await?;
/// ```
pub struct LmdbCacheBackend {
    env: Env,
    db: Database<Bytes, Bytes>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LmdbCacheBackend {
    /// Create a new LMDB cache backend.
    ///
    /// * `path` - Directory where LMDB files will be stored (created if needed)
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbCacheError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    /// Read and decode an entry inside an open write transaction.
    fn read_in(
        &self,
        wtxn: &RwTxn<'_>,
        key: &CacheKey,
        operation: &'static str,
    ) -> PersonaResult<Option<CacheHash>> {
        let bytes = self
            .db
            .get(wtxn, key.encode())
            .map_err(|e| cache_error(operation, e))?;
        match bytes {
            Some(bytes) => Ok(Some(decode_value(bytes, operation)?.0)),
            None => Ok(None),
        }
    }

    /// Merge and write within a single write transaction.
    fn merge(
        &self,
        key: &CacheKey,
        fields: &CacheHash,
        cached_at: DateTime<Utc>,
        create: bool,
        operation: &'static str,
    ) -> PersonaResult<bool> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| cache_error(operation, e))?;

        let existing = self.read_in(&wtxn, key, operation)?;
        let existed = existing.is_some();
        if !existed && !create {
            // Dropping the transaction aborts it.
            return Ok(false);
        }

        let mut hash = existing.unwrap_or_default();
        hash.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        let value = encode_value(&hash, cached_at, operation)?;

        self.db
            .put(&mut wtxn, key.encode(), &value)
            .map_err(|e| cache_error(operation, e))?;
        wtxn.commit().map_err(|e| cache_error(operation, e))?;

        Ok(existed)
    }
}

fn encode_value(
    hash: &CacheHash,
    cached_at: DateTime<Utc>,
    operation: &'static str,
) -> PersonaResult<Vec<u8>> {
    let json = serde_json::to_vec(hash).map_err(|e| cache_error(operation, e))?;
    let mut bytes = Vec::with_capacity(8 + json.len());
    bytes.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(&json);
    Ok(bytes)
}

fn decode_value(
    bytes: &[u8],
    operation: &'static str,
) -> PersonaResult<(CacheHash, DateTime<Utc>)> {
    if bytes.len() < 8 {
        return Err(cache_error(operation, "truncated cache value").into());
    }
    let mut ts = [0u8; 8];
    ts.copy_from_slice(&bytes[0..8]);
    let cached_at =
        DateTime::from_timestamp_millis(i64::from_le_bytes(ts)).unwrap_or_else(Utc::now);
    let hash: CacheHash =
        serde_json::from_slice(&bytes[8..]).map_err(|e| cache_error(operation, e))?;
    Ok((hash, cached_at))
}

#[async_trait]
impl CacheBackend for LmdbCacheBackend {
    async fn get(&self, key: &CacheKey) -> PersonaResult<Option<(CacheHash, DateTime<Utc>)>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| cache_error("cache.get", e))?;

        match self.db.get(&rtxn, key.encode()) {
            Ok(Some(bytes)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                decode_value(bytes, "cache.get").map(Some)
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(e) => Err(cache_error("cache.get", e).into()),
        }
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
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| cache_error("cache.delete", e))?;

        let deleted = self
            .db
            .delete(&mut wtxn, key.encode())
            .map_err(|e| cache_error("cache.delete", e))?;

        wtxn.commit().map_err(|e| cache_error("cache.delete", e))?;
        Ok(deleted)
    }

    async fn stats(&self) -> PersonaResult<CacheStats> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| cache_error("cache.stats", e))?;
        let entry_count = self
            .db
            .len(&rtxn)
            .map_err(|e| cache_error("cache.stats", e))?;

        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
        })
    }
}
