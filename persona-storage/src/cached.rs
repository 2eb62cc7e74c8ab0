//! Cache-aside person store.
//!
//! [`CachedPersonStore`] puts a hash cache in front of a durable store:
//!
//! - `save` writes the cache first, then the store; a store failure removes
//!   the cache entry again.
//! - `find_by_id` serves from cache, falling back to the store and
//!   repopulating the cache on a durable hit.
//! - `collect` always goes to the store.
//! - `update` writes the store, then patches the cached hash if there is one.
//! - `delete` removes the cache entry first and aborts if that fails.
//!
//! The two writes are not atomic. A crash between a failed durable insert
//! and the cache rollback leaves an entry in the cache that the store does
//! not have.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use persona_core::{
    Person, PersonCollector, PersonDeleter, PersonFilter, PersonFinder, PersonRepository,
    PersonSaver, PersonUpdater, PersonaError, PersonaResult, PersonalMetaData, StorageError,
    ValidationError,
};
use tokio::sync::RwLock;

use crate::cache::{CacheBackend, CacheKey, CacheStats};
use crate::record::{meta_patch, Record};

/// Default deadline for a single cache call.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(2);

pub struct CachedPersonStore<D, C> {
    db: D,
    cache: C,
    /// Readers: find_by_id, collect. Writers: save, update, delete.
    lock: RwLock<()>,
    cache_timeout: Duration,
}

impl<D, C> CachedPersonStore<D, C>
where
    D: PersonRepository,
    C: CacheBackend,
{
    pub fn new(db: D, cache: C) -> Self {
        Self {
            db,
            cache,
            lock: RwLock::new(()),
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
        }
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    pub fn db(&self) -> &D {
        &self.db
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub async fn cache_stats(&self) -> PersonaResult<CacheStats> {
        self.cache.stats().await
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> PersonaResult<T>
    where
        F: Future<Output = PersonaResult<T>>,
    {
        match tokio::time::timeout(self.cache_timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StorageError::Timeout { operation }.into()),
        }
    }
}

/// Reduce an error to its storage part for [`StorageError::RollbackFailed`].
fn into_storage(err: PersonaError, operation: &'static str) -> StorageError {
    match err {
        PersonaError::Storage(e) => e,
        PersonaError::Context { source, .. } => into_storage(*source, operation),
        other => StorageError::OperationFailed {
            operation,
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl<D, C> PersonSaver for CachedPersonStore<D, C>
where
    D: PersonRepository,
    C: CacheBackend,
{
    async fn save(&self, person: &Person) -> PersonaResult<()> {
        let _guard = self.lock.write().await;
        let key = CacheKey::person(&person.id);

        self.bounded(
            "cache.put",
            self.cache.put(&key, &Record::from(person).to_hash(), Utc::now()),
        )
        .await?;

        if let Err(err) = self.db.save(person).await {
            tracing::warn!(person_id = %person.id, error = %err, "durable save failed, rolling back cache entry");
            if let Err(rollback) = self.bounded("cache.delete", self.cache.delete(&key)).await {
                tracing::error!(person_id = %person.id, error = %rollback, "cache rollback failed");
                return Err(StorageError::RollbackFailed {
                    original: Box::new(into_storage(err, "persons.save")),
                    rollback: Box::new(into_storage(rollback, "cache.delete")),
                }
                .into());
            }
            return Err(err);
        }

        tracing::debug!(person_id = %person.id, "person saved");
        Ok(())
    }
}

#[async_trait]
impl<D, C> PersonFinder for CachedPersonStore<D, C>
where
    D: PersonRepository,
    C: CacheBackend,
{
    async fn find_by_id(&self, id: &str) -> PersonaResult<Person> {
        let _guard = self.lock.read().await;
        let key = CacheKey::person(id);

        if let Some((hash, _)) = self.bounded("cache.get", self.cache.get(&key)).await? {
            tracing::trace!(person_id = %id, "cache hit");
            return Ok(Record::from_hash(&hash)?.into());
        }

        let person = self.db.find_by_id(id).await?;
        if person.is_empty() {
            tracing::trace!(person_id = %id, "person not found");
            return Ok(person);
        }

        // Concurrent misses may both populate; they write the same row.
        self.bounded(
            "cache.put",
            self.cache.put(&key, &Record::from(&person).to_hash(), Utc::now()),
        )
        .await?;
        tracing::trace!(person_id = %id, "cache populated from store");
        Ok(person)
    }
}

#[async_trait]
impl<D, C> PersonCollector for CachedPersonStore<D, C>
where
    D: PersonRepository,
    C: CacheBackend,
{
    async fn collect(
        &self,
        filter: &PersonFilter,
        limit: i64,
        offset: i64,
    ) -> PersonaResult<Vec<Person>> {
        let _guard = self.lock.read().await;
        self.db.collect(filter, limit, offset).await
    }
}

#[async_trait]
impl<D, C> PersonUpdater for CachedPersonStore<D, C>
where
    D: PersonRepository,
    C: CacheBackend,
{
    async fn update(&self, id: &str, meta: &PersonalMetaData) -> PersonaResult<()> {
        if meta.is_empty() {
            return Err(ValidationError::NoUpdateData.into());
        }
        let _guard = self.lock.write().await;

        self.db.update(id, meta).await?;

        let patched = self
            .bounded(
                "cache.patch",
                self.cache
                    .patch_existing(&CacheKey::person(id), &meta_patch(meta), Utc::now()),
            )
            .await?;
        tracing::debug!(person_id = %id, cache_patched = patched, "person updated");
        Ok(())
    }
}

#[async_trait]
impl<D, C> PersonDeleter for CachedPersonStore<D, C>
where
    D: PersonRepository,
    C: CacheBackend,
{
    async fn delete(&self, id: &str) -> PersonaResult<()> {
        let _guard = self.lock.write().await;

        self.bounded("cache.delete", self.cache.delete(&CacheKey::person(id)))
            .await?;
        self.db.delete(id).await?;

        tracing::debug!(person_id = %id, "person deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheBackend;
    use crate::memory_store::InMemoryPersonStore;
    use persona_core::Identity;
    use std::sync::Arc;

    type Store = CachedPersonStore<Arc<InMemoryPersonStore>, Arc<InMemoryCacheBackend>>;

    fn store() -> (Store, Arc<InMemoryPersonStore>, Arc<InMemoryCacheBackend>) {
        let db = Arc::new(InMemoryPersonStore::new());
        let cache = Arc::new(InMemoryCacheBackend::new());
        (CachedPersonStore::new(db.clone(), cache.clone()), db, cache)
    }

    fn person(name: &str, age: i32) -> Person {
        Person::new(
            Identity::new(name, "Ivanov", "").unwrap(),
            PersonalMetaData::new("RU", "male", age),
        )
    }

    #[tokio::test]
    async fn test_save_writes_cache_and_store() {
        let (store, db, cache) = store();
        let p = person("Ivan", 30);
        store.save(&p).await.unwrap();

        assert_eq!(db.find_by_id(&p.id).await.unwrap(), p);
        assert!(cache.get(&CacheKey::person(&p.id)).await.unwrap().is_some());
        assert_eq!(store.find_by_id(&p.id).await.unwrap(), p);
    }

    #[tokio::test]
    async fn test_failed_save_rolls_back_cache() {
        let (store, db, cache) = store();
        let p = person("Ivan", 30);
        db.save(&p).await.unwrap();

        let err = store.save(&p).await.unwrap_err();
        assert!(matches!(
            err,
            PersonaError::Storage(StorageError::UniqueViolation { .. })
        ));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_find_miss_populates_cache() {
        let (store, db, cache) = store();
        let p = person("Ivan", 30);
        db.save(&p).await.unwrap();
        assert!(cache.is_empty());

        assert_eq!(store.find_by_id(&p.id).await.unwrap(), p);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_find_unknown_is_empty_and_not_cached() {
        let (store, _db, cache) = store();
        let found = store.find_by_id("nope").await.unwrap();
        assert!(found.is_empty());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_update_patches_cached_hash() {
        let (store, db, _cache) = store();
        let p = person("Ivan", 30);
        store.save(&p).await.unwrap();

        store
            .update(&p.id, &PersonalMetaData::new("", "", 25))
            .await
            .unwrap();

        let cached = store.find_by_id(&p.id).await.unwrap();
        let durable = db.find_by_id(&p.id).await.unwrap();
        assert_eq!(cached.meta, PersonalMetaData::new("RU", "male", 25));
        assert_eq!(cached, durable);
    }

    #[tokio::test]
    async fn test_empty_update_is_rejected() {
        let (store, _db, _cache) = store();
        for meta in [PersonalMetaData::default(), PersonalMetaData::new("", "", -5)] {
            let err = store.update("any", &meta).await.unwrap_err();
            assert_eq!(err, PersonaError::Validation(ValidationError::NoUpdateData));
        }
    }

    #[tokio::test]
    async fn test_delete_removes_both() {
        let (store, db, cache) = store();
        let p = person("Ivan", 30);
        store.save(&p).await.unwrap();

        store.delete(&p.id).await.unwrap();
        assert!(cache.is_empty());
        assert!(db.is_empty());
        assert!(store.find_by_id(&p.id).await.unwrap().is_empty());
    }
}
