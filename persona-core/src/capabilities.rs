//! Capability traits for person persistence and enrichment.
//!
//! Each store operation is its own trait so callers can depend on exactly the
//! capability they use. [`PersonRepository`] is the union, implemented for
//! every type that has all five.

use async_trait::async_trait;

use crate::error::PersonaResult;
use crate::filter::PersonFilter;
use crate::identity::Identity;
use crate::person::{Person, PersonalMetaData};

#[async_trait]
pub trait PersonSaver: Send + Sync {
    /// Persist a new person. Fails with a unique violation if the id exists.
    async fn save(&self, person: &Person) -> PersonaResult<()>;
}

#[async_trait]
pub trait PersonFinder: Send + Sync {
    /// Look up a person by id.
    ///
    /// An unknown id is not an error: the result is `Person::default()`.
    async fn find_by_id(&self, id: &str) -> PersonaResult<Person>;
}

#[async_trait]
pub trait PersonCollector: Send + Sync {
    /// List persons matching `filter`, ordered by id.
    ///
    /// `limit` and `offset` are applied only when positive; an offset has
    /// no effect without a limit.
    async fn collect(
        &self,
        filter: &PersonFilter,
        limit: i64,
        offset: i64,
    ) -> PersonaResult<Vec<Person>>;
}

#[async_trait]
pub trait PersonUpdater: Send + Sync {
    /// Overwrite the present fields of `meta` for `id`.
    ///
    /// Updating an unknown id succeeds and changes nothing.
    async fn update(&self, id: &str, meta: &PersonalMetaData) -> PersonaResult<()>;
}

#[async_trait]
pub trait PersonDeleter: Send + Sync {
    /// Remove a person. Deleting an unknown id succeeds.
    async fn delete(&self, id: &str) -> PersonaResult<()>;
}

/// A full person store.
pub trait PersonRepository:
    PersonSaver + PersonFinder + PersonCollector + PersonUpdater + PersonDeleter
{
}

impl<T> PersonRepository for T where
    T: PersonSaver + PersonFinder + PersonCollector + PersonUpdater + PersonDeleter
{
}

/// Creates persons from a bare identity, enriching them along the way.
#[async_trait]
pub trait PersonCreator: Send + Sync {
    /// Returns the id of the stored person.
    async fn create_from(&self, identity: &Identity) -> PersonaResult<String>;
}

/// Lookup of personal metadata by first name.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn age_by_name(&self, name: &str) -> PersonaResult<i32>;
    async fn gender_by_name(&self, name: &str) -> PersonaResult<String>;
    async fn nation_by_name(&self, name: &str) -> PersonaResult<String>;
}

#[async_trait]
impl<T: PersonSaver + ?Sized> PersonSaver for std::sync::Arc<T> {
    async fn save(&self, person: &Person) -> PersonaResult<()> {
        (**self).save(person).await
    }
}

#[async_trait]
impl<T: PersonFinder + ?Sized> PersonFinder for std::sync::Arc<T> {
    async fn find_by_id(&self, id: &str) -> PersonaResult<Person> {
        (**self).find_by_id(id).await
    }
}

#[async_trait]
impl<T: PersonCollector + ?Sized> PersonCollector for std::sync::Arc<T> {
    async fn collect(
        &self,
        filter: &PersonFilter,
        limit: i64,
        offset: i64,
    ) -> PersonaResult<Vec<Person>> {
        (**self).collect(filter, limit, offset).await
    }
}

#[async_trait]
impl<T: PersonUpdater + ?Sized> PersonUpdater for std::sync::Arc<T> {
    async fn update(&self, id: &str, meta: &PersonalMetaData) -> PersonaResult<()> {
        (**self).update(id, meta).await
    }
}

#[async_trait]
impl<T: PersonDeleter + ?Sized> PersonDeleter for std::sync::Arc<T> {
    async fn delete(&self, id: &str) -> PersonaResult<()> {
        (**self).delete(id).await
    }
}

#[async_trait]
impl<T: PersonCreator + ?Sized> PersonCreator for std::sync::Arc<T> {
    async fn create_from(&self, identity: &Identity) -> PersonaResult<String> {
        (**self).create_from(identity).await
    }
}

#[async_trait]
impl<T: MetadataProvider + ?Sized> MetadataProvider for std::sync::Arc<T> {
    async fn age_by_name(&self, name: &str) -> PersonaResult<i32> {
        (**self).age_by_name(name).await
    }

    async fn gender_by_name(&self, name: &str) -> PersonaResult<String> {
        (**self).gender_by_name(name).await
    }

    async fn nation_by_name(&self, name: &str) -> PersonaResult<String> {
        (**self).nation_by_name(name).await
    }
}
