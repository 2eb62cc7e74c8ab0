//! In-memory durable store.
//!
//! Same observable contract as the Postgres adapter: id uniqueness, the
//! non-negative age check, id-ordered listing and no-op update/delete of
//! unknown ids. Used in tests and for running without a database.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use persona_core::{
    Person, PersonCollector, PersonDeleter, PersonFilter, PersonFinder, PersonSaver,
    PersonUpdater, PersonaResult, PersonalMetaData, StorageError, ValidationError,
};

#[derive(Debug, Default)]
pub struct InMemoryPersonStore {
    rows: RwLock<BTreeMap<String, Person>>,
}

impl InMemoryPersonStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned(operation: &'static str) -> StorageError {
    StorageError::OperationFailed {
        operation,
        reason: "lock poisoned".to_string(),
    }
}

#[async_trait]
impl PersonSaver for InMemoryPersonStore {
    async fn save(&self, person: &Person) -> PersonaResult<()> {
        if person.meta.age < 0 {
            return Err(StorageError::CheckViolation {
                column: "age".to_string(),
            }
            .into());
        }
        let mut rows = self.rows.write().map_err(|_| poisoned("persons.save"))?;
        if rows.contains_key(&person.id) {
            return Err(StorageError::UniqueViolation {
                column: "id".to_string(),
            }
            .into());
        }
        rows.insert(person.id.clone(), person.clone());
        Ok(())
    }
}

#[async_trait]
impl PersonFinder for InMemoryPersonStore {
    async fn find_by_id(&self, id: &str) -> PersonaResult<Person> {
        let rows = self
            .rows
            .read()
            .map_err(|_| poisoned("persons.find_by_id"))?;
        Ok(rows.get(id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl PersonCollector for InMemoryPersonStore {
    async fn collect(
        &self,
        filter: &PersonFilter,
        limit: i64,
        offset: i64,
    ) -> PersonaResult<Vec<Person>> {
        let rows = self.rows.read().map_err(|_| poisoned("persons.collect"))?;
        let matching = rows
            .values()
            .filter(|p| filter.matches(p.meta.age, &p.meta.gender, &p.meta.nation));

        let persons = if limit > 0 {
            let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
            let take = usize::try_from(limit).unwrap_or(usize::MAX);
            matching.skip(skip).take(take).cloned().collect()
        } else {
            matching.cloned().collect()
        };
        Ok(persons)
    }
}

#[async_trait]
impl PersonUpdater for InMemoryPersonStore {
    async fn update(&self, id: &str, meta: &PersonalMetaData) -> PersonaResult<()> {
        if meta.is_empty() {
            return Err(ValidationError::NoUpdateData.into());
        }
        let mut rows = self.rows.write().map_err(|_| poisoned("persons.update"))?;
        if let Some(person) = rows.get_mut(id) {
            person.meta.apply(meta);
        }
        Ok(())
    }
}

#[async_trait]
impl PersonDeleter for InMemoryPersonStore {
    async fn delete(&self, id: &str) -> PersonaResult<()> {
        let mut rows = self.rows.write().map_err(|_| poisoned("persons.delete"))?;
        rows.remove(id);
        Ok(())
    }
}
