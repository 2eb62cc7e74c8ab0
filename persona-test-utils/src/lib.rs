//! Persona Test Utilities
//!
//! Shared test infrastructure for the Persona workspace:
//! - Proptest generators for identities, persons, records and filters
//! - Mock metadata providers and person creators
//! - Fault-injecting store and cache doubles

pub use persona_core::{
    Identity, MetadataError, Person, PersonFilter, PersonaError, PersonaResult, PersonalMetaData,
    StorageError, ValidationError,
};
pub use persona_storage::{InMemoryCacheBackend, InMemoryPersonStore, Record};

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Persona types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// A valid name part: ASCII letters only.
    pub fn arb_name_part() -> impl Strategy<Value = String> {
        "[A-Za-z]{1,16}"
    }

    /// A name part with at least one character outside ASCII letters.
    pub fn arb_invalid_name_part() -> impl Strategy<Value = String> {
        ("[A-Za-z]{0,6}", "[0-9@ _.\\-]", "[A-Za-z]{0,6}").prop_map(|(a, bad, b)| a + &bad + &b)
    }

    /// A valid identity, with or without patronymic.
    pub fn arb_identity() -> impl Strategy<Value = Identity> {
        (
            arb_name_part(),
            arb_name_part(),
            prop_oneof![Just(String::new()), arb_name_part()],
        )
            .prop_map(|(name, surname, patronymic)| Identity {
                name,
                surname,
                patronymic,
            })
    }

    pub fn arb_nation() -> impl Strategy<Value = String> {
        "[A-Z]{2}"
    }

    pub fn arb_gender() -> impl Strategy<Value = String> {
        prop_oneof![Just("male".to_string()), Just("female".to_string())]
    }

    /// Fully populated metadata.
    pub fn arb_metadata() -> impl Strategy<Value = PersonalMetaData> {
        (arb_nation(), arb_gender(), 1i32..120).prop_map(|(nation, gender, age)| {
            PersonalMetaData {
                nation,
                gender,
                age,
            }
        })
    }

    /// Metadata with each field independently present or absent.
    pub fn arb_partial_metadata() -> impl Strategy<Value = PersonalMetaData> {
        (
            prop::option::of(arb_nation()),
            prop::option::of(arb_gender()),
            prop::option::of(1i32..120),
        )
            .prop_map(|(nation, gender, age)| PersonalMetaData {
                nation: nation.unwrap_or_default(),
                gender: gender.unwrap_or_default(),
                age: age.unwrap_or_default(),
            })
    }

    pub fn arb_person_id() -> impl Strategy<Value = String> {
        any::<[u8; 16]>().prop_map(|b| Uuid::from_bytes(b).to_string())
    }

    pub fn arb_person() -> impl Strategy<Value = Person> {
        (arb_person_id(), arb_identity(), arb_metadata()).prop_map(|(id, identity, meta)| Person {
            id,
            identity,
            meta,
        })
    }

    /// Records with arbitrary (including empty) text fields.
    pub fn arb_record() -> impl Strategy<Value = Record> {
        (
            arb_person_id(),
            ".{0,12}",
            ".{0,12}",
            prop_oneof![Just(String::new()), ".{1,12}"],
            ".{0,4}",
            ".{0,8}",
            any::<i32>(),
        )
            .prop_map(
                |(id, name, surname, patronymic, nation, gender, age)| Record {
                    id,
                    name,
                    surname,
                    patronymic,
                    nation,
                    gender,
                    age,
                },
            )
    }

    pub fn arb_filter() -> impl Strategy<Value = PersonFilter> {
        (
            prop::option::of(0i32..60),
            prop::option::of(20i32..120),
            prop::option::of(arb_gender()),
            prop::collection::vec(arb_nation(), 0..3),
        )
            .prop_map(|(older_than, younger_than, gender, nations)| PersonFilter {
                older_than,
                younger_than,
                gender,
                nations,
            })
    }
}

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

pub mod mocks {
    //! Deterministic stand-ins for external capabilities.

    use super::*;
    use async_trait::async_trait;
    use persona_core::{MetadataProvider, PersonCreator};

    /// Metadata provider answering every name with the same values.
    #[derive(Debug, Clone)]
    pub struct StaticMetadataProvider {
        meta: PersonalMetaData,
        failure: Option<MetadataError>,
    }

    impl StaticMetadataProvider {
        pub fn new(meta: PersonalMetaData) -> Self {
            Self {
                meta,
                failure: None,
            }
        }

        /// Every lookup fails with `err`.
        pub fn failing(err: MetadataError) -> Self {
            Self {
                meta: PersonalMetaData::default(),
                failure: Some(err),
            }
        }

        fn check(&self) -> PersonaResult<()> {
            match &self.failure {
                Some(err) => Err(err.clone().into()),
                None => Ok(()),
            }
        }
    }

    impl Default for StaticMetadataProvider {
        fn default() -> Self {
            Self::new(PersonalMetaData::new("RU", "male", 42))
        }
    }

    #[async_trait]
    impl MetadataProvider for StaticMetadataProvider {
        async fn age_by_name(&self, _name: &str) -> PersonaResult<i32> {
            self.check()?;
            Ok(self.meta.age)
        }

        async fn gender_by_name(&self, _name: &str) -> PersonaResult<String> {
            self.check()?;
            Ok(self.meta.gender.clone())
        }

        async fn nation_by_name(&self, _name: &str) -> PersonaResult<String> {
            self.check()?;
            Ok(self.meta.nation.clone())
        }
    }

    /// Person creator that records every identity it receives.
    ///
    /// Failures queued with [`RecordingCreator::fail_next`] are returned by
    /// the following calls, one per call, before recording resumes.
    #[derive(Debug, Default)]
    pub struct RecordingCreator {
        created: Mutex<Vec<Identity>>,
        failures: Mutex<VecDeque<PersonaError>>,
        attempts: Mutex<usize>,
    }

    impl RecordingCreator {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next(&self, err: impl Into<PersonaError>) {
            if let Ok(mut failures) = self.failures.lock() {
                failures.push_back(err.into());
            }
        }

        /// Identities that were created successfully, in call order.
        pub fn created(&self) -> Vec<Identity> {
            self.created.lock().map(|c| c.clone()).unwrap_or_default()
        }

        /// All calls, including failed ones.
        pub fn attempts(&self) -> usize {
            self.attempts.lock().map(|a| *a).unwrap_or(0)
        }
    }

    #[async_trait]
    impl PersonCreator for RecordingCreator {
        async fn create_from(&self, identity: &Identity) -> PersonaResult<String> {
            if let Ok(mut attempts) = self.attempts.lock() {
                *attempts += 1;
            }
            let failure = self.failures.lock().ok().and_then(|mut f| f.pop_front());
            if let Some(err) = failure {
                return Err(err);
            }
            if let Ok(mut created) = self.created.lock() {
                created.push(identity.clone());
            }
            Ok(persona_core::new_person_id())
        }
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

pub mod faults {
    //! Store and cache wrappers that fail or stall on demand.

    use super::*;
    use std::time::Duration;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use persona_core::{
        PersonCollector, PersonDeleter, PersonFinder, PersonSaver, PersonUpdater,
    };
    use persona_storage::{CacheBackend, CacheHash, CacheKey, CacheStats};

    /// Per-operation failure plan with call counting.
    #[derive(Debug, Default)]
    pub struct Faults {
        one_shot: Mutex<HashMap<&'static str, VecDeque<StorageError>>>,
        sticky: Mutex<HashMap<&'static str, StorageError>>,
        delays: Mutex<HashMap<&'static str, Duration>>,
        calls: Mutex<HashMap<&'static str, usize>>,
    }

    impl Faults {
        /// Fail the next call to `operation` with `err`.
        pub fn fail_next(&self, operation: &'static str, err: StorageError) {
            if let Ok(mut plan) = self.one_shot.lock() {
                plan.entry(operation).or_default().push_back(err);
            }
        }

        /// Fail every call to `operation` until [`Faults::clear`].
        pub fn fail_always(&self, operation: &'static str, err: StorageError) {
            if let Ok(mut plan) = self.sticky.lock() {
                plan.insert(operation, err);
            }
        }

        /// Hold every call to `operation` for `delay` before it runs.
        pub fn delay(&self, operation: &'static str, delay: Duration) {
            if let Ok(mut plan) = self.delays.lock() {
                plan.insert(operation, delay);
            }
        }

        pub fn clear(&self) {
            if let Ok(mut plan) = self.one_shot.lock() {
                plan.clear();
            }
            if let Ok(mut plan) = self.sticky.lock() {
                plan.clear();
            }
            if let Ok(mut plan) = self.delays.lock() {
                plan.clear();
            }
        }

        /// Number of calls to `operation` so far, failed or not.
        pub fn calls(&self, operation: &'static str) -> usize {
            self.calls
                .lock()
                .ok()
                .and_then(|c| c.get(operation).copied())
                .unwrap_or(0)
        }

        /// Count the call, wait out any delay, then apply the failure plan.
        pub(crate) async fn check(&self, operation: &'static str) -> PersonaResult<()> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls.entry(operation).or_default() += 1;
            }
            let delay = self
                .delays
                .lock()
                .ok()
                .and_then(|plan| plan.get(operation).copied());
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let queued = self
                .one_shot
                .lock()
                .ok()
                .and_then(|mut plan| plan.get_mut(operation).and_then(|q| q.pop_front()));
            if let Some(err) = queued {
                return Err(err.into());
            }
            let sticky = self
                .sticky
                .lock()
                .ok()
                .and_then(|plan| plan.get(operation).cloned());
            match sticky {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        }
    }

    /// [`InMemoryPersonStore`] with injectable failures.
    ///
    /// Operation names: `save`, `find_by_id`, `collect`, `update`, `delete`.
    #[derive(Debug, Default)]
    pub struct FlakyPersonStore {
        pub inner: InMemoryPersonStore,
        pub faults: Faults,
    }

    impl FlakyPersonStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl PersonSaver for FlakyPersonStore {
        async fn save(&self, person: &Person) -> PersonaResult<()> {
            self.faults.check("save").await?;
            self.inner.save(person).await
        }
    }

    #[async_trait]
    impl PersonFinder for FlakyPersonStore {
        async fn find_by_id(&self, id: &str) -> PersonaResult<Person> {
            self.faults.check("find_by_id").await?;
            self.inner.find_by_id(id).await
        }
    }

    #[async_trait]
    impl PersonCollector for FlakyPersonStore {
        async fn collect(
            &self,
            filter: &PersonFilter,
            limit: i64,
            offset: i64,
        ) -> PersonaResult<Vec<Person>> {
            self.faults.check("collect").await?;
            self.inner.collect(filter, limit, offset).await
        }
    }

    #[async_trait]
    impl PersonUpdater for FlakyPersonStore {
        async fn update(&self, id: &str, meta: &PersonalMetaData) -> PersonaResult<()> {
            self.faults.check("update").await?;
            self.inner.update(id, meta).await
        }
    }

    #[async_trait]
    impl PersonDeleter for FlakyPersonStore {
        async fn delete(&self, id: &str) -> PersonaResult<()> {
            self.faults.check("delete").await?;
            self.inner.delete(id).await
        }
    }

    /// [`InMemoryCacheBackend`] with injectable failures.
    ///
    /// Operation names: `get`, `put`, `patch`, `delete`.
    #[derive(Debug, Default)]
    pub struct FlakyCacheBackend {
        pub inner: InMemoryCacheBackend,
        pub faults: Faults,
    }

    impl FlakyCacheBackend {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl CacheBackend for FlakyCacheBackend {
        async fn get(
            &self,
            key: &CacheKey,
        ) -> PersonaResult<Option<(CacheHash, DateTime<Utc>)>> {
            self.faults.check("get").await?;
            self.inner.get(key).await
        }

        async fn put(
            &self,
            key: &CacheKey,
            fields: &CacheHash,
            cached_at: DateTime<Utc>,
        ) -> PersonaResult<()> {
            self.faults.check("put").await?;
            self.inner.put(key, fields, cached_at).await
        }

        async fn patch_existing(
            &self,
            key: &CacheKey,
            fields: &CacheHash,
            cached_at: DateTime<Utc>,
        ) -> PersonaResult<bool> {
            self.faults.check("patch").await?;
            self.inner.patch_existing(key, fields, cached_at).await
        }

        async fn delete(&self, key: &CacheKey) -> PersonaResult<bool> {
            self.faults.check("delete").await?;
            self.inner.delete(key).await
        }

        async fn stats(&self) -> PersonaResult<CacheStats> {
            self.inner.stats().await
        }
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    pub fn ivan() -> Identity {
        Identity {
            name: "Ivan".to_string(),
            surname: "Ivanov".to_string(),
            patronymic: "Ivanovich".to_string(),
        }
    }

    /// A person with the given id, age and nation.
    pub fn person_with(id: &str, age: i32, nation: &str) -> Person {
        Person {
            id: id.to_string(),
            identity: ivan(),
            meta: PersonalMetaData::new(nation, "male", age),
        }
    }

    pub fn transient_store_error() -> StorageError {
        StorageError::Unavailable {
            operation: "persons.save",
            reason: "connection refused".to_string(),
        }
    }
}
