#![cfg(feature = "db-tests")]
//! Property-Based Tests for the PostgreSQL Person Store
//!
//! **Property 1: Round trip**
//! save(p) then find_by_id(p.id) returns p, empty patronymic included.
//!
//! **Property 2: Constraints**
//! duplicate ids and negative ages are classified by column.
//!
//! Requires a reachable database configured through `PERSONA_DB_*`.

use persona_core::{
    Person, PersonCollector, PersonDeleter, PersonFilter, PersonFinder, PersonSaver,
    PersonUpdater, PersonaError, PersonalMetaData, StorageError,
};
use persona_service::PgPersonStore;
use persona_storage::{CachedPersonStore, InMemoryCacheBackend};
use persona_test_utils::fixtures::person_with;
use persona_test_utils::generators::arb_person;
use proptest::prelude::*;
use tokio::runtime::Runtime;

#[path = "support/db.rs"]
mod test_db_support;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

async fn test_store() -> PgPersonStore {
    test_db_support::test_pg_store().await
}

/// Ids unique to this run so tests can share one database.
fn unique_id(label: &str) -> String {
    format!("{}-{}", label, persona_core::new_person_id())
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_save_then_find_round_trips(person in arb_person()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let store = test_store().await;
            let person = Person {
                id: unique_id("prop"),
                ..person
            };
            store
                .save(&person)
                .await
                .map_err(|e| TestCaseError::fail(format!("save: {e}")))?;

            let found = store
                .find_by_id(&person.id)
                .await
                .map_err(|e| TestCaseError::fail(format!("find: {e}")))?;
            prop_assert_eq!(&found, &person);

            store
                .delete(&person.id)
                .await
                .map_err(|e| TestCaseError::fail(format!("delete: {e}")))?;
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// SCENARIO TESTS
// ============================================================================

#[tokio::test]
async fn test_duplicate_id_is_unique_violation() {
    let store = test_store().await;
    let person = person_with(&unique_id("dup"), 30, "RU");
    store.save(&person).await.unwrap();

    let err = store.save(&person).await.unwrap_err();
    assert_eq!(
        err,
        PersonaError::Storage(StorageError::UniqueViolation {
            column: "id".to_string()
        })
    );
    assert_eq!(err.to_string(), "Storage error: id unique violation");
    store.delete(&person.id).await.unwrap();
}

#[tokio::test]
async fn test_negative_age_is_check_violation() {
    let store = test_store().await;
    let person = person_with(&unique_id("neg"), -1, "RU");

    let err = store.save(&person).await.unwrap_err();
    assert_eq!(
        err,
        PersonaError::Storage(StorageError::CheckViolation {
            column: "age".to_string()
        })
    );
    assert!(store.find_by_id(&person.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_partial_update_and_delete() {
    let store = test_store().await;
    let person = person_with(&unique_id("upd"), 30, "RU");
    store.save(&person).await.unwrap();

    store
        .update(&person.id, &PersonalMetaData::new("", "", 25))
        .await
        .unwrap();
    let found = store.find_by_id(&person.id).await.unwrap();
    assert_eq!(found.meta, PersonalMetaData::new("RU", "male", 25));

    // Unknown ids are not an error.
    store
        .update("never-saved", &PersonalMetaData::new("KZ", "", 0))
        .await
        .unwrap();

    store.delete(&person.id).await.unwrap();
    assert!(store.find_by_id(&person.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_collect_filters_by_nation_and_age() {
    let store = test_store().await;
    let nation = format!("N{}", &persona_core::new_person_id()[..8]);
    let ids: Vec<String> = (0..4).map(|i| unique_id(&format!("col{i}"))).collect();
    for (i, id) in ids.iter().enumerate() {
        store
            .save(&person_with(id, 10 + 10 * i as i32, &nation))
            .await
            .unwrap();
    }

    let filter = PersonFilter::parse([
        "older-than.15".to_string(),
        "younger-than.40".to_string(),
        format!("nation.{nation}"),
    ])
    .unwrap();
    let got = store.collect(&filter, 0, 0).await.unwrap();
    let mut expected = vec![ids[1].clone(), ids[2].clone()];
    expected.sort();
    assert_eq!(got.into_iter().map(|p| p.id).collect::<Vec<_>>(), expected);

    let paged = store.collect(&filter, 1, 1).await.unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0].id, expected[1]);

    for id in &ids {
        store.delete(id).await.unwrap();
    }
}

#[tokio::test]
async fn test_cache_aside_over_postgres() {
    let store = CachedPersonStore::new(test_store().await, InMemoryCacheBackend::new());
    let person = person_with(&unique_id("cached"), 33, "RU");
    store.save(&person).await.unwrap();

    assert_eq!(store.find_by_id(&person.id).await.unwrap(), person);
    assert_eq!(store.db().find_by_id(&person.id).await.unwrap(), person);

    store.delete(&person.id).await.unwrap();
    assert!(store.db().find_by_id(&person.id).await.unwrap().is_empty());
}
