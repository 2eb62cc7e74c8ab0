use persona_service::db::{DbConfig, PgPersonStore};

pub async fn test_pg_store() -> PgPersonStore {
    let config = DbConfig::from_env();
    let store = PgPersonStore::from_config(&config).expect("Failed to create database pool");
    store
        .ensure_schema()
        .await
        .expect("Failed to create persons table");
    store
}
