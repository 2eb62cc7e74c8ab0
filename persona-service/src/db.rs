//! PostgreSQL Person Store
//!
//! Connection pooling with deadpool-postgres and the relational adapter for
//! the `persons` table. Statements come from `persona_storage::query`; this
//! module only executes them, maps rows back to persons and classifies
//! driver errors into [`StorageError`]s.
//!
//! Writes run in a REPEATABLE READ transaction that commits on success and
//! rolls back when dropped. Every operation is bounded by the configured
//! operation timeout, connection checkout included.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Object, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime,
};
use persona_core::{
    Person, PersonCollector, PersonDeleter, PersonFilter, PersonFinder, PersonSaver,
    PersonUpdater, PersonaResult, PersonalMetaData, StorageError, ValidationError,
};
use persona_storage::query::{
    self, CREATE_PERSONS_TABLE, DELETE_PERSON, INSERT_PERSON, SELECT_PERSON_BY_ID,
};
use persona_storage::{QueryArg, Record, Statement};
use tokio_postgres::error::{DbError, SqlState};
use tokio_postgres::types::ToSql;
use tokio_postgres::{IsolationLevel, NoTls, Row};

use crate::constants::{
    DEFAULT_DB_HOST, DEFAULT_DB_NAME, DEFAULT_DB_OPERATION_TIMEOUT_SECS, DEFAULT_DB_POOL_SIZE,
    DEFAULT_DB_POOL_TIMEOUT_SECS, DEFAULT_DB_PORT, DEFAULT_DB_USER,
};
use crate::error::{ServiceError, ServiceResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait for a pooled connection
    pub timeout: Duration,
    /// Deadline for one store operation
    pub operation_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DB_HOST.to_string(),
            port: DEFAULT_DB_PORT,
            dbname: DEFAULT_DB_NAME.to_string(),
            user: DEFAULT_DB_USER.to_string(),
            password: String::new(),
            max_size: DEFAULT_DB_POOL_SIZE,
            timeout: Duration::from_secs(DEFAULT_DB_POOL_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_DB_OPERATION_TIMEOUT_SECS),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// - `PERSONA_DB_HOST`, `PERSONA_DB_PORT`, `PERSONA_DB_NAME`,
    ///   `PERSONA_DB_USER`, `PERSONA_DB_PASSWORD`
    /// - `PERSONA_DB_POOL_SIZE` (default: 16)
    /// - `PERSONA_DB_TIMEOUT`: pool wait in seconds (default: 30)
    /// - `PERSONA_DB_OPERATION_TIMEOUT`: per-operation seconds (default: 5)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("PERSONA_DB_HOST").unwrap_or(defaults.host),
            port: env_parse("PERSONA_DB_PORT").unwrap_or(defaults.port),
            dbname: std::env::var("PERSONA_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("PERSONA_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("PERSONA_DB_PASSWORD").unwrap_or_default(),
            max_size: env_parse("PERSONA_DB_POOL_SIZE").unwrap_or(defaults.max_size),
            timeout: env_parse("PERSONA_DB_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            operation_timeout: env_parse("PERSONA_DB_OPERATION_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.operation_timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ServiceResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size.max(1));
        pool_cfg.timeouts.wait = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ServiceError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

/// Column a constraint guards, from Postgres' default constraint names
/// (`persons_pkey`, `persons_age_check`, `persons_name_key`).
fn constraint_column(db: &DbError) -> String {
    if let Some(column) = db.column() {
        return column.to_string();
    }
    let Some(constraint) = db.constraint() else {
        return "unknown".to_string();
    };
    let name = constraint
        .strip_prefix(db.table().unwrap_or("persons"))
        .map(|rest| rest.trim_start_matches('_'))
        .unwrap_or(constraint);
    match name {
        "pkey" => "id".to_string(),
        other => other
            .strip_suffix("_check")
            .or_else(|| other.strip_suffix("_key"))
            .unwrap_or(other)
            .to_string(),
    }
}

fn classify(operation: &'static str, err: tokio_postgres::Error) -> StorageError {
    if let Some(db) = err.as_db_error() {
        if *db.code() == SqlState::UNIQUE_VIOLATION {
            return StorageError::UniqueViolation {
                column: constraint_column(db),
            };
        }
        if *db.code() == SqlState::CHECK_VIOLATION {
            return StorageError::CheckViolation {
                column: constraint_column(db),
            };
        }
        if *db.code() == SqlState::QUERY_CANCELED {
            return StorageError::Timeout { operation };
        }
    }
    if err.is_closed() {
        return StorageError::Unavailable {
            operation,
            reason: err.to_string(),
        };
    }
    StorageError::OperationFailed {
        operation,
        reason: err.to_string(),
    }
}

fn classify_pool(operation: &'static str, err: PoolError) -> StorageError {
    match err {
        PoolError::Timeout(_) => StorageError::Timeout { operation },
        other => StorageError::Unavailable {
            operation,
            reason: other.to_string(),
        },
    }
}

fn params(args: &[QueryArg]) -> Vec<&(dyn ToSql + Sync)> {
    args.iter()
        .map(|arg| match arg {
            QueryArg::Int(v) => v as &(dyn ToSql + Sync),
            QueryArg::BigInt(v) => v as &(dyn ToSql + Sync),
            QueryArg::Text(v) => v as &(dyn ToSql + Sync),
        })
        .collect()
}

fn person_from_row(row: &Row) -> Result<Person, StorageError> {
    let codec = |e: tokio_postgres::Error| StorageError::Codec {
        reason: e.to_string(),
    };
    Ok(Record {
        id: row.try_get("id").map_err(codec)?,
        name: row.try_get("name").map_err(codec)?,
        surname: row.try_get("surname").map_err(codec)?,
        patronymic: row.try_get("patronymic").map_err(codec)?,
        nation: row.try_get("nation").map_err(codec)?,
        gender: row.try_get("gender").map_err(codec)?,
        age: row.try_get("age").map_err(codec)?,
    }
    .into())
}

// ============================================================================
// POSTGRES PERSON STORE
// ============================================================================

/// Durable person store over a deadpool-postgres pool.
#[derive(Clone)]
pub struct PgPersonStore {
    pool: Pool,
    operation_timeout: Duration,
}

impl PgPersonStore {
    pub fn new(pool: Pool, operation_timeout: Duration) -> Self {
        Self {
            pool,
            operation_timeout,
        }
    }

    /// Create a store with its own pool.
    pub fn from_config(config: &DbConfig) -> ServiceResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool, config.operation_timeout))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    /// Create the `persons` table if it does not exist.
    pub async fn ensure_schema(&self) -> PersonaResult<()> {
        const OP: &str = "persons.ensure_schema";
        self.bounded(OP, async {
            let conn = self.conn(OP).await?;
            conn.batch_execute(CREATE_PERSONS_TABLE)
                .await
                .map_err(|e| classify(OP, e))
        })
        .await?;
        tracing::info!("persons schema ready");
        Ok(())
    }

    async fn conn(&self, operation: &'static str) -> Result<Object, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| classify_pool(operation, e))
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, StorageError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| StorageError::Timeout { operation })?
    }

    /// Run one write statement in a REPEATABLE READ transaction.
    async fn write(
        &self,
        operation: &'static str,
        sql: &str,
        args: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, StorageError> {
        self.bounded(operation, async {
            let mut conn = self.conn(operation).await?;
            let tx = conn
                .build_transaction()
                .isolation_level(IsolationLevel::RepeatableRead)
                .start()
                .await
                .map_err(|e| classify(operation, e))?;
            let affected = tx
                .execute(sql, args)
                .await
                .map_err(|e| classify(operation, e))?;
            tx.commit().await.map_err(|e| classify(operation, e))?;
            Ok(affected)
        })
        .await
    }
}

#[async_trait]
impl PersonSaver for PgPersonStore {
    async fn save(&self, person: &Person) -> PersonaResult<()> {
        let record = Record::from(person);
        self.write(
            "persons.save",
            INSERT_PERSON,
            &[
                &record.id,
                &record.name,
                &record.surname,
                &record.patronymic,
                &record.nation,
                &record.gender,
                &record.age,
            ],
        )
        .await?;
        tracing::debug!(person_id = %person.id, "Person inserted");
        Ok(())
    }
}

#[async_trait]
impl PersonFinder for PgPersonStore {
    async fn find_by_id(&self, id: &str) -> PersonaResult<Person> {
        const OP: &str = "persons.find_by_id";
        let person = self
            .bounded(OP, async {
                let conn = self.conn(OP).await?;
                let row = conn
                    .query_opt(SELECT_PERSON_BY_ID, &[&id])
                    .await
                    .map_err(|e| classify(OP, e))?;
                match row {
                    Some(row) => person_from_row(&row),
                    None => Ok(Person::default()),
                }
            })
            .await?;
        Ok(person)
    }
}

#[async_trait]
impl PersonCollector for PgPersonStore {
    async fn collect(
        &self,
        filter: &PersonFilter,
        limit: i64,
        offset: i64,
    ) -> PersonaResult<Vec<Person>> {
        const OP: &str = "persons.collect";
        let Statement { sql, args } = query::collect_statement(filter, limit, offset);
        let persons = self
            .bounded(OP, async {
                let conn = self.conn(OP).await?;
                let rows = conn
                    .query(sql.as_str(), &params(&args))
                    .await
                    .map_err(|e| classify(OP, e))?;
                rows.iter().map(person_from_row).collect::<Result<Vec<_>, _>>()
            })
            .await?;
        Ok(persons)
    }
}

#[async_trait]
impl PersonUpdater for PgPersonStore {
    async fn update(&self, id: &str, meta: &PersonalMetaData) -> PersonaResult<()> {
        let Some(Statement { sql, args }) = query::update_statement(id, meta) else {
            return Err(ValidationError::NoUpdateData.into());
        };
        let affected = self.write("persons.update", &sql, &params(&args)).await?;
        tracing::debug!(person_id = %id, affected, "Person updated");
        Ok(())
    }
}

#[async_trait]
impl PersonDeleter for PgPersonStore {
    async fn delete(&self, id: &str) -> PersonaResult<()> {
        let affected = self.write("persons.delete", DELETE_PERSON, &[&id]).await?;
        tracing::debug!(person_id = %id, affected, "Person deleted");
        Ok(())
    }
}
