//! Service-level errors.
//!
//! Store, cache and lookup failures stay [`PersonaError`]s all the way up.
//! [`ServiceError`] only adds what can go wrong while wiring the process
//! together.

use persona_core::{ConfigError, PersonaError};
use persona_ingest::BrokerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Persona(#[from] PersonaError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServiceError {
    pub fn database_error(message: impl Into<String>) -> Self {
        ServiceError::Database(message.into())
    }

    pub fn telemetry_error(message: impl Into<String>) -> Self {
        ServiceError::Telemetry(message.into())
    }
}

impl From<persona_storage::LmdbCacheError> for ServiceError {
    fn from(err: persona_storage::LmdbCacheError) -> Self {
        ServiceError::Cache(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;
    use persona_core::ValidationError;

    #[test]
    fn test_persona_errors_pass_through_unchanged() {
        let err: ServiceError = PersonaError::from(ValidationError::EmptyId).into();
        assert_eq!(err.to_string(), "Validation error: empty id");
    }

    #[test]
    fn test_config_errors_name_the_field() {
        let err: ServiceError = ConfigError::MissingRequired {
            field: "PERSONA_KAFKA_BROKERS".to_string(),
        }
        .into();
        assert!(err.to_string().contains("PERSONA_KAFKA_BROKERS"));
    }
}
