//! Error types for Persona operations

use thiserror::Error;

/// Storage layer errors (durable store and cache).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{column} unique violation")]
    UniqueViolation { column: String },

    #[error("{column} check violation")]
    CheckViolation { column: String },

    #[error("{operation}: deadline exceeded")]
    Timeout { operation: &'static str },

    #[error("{operation}: store unavailable: {reason}")]
    Unavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation}: {reason}")]
    OperationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("{operation}: cache: {reason}")]
    Cache {
        operation: &'static str,
        reason: String,
    },

    #[error("record codec: {reason}")]
    Codec { reason: String },

    /// The durable write failed and removing the eagerly written cache entry
    /// failed as well. Both errors are kept.
    #[error("{original}; cache rollback failed: {rollback}")]
    RollbackFailed {
        original: Box<StorageError>,
        rollback: Box<StorageError>,
    },
}

impl StorageError {
    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Timeout { .. } | StorageError::Unavailable { .. }
        )
    }
}

/// Validation errors for identities, filters and update payloads.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty required {field}")]
    EmptyField { field: &'static str },

    #[error("{field} contains invalid characters: {value}")]
    InvalidCharacters { field: &'static str, value: String },

    #[error("unsupported {token} filter")]
    UnsupportedFilter { token: String },

    #[error("filter parsing error: {token}")]
    MalformedFilter { token: String },

    #[error("empty id")]
    EmptyId,

    #[error("no data for update")]
    NoUpdateData,
}

/// Errors from the external metadata lookup.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("{provider}: request failed: {reason}")]
    RequestFailed {
        provider: &'static str,
        reason: String,
    },

    #[error("no {field} in response")]
    MissingField { field: &'static str },

    #[error("{provider}: deadline exceeded")]
    Timeout { provider: &'static str },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Persona errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersonaError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("{operation}: {source}")]
    Context {
        operation: &'static str,
        #[source]
        source: Box<PersonaError>,
    },
}

impl PersonaError {
    /// Wrap this error with the name of the operation that failed.
    pub fn context(self, operation: &'static str) -> Self {
        PersonaError::Context {
            operation,
            source: Box::new(self),
        }
    }

    /// Whether the underlying failure is a timeout or an unavailable
    /// dependency rather than a permanent fault.
    pub fn is_transient(&self) -> bool {
        match self {
            PersonaError::Storage(e) => e.is_transient(),
            PersonaError::Metadata(MetadataError::Timeout { .. }) => true,
            PersonaError::Context { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Whether the failure was caused by invalid input.
    pub fn is_validation(&self) -> bool {
        match self {
            PersonaError::Validation(_) => true,
            PersonaError::Context { source, .. } => source.is_validation(),
            _ => false,
        }
    }
}

/// Result type alias for Persona operations.
pub type PersonaResult<T> = Result<T, PersonaError>;

/// Extension for attaching operation context to results.
pub trait ResultExt<T> {
    fn context(self, operation: &'static str) -> PersonaResult<T>;
}

impl<T, E: Into<PersonaError>> ResultExt<T> for Result<T, E> {
    fn context(self, operation: &'static str) -> PersonaResult<T> {
        self.map_err(|e| e.into().context(operation))
    }
}

// =============================================================================
// TESTS
// =============================================================================
