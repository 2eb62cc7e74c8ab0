//! Service Configuration
//!
//! Every section loads from `PERSONA_*` environment variables with defaults
//! for local development. [`ServiceConfig::validate`] checks the settings
//! the service cannot start without.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use persona_core::ConfigError;
use persona_ingest::IngestConfig;
use persona_storage::{CacheBackend, InMemoryCacheBackend, LmdbCacheBackend};

use crate::constants::{DEFAULT_CACHE_MAX_SIZE_MB, DEFAULT_CACHE_PATH, DEFAULT_CACHE_TIMEOUT_MS};
use crate::db::DbConfig;
use crate::error::ServiceResult;
use crate::metadata::MetadataConfig;
use crate::telemetry::TelemetryConfig;

// ============================================================================
// CACHE SETTINGS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    /// Persistent LMDB environment on local disk
    Lmdb,
    /// Process memory, lost on restart
    Memory,
}

impl std::str::FromStr for CacheBackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lmdb" => Ok(CacheBackendKind::Lmdb),
            "memory" => Ok(CacheBackendKind::Memory),
            other => Err(ConfigError::InvalidValue {
                field: "PERSONA_CACHE_BACKEND".to_string(),
                value: other.to_string(),
                reason: "expected lmdb or memory".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    pub path: PathBuf,
    pub max_size_mb: usize,
    /// Deadline for one cache call
    pub timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Lmdb,
            path: PathBuf::from(DEFAULT_CACHE_PATH),
            max_size_mb: DEFAULT_CACHE_MAX_SIZE_MB,
            timeout: Duration::from_millis(DEFAULT_CACHE_TIMEOUT_MS),
        }
    }
}

impl CacheSettings {
    /// - `PERSONA_CACHE_BACKEND`: lmdb | memory (default: lmdb)
    /// - `PERSONA_CACHE_PATH` (default: ./data/cache)
    /// - `PERSONA_CACHE_MAX_SIZE_MB` (default: 256)
    /// - `PERSONA_CACHE_TIMEOUT_MS` (default: 2000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let backend = match std::env::var("PERSONA_CACHE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.backend,
        };
        Ok(Self {
            backend,
            path: std::env::var("PERSONA_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: std::env::var("PERSONA_CACHE_MAX_SIZE_MB")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size_mb),
            timeout: std::env::var("PERSONA_CACHE_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.timeout),
        })
    }

    /// Open the configured backend.
    pub fn open(&self) -> ServiceResult<Arc<dyn CacheBackend>> {
        let backend: Arc<dyn CacheBackend> = match self.backend {
            CacheBackendKind::Lmdb => {
                Arc::new(LmdbCacheBackend::new(&self.path, self.max_size_mb)?)
            }
            CacheBackendKind::Memory => Arc::new(InMemoryCacheBackend::new()),
        };
        tracing::info!(backend = ?self.backend, path = %self.path.display(), "Cache opened");
        Ok(backend)
    }
}

// ============================================================================
// SERVICE CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db: DbConfig,
    pub cache: CacheSettings,
    pub metadata: MetadataConfig,
    pub ingest: IngestConfig,
    pub telemetry: TelemetryConfig,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            db: DbConfig::from_env(),
            cache: CacheSettings::from_env()?,
            metadata: MetadataConfig::from_env(),
            ingest: IngestConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_size_mb == 0 {
            return Err(ConfigError::InvalidValue {
                field: "PERSONA_CACHE_MAX_SIZE_MB".to_string(),
                value: "0".to_string(),
                reason: "cache map size must be positive".to_string(),
            });
        }
        self.metadata.validate()?;
        self.ingest.validate()
    }
}
