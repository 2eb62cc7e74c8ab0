//! Constants for the Persona service
//!
//! Defaults for every `from_env` configuration in this crate.

// ============================================================================
// DATABASE
// ============================================================================

pub const DEFAULT_DB_HOST: &str = "localhost";

pub const DEFAULT_DB_PORT: u16 = 5432;

pub const DEFAULT_DB_NAME: &str = "persona";

pub const DEFAULT_DB_USER: &str = "postgres";

/// Maximum pooled connections
pub const DEFAULT_DB_POOL_SIZE: usize = 16;

/// Seconds to wait for a pooled connection
pub const DEFAULT_DB_POOL_TIMEOUT_SECS: u64 = 30;

/// Seconds allowed for one store operation, connection checkout included
pub const DEFAULT_DB_OPERATION_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// CACHE
// ============================================================================

pub const DEFAULT_CACHE_PATH: &str = "./data/cache";

/// LMDB map size in megabytes
pub const DEFAULT_CACHE_MAX_SIZE_MB: usize = 256;

/// Milliseconds allowed for one cache call
pub const DEFAULT_CACHE_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// METADATA LOOKUPS
// ============================================================================

pub const DEFAULT_AGIFY_URL: &str = "https://api.agify.io";

pub const DEFAULT_GENDERIZE_URL: &str = "https://api.genderize.io";

pub const DEFAULT_NATIONALIZE_URL: &str = "https://api.nationalize.io";

/// Seconds allowed for one lookup request
pub const DEFAULT_METADATA_TIMEOUT_SECS: u64 = 5;

/// Lookup requests per minute, shared by the three upstreams
pub const DEFAULT_METADATA_RATE_LIMIT: u32 = 600;

pub const DEFAULT_METADATA_BURST: u32 = 10;

pub const DEFAULT_METADATA_MAX_IDLE_CONNECTIONS: usize = 15;

// ============================================================================
// TELEMETRY
// ============================================================================

pub const DEFAULT_SERVICE_NAME: &str = "persona-service";

pub const DEFAULT_LOG_FILTER: &str = "persona=debug,info";
