//! Persona Service
//!
//! The outer layer of Persona: the PostgreSQL person store, the HTTP
//! metadata provider, the person manager that ties enrichment to storage,
//! configuration and tracing setup. The `persona-service` binary (feature
//! `kafka`) wires them to the Kafka ingestion pipeline.

pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod telemetry;

pub use config::{CacheBackendKind, CacheSettings, ServiceConfig};
pub use db::{DbConfig, PgPersonStore};
pub use error::{ServiceError, ServiceResult};
pub use manager::PersonManager;
pub use metadata::{HttpMetadataProvider, MetadataConfig};
pub use telemetry::{init_tracing, TelemetryConfig};
