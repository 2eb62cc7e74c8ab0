//! Persona Ingest - Event-Stream Ingestion
//!
//! Reads name triples from an event stream, creates persons through a
//! [`PersonCreator`], and dead-letters everything that fails to an error
//! stream.
//!
//! - [`message`]: wire formats of the inbound and error streams
//! - [`broker`]: [`EventSource`] / [`ErrorSink`] seams
//! - [`pipeline`]: the three-stage pipeline
//! - [`memory`]: in-process adapters
//! - `kafka`: Kafka adapters (feature `kafka`)
//!
//! [`PersonCreator`]: persona_core::PersonCreator

pub mod broker;
pub mod config;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod message;
pub mod pipeline;

pub use broker::{BrokerError, ErrorSink, EventSource, RawMessage};
pub use config::IngestConfig;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaErrorSink, KafkaEventSource};
pub use memory::{EventFeed, InMemoryErrorSink, InMemoryEventSource};
pub use message::{FioErrorMessage, FioMessage};
pub use pipeline::{IngestMetrics, IngestPipeline, IngestSnapshot};
