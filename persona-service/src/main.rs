//! Persona Service Entry Point
//!
//! Bootstraps configuration and tracing, prepares the durable store and the
//! cache, and runs the Kafka ingestion pipeline until Ctrl-C.

use std::sync::Arc;

use persona_ingest::{IngestPipeline, KafkaErrorSink, KafkaEventSource};
use persona_service::{
    init_tracing, HttpMetadataProvider, PersonManager, PgPersonStore, ServiceConfig,
    ServiceResult,
};
use persona_storage::CachedPersonStore;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(&config.telemetry)?;
    config.validate()?;

    let db = PgPersonStore::from_config(&config.db)?;
    db.ensure_schema().await?;
    let cache = config.cache.open()?;
    let store = CachedPersonStore::new(db, cache).with_cache_timeout(config.cache.timeout);

    let metadata = HttpMetadataProvider::new(config.metadata.clone())?;
    let manager = Arc::new(PersonManager::new(store, metadata));

    let source = KafkaEventSource::connect(&config.ingest)?;
    let sink = KafkaErrorSink::connect(&config.ingest)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = IngestPipeline::spawn(
        &config.ingest,
        source,
        sink,
        manager.clone(),
        shutdown_rx,
    );
    tracing::info!(
        read_topic = %config.ingest.read_topic,
        error_topic = %config.ingest.error_topic,
        "Starting Persona ingest"
    );

    let mut join = std::pin::pin!(pipeline.join());
    let snapshot = tokio::select! {
        snapshot = &mut join => {
            tracing::warn!("Ingest pipeline stopped before shutdown was requested");
            snapshot
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown signal received");
            let _ = shutdown_tx.send(true);
            join.await
        }
    };

    let cache_stats = manager.repo().cache_stats().await?;
    tracing::info!(
        created = snapshot.created,
        errors_published = snapshot.errors_published,
        errors_dropped = snapshot.errors_dropped,
        cache_hits = cache_stats.hits,
        cache_misses = cache_stats.misses,
        cache_entries = cache_stats.entry_count,
        "Persona ingest stopped"
    );
    Ok(())
}
