//! Pipeline Tests
//!
//! **Property: Conservation**
//! every fetched message is either created once or reported once.
//!
//! Scenario tests cover dead-lettering, publish retry, shutdown and
//! backpressure against the in-memory broker adapters.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use persona_core::{Identity, PersonCreator, PersonaResult};
use persona_ingest::{
    BrokerError, ErrorSink, IngestConfig, IngestPipeline, InMemoryErrorSink, InMemoryEventSource,
};
use persona_test_utils::fixtures::transient_store_error;
use persona_test_utils::generators::{arb_identity, arb_invalid_name_part};
use persona_test_utils::mocks::RecordingCreator;
use proptest::prelude::*;
use tokio::runtime::Runtime;
use tokio::sync::{watch, Semaphore};

// ============================================================================
// HELPERS
// ============================================================================

const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

fn payload(name: &str, surname: &str, patronymic: &str) -> Vec<u8> {
    serde_json::json!({
        "Name": name,
        "Surname": surname,
        "Patronymic": patronymic,
    })
    .to_string()
    .into_bytes()
}

fn identity_payload(identity: &Identity) -> Vec<u8> {
    payload(&identity.name, &identity.surname, &identity.patronymic)
}

/// Run a finite stream through a fresh pipeline and wait for it to drain.
async fn run_to_end(
    config: &IngestConfig,
    payloads: Vec<Vec<u8>>,
    creator: Arc<RecordingCreator>,
    sink: InMemoryErrorSink,
) -> persona_ingest::IngestSnapshot {
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let source = InMemoryEventSource::from_payloads(payloads);
    let pipeline = IngestPipeline::spawn(config, source, sink, creator, shutdown_rx);
    tokio::time::timeout(JOIN_TIMEOUT, pipeline.join())
        .await
        .expect("pipeline did not drain")
}

/// Creator that waits for a permit before each creation.
struct GatedCreator {
    gate: Arc<Semaphore>,
    calls: AtomicUsize,
}

#[async_trait]
impl PersonCreator for GatedCreator {
    async fn create_from(&self, _identity: &Identity) -> PersonaResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        Ok(persona_core::new_person_id())
    }
}

/// Sink whose first publish never completes.
#[derive(Clone, Default)]
struct StallingSink {
    calls: Arc<AtomicUsize>,
    delivered: Arc<AtomicUsize>,
}

#[async_trait]
impl ErrorSink for StallingSink {
    async fn publish(&mut self, _payload: &[u8]) -> Result<(), BrokerError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::future::pending::<()>().await;
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Sink whose every publish takes `delay` before it succeeds.
#[derive(Clone)]
struct SlowSink {
    delay: Duration,
    delivered: Arc<AtomicUsize>,
}

#[async_trait]
impl ErrorSink for SlowSink {
    async fn publish(&mut self, _payload: &[u8]) -> Result<(), BrokerError> {
        tokio::time::sleep(self.delay).await;
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        Ok(())
    }
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

#[derive(Debug, Clone)]
enum Inbound {
    Valid(Identity),
    InvalidName(String),
    Garbage(Vec<u8>),
}

fn arb_inbound() -> impl Strategy<Value = Inbound> {
    prop_oneof![
        3 => arb_identity().prop_map(Inbound::Valid),
        1 => arb_invalid_name_part().prop_map(Inbound::InvalidName),
        1 => prop::collection::vec(any::<u8>(), 0..8)
            .prop_filter("must not contain a JSON object", |b| !b.contains(&b'{'))
            .prop_map(Inbound::Garbage),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_every_message_is_created_or_reported(inbound in prop::collection::vec(arb_inbound(), 0..24)) {
        let rt = Runtime::new()
            .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))?;
        rt.block_on(async {
            let payloads: Vec<Vec<u8>> = inbound
                .iter()
                .map(|m| match m {
                    Inbound::Valid(identity) => identity_payload(identity),
                    Inbound::InvalidName(name) => payload(name, "Ivanov", ""),
                    Inbound::Garbage(bytes) => bytes.clone(),
                })
                .collect();
            let expected: Vec<Identity> = inbound
                .iter()
                .filter_map(|m| match m {
                    Inbound::Valid(identity) => Some(identity.clone()),
                    _ => None,
                })
                .collect();

            let creator = Arc::new(RecordingCreator::new());
            let sink = InMemoryErrorSink::new();
            let snapshot =
                run_to_end(&IngestConfig::testing(), payloads, creator.clone(), sink.clone()).await;

            prop_assert_eq!(snapshot.fetched as usize, inbound.len());
            prop_assert_eq!(creator.created(), expected.clone());
            prop_assert_eq!(sink.published().len(), inbound.len() - expected.len());
            prop_assert!(sink.is_closed());
            Ok::<(), TestCaseError>(())
        })?;
    }
}

// ============================================================================
// SCENARIO TESTS
// ============================================================================

#[tokio::test]
async fn test_malformed_message_is_dead_lettered() {
    let creator = Arc::new(RecordingCreator::new());
    let sink = InMemoryErrorSink::new();
    let payloads = vec![
        b"{not json".to_vec(),
        payload("Iv4n", "Ivanov", ""),
        payload("Ivan", "Ivanov", "Ivanovich"),
    ];

    let snapshot = run_to_end(&IngestConfig::testing(), payloads, creator.clone(), sink.clone()).await;

    assert_eq!(creator.attempts(), 1);
    assert_eq!(creator.created()[0].name, "Ivan");
    assert_eq!(snapshot.decode_failures, 1);
    assert_eq!(snapshot.rejected, 1);

    let published = sink.published();
    assert_eq!(published.len(), 2);
    assert!(published[0].message.name.is_empty());
    assert!(!published[0].error.is_empty());
    assert_eq!(published[1].message.name, "Iv4n");
    assert_eq!(published[1].error, "name contains invalid characters: Iv4n");
}

#[tokio::test]
async fn test_creation_failure_is_reported_and_next_message_proceeds() {
    let creator = Arc::new(RecordingCreator::new());
    creator.fail_next(transient_store_error());
    let sink = InMemoryErrorSink::new();
    let payloads = vec![
        payload("Ivan", "Ivanov", ""),
        payload("Petr", "Petrov", "Petrovich"),
    ];

    let snapshot = run_to_end(&IngestConfig::testing(), payloads, creator.clone(), sink.clone()).await;

    assert_eq!(creator.attempts(), 2);
    assert_eq!(creator.created().len(), 1);
    assert_eq!(creator.created()[0].name, "Petr");
    assert_eq!(snapshot.creation_failures, 1);

    let published = sink.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].message.name, "Ivan");
    assert!(published[0].error.contains("connection refused"));
}

#[tokio::test]
async fn test_publish_retries_transient_errors() {
    let creator = Arc::new(RecordingCreator::new());
    let sink = InMemoryErrorSink::new();
    sink.fail_next(BrokerError::LeaderNotAvailable);
    sink.fail_next(BrokerError::DeadlineExceeded);

    let snapshot = run_to_end(
        &IngestConfig::testing(),
        vec![payload("", "", "")],
        creator,
        sink.clone(),
    )
    .await;

    assert_eq!(sink.attempts(), 3);
    assert_eq!(sink.published().len(), 1);
    assert_eq!(sink.published()[0].error, "empty required name");
    assert_eq!(snapshot.publish_retries, 2);
    assert_eq!(snapshot.errors_published, 1);
}

#[tokio::test]
async fn test_publish_gives_up_after_attempts() {
    let creator = Arc::new(RecordingCreator::new());
    let sink = InMemoryErrorSink::new();
    for _ in 0..3 {
        sink.fail_next(BrokerError::LeaderNotAvailable);
    }

    let snapshot = run_to_end(
        &IngestConfig::testing(),
        vec![payload("", "", ""), payload("1", "", "")],
        creator,
        sink.clone(),
    )
    .await;

    // First report exhausts its three attempts, second goes through.
    assert_eq!(sink.attempts(), 4);
    assert_eq!(snapshot.errors_dropped, 1);
    assert_eq!(sink.published().len(), 1);
    assert_eq!(sink.published()[0].message.name, "1");
}

#[tokio::test]
async fn test_non_transient_publish_failure_is_dropped() {
    let creator = Arc::new(RecordingCreator::new());
    let sink = InMemoryErrorSink::new();
    sink.fail_next(BrokerError::Publish("message too large".to_string()));

    let snapshot = run_to_end(
        &IngestConfig::testing(),
        vec![payload("", "", "")],
        creator,
        sink.clone(),
    )
    .await;

    assert_eq!(sink.attempts(), 1);
    assert_eq!(snapshot.publish_retries, 0);
    assert_eq!(snapshot.errors_dropped, 1);
    assert!(sink.published().is_empty());
}

#[tokio::test]
async fn test_stalled_publish_times_out_and_retries() {
    let creator = Arc::new(RecordingCreator::new());
    let sink = StallingSink::default();
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let source = InMemoryEventSource::from_payloads([payload("", "", "")]);

    let pipeline = IngestPipeline::spawn(
        &IngestConfig::testing(),
        source,
        sink.clone(),
        creator,
        shutdown_rx,
    );
    let snapshot = tokio::time::timeout(JOIN_TIMEOUT, pipeline.join())
        .await
        .expect("pipeline did not drain");

    assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 1);
    assert_eq!(snapshot.publish_retries, 1);
}

#[tokio::test]
async fn test_read_error_stops_fetch_and_drains() {
    let creator = Arc::new(RecordingCreator::new());
    let sink = InMemoryErrorSink::new();
    let (feed, source) = InMemoryEventSource::channel();
    feed.push(payload("Ivan", "Ivanov", ""));
    feed.push_error(BrokerError::Read("broker gone".to_string()));
    feed.push(payload("Petr", "Petrov", ""));
    let closed = source.closed_flag();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = IngestPipeline::spawn(
        &IngestConfig::testing(),
        source,
        sink.clone(),
        creator.clone(),
        shutdown_rx,
    );
    let snapshot = tokio::time::timeout(JOIN_TIMEOUT, pipeline.join())
        .await
        .expect("pipeline did not stop");

    assert_eq!(snapshot.read_failures, 1);
    assert_eq!(creator.created().len(), 1);
    assert!(closed.load(Ordering::SeqCst));
    assert!(sink.is_closed());
}

#[tokio::test]
async fn test_shutdown_stops_idle_pipeline() {
    let creator = Arc::new(RecordingCreator::new());
    let sink = InMemoryErrorSink::new();
    let (feed, source) = InMemoryEventSource::channel();
    feed.push(payload("Ivan", "Ivanov", ""));
    let closed = source.closed_flag();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = IngestPipeline::spawn(
        &IngestConfig::testing(),
        source,
        sink.clone(),
        creator.clone(),
        shutdown_rx,
    );

    let metrics = pipeline.metrics();
    for _ in 0..100 {
        if metrics.snapshot().created == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(metrics.snapshot().created, 1);

    // The feed is still open, so only the shutdown signal can stop the stages.
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(JOIN_TIMEOUT, pipeline.join())
        .await
        .expect("pipeline ignored shutdown");

    assert!(closed.load(Ordering::SeqCst));
    assert!(sink.is_closed());
    drop(feed);
}

#[tokio::test]
async fn test_dropped_controller_counts_as_shutdown() {
    let creator = Arc::new(RecordingCreator::new());
    let (_feed, source) = InMemoryEventSource::channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = IngestPipeline::spawn(
        &IngestConfig::testing(),
        source,
        InMemoryErrorSink::new(),
        creator,
        shutdown_rx,
    );

    drop(shutdown_tx);
    tokio::time::timeout(JOIN_TIMEOUT, pipeline.join())
        .await
        .expect("pipeline outlived its controller");
}

#[tokio::test]
async fn test_slow_handler_applies_backpressure() {
    let gate = Arc::new(Semaphore::new(0));
    let creator = Arc::new(GatedCreator {
        gate: gate.clone(),
        calls: AtomicUsize::new(0),
    });
    let payloads: Vec<Vec<u8>> = (0..10).map(|_| payload("Ivan", "Ivanov", "")).collect();
    let source = InMemoryEventSource::from_payloads(payloads);

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = IngestPipeline::spawn(
        &IngestConfig::testing(),
        source,
        InMemoryErrorSink::new(),
        creator.clone(),
        shutdown_rx,
    );
    let metrics = pipeline.metrics();

    tokio::time::sleep(Duration::from_millis(100)).await;
    // One message in the creator, one queued, one held by fetch.
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);
    assert!(metrics.snapshot().fetched <= 3);

    gate.add_permits(10);
    let snapshot = tokio::time::timeout(JOIN_TIMEOUT, pipeline.join())
        .await
        .expect("pipeline did not drain");
    assert_eq!(snapshot.fetched, 10);
    assert_eq!(snapshot.created, 10);
}

#[tokio::test]
async fn test_shutdown_lets_in_flight_creation_finish() {
    let gate = Arc::new(Semaphore::new(0));
    let creator = Arc::new(GatedCreator {
        gate: gate.clone(),
        calls: AtomicUsize::new(0),
    });
    let (feed, source) = InMemoryEventSource::channel();
    feed.push(payload("Ivan", "Ivanov", ""));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = IngestPipeline::spawn(
        &IngestConfig::testing(),
        source,
        InMemoryErrorSink::new(),
        creator.clone(),
        shutdown_rx,
    );

    for _ in 0..100 {
        if creator.calls.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(creator.calls.load(Ordering::SeqCst), 1);

    shutdown_tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.add_permits(1);

    let snapshot = tokio::time::timeout(JOIN_TIMEOUT, pipeline.join())
        .await
        .expect("pipeline ignored shutdown");
    assert_eq!(snapshot.created, 1);
    assert_eq!(snapshot.creation_failures, 0);
    drop(feed);
}

#[tokio::test]
async fn test_shutdown_accounts_for_every_error_report() {
    let creator = Arc::new(RecordingCreator::new());
    let sink = SlowSink {
        delay: Duration::from_millis(100),
        delivered: Arc::new(AtomicUsize::new(0)),
    };
    let (feed, source) = InMemoryEventSource::channel();
    for _ in 0..3 {
        feed.push(payload("", "", ""));
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = IngestPipeline::spawn(
        &IngestConfig::testing(),
        source,
        sink.clone(),
        creator,
        shutdown_rx,
    );

    // The first report is mid-publish when shutdown arrives.
    tokio::time::sleep(Duration::from_millis(30)).await;
    shutdown_tx.send(true).unwrap();
    let snapshot = tokio::time::timeout(JOIN_TIMEOUT, pipeline.join())
        .await
        .expect("pipeline ignored shutdown");

    let delivered = sink.delivered.load(Ordering::SeqCst) as u64;
    assert!(delivered >= 1);
    assert_eq!(snapshot.errors_published, delivered);
    assert_eq!(
        snapshot.rejected,
        snapshot.errors_published + snapshot.errors_dropped
    );
    drop(feed);
}
