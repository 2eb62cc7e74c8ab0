//! In-process broker adapters for tests and local runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::broker::{BrokerError, ErrorSink, EventSource, RawMessage};
use crate::message::FioErrorMessage;

/// Producer side of an [`InMemoryEventSource`].
///
/// Dropping every feed ends the stream once buffered items are read.
#[derive(Debug, Clone)]
pub struct EventFeed {
    tx: mpsc::UnboundedSender<Result<Vec<u8>, BrokerError>>,
}

impl EventFeed {
    /// Queue a payload. Returns `false` if the source is gone.
    pub fn push(&self, payload: impl Into<Vec<u8>>) -> bool {
        self.tx.send(Ok(payload.into())).is_ok()
    }

    /// Queue a read failure.
    pub fn push_error(&self, error: BrokerError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// Event source backed by an unbounded channel.
#[derive(Debug)]
pub struct InMemoryEventSource {
    rx: mpsc::UnboundedReceiver<Result<Vec<u8>, BrokerError>>,
    offset: i64,
    closed: Arc<AtomicBool>,
}

impl InMemoryEventSource {
    /// Open a source that stays live while its feed exists.
    pub fn channel() -> (EventFeed, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventFeed { tx },
            Self {
                rx,
                offset: 0,
                closed: Arc::new(AtomicBool::new(false)),
            },
        )
    }

    /// A finite stream that ends after `payloads`.
    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Vec<u8>>,
    {
        let (feed, source) = Self::channel();
        for payload in payloads {
            feed.push(payload);
        }
        source
    }

    /// Flag set once the pipeline has closed this source.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        self.closed.clone()
    }
}

#[async_trait]
impl EventSource for InMemoryEventSource {
    async fn next_message(&mut self) -> Result<Option<RawMessage>, BrokerError> {
        match self.rx.recv().await {
            Some(Ok(payload)) => {
                let offset = self.offset;
                self.offset += 1;
                Ok(Some(RawMessage {
                    payload,
                    key: None,
                    topic: "memory".to_string(),
                    partition: 0,
                    offset,
                }))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.rx.close();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SinkState {
    published: Vec<Vec<u8>>,
    failures: VecDeque<BrokerError>,
    attempts: usize,
    closed: bool,
}

/// Error sink that records published payloads.
///
/// Clones share state, so a test can keep one while the pipeline owns
/// another.
#[derive(Debug, Clone, Default)]
pub struct InMemoryErrorSink {
    state: Arc<Mutex<SinkState>>,
}

impl InMemoryErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next publish attempt fail with `error`. Calls queue up.
    pub fn fail_next(&self, error: BrokerError) {
        if let Ok(mut state) = self.state.lock() {
            state.failures.push_back(error);
        }
    }

    /// Reports published so far, decoded.
    pub fn published(&self) -> Vec<FioErrorMessage> {
        self.state
            .lock()
            .map(|s| {
                s.published
                    .iter()
                    .filter_map(|p| FioErrorMessage::decode(p).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Publish attempts, failed ones included.
    pub fn attempts(&self) -> usize {
        self.state.lock().map(|s| s.attempts).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or(false)
    }
}

#[async_trait]
impl ErrorSink for InMemoryErrorSink {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), BrokerError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| BrokerError::Publish("sink state poisoned".to_string()))?;
        if state.closed {
            return Err(BrokerError::Closed);
        }
        state.attempts += 1;
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }
        state.published.push(payload.to_vec());
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FioMessage;

    #[tokio::test]
    async fn test_source_assigns_offsets_and_ends() {
        let mut source = InMemoryEventSource::from_payloads([b"a".to_vec(), b"b".to_vec()]);
        let first = source.next_message().await.unwrap().unwrap();
        let second = source.next_message().await.unwrap().unwrap();
        assert_eq!((first.offset, second.offset), (0, 1));
        assert_eq!(second.payload, b"b");
        assert!(source.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_source_surfaces_read_errors() {
        let (feed, mut source) = InMemoryEventSource::channel();
        feed.push_error(BrokerError::Read("rebalance".to_string()));
        assert!(source.next_message().await.is_err());

        let closed = source.closed_flag();
        source.close().await.unwrap();
        assert!(closed.load(Ordering::SeqCst));
        assert!(!feed.push(b"late".to_vec()));
    }

    #[tokio::test]
    async fn test_sink_records_and_fails_on_demand() {
        let sink = InMemoryErrorSink::new();
        let mut owned = sink.clone();
        sink.fail_next(BrokerError::LeaderNotAvailable);

        let payload = FioErrorMessage::new(FioMessage::default(), "boom")
            .encode()
            .unwrap();
        assert_eq!(
            owned.publish(&payload).await,
            Err(BrokerError::LeaderNotAvailable)
        );
        owned.publish(&payload).await.unwrap();

        assert_eq!(sink.attempts(), 2);
        assert_eq!(sink.published().len(), 1);
        assert_eq!(sink.published()[0].error, "boom");

        owned.close().await.unwrap();
        assert!(sink.is_closed());
        assert_eq!(owned.publish(&payload).await, Err(BrokerError::Closed));
    }
}
