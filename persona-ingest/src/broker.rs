//! Broker abstractions: where messages come from and where failures go.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("leader not available")]
    LeaderNotAvailable,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("read failed: {0}")]
    Read(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("encode failed: {0}")]
    Encode(String),

    #[error("broker connection closed")]
    Closed,
}

impl BrokerError {
    /// Whether a publish that failed this way is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::LeaderNotAvailable | BrokerError::DeadlineExceeded
        )
    }
}

/// One message read from the inbound stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub payload: Vec<u8>,
    pub key: Option<Vec<u8>>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl RawMessage {
    pub fn from_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }
}

/// Inbound event stream, owned by the fetch stage.
#[async_trait]
pub trait EventSource: Send {
    /// Read the next message. `Ok(None)` means the stream has ended.
    ///
    /// Must be cancel-safe: the fetch stage drops this future on shutdown.
    async fn next_message(&mut self) -> Result<Option<RawMessage>, BrokerError>;

    /// Release broker resources. Called once when the fetch stage stops.
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// Outbound error stream, owned by the respond-error stage.
#[async_trait]
pub trait ErrorSink: Send {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), BrokerError>;

    /// Flush and release broker resources.
    async fn close(&mut self) -> Result<(), BrokerError>;
}
