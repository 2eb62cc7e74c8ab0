//! Kafka event source and error sink.

use async_trait::async_trait;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Message};
use std::time::Duration;

use crate::broker::{BrokerError, ErrorSink, EventSource, RawMessage};
use crate::config::IngestConfig;

const FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Classify a client error so the respond-error stage knows what to retry.
pub fn map_kafka_error(error: KafkaError, read: bool) -> BrokerError {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::LeaderNotAvailable | RDKafkaErrorCode::NotLeaderForPartition) => {
            BrokerError::LeaderNotAvailable
        }
        Some(
            RDKafkaErrorCode::MessageTimedOut
            | RDKafkaErrorCode::RequestTimedOut
            | RDKafkaErrorCode::OperationTimedOut,
        ) => BrokerError::DeadlineExceeded,
        _ if read => BrokerError::Read(error.to_string()),
        _ => BrokerError::Publish(error.to_string()),
    }
}

/// Consumer-group reader for the inbound topic.
pub struct KafkaEventSource {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaEventSource {
    pub fn connect(config: &IngestConfig) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "true")
            .create()
            .map_err(|e| map_kafka_error(e, true))?;
        consumer
            .subscribe(&[config.read_topic.as_str()])
            .map_err(|e| map_kafka_error(e, true))?;

        tracing::info!(
            topic = %config.read_topic,
            group_id = %config.group_id,
            "Subscribed to inbound topic"
        );
        Ok(Self {
            consumer,
            topic: config.read_topic.clone(),
        })
    }
}

#[async_trait]
impl EventSource for KafkaEventSource {
    async fn next_message(&mut self) -> Result<Option<RawMessage>, BrokerError> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| map_kafka_error(e, true))?;
        Ok(Some(RawMessage {
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            key: msg.key().map(<[u8]>::to_vec),
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
        }))
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.consumer.unsubscribe();
        tracing::info!(topic = %self.topic, "Unsubscribed from inbound topic");
        Ok(())
    }
}

/// Producer for the error topic.
pub struct KafkaErrorSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaErrorSink {
    pub fn connect(config: &IngestConfig) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", config.brokers.join(","))
            .set(
                "message.timeout.ms",
                config.publish_timeout.as_millis().to_string(),
            )
            .create()
            .map_err(|e| map_kafka_error(e, false))?;
        Ok(Self {
            producer,
            topic: config.error_topic.clone(),
        })
    }
}

#[async_trait]
impl ErrorSink for KafkaErrorSink {
    async fn publish(&mut self, payload: &[u8]) -> Result<(), BrokerError> {
        let record = FutureRecord::<(), [u8]>::to(&self.topic).payload(payload);
        self.producer
            .send(record, Timeout::Never)
            .await
            .map(|_| ())
            .map_err(|(e, _)| map_kafka_error(e, false))
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.producer
            .flush(Timeout::After(FLUSH_TIMEOUT))
            .map_err(|e| map_kafka_error(e, false))
    }
}
