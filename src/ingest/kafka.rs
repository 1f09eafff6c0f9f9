//! Kafka consumer for durable span ingest
//!
//! Consumes span messages from Kafka topics and writes them through the
//! span writer. Offsets are committed only after a message's spans are
//! written, so a restart resumes from the last fully written message.
//!
//! ## Message Format
//!
//! Either a single span:
//! ```json
//! {"traceId": "1", "spanId": "2", "operationName": "GET /", "startTime": "2023-01-01T00:00:00Z", "duration": 1500}
//! ```
//!
//! Or a batch:
//! ```json
//! {"spans": [{...}, {...}]}
//! ```
//!
//! ## Configuration
//!
//! Environment variables:
//! - `KAFKA_BROKERS`: Comma-separated list of brokers (default: localhost:9092)
//! - `KAFKA_TOPICS`: Comma-separated list of topics to consume
//! - `KAFKA_GROUP_ID`: Consumer group ID (default: spanchunk)
//! - `KAFKA_AUTO_OFFSET_RESET`: Where to start if no offset (earliest/latest, default: earliest)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use tokio::sync::mpsc;

use super::{decode_spans, write_spans, ProcessError};
use crate::writer::{WriteStats, Writer};

/// Kafka consumer configuration
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topics: Vec<String>,
    pub group_id: String,
    /// earliest or latest
    pub auto_offset_reset: String,
    /// Off for at-least-once delivery
    pub enable_auto_commit: bool,
    pub session_timeout_ms: u32,
    pub max_poll_interval_ms: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topics: vec![],
            group_id: "spanchunk".to_string(),
            auto_offset_reset: "earliest".to_string(),
            enable_auto_commit: false,
            session_timeout_ms: 30000,
            max_poll_interval_ms: 300000,
        }
    }
}

impl KafkaConfig {
    /// `None` when no topics are configured
    pub fn from_env() -> Option<Self> {
        let topics = std::env::var("KAFKA_TOPICS").ok()?;
        if topics.trim().is_empty() {
            return None;
        }

        let defaults = Self::default();
        Some(Self {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or(defaults.brokers),
            topics: topics
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            group_id: std::env::var("KAFKA_GROUP_ID").unwrap_or(defaults.group_id),
            auto_offset_reset: std::env::var("KAFKA_AUTO_OFFSET_RESET")
                .unwrap_or(defaults.auto_offset_reset),
            ..defaults
        })
    }
}

/// Consumer statistics
#[derive(Debug, Default, Clone)]
pub struct KafkaStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub spans_written: u64,
    pub chunks_written: u64,
    pub errors: u64,
    pub last_offset: HashMap<String, i64>,
}

pub struct KafkaConsumer {
    config: KafkaConfig,
    writer: Arc<Writer>,
    consumer: StreamConsumer,
    shutdown_tx: Option<mpsc::Sender<()>>,
    stats: Arc<parking_lot::RwLock<KafkaStats>>,
}

impl KafkaConsumer {
    pub fn new(config: KafkaConfig, writer: Arc<Writer>) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", config.enable_auto_commit.to_string())
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("max.poll.interval.ms", config.max_poll_interval_ms.to_string())
            .set("fetch.min.bytes", "1024")
            .set("fetch.max.wait.ms", "100")
            .create()?;

        Ok(Self {
            config,
            writer,
            consumer,
            shutdown_tx: None,
            stats: Arc::new(parking_lot::RwLock::new(KafkaStats::default())),
        })
    }

    pub fn subscribe(&self) -> Result<(), KafkaError> {
        let topics: Vec<&str> = self.config.topics.iter().map(|s| s.as_str()).collect();
        self.consumer.subscribe(&topics)?;
        tracing::info!(topics = ?self.config.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    pub fn stats(&self) -> KafkaStats {
        self.stats.read().clone()
    }

    /// Start consuming in the background
    pub fn start(mut self) -> tokio::task::JoinHandle<()> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let consumer = self.consumer;
        let writer = self.writer;
        let stats = self.stats;

        tokio::spawn(async move {
            tracing::info!("Kafka consumer started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Kafka consumer shutting down");
                        break;
                    }
                    result = consumer.recv() => {
                        let message = match result {
                            Ok(message) => message,
                            Err(e) => {
                                tracing::error!(error = %e, "Kafka receive error");
                                tokio::time::sleep(Duration::from_millis(100)).await;
                                continue;
                            }
                        };

                        let topic = message.topic().to_string();
                        let partition = message.partition();
                        let offset = message.offset();
                        stats.write().messages_received += 1;

                        let Some(payload) = message.payload() else {
                            continue;
                        };

                        // Chunk building and store puts are blocking work
                        let result = tokio::task::block_in_place(|| {
                            Self::process_message(&writer, payload)
                        });

                        match result {
                            Ok((spans, write_stats)) => {
                                if let Err(e) = consumer.commit_message(&message, CommitMode::Async) {
                                    tracing::error!(
                                        topic = %topic,
                                        partition = partition,
                                        offset = offset,
                                        error = %e,
                                        "Failed to commit offset"
                                    );
                                }

                                let mut s = stats.write();
                                s.messages_processed += 1;
                                s.spans_written += spans as u64;
                                s.chunks_written += write_stats.chunks_written as u64;
                                s.last_offset.insert(format!("{}:{}", topic, partition), offset);
                            }
                            Err(e) => {
                                tracing::error!(
                                    topic = %topic,
                                    partition = partition,
                                    offset = offset,
                                    error = %e,
                                    "Failed to process message"
                                );
                                stats.write().errors += 1;
                            }
                        }
                    }
                }
            }
        })
    }

    /// Decode and write one message; returns the number of spans written
    fn process_message(writer: &Writer, payload: &[u8]) -> Result<(usize, WriteStats), ProcessError> {
        let spans = decode_spans(payload)?;
        let stats = write_spans(writer, &spans)?;
        Ok((spans.len(), stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::writer::WriterConfig;

    fn writer() -> (Writer, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Writer::new(WriterConfig::default(), store.clone()).unwrap(), store)
    }

    #[test]
    fn test_kafka_config_default() {
        let config = KafkaConfig::default();
        assert_eq!(config.brokers, "localhost:9092");
        assert_eq!(config.group_id, "spanchunk");
        assert!(!config.enable_auto_commit);
    }

    #[test]
    fn test_process_batch_message() {
        let (writer, store) = writer();
        let payload = r#"{
            "spans": [
                {"traceId": "1", "spanId": "1", "startTime": "2023-01-01T00:00:00Z", "duration": 1000000},
                {"traceId": "1", "spanId": "2", "startTime": "2023-01-01T00:00:01Z", "duration": 3000000}
            ]
        }"#;

        let (spans, stats) = KafkaConsumer::process_message(&writer, payload.as_bytes()).unwrap();

        assert_eq!(spans, 2);
        assert_eq!(stats.chunks_written, 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_process_single_message() {
        let (writer, store) = writer();
        let payload = r#"{"traceId": "ab", "spanId": "cd", "startTime": "2023-01-01T00:00:00Z"}"#;

        let (spans, _) = KafkaConsumer::process_message(&writer, payload.as_bytes()).unwrap();

        assert_eq!(spans, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_process_malformed_message() {
        let (writer, store) = writer();
        let result = KafkaConsumer::process_message(&writer, b"{\"spans\": 5}");
        assert!(matches!(result, Err(ProcessError::Parse(_))));
        assert!(store.is_empty());
    }
}
