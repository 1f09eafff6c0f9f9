//! Ingest sources
//!
//! Spans arrive through:
//! - HTTP API (default)
//! - Kafka consumer (optional, enable with `kafka` feature)
//!
//! Both accept the same JSON payloads, decoded here.

use serde::{Deserialize, Serialize};

use crate::model::Span;
use crate::writer::{WriteError, WriteStats, Writer};

#[cfg(feature = "kafka")]
pub mod kafka;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaConsumer};

/// Batch payload: `{"spans": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanBatch {
    pub spans: Vec<Span>,
}

/// Decode a payload holding either one span or a [`SpanBatch`]
pub fn decode_spans(payload: &[u8]) -> Result<Vec<Span>, ProcessError> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|e| ProcessError::Parse(e.to_string()))?;

    let is_batch = value
        .as_object()
        .map(|obj| obj.contains_key("spans"))
        .unwrap_or(false);

    if is_batch {
        let batch: SpanBatch =
            serde_json::from_value(value).map_err(|e| ProcessError::Parse(e.to_string()))?;
        Ok(batch.spans)
    } else {
        let span: Span =
            serde_json::from_value(value).map_err(|e| ProcessError::Parse(e.to_string()))?;
        Ok(vec![span])
    }
}

/// Write spans in order, stopping at the first error
pub fn write_spans(writer: &Writer, spans: &[Span]) -> Result<WriteStats, ProcessError> {
    let mut total = WriteStats::default();
    for span in spans {
        total += writer.write_span(span)?;
    }
    Ok(total)
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Write error: {0}")]
    Write(#[from] WriteError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::writer::WriterConfig;
    use std::sync::Arc;

    const SPAN: &str = r#"{
        "traceId": "00000000000000010000000000000002",
        "spanId": "0000000000000003",
        "operationName": "GET /users",
        "startTime": "2023-01-01T00:00:00Z",
        "duration": 2000000,
        "tags": [{"key": "http.status", "value": 200}],
        "process": {"serviceName": "frontend"}
    }"#;

    #[test]
    fn test_decode_single_span() {
        let spans = decode_spans(SPAN.as_bytes()).unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].operation_name, "GET /users");
        assert_eq!(spans[0].trace_id.low, 2);
    }

    #[test]
    fn test_decode_batch() {
        let payload = format!(r#"{{"spans": [{}, {}]}}"#, SPAN, SPAN);
        let spans = decode_spans(payload.as_bytes()).unwrap();
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_decode_invalid() {
        assert!(matches!(decode_spans(b"not json"), Err(ProcessError::Parse(_))));
        assert!(matches!(
            decode_spans(br#"{"spans": [{"spanId": "zz"}]}"#),
            Err(ProcessError::Parse(_))
        ));
    }

    #[test]
    fn test_write_spans() {
        let store = Arc::new(MemoryStore::new());
        let writer = Writer::new(WriterConfig::default(), store.clone()).unwrap();

        let spans = decode_spans(format!(r#"{{"spans": [{}, {}]}}"#, SPAN, SPAN).as_bytes()).unwrap();
        let stats = write_spans(&writer, &spans).unwrap();

        assert_eq!(stats.buckets, 2);
        assert_eq!(stats.chunks_written, 2);
        assert_eq!(store.keys().len(), 2);
    }
}
