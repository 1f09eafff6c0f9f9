//! Span data model
//!
//! Mirrors the shape handed over by the tracing runtime: a 128-bit trace id
//! split into high/low halves, a 64-bit span id, timing, tags and the
//! emitting process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 128-bit trace identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TraceId {
    pub high: u64,
    pub low: u64,
}

impl TraceId {
    pub fn new(high: u64, low: u64) -> Self {
        Self { high, low }
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.high == 0 {
            write!(f, "{:016x}", self.low)
        } else {
            write!(f, "{:016x}{:016x}", self.high, self.low)
        }
    }
}

impl FromStr for TraceId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 32 {
            return Err(ModelError::InvalidId(s.to_string()));
        }

        let split = s.len().saturating_sub(16);
        let (high, low) = s.split_at(split);
        let high = if high.is_empty() { 0 } else { parse_hex(high)? };
        let low = parse_hex(low)?;

        Ok(Self { high, low })
    }
}

/// 64-bit span identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SpanId(pub u64);

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for SpanId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() > 16 {
            return Err(ModelError::InvalidId(s.to_string()));
        }
        parse_hex(s).map(SpanId)
    }
}

fn parse_hex(s: &str) -> Result<u64, ModelError> {
    u64::from_str_radix(s, 16).map_err(|_| ModelError::InvalidId(s.to_string()))
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(TraceId);
hex_serde!(SpanId);

/// Tag value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    String(String),
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::String(s) => f.write_str(s),
            TagValue::Bool(b) => write!(f, "{}", b),
            TagValue::Int(i) => write!(f, "{}", i),
            TagValue::Float(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for TagValue {
    fn from(v: &str) -> Self {
        TagValue::String(v.to_string())
    }
}

impl From<String> for TagValue {
    fn from(v: String) -> Self {
        TagValue::String(v)
    }
}

impl From<bool> for TagValue {
    fn from(v: bool) -> Self {
        TagValue::Bool(v)
    }
}

impl From<i64> for TagValue {
    fn from(v: i64) -> Self {
        TagValue::Int(v)
    }
}

impl From<f64> for TagValue {
    fn from(v: f64) -> Self {
        TagValue::Float(v)
    }
}

/// A single span or process tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: TagValue,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The process that emitted a span
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Process {
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
}

impl Process {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.push(KeyValue::new(key, value));
        self
    }
}

/// A finished span, read-only for the duration of a write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(default)]
    pub operation_name: String,
    #[serde(default)]
    pub flags: u32,
    pub start_time: DateTime<Utc>,
    /// Duration in microseconds
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub tags: Vec<KeyValue>,
    #[serde(default)]
    pub process_id: String,
    #[serde(default)]
    pub process: Process,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Span {
    pub fn new(
        trace_id: TraceId,
        span_id: SpanId,
        operation_name: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            trace_id,
            span_id,
            operation_name: operation_name.into(),
            flags: 0,
            start_time,
            duration: 0,
            tags: Vec::new(),
            process_id: String::new(),
            process: Process::default(),
            warnings: Vec::new(),
        }
    }

    pub fn with_duration_micros(mut self, micros: i64) -> Self {
        self.duration = micros;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.tags.push(KeyValue::new(key, value));
        self
    }

    pub fn with_process(mut self, process_id: impl Into<String>, process: Process) -> Self {
        self.process_id = process_id.into();
        self.process = process;
        self
    }

    /// End of the span's active lifetime, `None` past the representable range
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
            .checked_add_signed(chrono::Duration::microseconds(self.duration))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Invalid hex id: '{0}'")]
    InvalidId(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_trace_id_round_trip() {
        let id: TraceId = "5b8aa5a2d2c872e8321cf37308d69df2".parse().unwrap();
        assert_eq!(id.high, 0x5b8aa5a2d2c872e8);
        assert_eq!(id.low, 0x321cf37308d69df2);
        assert_eq!(id.to_string(), "5b8aa5a2d2c872e8321cf37308d69df2");
    }

    #[test]
    fn test_short_trace_id() {
        let id: TraceId = "ff".parse().unwrap();
        assert_eq!(id, TraceId::new(0, 0xff));
        assert_eq!(id.to_string(), "00000000000000ff");
    }

    #[test]
    fn test_invalid_ids() {
        assert!("".parse::<TraceId>().is_err());
        assert!("xyz".parse::<TraceId>().is_err());
        assert!("0".repeat(33).parse::<TraceId>().is_err());
        assert!("12345678901234567".parse::<SpanId>().is_err());
    }

    #[test]
    fn test_span_json() {
        let json = r#"{
            "traceId": "00000000000000010000000000000002",
            "spanId": "051581bf3cb55c13",
            "operationName": "GET /api/users",
            "startTime": "2023-01-01T00:00:00Z",
            "duration": 1500,
            "tags": [{"key": "http.status", "value": 200}, {"key": "error", "value": false}],
            "process": {"serviceName": "frontend"}
        }"#;

        let span: Span = serde_json::from_str(json).unwrap();
        assert_eq!(span.trace_id, TraceId::new(1, 2));
        assert_eq!(span.span_id, SpanId(0x051581bf3cb55c13));
        assert_eq!(span.duration, 1500);
        assert_eq!(span.tags[0].value, TagValue::Int(200));
        assert_eq!(span.tags[1].value, TagValue::Bool(false));
        assert_eq!(span.process.service_name, "frontend");
        assert!(span.warnings.is_empty());
        assert_eq!(
            span.end_time(),
            Some(Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::microseconds(1500))
        );
        assert_eq!(span.with_duration_micros(i64::MAX).end_time(), None);
    }
}
