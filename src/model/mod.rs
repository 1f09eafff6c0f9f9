//! Span model accepted from the tracing runtime
//!
//! Spans arrive either in their native JSON form or as OTLP/JSON export
//! requests, which [`otlp_json::ExportTraceServiceRequest::into_spans`]
//! flattens into the same model.

pub mod otlp_json;
mod span;

pub use span::{KeyValue, ModelError, Process, Span, SpanId, TagValue, TraceId};
