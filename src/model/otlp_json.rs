//! OTLP JSON format structures (for HTTP/JSON ingest)
//!
//! Only the fields that map onto [`Span`] are decoded; everything else in
//! the export request is ignored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::span::{KeyValue as SpanTag, ModelError, Process, Span, SpanId, TagValue, TraceId};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTraceServiceRequest {
    pub resource_spans: Vec<ResourceSpans>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpans {
    pub resource: Option<Resource>,
    pub scope_spans: Vec<ScopeSpans>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub attributes: Option<Vec<KeyValue>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeSpans {
    pub scope: Option<InstrumentationScope>,
    pub spans: Vec<OtlpSpan>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationScope {
    pub name: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtlpSpan {
    pub trace_id: String,
    pub span_id: String,
    pub name: String,
    pub kind: Option<i32>,
    pub flags: Option<u32>,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    pub attributes: Option<Vec<KeyValue>>,
    pub status: Option<Status>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyValue {
    pub string_value: Option<String>,
    pub int_value: Option<String>, // OTLP sends as string
    pub double_value: Option<f64>,
    pub bool_value: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub code: Option<i32>,
    pub message: Option<String>,
}

impl AnyValue {
    pub fn to_tag_value(&self) -> Option<TagValue> {
        if let Some(s) = &self.string_value {
            return Some(TagValue::String(s.clone()));
        }
        if let Some(i) = &self.int_value {
            if let Ok(parsed) = i.parse::<i64>() {
                return Some(TagValue::Int(parsed));
            }
        }
        if let Some(d) = self.double_value {
            return Some(TagValue::Float(d));
        }
        if let Some(b) = self.bool_value {
            return Some(TagValue::Bool(b));
        }
        None
    }
}

fn span_kind_name(kind: i32) -> Option<&'static str> {
    match kind {
        1 => Some("internal"),
        2 => Some("server"),
        3 => Some("client"),
        4 => Some("producer"),
        5 => Some("consumer"),
        _ => None,
    }
}

fn status_code_name(code: i32) -> Option<&'static str> {
    match code {
        1 => Some("OK"),
        2 => Some("ERROR"),
        _ => None,
    }
}

fn convert_attributes(attrs: Option<&Vec<KeyValue>>) -> Vec<SpanTag> {
    attrs
        .map(|attrs| {
            attrs
                .iter()
                .filter_map(|kv| {
                    kv.value.to_tag_value().map(|value| SpanTag {
                        key: kv.key.clone(),
                        value,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_unix_nanos(raw: &str) -> Result<i64, ModelError> {
    raw.parse::<i64>()
        .map_err(|_| ModelError::InvalidTimestamp(raw.to_string()))
}

impl ExportTraceServiceRequest {
    /// Flatten the request into spans, one process per resource
    pub fn into_spans(self) -> Result<Vec<Span>, ModelError> {
        let mut spans = Vec::new();

        for (idx, resource_spans) in self.resource_spans.into_iter().enumerate() {
            let resource_attrs = resource_spans
                .resource
                .as_ref()
                .and_then(|r| r.attributes.as_ref());

            let service_name = resource_attrs
                .and_then(|attrs| {
                    attrs
                        .iter()
                        .find(|kv| kv.key == "service.name")
                        .and_then(|kv| kv.value.string_value.clone())
                })
                .unwrap_or_else(|| "unknown".to_string());

            let process = Process {
                service_name,
                tags: convert_attributes(resource_attrs)
                    .into_iter()
                    .filter(|kv| kv.key != "service.name")
                    .collect(),
            };
            let process_id = format!("p{}", idx + 1);

            for scope_spans in resource_spans.scope_spans {
                let scope_name = scope_spans
                    .scope
                    .as_ref()
                    .and_then(|s| s.name.clone())
                    .unwrap_or_default();
                let scope_version = scope_spans
                    .scope
                    .as_ref()
                    .and_then(|s| s.version.clone())
                    .unwrap_or_default();

                for span in scope_spans.spans {
                    let start_ns = parse_unix_nanos(&span.start_time_unix_nano)?;
                    let end_ns = parse_unix_nanos(&span.end_time_unix_nano)?;
                    let duration_ns = end_ns.checked_sub(start_ns).ok_or_else(|| {
                        ModelError::InvalidTimestamp(span.end_time_unix_nano.clone())
                    })?;

                    let mut tags = convert_attributes(span.attributes.as_ref());
                    if !scope_name.is_empty() {
                        tags.push(SpanTag::new("otel.scope.name", scope_name.clone()));
                    }
                    if !scope_version.is_empty() {
                        tags.push(SpanTag::new("otel.scope.version", scope_version.clone()));
                    }
                    if let Some(kind) = span.kind.and_then(span_kind_name) {
                        tags.push(SpanTag::new("span.kind", kind));
                    }
                    if let Some(status) = &span.status {
                        if let Some(code) = status.code.and_then(status_code_name) {
                            tags.push(SpanTag::new("otel.status_code", code));
                        }
                        if let Some(message) = status.message.as_ref().filter(|m| !m.is_empty()) {
                            tags.push(SpanTag::new("otel.status_description", message.clone()));
                        }
                    }

                    spans.push(Span {
                        trace_id: span.trace_id.parse::<TraceId>()?,
                        span_id: span.span_id.parse::<SpanId>()?,
                        operation_name: span.name,
                        flags: span.flags.unwrap_or(0),
                        start_time: DateTime::<Utc>::from_timestamp_nanos(start_ns),
                        duration: duration_ns / 1_000,
                        tags,
                        process_id: process_id.clone(),
                        process: process.clone(),
                        warnings: Vec::new(),
                    });
                }
            }
        }

        Ok(spans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUEST: &str = r#"{
        "resourceSpans": [{
            "resource": {
                "attributes": [
                    {"key": "service.name", "value": {"stringValue": "test-service"}},
                    {"key": "host.name", "value": {"stringValue": "web-1"}}
                ]
            },
            "scopeSpans": [{
                "scope": {"name": "my-lib", "version": "1.0"},
                "spans": [{
                    "traceId": "5b8aa5a2d2c872e8321cf37308d69df2",
                    "spanId": "051581bf3cb55c13",
                    "name": "GET /api/users",
                    "kind": 2,
                    "startTimeUnixNano": "1544712660000000000",
                    "endTimeUnixNano": "1544712661000000000",
                    "attributes": [{"key": "http.status_code", "value": {"intValue": "200"}}],
                    "status": {"code": 1}
                }]
            }]
        }]
    }"#;

    #[test]
    fn test_otlp_into_spans() {
        let request: ExportTraceServiceRequest = serde_json::from_str(REQUEST).unwrap();
        let spans = request.into_spans().unwrap();
        assert_eq!(spans.len(), 1);

        let span = &spans[0];
        assert_eq!(span.trace_id.high, 0x5b8aa5a2d2c872e8);
        assert_eq!(span.trace_id.low, 0x321cf37308d69df2);
        assert_eq!(span.duration, 1_000_000);
        assert_eq!(span.process_id, "p1");
        assert_eq!(span.process.service_name, "test-service");
        assert_eq!(span.process.tags, vec![SpanTag::new("host.name", "web-1")]);
        assert_eq!(span.start_time.timestamp(), 1544712660);

        let tag = |key: &str| span.tags.iter().find(|kv| kv.key == key).map(|kv| kv.value.clone());
        assert_eq!(tag("http.status_code"), Some(TagValue::Int(200)));
        assert_eq!(tag("span.kind"), Some(TagValue::from("server")));
        assert_eq!(tag("otel.status_code"), Some(TagValue::from("OK")));
        assert_eq!(tag("otel.scope.name"), Some(TagValue::from("my-lib")));
    }

    #[test]
    fn test_otlp_bad_trace_id() {
        let request: ExportTraceServiceRequest =
            serde_json::from_str(&REQUEST.replace("5b8aa5a2d2c872e8321cf37308d69df2", "zz")).unwrap();
        assert!(matches!(request.into_spans(), Err(ModelError::InvalidId(_))));
    }

    #[test]
    fn test_missing_service_name() {
        let json = r#"{"resourceSpans": [{"scopeSpans": [{"spans": [{
            "traceId": "01", "spanId": "02", "name": "op",
            "startTimeUnixNano": "0", "endTimeUnixNano": "0"
        }]}]}]}"#;
        let request: ExportTraceServiceRequest = serde_json::from_str(json).unwrap();
        let spans = request.into_spans().unwrap();
        assert_eq!(spans[0].process.service_name, "unknown");
        assert_eq!(spans[0].duration, 0);
    }

    #[test]
    fn test_unrepresentable_duration() {
        let json = REQUEST
            .replace("1544712660000000000", "-9223372036854775808")
            .replace("1544712661000000000", "9223372036854775807");
        let request: ExportTraceServiceRequest = serde_json::from_str(&json).unwrap();
        assert!(matches!(request.into_spans(), Err(ModelError::InvalidTimestamp(_))));
    }
}
