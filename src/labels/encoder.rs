//! Span → label set encoding

use super::{is_valid_label_name, Label, LabelError, LabelSet, METRIC_NAME};
use crate::model::{KeyValue, Span};
use chrono::SecondsFormat;

/// Label names derived from span fields
pub const SPAN_LABEL_NAMES: &[&str] = &[
    "id",
    "trace_id_low",
    "trace_id_high",
    "flags",
    "duration",
    "tags",
    "process_id",
    "process_tags",
    "warnings",
    "service_name",
    "operation_name",
    "start_time",
];

/// Serialize tags as `key=value` pairs joined by `,`.
///
/// Pairs are sorted by key, then value, so the same tags always produce the
/// same string regardless of the order they were recorded in.
pub fn serialize_tags(tags: &[KeyValue]) -> String {
    let mut pairs: Vec<(&str, String)> = tags
        .iter()
        .map(|kv| (kv.key.as_str(), kv.value.to_string()))
        .collect();
    pairs.sort();

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Encodes spans into label sets, adding deployment-wide static labels
#[derive(Debug, Clone, Default)]
pub struct LabelEncoder {
    static_labels: Vec<Label>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Static labels may not shadow the kind label or any span field label
    pub fn with_static_labels(labels: Vec<Label>) -> Result<Self, LabelError> {
        for label in &labels {
            if !is_valid_label_name(&label.name) {
                return Err(LabelError::InvalidName(label.name.clone()));
            }
            if label.name == METRIC_NAME || SPAN_LABEL_NAMES.contains(&label.name.as_str()) {
                return Err(LabelError::ReservedName(label.name.clone()));
            }
        }
        Ok(Self {
            static_labels: labels,
        })
    }

    pub fn static_labels(&self) -> &[Label] {
        &self.static_labels
    }

    /// Encode a span. Never fails; missing values become empty strings.
    pub fn encode(&self, span: &Span) -> LabelSet {
        let mut set = LabelSet::new();

        for label in &self.static_labels {
            set.set(&label.name, label.value.clone());
        }

        set.set("id", span.span_id.0.to_string());
        set.set("trace_id_low", span.trace_id.low.to_string());
        set.set("trace_id_high", span.trace_id.high.to_string());
        set.set("flags", span.flags.to_string());
        set.set("duration", span.duration.to_string());
        set.set("tags", serialize_tags(&span.tags));
        set.set("process_id", span.process_id.clone());
        set.set("process_tags", serialize_tags(&span.process.tags));
        set.set("warnings", span.warnings.join(","));
        set.set("service_name", span.process.service_name.clone());
        set.set("operation_name", span.operation_name.clone());
        set.set(
            "start_time",
            span.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        set.ensure_kind();
        set
    }
}

/// Encode a span without static labels
pub fn encode_labels(span: &Span) -> LabelSet {
    LabelEncoder::new().encode(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{parse_labels, SPANS_KIND};
    use crate::model::{Process, SpanId, TraceId};
    use chrono::{TimeZone, Utc};

    fn sample_span() -> Span {
        Span::new(
            TraceId::new(7, 42),
            SpanId(99),
            "GET /users",
            Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        )
        .with_duration_micros(5_000_000)
        .with_tag("http.status", "200")
        .with_process("p1", Process::new("frontend").with_tag("hostname", "web-1"))
    }

    #[test]
    fn test_encode_all_fields() {
        let set = encode_labels(&sample_span());

        assert_eq!(set.get("__name__"), Some(SPANS_KIND));
        assert_eq!(set.get("id"), Some("99"));
        assert_eq!(set.get("trace_id_low"), Some("42"));
        assert_eq!(set.get("trace_id_high"), Some("7"));
        assert_eq!(set.get("flags"), Some("0"));
        assert_eq!(set.get("duration"), Some("5000000"));
        assert_eq!(set.get("tags"), Some("http.status=200"));
        assert_eq!(set.get("process_id"), Some("p1"));
        assert_eq!(set.get("process_tags"), Some("hostname=web-1"));
        assert_eq!(set.get("warnings"), Some(""));
        assert_eq!(set.get("service_name"), Some("frontend"));
        assert_eq!(set.get("operation_name"), Some("GET /users"));
        assert_eq!(set.get("start_time"), Some("2023-01-01T00:00:00Z"));
        assert_eq!(set.len(), SPAN_LABEL_NAMES.len() + 1);
    }

    #[test]
    fn test_kind_label_exactly_once() {
        let set = encode_labels(&sample_span());
        let count = set.iter().filter(|l| l.name == METRIC_NAME).count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_fields_not_omitted() {
        let span = Span::new(TraceId::default(), SpanId::default(), "", Utc::now());
        let set = encode_labels(&span);
        for name in SPAN_LABEL_NAMES {
            assert!(set.has(name), "missing {}", name);
        }
        assert_eq!(set.get("operation_name"), Some(""));
        assert_eq!(set.get("tags"), Some(""));
    }

    #[test]
    fn test_tag_order_independent() {
        let a = sample_span().with_tag("b", 1i64).with_tag("a", true);
        let mut b = sample_span();
        b.tags.insert(0, KeyValue::new("a", true));
        b.tags.insert(0, KeyValue::new("b", 1i64));

        assert_eq!(serialize_tags(&a.tags), "a=true,b=1,http.status=200");
        assert_eq!(serialize_tags(&a.tags), serialize_tags(&b.tags));
        assert_eq!(encode_labels(&a).fingerprint(), encode_labels(&b).fingerprint());
    }

    #[test]
    fn test_encoded_text_parses_back() {
        let mut span = sample_span().with_tag("sql", "select \"x\"");
        span.warnings = vec!["clock skew".to_string(), "truncated".to_string()];

        let set = encode_labels(&span);
        assert_eq!(set.get("warnings"), Some("clock skew,truncated"));
        assert_eq!(parse_labels(&set.to_string()).unwrap(), set);
    }

    #[test]
    fn test_static_labels() {
        let encoder = LabelEncoder::with_static_labels(vec![Label::new("env", "prod")]).unwrap();
        let set = encoder.encode(&sample_span());
        assert_eq!(set.get("env"), Some("prod"));
        assert_eq!(set.get("__name__"), Some(SPANS_KIND));
    }

    #[test]
    fn test_static_labels_reserved() {
        assert_eq!(
            LabelEncoder::with_static_labels(vec![Label::new("__name__", "logs")]).unwrap_err(),
            LabelError::ReservedName("__name__".to_string())
        );
        assert_eq!(
            LabelEncoder::with_static_labels(vec![Label::new("tags", "x")]).unwrap_err(),
            LabelError::ReservedName("tags".to_string())
        );
        assert!(matches!(
            LabelEncoder::with_static_labels(vec![Label::new("bad-name", "x")]),
            Err(LabelError::InvalidName(_))
        ));
    }
}
