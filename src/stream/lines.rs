//! Line materialization for a bucket

use super::bucket::TimeRange;
use super::Entry;
use crate::model::Span;

pub const DEFAULT_LINE_TEMPLATE: &str =
    "level=info caller=jaeger component=chunks latency=\"{latency}\"";

/// Operator-supplied line text with span placeholders.
///
/// Supported placeholders: `{latency}`, `{service}`, `{operation}`,
/// `{trace_id}`, `{span_id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineTemplate(String);

impl Default for LineTemplate {
    fn default() -> Self {
        Self(DEFAULT_LINE_TEMPLATE.to_string())
    }
}

impl LineTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn render(&self, span: &Span) -> String {
        self.0
            .replace("{latency}", &format_latency(span.duration))
            .replace("{service}", &span.process.service_name)
            .replace("{operation}", &span.operation_name)
            .replace("{trace_id}", &span.trace_id.to_string())
            .replace("{span_id}", &span.span_id.to_string())
    }
}

/// Human readable duration, e.g. `250µs`, `1.5ms`, `5s`, `1m30s`, `2h0m0s`
pub fn format_latency(micros: i64) -> String {
    if micros == 0 {
        return "0s".to_string();
    }

    let sign = if micros < 0 { "-" } else { "" };
    let micros = micros.unsigned_abs();

    if micros < 1_000 {
        return format!("{}{}µs", sign, micros);
    }
    if micros < 1_000_000 {
        return format!("{}{}ms", sign, trim_fraction(micros, 1_000));
    }

    let hours = micros / 3_600_000_000;
    let minutes = (micros / 60_000_000) % 60;
    let seconds = trim_fraction(micros % 60_000_000, 1_000_000);

    if hours > 0 {
        format!("{}{}h{}m{}s", sign, hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}{}m{}s", sign, minutes, seconds)
    } else {
        format!("{}{}s", sign, seconds)
    }
}

/// `value / unit` with trailing zeros of the fraction dropped
fn trim_fraction(value: u64, unit: u64) -> String {
    let whole = value / unit;
    let frac = value % unit;
    if frac == 0 {
        return whole.to_string();
    }

    let width = unit.to_string().len() - 1;
    let frac = format!("{:0width$}", frac, width = width);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// One entry per tick of `range`, all carrying `line`
pub fn materialize_entries(range: &TimeRange, line: &str) -> Vec<Entry> {
    range
        .ticks()
        .map(|timestamp| Entry {
            timestamp,
            line: line.to_string(),
        })
        .collect()
}
