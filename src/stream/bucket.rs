//! Time bucketing of a span's active lifetime

use super::StreamError;
use crate::model::Span;
use chrono::{DateTime, Duration, Utc};

/// Width of one materialized step
pub fn tick() -> Duration {
    Duration::seconds(1)
}

/// Widest range a single bucket may cover; longer spans are rejected
pub fn max_bucket_width() -> Duration {
    Duration::hours(24)
}

/// Half-open interval `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Degenerate or inverted ranges are widened to one tick
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        let to = if to <= from {
            from.checked_add_signed(tick()).unwrap_or(from)
        } else {
            to
        };
        Self { from, to }
    }

    pub fn width(&self) -> Duration {
        self.to - self.from
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.from && ts < self.to
    }

    /// Tick-aligned instants from `from` up to (excluding) `to`
    pub fn ticks(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let step = tick();
        std::iter::successors(Some(self.from), move |t| t.checked_add_signed(step))
            .take_while(move |t| *t < self.to)
    }
}

/// Instant a span's bucket starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceInstant {
    /// The span's own start time
    #[default]
    SpanStart,
    /// Wall-clock time at processing
    WallClock,
}

impl ReferenceInstant {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceInstant::SpanStart => "span_start",
            ReferenceInstant::WallClock => "wall_clock",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "span_start" => Some(ReferenceInstant::SpanStart),
            "wall_clock" => Some(ReferenceInstant::WallClock),
            _ => None,
        }
    }
}

/// Splits a span into the time ranges that each become one chunk.
///
/// Ranges are processed in the order returned. A policy may return ranges
/// that map to the same chunk (e.g. a bucket overlapping two stores); the
/// writer submits each chunk identity once.
pub trait BucketPolicy: Send + Sync {
    fn buckets(&self, span: &Span) -> Result<Vec<TimeRange>, StreamError>;
}

/// Single bucket covering the span's whole active lifetime
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeBucketer {
    reference: ReferenceInstant,
}

impl TimeBucketer {
    pub fn new(reference: ReferenceInstant) -> Self {
        Self { reference }
    }

    pub fn reference(&self) -> ReferenceInstant {
        self.reference
    }

    /// Bucket with an explicit wall-clock reading
    pub fn buckets_at(&self, span: &Span, now: DateTime<Utc>) -> Result<Vec<TimeRange>, StreamError> {
        let start = match self.reference {
            ReferenceInstant::SpanStart => span.start_time,
            ReferenceInstant::WallClock => now,
        };

        let micros = span.duration.max(0);
        if micros > max_bucket_width().num_microseconds().unwrap_or(i64::MAX) {
            return Err(StreamError::RangeTooWide(micros));
        }
        let end = start
            .checked_add_signed(Duration::microseconds(micros))
            .ok_or_else(|| StreamError::TimestampOutOfRange(start.to_rfc3339()))?;

        Ok(vec![TimeRange::new(start, end)])
    }
}

impl BucketPolicy for TimeBucketer {
    fn buckets(&self, span: &Span) -> Result<Vec<TimeRange>, StreamError> {
        self.buckets_at(span, Utc::now())
    }
}
