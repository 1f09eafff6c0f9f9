//! Streams of timestamped lines built from spans
//!
//! A span's lifetime is split into [`TimeRange`] buckets, and each bucket is
//! walked one [`tick`] at a time to produce the entries of one chunk.

mod bucket;
mod lines;

pub use bucket::{max_bucket_width, tick, BucketPolicy, ReferenceInstant, TimeBucketer, TimeRange};
pub use lines::{format_latency, materialize_entries, LineTemplate, DEFAULT_LINE_TEMPLATE};

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("Span duration of {0}us exceeds the maximum bucket width")]
    RangeTooWide(i64),

    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(String),
}

/// A timestamped line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

impl Entry {
    pub fn new(timestamp: DateTime<Utc>, line: impl Into<String>) -> Self {
        Self {
            timestamp,
            line: line.into(),
        }
    }
}
