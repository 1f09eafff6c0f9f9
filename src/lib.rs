//! spanchunk: tracing spans stored as compressed log chunks
//!
//! Each finished span is turned into a label set that identifies its
//! stream, bucketed over its active time range, expanded into one log line
//! per second of that range, and packed into an LZ4-compressed chunk that
//! is handed to a chunk store.
//!
//! # Pipeline
//!
//! - **Label encoding**: span fields → canonical [`labels::LabelSet`] with `__name__="spans"`
//! - **Time bucketing**: span → time ranges ([`stream::BucketPolicy`], default [`stream::TimeBucketer`])
//! - **Line materialization**: range → one entry per tick ([`stream::materialize_entries`])
//! - **Chunk building**: labels + entries → [`chunk::Chunk`]
//! - **Writing**: chunks → [`store::ChunkStore::put_one`]
//!
//! # Example
//!
//! ```no_run
//! use spanchunk::model::{Span, SpanId, TraceId};
//! use spanchunk::store::MemoryStore;
//! use spanchunk::writer::{Writer, WriterConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let writer = Writer::new(WriterConfig::default(), store.clone()).unwrap();
//!
//! let span = Span::new(TraceId::new(0, 1), SpanId(2), "GET /users", chrono::Utc::now())
//!     .with_duration_micros(5_000_000)
//!     .with_tag("http.status", "200");
//! writer.write_span(&span).unwrap();
//!
//! for key in store.keys() {
//!     println!("{}", key);
//! }
//! ```

pub mod api;
pub mod chunk;
pub mod config;
pub mod ingest;
pub mod labels;
pub mod model;
pub mod store;
pub mod stream;
pub mod writer;

// Re-export commonly used types
pub use chunk::{Chunk, ChunkBuilder, ChunkError, ChunkKey};
pub use labels::{LabelEncoder, LabelSet};
pub use model::Span;
pub use store::{ChunkStore, StoreError, WriteContext};
pub use writer::{ErrorPolicy, WriteError, WriteStats, Writer, WriterConfig};
