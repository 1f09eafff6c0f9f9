//! Span writer
//!
//! Drives one span through label encoding, bucketing, line materialization
//! and chunk building, then hands each distinct chunk to the store.

use fxhash::FxHashSet;
use std::sync::Arc;

use crate::chunk::{ChunkBuilder, ChunkError, Encoding, DEFAULT_BLOCK_SIZE};
use crate::labels::{Label, LabelEncoder, LabelError};
use crate::model::Span;
use crate::store::{ChunkStore, StoreError, WriteContext, DEFAULT_TENANT};
use crate::stream::{
    materialize_entries, BucketPolicy, LineTemplate, ReferenceInstant, StreamError, TimeBucketer,
};

/// What to do when the store rejects a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the failure and carry on with the remaining buckets
    #[default]
    Continue,
    /// Stop and return the store error to the caller
    Abort,
}

impl ErrorPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorPolicy::Continue => "continue",
            ErrorPolicy::Abort => "abort",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "continue" => Some(ErrorPolicy::Continue),
            "abort" => Some(ErrorPolicy::Abort),
            _ => None,
        }
    }
}

/// Writer configuration
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Tenant every chunk is written under
    pub tenant: String,
    /// Where a span's bucket starts
    pub reference_instant: ReferenceInstant,
    pub on_store_error: ErrorPolicy,
    pub line_template: LineTemplate,
    pub encoding: Encoding,
    /// Uncompressed block size in bytes
    pub block_size: usize,
    /// Labels added to every span, e.g. `env="prod"`
    pub static_labels: Vec<Label>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            tenant: DEFAULT_TENANT.to_string(),
            reference_instant: ReferenceInstant::default(),
            on_store_error: ErrorPolicy::default(),
            line_template: LineTemplate::default(),
            encoding: Encoding::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            static_labels: Vec::new(),
        }
    }
}

impl WriterConfig {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            ..Default::default()
        }
    }

    pub fn with_reference_instant(mut self, reference: ReferenceInstant) -> Self {
        self.reference_instant = reference;
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.on_store_error = policy;
        self
    }

    pub fn with_line_template(mut self, template: LineTemplate) -> Self {
        self.line_template = template;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_static_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.static_labels.push(Label::new(name, value));
        self
    }
}

/// Outcome of one `write_span` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct WriteStats {
    pub buckets: usize,
    pub chunks_written: usize,
    pub duplicates_skipped: usize,
    pub store_failures: usize,
}

impl std::ops::AddAssign for WriteStats {
    fn add_assign(&mut self, other: Self) {
        self.buckets += other.buckets;
        self.chunks_written += other.chunks_written;
        self.duplicates_skipped += other.duplicates_skipped;
        self.store_failures += other.store_failures;
    }
}

pub struct Writer {
    ctx: WriteContext,
    config: WriterConfig,
    encoder: LabelEncoder,
    bucketer: Arc<dyn BucketPolicy>,
    builder: ChunkBuilder,
    store: Arc<dyn ChunkStore>,
}

impl Writer {
    pub fn new(config: WriterConfig, store: Arc<dyn ChunkStore>) -> Result<Self, WriteError> {
        let encoder = LabelEncoder::with_static_labels(config.static_labels.clone())?;
        let builder = ChunkBuilder::new(config.tenant.clone())
            .with_encoding(config.encoding)
            .with_block_size(config.block_size);

        Ok(Self {
            ctx: WriteContext::new(config.tenant.clone()),
            bucketer: Arc::new(TimeBucketer::new(config.reference_instant)),
            encoder,
            builder,
            config,
            store,
        })
    }

    /// Replace the default single-bucket policy
    pub fn with_bucket_policy(mut self, policy: Arc<dyn BucketPolicy>) -> Self {
        self.bucketer = policy;
        self
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn context(&self) -> &WriteContext {
        &self.ctx
    }

    /// Write one span.
    ///
    /// Buckets are processed in order. A chunk whose external key was
    /// already submitted during this call is skipped. Store failures are
    /// handled per [`ErrorPolicy`]; bucketing and chunk build failures
    /// always abort before anything is stored.
    pub fn write_span(&self, span: &Span) -> Result<WriteStats, WriteError> {
        let labels = self.encoder.encode(span).to_string();
        let line = self.config.line_template.render(span);
        let buckets = self.bucketer.buckets(span)?;

        let mut stats = WriteStats {
            buckets: buckets.len(),
            ..Default::default()
        };
        let mut submitted: FxHashSet<String> = FxHashSet::default();

        for range in &buckets {
            let entries = materialize_entries(range, &line);
            let chunk = self.builder.build(&labels, &entries)?;

            let key = chunk.external_key().to_string();
            if !submitted.insert(key.clone()) {
                tracing::debug!(key = %key, "Skipping duplicate chunk");
                stats.duplicates_skipped += 1;
                continue;
            }

            let (from, through) = (chunk.from(), chunk.through());
            match self.store.put_one(&self.ctx, from, through, chunk) {
                Ok(()) => stats.chunks_written += 1,
                Err(e) => {
                    stats.store_failures += 1;
                    tracing::warn!(
                        store = self.store.name(),
                        tenant = %self.ctx.tenant,
                        key = %key,
                        error = %e,
                        "Failed to put span chunk"
                    );
                    if self.config.on_store_error == ErrorPolicy::Abort {
                        return Err(WriteError::Store { key, source: e });
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Nothing to release; the store's lifecycle belongs to its owner
    pub fn close(&self) -> Result<(), WriteError> {
        tracing::debug!(tenant = %self.ctx.tenant, "Span writer closed");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Failed to build chunk: {0}")]
    Chunk(#[from] ChunkError),

    #[error("Failed to bucket span: {0}")]
    Bucket(#[from] StreamError),

    #[error("Invalid writer labels: {0}")]
    Labels(#[from] LabelError),

    #[error("Store rejected chunk {key}: {source}")]
    Store {
        key: String,
        #[source]
        source: StoreError,
    },
}
