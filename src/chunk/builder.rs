//! Label text and entries → chunk construction

use super::block::{MemChunk, DEFAULT_BLOCK_SIZE};
use super::compression::Encoding;
use super::{Chunk, ChunkError};
use crate::labels::parse_labels;
use crate::stream::Entry;

/// Builds chunks for a single tenant
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    tenant: String,
    encoding: Encoding,
    block_size: usize,
}

impl ChunkBuilder {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            encoding: Encoding::default(),
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Build a chunk from label text and entries.
    ///
    /// `from`/`through` are the smallest and largest entry timestamps, in
    /// whatever order the entries arrive. Nothing is returned unless every
    /// entry was appended and the chunk encoded.
    pub fn build(&self, labels: &str, entries: &[Entry]) -> Result<Chunk, ChunkError> {
        let mut labels = parse_labels(labels)?;
        labels.ensure_kind();

        let first = entries.first().ok_or(ChunkError::EmptyEntries)?;
        let (mut from, mut through) = (first.timestamp, first.timestamp);

        let mut data = MemChunk::new(self.encoding, self.block_size);
        for entry in entries {
            from = from.min(entry.timestamp);
            through = through.max(entry.timestamp);
            data.append(entry)?;
        }
        data.close();

        Chunk::new(&self.tenant, labels, data, from, through)
    }
}

/// Build a chunk with the default encoding and block size
pub fn build_chunk(labels: &str, entries: &[Entry], tenant: &str) -> Result<Chunk, ChunkError> {
    ChunkBuilder::new(tenant).build(labels, entries)
}
