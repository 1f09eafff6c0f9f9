//! Immutable, compressed, label-identified chunks
//!
//! A [`Chunk`] is built once per bucket per span by the [`ChunkBuilder`],
//! then handed to a store. Its identity is the [`ChunkKey`]: tenant, label
//! fingerprint and time bounds.

mod block;
mod builder;
pub mod compression;

pub use block::{MemChunk, SealedBlock, DEFAULT_BLOCK_SIZE};
pub use builder::{build_chunk, ChunkBuilder};
pub use compression::{CompressionError, Encoding};

use crate::labels::{Fingerprint, LabelError, LabelSet};
use crate::stream::Entry;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Identity of a chunk: `<tenant>/<fingerprint>:<from ms>:<through ms>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChunkKey {
    pub tenant: String,
    pub fingerprint: Fingerprint,
    /// Unix milliseconds
    pub from: i64,
    /// Unix milliseconds
    pub through: i64,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}:{:x}:{:x}",
            self.tenant, self.fingerprint, self.from, self.through
        )
    }
}

impl FromStr for ChunkKey {
    type Err = ChunkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ChunkError::InvalidKey(s.to_string());

        let (tenant, rest) = s.rsplit_once('/').ok_or_else(invalid)?;
        let mut parts = rest.split(':');
        let (Some(fp), Some(from), Some(through), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let parse_ms = |v: &str| u64::from_str_radix(v, 16).map(|v| v as i64).map_err(|_| invalid());

        if tenant.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            tenant: tenant.to_string(),
            fingerprint: fp.parse().map_err(|_| invalid())?,
            from: parse_ms(from)?,
            through: parse_ms(through)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    tenant: String,
    fingerprint: Fingerprint,
    labels: LabelSet,
    from: DateTime<Utc>,
    through: DateTime<Utc>,
    data: MemChunk,
    encoded: Vec<u8>,
    checksum: u64,
    external_key: String,
}

impl Chunk {
    /// Assemble a chunk around closed data, encoding it and caching its identity
    pub(crate) fn new(
        tenant: &str,
        labels: LabelSet,
        data: MemChunk,
        from: DateTime<Utc>,
        through: DateTime<Utc>,
    ) -> Result<Self, ChunkError> {
        let fingerprint = labels.fingerprint();
        let encoded = data.encode()?;
        let checksum = fxhash::hash64(&encoded);
        let external_key = ChunkKey {
            tenant: tenant.to_string(),
            fingerprint,
            from: from.timestamp_millis(),
            through: through.timestamp_millis(),
        }
        .to_string();

        Ok(Self {
            tenant: tenant.to_string(),
            fingerprint,
            labels,
            from,
            through,
            data,
            encoded,
            checksum,
            external_key,
        })
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Smallest appended entry timestamp
    pub fn from(&self) -> DateTime<Utc> {
        self.from
    }

    /// Largest appended entry timestamp
    pub fn through(&self) -> DateTime<Utc> {
        self.through
    }

    pub fn data(&self) -> &MemChunk {
        &self.data
    }

    /// Encoded bytes as persisted by stores
    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    /// Hash of the encoded bytes
    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    pub fn external_key(&self) -> &str {
        &self.external_key
    }

    pub fn key(&self) -> ChunkKey {
        ChunkKey {
            tenant: self.tenant.clone(),
            fingerprint: self.fingerprint,
            from: self.from.timestamp_millis(),
            through: self.through.timestamp_millis(),
        }
    }

    pub fn entries(&self) -> Result<Vec<Entry>, ChunkError> {
        self.data.entries()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("Cannot build a chunk without entries")]
    EmptyEntries,

    #[error("Label parse error: {0}")]
    LabelParse(#[from] LabelError),

    #[error("Compression error: {0}")]
    Compression(#[from] CompressionError),

    #[error("Chunk is closed")]
    ChunkClosed,

    #[error("Chunk must be closed before encoding")]
    NotClosed,

    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(String),

    #[error("Entry of {0} bytes is too large")]
    EntryTooLarge(usize),

    #[error("Corrupted chunk: {0}")]
    Corrupted(String),

    #[error("Invalid chunk key '{0}'")]
    InvalidKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trip() {
        let key = ChunkKey {
            tenant: "fake".to_string(),
            fingerprint: Fingerprint(0xdeadbeef),
            from: 1_672_531_200_000,
            through: 1_672_531_204_000,
        };
        let text = key.to_string();
        assert_eq!(text, "fake/00000000deadbeef:1856aa0c800:1856aa0d7a0");
        assert_eq!(text.parse::<ChunkKey>().unwrap(), key);
    }

    #[test]
    fn test_invalid_keys() {
        for bad in [
            "",
            "no-slash",
            "/00000000deadbeef:1:2",
            "fake/00000000deadbeef:1",
            "fake/00000000deadbeef:1:2:3",
            "fake/zz:1:2",
            "fake/00000000deadbeef:g:2",
        ] {
            assert!(
                matches!(bad.parse::<ChunkKey>(), Err(ChunkError::InvalidKey(_))),
                "{} should be rejected",
                bad
            );
        }
    }
}
