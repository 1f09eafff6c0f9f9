//! In-memory chunk made of compressed blocks
//!
//! Entries are appended to an uncompressed head block. When the head block
//! reaches the block size it is cut: compressed and sealed. Closing the
//! chunk cuts the last head block and forbids further appends.

use super::compression::Encoding;
use super::ChunkError;
use crate::stream::Entry;
use chrono::{DateTime, Utc};

/// Target uncompressed size of one block
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

const MAGIC: [u8; 4] = *b"SPCH";
const FORMAT_VERSION: u8 = 1;

/// Timestamp (i64) + line length (u32)
const ENTRY_OVERHEAD: usize = 12;

#[derive(Debug, Clone, Default)]
struct HeadBlock {
    raw: Vec<u8>,
    num_entries: u32,
    mint: i64,
    maxt: i64,
}

impl HeadBlock {
    fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    fn append(&mut self, ts: i64, line: &str) -> Result<(), ChunkError> {
        let len = u32::try_from(line.len()).map_err(|_| ChunkError::EntryTooLarge(line.len()))?;

        self.raw.reserve(ENTRY_OVERHEAD + line.len());
        self.raw.extend_from_slice(&ts.to_le_bytes());
        self.raw.extend_from_slice(&len.to_le_bytes());
        self.raw.extend_from_slice(line.as_bytes());

        if self.num_entries == 0 {
            self.mint = ts;
            self.maxt = ts;
        } else {
            self.mint = self.mint.min(ts);
            self.maxt = self.maxt.max(ts);
        }
        self.num_entries += 1;
        Ok(())
    }
}

/// A sealed, compressed block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedBlock {
    /// Smallest entry timestamp (Unix ns)
    pub mint: i64,
    /// Largest entry timestamp (Unix ns)
    pub maxt: i64,
    pub num_entries: u32,
    /// Compressed payload
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MemChunk {
    encoding: Encoding,
    block_size: usize,
    blocks: Vec<SealedBlock>,
    head: HeadBlock,
    closed: bool,
}

impl MemChunk {
    pub fn new(encoding: Encoding, block_size: usize) -> Self {
        Self {
            encoding,
            block_size: block_size.max(1),
            blocks: Vec::new(),
            head: HeadBlock::default(),
            closed: false,
        }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn blocks(&self) -> &[SealedBlock] {
        &self.blocks
    }

    pub fn num_entries(&self) -> usize {
        self.blocks.iter().map(|b| b.num_entries as usize).sum::<usize>()
            + self.head.num_entries as usize
    }

    /// Append in encounter order; entries need not be sorted
    pub fn append(&mut self, entry: &Entry) -> Result<(), ChunkError> {
        if self.closed {
            return Err(ChunkError::ChunkClosed);
        }

        let ts = entry
            .timestamp
            .timestamp_nanos_opt()
            .ok_or_else(|| ChunkError::TimestampOutOfRange(entry.timestamp.to_rfc3339()))?;

        self.head.append(ts, &entry.line)?;

        if self.head.raw.len() >= self.block_size {
            self.cut();
        }
        Ok(())
    }

    /// Seal the head block
    fn cut(&mut self) {
        if self.head.is_empty() {
            return;
        }

        let head = std::mem::take(&mut self.head);
        self.blocks.push(SealedBlock {
            mint: head.mint,
            maxt: head.maxt,
            num_entries: head.num_entries,
            data: self.encoding.compressor().compress(&head.raw),
        });
    }

    /// Seal remaining entries. No appends are accepted afterwards.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.cut();
        self.closed = true;
    }

    /// Serialize a closed chunk
    pub fn encode(&self) -> Result<Vec<u8>, ChunkError> {
        if !self.closed {
            return Err(ChunkError::NotClosed);
        }

        let payload: usize = self.blocks.iter().map(|b| 24 + b.data.len()).sum();
        let mut out = Vec::with_capacity(10 + payload);

        out.extend_from_slice(&MAGIC);
        out.push(FORMAT_VERSION);
        out.push(self.encoding.to_byte());
        out.extend_from_slice(&(self.blocks.len() as u32).to_le_bytes());

        for block in &self.blocks {
            out.extend_from_slice(&block.mint.to_le_bytes());
            out.extend_from_slice(&block.maxt.to_le_bytes());
            out.extend_from_slice(&block.num_entries.to_le_bytes());
            out.extend_from_slice(&(block.data.len() as u32).to_le_bytes());
            out.extend_from_slice(&block.data);
        }

        Ok(out)
    }

    /// Read back an encoded chunk (always closed)
    pub fn decode(data: &[u8]) -> Result<Self, ChunkError> {
        let mut reader = ByteReader::new(data);

        if reader.read_bytes(4)? != MAGIC {
            return Err(ChunkError::Corrupted("bad magic".to_string()));
        }
        let version = reader.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(ChunkError::Corrupted(format!("unsupported version {}", version)));
        }
        let encoding = Encoding::from_byte(reader.read_u8()?)?;
        let num_blocks = reader.read_u32()?;

        let mut blocks = Vec::new();
        for _ in 0..num_blocks {
            let mint = reader.read_i64()?;
            let maxt = reader.read_i64()?;
            let num_entries = reader.read_u32()?;
            let len = reader.read_u32()? as usize;
            let data = reader.read_bytes(len)?.to_vec();
            blocks.push(SealedBlock {
                mint,
                maxt,
                num_entries,
                data,
            });
        }

        if !reader.is_empty() {
            return Err(ChunkError::Corrupted("trailing bytes".to_string()));
        }

        Ok(Self {
            encoding,
            block_size: DEFAULT_BLOCK_SIZE,
            blocks,
            head: HeadBlock::default(),
            closed: true,
        })
    }

    /// All entries in append order
    pub fn entries(&self) -> Result<Vec<Entry>, ChunkError> {
        let mut entries = Vec::with_capacity(self.num_entries());
        let compressor = self.encoding.compressor();

        for block in &self.blocks {
            let raw = compressor.decompress(&block.data)?;
            let before = entries.len();
            decode_entries(&raw, &mut entries)?;
            if entries.len() - before != block.num_entries as usize {
                return Err(ChunkError::Corrupted("block entry count mismatch".to_string()));
            }
        }
        decode_entries(&self.head.raw, &mut entries)?;

        Ok(entries)
    }
}

fn decode_entries(raw: &[u8], out: &mut Vec<Entry>) -> Result<(), ChunkError> {
    let mut reader = ByteReader::new(raw);
    while !reader.is_empty() {
        let ts = reader.read_i64()?;
        let len = reader.read_u32()? as usize;
        let line = std::str::from_utf8(reader.read_bytes(len)?)
            .map_err(|e| ChunkError::Corrupted(e.to_string()))?;
        out.push(Entry {
            timestamp: DateTime::<Utc>::from_timestamp_nanos(ts),
            line: line.to_string(),
        });
    }
    Ok(())
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], ChunkError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| ChunkError::Corrupted("unexpected end of data".to_string()))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, ChunkError> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, ChunkError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.read_bytes(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn read_i64(&mut self) -> Result<i64, ChunkError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.read_bytes(8)?);
        Ok(i64::from_le_bytes(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn entries(n: i64) -> Vec<Entry> {
        let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Entry::new(base + Duration::seconds(i), format!("line {}", i)))
            .collect()
    }

    #[test]
    fn test_append_close_decode() {
        let mut chunk = MemChunk::new(Encoding::Lz4, DEFAULT_BLOCK_SIZE);
        for entry in entries(10) {
            chunk.append(&entry).unwrap();
        }
        chunk.close();

        assert_eq!(chunk.blocks().len(), 1);
        assert_eq!(chunk.num_entries(), 10);

        let decoded = MemChunk::decode(&chunk.encode().unwrap()).unwrap();
        assert!(decoded.is_closed());
        assert_eq!(decoded.encoding(), Encoding::Lz4);
        assert_eq!(decoded.entries().unwrap(), entries(10));
    }

    #[test]
    fn test_block_cut_at_size() {
        let mut chunk = MemChunk::new(Encoding::None, 64);
        for entry in entries(20) {
            chunk.append(&entry).unwrap();
        }
        chunk.close();

        assert!(chunk.blocks().len() > 1);
        assert_eq!(chunk.num_entries(), 20);
        assert_eq!(chunk.entries().unwrap(), entries(20));
        for block in chunk.blocks() {
            assert!(block.mint <= block.maxt);
        }
    }

    #[test]
    fn test_append_after_close() {
        let mut chunk = MemChunk::new(Encoding::Lz4, DEFAULT_BLOCK_SIZE);
        chunk.close();
        assert!(matches!(
            chunk.append(&entries(1)[0]),
            Err(ChunkError::ChunkClosed)
        ));
    }

    #[test]
    fn test_encode_requires_close() {
        let chunk = MemChunk::new(Encoding::Lz4, DEFAULT_BLOCK_SIZE);
        assert!(matches!(chunk.encode(), Err(ChunkError::NotClosed)));
    }

    #[test]
    fn test_unsorted_entries_keep_order() {
        let mut input = entries(3);
        input.swap(0, 2);

        let mut chunk = MemChunk::new(Encoding::Lz4, DEFAULT_BLOCK_SIZE);
        for entry in &input {
            chunk.append(entry).unwrap();
        }
        chunk.close();

        assert_eq!(chunk.entries().unwrap(), input);
        let block = &chunk.blocks()[0];
        assert_eq!(block.mint, input[2].timestamp.timestamp_nanos_opt().unwrap());
        assert_eq!(block.maxt, input[0].timestamp.timestamp_nanos_opt().unwrap());
    }

    #[test]
    fn test_decode_corrupted() {
        let mut chunk = MemChunk::new(Encoding::Lz4, DEFAULT_BLOCK_SIZE);
        chunk.append(&entries(1)[0]).unwrap();
        chunk.close();
        let encoded = chunk.encode().unwrap();

        assert!(matches!(MemChunk::decode(b"nope"), Err(ChunkError::Corrupted(_))));
        assert!(matches!(
            MemChunk::decode(&encoded[..encoded.len() - 1]),
            Err(ChunkError::Corrupted(_))
        ));

        let mut trailing = encoded.clone();
        trailing.push(0);
        assert!(matches!(MemChunk::decode(&trailing), Err(ChunkError::Corrupted(_))));

        let mut bad_version = encoded;
        bad_version[4] = 99;
        assert!(matches!(MemChunk::decode(&bad_version), Err(ChunkError::Corrupted(_))));
    }
}
