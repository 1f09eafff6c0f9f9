//! Block compression
//!
//! LZ4 is the default: chunk lines are highly repetitive and LZ4 compresses
//! them well at very low CPU cost.

/// Compression algorithm identifier, stored in the chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// No compression
    None,
    /// LZ4 block compression
    #[default]
    Lz4,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::None => "none",
            Encoding::Lz4 => "lz4",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Encoding::None),
            "lz4" => Some(Encoding::Lz4),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Encoding::None => 0,
            Encoding::Lz4 => 1,
        }
    }

    pub fn from_byte(b: u8) -> Result<Self, CompressionError> {
        match b {
            0 => Ok(Encoding::None),
            1 => Ok(Encoding::Lz4),
            other => Err(CompressionError::UnknownEncoding(other)),
        }
    }

    pub fn compressor(self) -> &'static dyn Compressor {
        match self {
            Encoding::None => &NoopCompressor,
            Encoding::Lz4 => &Lz4Compressor,
        }
    }
}

/// Trait for compressing block data
pub trait Compressor: Send + Sync {
    /// Compress data and return compressed bytes
    fn compress(&self, data: &[u8]) -> Vec<u8>;

    /// Decompress data and return original bytes
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError>;

    fn encoding(&self) -> Encoding;
}

/// LZ4 compressor
#[derive(Debug, Clone, Default)]
pub struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Vec<u8> {
        if data.is_empty() {
            return vec![];
        }
        lz4_flex::compress_prepend_size(data)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        if data.is_empty() {
            return Ok(vec![]);
        }
        if data.len() < 4 {
            return Err(CompressionError::InvalidData);
        }

        lz4_flex::decompress_size_prepended(data)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))
    }

    fn encoding(&self) -> Encoding {
        Encoding::Lz4
    }
}

/// Pass-through compressor
#[derive(Debug, Clone, Default)]
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn compress(&self, data: &[u8]) -> Vec<u8> {
        data.to_vec()
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, CompressionError> {
        Ok(data.to_vec())
    }

    fn encoding(&self) -> Encoding {
        Encoding::None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompressionError {
    #[error("Failed to decompress: {0}")]
    DecompressionFailed(String),

    #[error("Invalid compressed data")]
    InvalidData,

    #[error("Unknown encoding byte {0}")]
    UnknownEncoding(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lz4_repetitive_lines() {
        let line = b"level=info caller=jaeger component=chunks latency=\"5s\"";
        let data: Vec<u8> = line.iter().copied().cycle().take(line.len() * 200).collect();

        let compressor = Encoding::Lz4.compressor();
        let compressed = compressor.compress(&data);
        assert!(compressed.len() < data.len() / 10);
        assert_eq!(compressor.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn test_lz4_empty() {
        let compressor = Lz4Compressor;
        assert!(compressor.compress(&[]).is_empty());
        assert!(compressor.decompress(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_lz4_truncated() {
        assert!(matches!(Lz4Compressor.decompress(&[1, 2]), Err(CompressionError::InvalidData)));
        let compressed = Lz4Compressor.compress(b"some data that will be cut short");
        assert!(Lz4Compressor.decompress(&compressed[..compressed.len() - 3]).is_err());
    }

    #[test]
    fn test_encoding_bytes() {
        for encoding in [Encoding::None, Encoding::Lz4] {
            assert_eq!(Encoding::from_byte(encoding.to_byte()).unwrap(), encoding);
            assert_eq!(Encoding::parse(encoding.as_str()), Some(encoding));
            assert_eq!(encoding.compressor().encoding(), encoding);
        }
        assert!(matches!(Encoding::from_byte(9), Err(CompressionError::UnknownEncoding(9))));
    }
}
