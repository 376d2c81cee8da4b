//! Optional byte compression of encoded values

use serde::{Deserialize, Serialize};
use stratadex_core::{Error, Result};

/// Default zstd level
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// Compression applied after serialization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Compression {
    /// Bytes are stored as serialized
    #[default]
    None,
    /// zstd at the given level
    Zstd {
        /// Compression level
        level: i32,
    },
}

impl Compression {
    /// zstd at the default level
    pub fn zstd() -> Self {
        Compression::Zstd {
            level: DEFAULT_ZSTD_LEVEL,
        }
    }

    /// Compress serialized bytes
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Zstd { level } => zstd::encode_all(data, *level)
                .map_err(|e| Error::serialization(format!("zstd compress: {}", e))),
        }
    }

    /// Reverse [`Compression::compress`]
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Zstd { .. } => zstd::decode_all(data)
                .map_err(|e| Error::serialization(format!("zstd decompress: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_shrinks_repetitive_input() {
        let data = vec![7u8; 10_000];
        let packed = Compression::zstd().compress(&data).unwrap();
        assert!(packed.len() < data.len() / 10);
        assert_eq!(Compression::zstd().decompress(&packed).unwrap(), data);
    }

    #[test]
    fn test_none_is_identity() {
        assert_eq!(Compression::None.compress(b"abc").unwrap(), b"abc");
    }

    #[test]
    fn test_zstd_rejects_garbage() {
        assert!(Compression::zstd().decompress(b"not zstd").is_err());
    }
}
