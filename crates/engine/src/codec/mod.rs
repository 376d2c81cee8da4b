//! Document codec
//!
//! Encoding pipeline per document: serialize, then optionally compress.
//! Segmented collections additionally split the encoded bytes into chunks
//! bounded by the substrate's single-entry limit (see [`segment`]).
//!
//! # Usage
//!
//! ```ignore
//! use stratadex_engine::codec::{Codec, Compression, SerializerKind};
//!
//! let codec = Codec::new(SerializerKind::MessagePack, Compression::zstd());
//! let bytes = codec.encode(&value)?;
//! assert_eq!(codec.decode(&bytes)?, value);
//! ```

mod compression;
pub mod segment;
mod serializer;

pub use compression::Compression;
pub use segment::SegmentHeader;
pub use serializer::SerializerKind;

use stratadex_core::{Result, Value};

/// Serializer plus compressor, chosen per collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Codec {
    serializer: SerializerKind,
    compression: Compression,
}

impl Codec {
    /// Create a codec
    pub fn new(serializer: SerializerKind, compression: Compression) -> Self {
        Codec {
            serializer,
            compression,
        }
    }

    /// Serializer in use
    pub fn serializer(&self) -> SerializerKind {
        self.serializer
    }

    /// Compression in use
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Serialize then compress
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let raw = self.serializer.serialize(value)?;
        self.compression.compress(&raw)
    }

    /// Decompress then deserialize
    pub fn decode(&self, bytes: &[u8]) -> Result<Value> {
        let raw = self.compression.decompress(bytes)?;
        self.serializer.deserialize(&raw)
    }
}
