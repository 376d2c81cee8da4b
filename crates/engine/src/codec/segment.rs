//! Value segmentation
//!
//! A segmented document stores a [`SegmentHeader`] at its id key and the
//! encoded bytes as ordered chunks under `segment/(id, n)`. Chunks are at
//! most `chunk_size` bytes; an empty encoding has zero chunks.
//!
//! Reassembly verifies chunk count, total length and the xxh3 digest of the
//! concatenated bytes. Any mismatch is reported as corruption.

use serde::{Deserialize, Serialize};
use stratadex_core::{Error, Result};
use xxhash_rust::xxh3::xxh3_64;

/// Descriptor stored in place of a segmented value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentHeader {
    /// Number of chunks
    pub chunk_count: u32,
    /// Length of the concatenated bytes
    pub total_len: u64,
    /// xxh3-64 of the concatenated bytes
    pub digest: u64,
}

impl SegmentHeader {
    /// Describe `bytes` split into chunks of `chunk_size`
    pub fn describe(bytes: &[u8], chunk_size: usize) -> Self {
        SegmentHeader {
            chunk_count: chunk_count(bytes.len(), chunk_size),
            total_len: bytes.len() as u64,
            digest: xxh3_64(bytes),
        }
    }

    /// Encode the header for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Decode a stored header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| Error::corruption(format!("bad segment header: {}", e)))
    }
}

fn chunk_count(len: usize, chunk_size: usize) -> u32 {
    if len == 0 {
        0
    } else {
        len.div_ceil(chunk_size.max(1)) as u32
    }
}

/// Split encoded bytes into chunks of at most `chunk_size`
pub fn split(bytes: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    bytes.chunks(chunk_size.max(1)).collect()
}

/// Concatenate chunks in order and verify them against the header
pub fn reassemble(header: &SegmentHeader, chunks: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    if chunks.len() != header.chunk_count as usize {
        return Err(Error::corruption(format!(
            "expected {} chunks, found {}",
            header.chunk_count,
            chunks.len()
        )));
    }
    let mut bytes = Vec::with_capacity(header.total_len as usize);
    for chunk in chunks {
        bytes.extend_from_slice(&chunk);
    }
    if bytes.len() as u64 != header.total_len {
        return Err(Error::corruption(format!(
            "expected {} bytes, found {}",
            header.total_len,
            bytes.len()
        )));
    }
    if xxh3_64(&bytes) != header.digest {
        return Err(Error::corruption("segment digest mismatch"));
    }
    Ok(bytes)
}
