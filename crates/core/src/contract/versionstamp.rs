//! Versionstamps
//!
//! A versionstamp is the opaque token a substrate issues for every committed
//! write. Every key written by one commit carries the same versionstamp, and
//! versionstamps strictly increase from one commit to the next.
//!
//! Callers use them as optimistic-concurrency preconditions: a `Check` holding
//! the versionstamp observed by a read fails if the key was written since.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque 10-byte commit token
///
/// The first 8 bytes are a big-endian commit sequence, the last 2 a batch
/// index, so byte order equals commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Versionstamp([u8; 10]);

impl Versionstamp {
    /// The smallest versionstamp; never issued for a commit
    pub const ZERO: Versionstamp = Versionstamp([0; 10]);

    /// Build the versionstamp of commit number `sequence`
    pub fn from_sequence(sequence: u64) -> Self {
        let mut bytes = [0u8; 10];
        bytes[..8].copy_from_slice(&sequence.to_be_bytes());
        Versionstamp(bytes)
    }

    /// Wrap raw bytes
    pub const fn from_bytes(bytes: [u8; 10]) -> Self {
        Versionstamp(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 10] {
        &self.0
    }

    /// Parse the 20-character hex form produced by `Display`
    pub fn parse_hex(s: &str) -> Option<Self> {
        if s.len() != 20 || !s.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 10];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Versionstamp(bytes))
    }
}

impl fmt::Display for Versionstamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}
