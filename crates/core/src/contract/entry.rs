//! Substrate entries
//!
//! The substrate stores one `RawValue` per key. Document values, index
//! pointers and segment chunks are all `Bytes`; `U64` is the native counter
//! cell that atomic `sum`/`min`/`max` mutations operate on.

use super::Versionstamp;
use crate::types::Key;
use serde::{Deserialize, Serialize};

/// Value held by one substrate key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawValue {
    /// Opaque encoded bytes
    Bytes(Vec<u8>),
    /// Unsigned 64-bit counter cell
    U64(u64),
}

impl RawValue {
    /// Stored size in bytes, as counted against `Limits::max_value_bytes`
    pub fn len(&self) -> usize {
        match self {
            RawValue::Bytes(b) => b.len(),
            RawValue::U64(_) => 8,
        }
    }

    /// True for empty byte payloads
    pub fn is_empty(&self) -> bool {
        matches!(self, RawValue::Bytes(b) if b.is_empty())
    }

    /// Get the bytes if this is a `Bytes` value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RawValue::Bytes(b) => Some(b),
            RawValue::U64(_) => None,
        }
    }

    /// Get the counter if this is a `U64` value
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RawValue::U64(n) => Some(*n),
            RawValue::Bytes(_) => None,
        }
    }
}

/// One key/value pair as read from the substrate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Decoded key
    pub key: Key,
    /// Stored value
    pub value: RawValue,
    /// Versionstamp of the commit that last wrote this key
    pub versionstamp: Versionstamp,
}
