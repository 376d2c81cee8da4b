//! Storage-layer value wrapper
//!
//! The map is keyed by packed bytes, so the decoded `Key` is rebuilt on read.
//! `StoredValue` keeps what the map owns per key: the raw value and the
//! versionstamp of the commit that wrote it.

use stratadex_core::{Entry, Key, RawValue, Result, Versionstamp};

/// A stored value and its commit versionstamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    value: RawValue,
    versionstamp: Versionstamp,
}

impl StoredValue {
    /// Create a stored value
    pub fn new(value: RawValue, versionstamp: Versionstamp) -> Self {
        StoredValue {
            value,
            versionstamp,
        }
    }

    /// Get the value
    #[inline]
    pub fn value(&self) -> &RawValue {
        &self.value
    }

    /// Get the versionstamp
    #[inline]
    pub fn versionstamp(&self) -> Versionstamp {
        self.versionstamp
    }

    /// Build the contract `Entry` for the packed key this value is stored under
    pub fn to_entry(&self, packed: &[u8]) -> Result<Entry> {
        Ok(Entry {
            key: Key::unpack(packed)?,
            value: self.value.clone(),
            versionstamp: self.versionstamp,
        })
    }
}
