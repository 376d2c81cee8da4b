//! History log records
//!
//! History-enabled collections append one immutable record per write or
//! delete under `history/(id, micros, entry_id)`. The record's value is the
//! collection-encoded document, inline when it fits one entry and
//! otherwise split into chunks under `history_segment/(entry_id, n)`.

use crate::codec::SegmentHeader;
use serde::{Deserialize, Serialize};
use stratadex_core::{DocumentId, Error, Result, Timestamp, Value};

/// Kind of change recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    /// The document was written
    Write,
    /// The document was deleted
    Delete,
}

/// One entry of a document's history
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Document the entry belongs to
    pub id: DocumentId,
    /// Time of the change
    pub timestamp: Timestamp,
    /// Write or delete
    pub kind: HistoryKind,
    /// Written value; `None` for deletes
    pub value: Option<Value>,
}

/// Stored form of a history value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum StoredHistoryValue {
    None,
    Inline(Vec<u8>),
    Segmented(SegmentHeader),
}

/// Stored form of a history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct HistoryRecord {
    pub kind: HistoryKind,
    pub timestamp: u64,
    pub value: StoredHistoryValue,
}

impl HistoryRecord {
    pub(crate) fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::serialization(e.to_string()))
    }

    pub(crate) fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| Error::corruption(format!("bad history record: {}", e)))
    }
}
