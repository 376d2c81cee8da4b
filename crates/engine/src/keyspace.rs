//! Key-space layout for one collection
//!
//! Every key a collection touches is derived here from its base key
//! `[key_prefix, collection_name]` plus a role segment:
//!
//! | Role | Key |
//! |------|-----|
//! | id | `base + ["__id__", id]` |
//! | primary index | `base + ["__index_primary__", field, value]` |
//! | secondary index | `base + ["__index_secondary__", field, value, id]` |
//! | segment | `base + ["__segment__", id, chunk]` |
//! | undelivered | `base + ["__undelivered__", id]` |
//! | history | `base + ["__history__", id, micros, entry_id]` |
//! | history segment | `base + ["__history_segment__", entry_id, chunk]` |
//!
//! Role segments are distinct strings, so keys of different roles never
//! collide, and packed byte order equals the iteration order each role needs.

use stratadex_core::{DocumentId, Key, KeyPart, ListSelector, Timestamp};

/// Role segment of document entries
pub const ID: &str = "__id__";
/// Role segment of primary index entries
pub const PRIMARY_INDEX: &str = "__index_primary__";
/// Role segment of secondary index entries
pub const SECONDARY_INDEX: &str = "__index_secondary__";
/// Role segment of value chunks
pub const SEGMENT: &str = "__segment__";
/// Role segment of undelivered queue payloads
pub const UNDELIVERED: &str = "__undelivered__";
/// Role segment of history entries
pub const HISTORY: &str = "__history__";
/// Role segment of history value chunks
pub const HISTORY_SEGMENT: &str = "__history_segment__";

/// Key builder rooted at one base key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    base: Key,
}

impl KeySpace {
    /// Key space of a collection
    pub fn new(key_prefix: &str, collection: &str) -> Self {
        KeySpace {
            base: Key::from_parts([key_prefix, collection]),
        }
    }

    /// Key space rooted directly at the database prefix
    pub fn root(key_prefix: &str) -> Self {
        KeySpace {
            base: Key::from_parts([key_prefix]),
        }
    }

    /// The base key
    pub fn base(&self) -> &Key {
        &self.base
    }

    fn role(&self, role: &str) -> Key {
        self.base.child(role)
    }

    // ========== Documents ==========

    /// Prefix of every document key
    pub fn id_prefix(&self) -> Key {
        self.role(ID)
    }

    /// Key of one document
    pub fn id_key(&self, id: &DocumentId) -> Key {
        self.id_prefix().child(id.clone())
    }

    // ========== Indices ==========

    /// Key of the primary entry for `(field, value)`
    pub fn primary_index_key(&self, field: &str, value: &KeyPart) -> Key {
        self.role(PRIMARY_INDEX).child(field).child(value.clone())
    }

    /// Prefix of every primary entry of `field`
    pub fn primary_field_prefix(&self, field: &str) -> Key {
        self.role(PRIMARY_INDEX).child(field)
    }

    /// Key of the secondary entry for `(field, value, id)`
    pub fn secondary_index_key(&self, field: &str, value: &KeyPart, id: &DocumentId) -> Key {
        self.secondary_value_prefix(field, value).child(id.clone())
    }

    /// Prefix of every secondary entry of `field`, ordered by `(value, id)`
    pub fn secondary_field_prefix(&self, field: &str) -> Key {
        self.role(SECONDARY_INDEX).child(field)
    }

    /// Prefix of the secondary entries sharing `(field, value)`
    pub fn secondary_value_prefix(&self, field: &str, value: &KeyPart) -> Key {
        self.secondary_field_prefix(field).child(value.clone())
    }

    // ========== Segments ==========

    /// Prefix of the chunks of one document
    pub fn segment_prefix(&self, id: &DocumentId) -> Key {
        self.role(SEGMENT).child(id.clone())
    }

    /// Key of one chunk
    pub fn segment_key(&self, id: &DocumentId, chunk: u32) -> Key {
        self.segment_prefix(id).child(chunk)
    }

    // ========== Queue ==========

    /// Prefix of undelivered payloads
    pub fn undelivered_prefix(&self) -> Key {
        self.role(UNDELIVERED)
    }

    /// Key under which an undelivered payload is persisted
    pub fn undelivered_key(&self, id: &DocumentId) -> Key {
        self.undelivered_prefix().child(id.clone())
    }

    // ========== History ==========

    /// Prefix of every history entry
    pub fn history_root(&self) -> Key {
        self.role(HISTORY)
    }

    /// Prefix of the history entries of one document
    pub fn history_prefix(&self, id: &DocumentId) -> Key {
        self.history_root().child(id.clone())
    }

    /// Key of one history entry
    pub fn history_key(&self, id: &DocumentId, timestamp: Timestamp, entry_id: &str) -> Key {
        self.history_prefix(id)
            .child(timestamp.to_key_part())
            .child(entry_id)
    }

    /// Prefix of every history chunk
    pub fn history_segment_root(&self) -> Key {
        self.role(HISTORY_SEGMENT)
    }

    /// Prefix of the chunks of one history entry
    pub fn history_segment_prefix(&self, entry_id: &str) -> Key {
        self.history_segment_root().child(entry_id)
    }

    /// Key of one history chunk
    pub fn history_segment_key(&self, entry_id: &str, chunk: u32) -> Key {
        self.history_segment_prefix(entry_id).child(chunk)
    }

    // ========== Ranges ==========

    /// Every key under the base
    pub fn everything(&self) -> ListSelector {
        ListSelector::prefix(&self.base)
    }

    /// Document id carried by a document key
    pub fn id_of(&self, key: &Key) -> Option<DocumentId> {
        if key.len() == self.base.len() + 2 && key.starts_with(&self.id_prefix()) {
            key.last().cloned()
        } else {
            None
        }
    }
}
