//! Index engine
//!
//! An [`IndexSpec`] maps field names to [`IndexKind`] and is validated once
//! when a collection is built. For every write the engine computes the index
//! entries implied by the old and the new value and folds the difference
//! into the same transaction as the document write:
//!
//! - new primary entries carry a "must not exist" check (uniqueness)
//! - entries implied by the new value are (re)written, so their
//!   versionstamp always equals the document's
//! - entries implied only by the old value are deleted
//!
//! Index entries store the packed owning id and are dereferenced through
//! the id key on read.

use crate::keyspace::KeySpace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stratadex_concurrency::AtomicTransaction;
use stratadex_core::{DocumentId, Error, Key, KeyPart, RawValue, Result, Value};

/// Kind of index on one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// At most one document per value
    Primary,
    /// Many documents per value, ordered by `(value, id)`
    Secondary,
}

/// Validated field-to-kind mapping of a collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSpec {
    fields: BTreeMap<String, IndexKind>,
}

impl IndexSpec {
    /// No indices
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from declarations, rejecting bad names and duplicates
    pub fn from_fields<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, IndexKind)>,
        S: Into<String>,
    {
        let mut spec = IndexSpec::new();
        for (field, kind) in fields {
            spec.declare(field.into(), kind)?;
        }
        Ok(spec)
    }

    fn declare(&mut self, field: String, kind: IndexKind) -> Result<()> {
        if field.is_empty() {
            return Err(Error::validation("index field name is empty"));
        }
        if field.starts_with("__") {
            return Err(Error::validation(format!(
                "index field '{}' uses the reserved '__' prefix",
                field
            )));
        }
        if self.fields.contains_key(&field) {
            return Err(Error::validation(format!(
                "index field '{}' is declared twice",
                field
            )));
        }
        self.fields.insert(field, kind);
        Ok(())
    }

    /// True when no field is indexed
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Kind of index on `field`
    pub fn kind_of(&self, field: &str) -> Option<IndexKind> {
        self.fields.get(field).copied()
    }

    /// Fields with a primary index
    pub fn primary_fields(&self) -> impl Iterator<Item = &str> {
        self.fields_of(IndexKind::Primary)
    }

    /// Fields with a secondary index
    pub fn secondary_fields(&self) -> impl Iterator<Item = &str> {
        self.fields_of(IndexKind::Secondary)
    }

    fn fields_of(&self, kind: IndexKind) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(move |(_, k)| **k == kind)
            .map(|(f, _)| f.as_str())
    }

    /// Fail unless `field` carries an index of `kind`
    pub fn require(&self, field: &str, kind: IndexKind) -> Result<()> {
        match self.kind_of(field) {
            Some(k) if k == kind => Ok(()),
            _ => Err(Error::validation(format!(
                "field '{}' has no {} index",
                field,
                match kind {
                    IndexKind::Primary => "primary",
                    IndexKind::Secondary => "secondary",
                }
            ))),
        }
    }

    /// Index entries implied by a value
    ///
    /// Non-object values and absent or null fields imply no entries.
    pub fn entries(&self, value: &Value) -> Result<IndexEntries> {
        let mut entries = IndexEntries::default();
        if !value.is_object() {
            return Ok(entries);
        }
        for (field, kind) in &self.fields {
            let part = match value.get(field) {
                Some(v) => v
                    .to_key_part()
                    .map_err(|e| Error::validation(format!("index field '{}': {}", field, e)))?,
                None => None,
            };
            if let Some(part) = part {
                let target = match kind {
                    IndexKind::Primary => &mut entries.primary,
                    IndexKind::Secondary => &mut entries.secondary,
                };
                target.push((field.clone(), part));
            }
        }
        Ok(entries)
    }

    /// Entries of an already stored value, skipping fields that cannot be
    /// keyed under the current declarations
    pub fn existing_entries(&self, value: &Value) -> IndexEntries {
        let mut entries = IndexEntries::default();
        for (field, kind) in &self.fields {
            if let Some(Ok(Some(part))) = value.get(field).map(Value::to_key_part) {
                match kind {
                    IndexKind::Primary => entries.primary.push((field.clone(), part)),
                    IndexKind::Secondary => entries.secondary.push((field.clone(), part)),
                }
            }
        }
        entries
    }
}

/// Index entries of one value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntries {
    /// `(field, value)` pairs of primary indices
    pub primary: Vec<(String, KeyPart)>,
    /// `(field, value)` pairs of secondary indices
    pub secondary: Vec<(String, KeyPart)>,
}

impl IndexEntries {
    /// True when there are no entries
    pub fn is_empty(&self) -> bool {
        self.primary.is_empty() && self.secondary.is_empty()
    }

    fn has_primary(&self, field: &str, value: &KeyPart) -> bool {
        self.primary.iter().any(|(f, v)| f == field && v == value)
    }

    fn has_secondary(&self, field: &str, value: &KeyPart) -> bool {
        self.secondary.iter().any(|(f, v)| f == field && v == value)
    }
}

/// Lookup value in the form index keys store it (`-0.0` as `0.0`)
pub fn lookup_part(value: KeyPart) -> KeyPart {
    match value {
        KeyPart::Float(f) if f == 0.0 => KeyPart::Float(0.0),
        other => other,
    }
}

/// Value stored in an index entry
pub fn pointer(id: &DocumentId) -> RawValue {
    RawValue::Bytes(Key::from(vec![id.clone()]).pack())
}

/// Owning id stored in an index entry
pub fn dereference(value: &RawValue) -> Result<DocumentId> {
    let bytes = value
        .as_bytes()
        .ok_or_else(|| Error::corruption("index entry does not hold an id"))?;
    let key = Key::unpack(bytes)?;
    match key.parts() {
        [id] => Ok(id.clone()),
        _ => Err(Error::corruption(format!("index entry holds {} parts", key.len()))),
    }
}

/// Fold the index changes of one write into `txn`
///
/// Returns the primary keys newly claimed by this write.
pub fn plan_write(
    txn: &mut AtomicTransaction,
    keys: &KeySpace,
    id: &DocumentId,
    old: Option<&IndexEntries>,
    new: &IndexEntries,
) -> Vec<Key> {
    let mut claimed = Vec::new();
    let empty = IndexEntries::default();
    let old = old.unwrap_or(&empty);

    for (field, value) in &new.primary {
        let key = keys.primary_index_key(field, value);
        if !old.has_primary(field, value) {
            txn.check(key.clone(), None);
            claimed.push(key.clone());
        }
        txn.set(key, pointer(id));
    }
    for (field, value) in &new.secondary {
        txn.set(keys.secondary_index_key(field, value, id), pointer(id));
    }

    for (field, value) in &old.primary {
        if !new.has_primary(field, value) {
            txn.delete(keys.primary_index_key(field, value));
        }
    }
    for (field, value) in &old.secondary {
        if !new.has_secondary(field, value) {
            txn.delete(keys.secondary_index_key(field, value, id));
        }
    }
    claimed
}

/// Fold the removal of every entry into `txn`
pub fn plan_delete(txn: &mut AtomicTransaction, keys: &KeySpace, id: &DocumentId, old: &IndexEntries) {
    for (field, value) in &old.primary {
        txn.delete(keys.primary_index_key(field, value));
    }
    for (field, value) in &old.secondary {
        txn.delete(keys.secondary_index_key(field, value, id));
    }
}
