//! Update-merge strategies
//!
//! - `Replace`: the update payload becomes the new value
//! - `MergeShallow`: top-level keys of an object payload overwrite the old
//!   object's keys; nested objects are replaced wholesale
//! - `Merge`: objects merge recursively, arrays concatenate, sets union,
//!   maps merge with new entries winning; every other leaf is replaced
//!
//! Merging never fails. Type mismatches (object over array, int over
//! string, ...) replace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use stratadex_core::{Error, Value};

/// How an update payload combines with the stored value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateStrategy {
    /// Payload replaces the old value
    Replace,
    /// One level of object merge
    MergeShallow,
    /// Recursive structural merge
    #[default]
    Merge,
}

impl UpdateStrategy {
    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStrategy::Replace => "replace",
            UpdateStrategy::MergeShallow => "merge-shallow",
            UpdateStrategy::Merge => "merge",
        }
    }

    /// Combine `old` with `update`
    pub fn apply(&self, old: Value, update: Value) -> Value {
        match self {
            UpdateStrategy::Replace => update,
            UpdateStrategy::MergeShallow => merge_shallow(old, update),
            UpdateStrategy::Merge => merge_deep(old, update),
        }
    }
}

impl fmt::Display for UpdateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UpdateStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(UpdateStrategy::Replace),
            "merge-shallow" => Ok(UpdateStrategy::MergeShallow),
            "merge" => Ok(UpdateStrategy::Merge),
            other => Err(Error::validation(format!(
                "unknown update strategy '{}', expected replace, merge-shallow or merge",
                other
            ))),
        }
    }
}

/// Top-level object merge
pub fn merge_shallow(old: Value, update: Value) -> Value {
    match (old, update) {
        (Value::Object(mut old), Value::Object(update)) => {
            old.extend(update);
            Value::Object(old)
        }
        (_, update) => update,
    }
}

/// Recursive structural merge
pub fn merge_deep(old: Value, update: Value) -> Value {
    match (old, update) {
        (Value::Object(mut old), Value::Object(update)) => {
            for (key, new) in update {
                let merged = match old.remove(&key) {
                    Some(prev) => merge_deep(prev, new),
                    None => new,
                };
                old.insert(key, merged);
            }
            Value::Object(old)
        }
        (Value::Array(mut old), Value::Array(update)) => {
            old.extend(update);
            Value::Array(old)
        }
        (Value::Set(mut old), Value::Set(update)) => {
            for member in update {
                if !old.contains(&member) {
                    old.push(member);
                }
            }
            Value::Set(old)
        }
        (Value::Map(mut old), Value::Map(update)) => {
            for (key, value) in update {
                match old.iter_mut().find(|(k, _)| *k == key) {
                    Some(slot) => slot.1 = value,
                    None => old.push((key, value)),
                }
            }
            Value::Map(old)
        }
        (_, update) => update,
    }
}
