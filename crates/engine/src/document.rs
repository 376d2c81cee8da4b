//! Documents and write outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use stratadex_core::{DocumentId, Value, Versionstamp};

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Id inside its collection
    pub id: DocumentId,
    /// Current value
    pub value: Value,
    /// Versionstamp of the last write
    pub versionstamp: Versionstamp,
}

impl Document {
    /// Field of an object value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.get(field)
    }
}

/// Outcome of one document write
///
/// A conflict is an expected result of optimistic concurrency: a
/// versionstamp or uniqueness precondition failed and nothing was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The write was committed
    Committed {
        /// Written document
        id: DocumentId,
        /// Versionstamp of the commit
        versionstamp: Versionstamp,
    },
    /// A precondition failed; the store is unchanged
    Conflict {
        /// Targeted document
        id: DocumentId,
    },
}

impl CommitOutcome {
    /// True if committed
    pub fn is_ok(&self) -> bool {
        matches!(self, CommitOutcome::Committed { .. })
    }

    /// Targeted document
    pub fn id(&self) -> &DocumentId {
        match self {
            CommitOutcome::Committed { id, .. } | CommitOutcome::Conflict { id } => id,
        }
    }

    /// Commit versionstamp, if committed
    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            CommitOutcome::Committed { versionstamp, .. } => Some(*versionstamp),
            CommitOutcome::Conflict { .. } => None,
        }
    }
}

impl fmt::Display for CommitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitOutcome::Committed { id, versionstamp } => {
                write!(f, "committed {} at {}", id, versionstamp)
            }
            CommitOutcome::Conflict { id } => write!(f, "conflict on {}", id),
        }
    }
}

/// Options of `set`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Replace an existing document instead of failing
    pub overwrite: bool,
}

impl SetOptions {
    /// Allow replacing an existing document
    pub fn overwrite() -> Self {
        SetOptions { overwrite: true }
    }
}
