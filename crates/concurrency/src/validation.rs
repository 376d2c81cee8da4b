//! Commit-time validation
//!
//! Rules:
//! - A check holding `None` fails if the key exists
//! - A check holding `Some(v)` fails unless the key exists with versionstamp `v`
//! - Every failed check is reported; any failure rejects the whole commit
//! - Blind mutations (no check on the key) never conflict

use crate::transaction::{AtomicTransaction, Check};
use stratadex_core::{validate_key_with_limits, Key, Limits, Result, Versionstamp};

/// Why one check failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// The key was required to be absent but exists
    KeyExists {
        /// Checked key
        key: Key,
        /// Versionstamp found
        current: Versionstamp,
    },

    /// The key was expected at a versionstamp but is absent
    KeyMissing {
        /// Checked key
        key: Key,
        /// Versionstamp expected
        expected: Versionstamp,
    },

    /// The key exists at a different versionstamp
    VersionstampMismatch {
        /// Checked key
        key: Key,
        /// Versionstamp expected
        expected: Versionstamp,
        /// Versionstamp found
        current: Versionstamp,
    },
}

impl ConflictType {
    /// Key the conflict was detected on
    pub fn key(&self) -> &Key {
        match self {
            ConflictType::KeyExists { key, .. }
            | ConflictType::KeyMissing { key, .. }
            | ConflictType::VersionstampMismatch { key, .. } => key,
        }
    }
}

/// Result of validating a transaction's checks
///
/// A transaction commits only if `is_valid()` returns true.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// All conflicts detected
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// A result with no conflicts
    pub fn ok() -> Self {
        Self::default()
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Evaluate one check against the key's current versionstamp
pub fn validate_check(check: &Check, current: Option<Versionstamp>) -> Option<ConflictType> {
    match (check.versionstamp, current) {
        (None, None) => None,
        (None, Some(current)) => Some(ConflictType::KeyExists {
            key: check.key.clone(),
            current,
        }),
        (Some(expected), None) => Some(ConflictType::KeyMissing {
            key: check.key.clone(),
            expected,
        }),
        (Some(expected), Some(current)) if expected == current => None,
        (Some(expected), Some(current)) => Some(ConflictType::VersionstampMismatch {
            key: check.key.clone(),
            expected,
            current,
        }),
    }
}

/// Evaluate every check, looking current versionstamps up through `current`
pub fn validate_checks<F>(checks: &[Check], mut current: F) -> ValidationResult
where
    F: FnMut(&Key) -> Option<Versionstamp>,
{
    let conflicts = checks
        .iter()
        .filter_map(|check| validate_check(check, current(&check.key)))
        .collect();
    ValidationResult { conflicts }
}

/// Reject transactions that exceed the substrate's limits
///
/// Runs before any check is evaluated; a violation is an error, not a conflict.
pub fn validate_limits(txn: &AtomicTransaction, limits: &Limits) -> Result<()> {
    limits.validate_commit_shape(txn.checks().len(), txn.mutations().len())?;
    for check in txn.checks() {
        validate_key_with_limits(&check.key, limits)?;
    }
    for mutation in txn.mutations() {
        validate_key_with_limits(&mutation.key, limits)?;
        if let crate::MutationKind::Set(value) = &mutation.kind {
            limits.validate_value_len(value.len())?;
        }
    }
    for message in txn.enqueues() {
        limits.validate_value_len(message.payload.len())?;
    }
    Ok(())
}
