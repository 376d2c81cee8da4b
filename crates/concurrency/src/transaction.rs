//! Atomic transaction model
//!
//! An `AtomicTransaction` is the only write path into a substrate. It carries:
//! - checks: per-key versionstamp preconditions (`None` means "must not exist")
//! - mutations: set / delete / counter `sum`, `min`, `max`
//! - enqueues: queue messages delivered only if the commit succeeds
//!
//! Commit is all-or-nothing. If any check fails, no mutation is applied and no
//! message is enqueued; the substrate reports `CommitResult::Conflict`. Every
//! key written by a successful commit receives the same versionstamp.

use crate::validation::ValidationResult;
use std::time::Duration;
use stratadex_core::{Key, RawValue, Versionstamp};

/// Versionstamp precondition on one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// Key to check
    pub key: Key,
    /// Expected versionstamp; `None` requires the key to be absent
    pub versionstamp: Option<Versionstamp>,
}

impl Check {
    /// Precondition: `key` must not exist
    pub fn absent(key: Key) -> Self {
        Check {
            key,
            versionstamp: None,
        }
    }

    /// Precondition: `key` was last written at `versionstamp`
    pub fn at(key: Key, versionstamp: Versionstamp) -> Self {
        Check {
            key,
            versionstamp: Some(versionstamp),
        }
    }
}

/// Kind of a mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// Store a value
    Set(RawValue),
    /// Remove the key
    Delete,
    /// Wrapping add onto a `U64` cell (absent counts as 0)
    Sum(u64),
    /// Keep the smaller of the cell and the operand (absent stores the operand)
    Min(u64),
    /// Keep the larger of the cell and the operand (absent stores the operand)
    Max(u64),
}

impl MutationKind {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            MutationKind::Set(_) => "set",
            MutationKind::Delete => "delete",
            MutationKind::Sum(_) => "sum",
            MutationKind::Min(_) => "min",
            MutationKind::Max(_) => "max",
        }
    }
}

/// One key mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    /// Target key
    pub key: Key,
    /// What to do
    pub kind: MutationKind,
}

/// A queue message attached to a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueue {
    /// Opaque payload handed to the queue listener
    pub payload: Vec<u8>,
    /// Delay before first delivery
    pub delay: Option<Duration>,
    /// Keys the payload is written to if every delivery attempt fails
    pub keys_if_undelivered: Vec<Key>,
    /// Delays between redelivery attempts; `None` uses the substrate default
    pub backoff_schedule: Option<Vec<Duration>>,
}

impl Enqueue {
    /// Message with default delivery options
    pub fn new(payload: Vec<u8>) -> Self {
        Enqueue {
            payload,
            delay: None,
            keys_if_undelivered: Vec::new(),
            backoff_schedule: None,
        }
    }
}

/// Summary of buffered operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingOperations {
    /// Number of checks
    pub checks: usize,
    /// Number of mutations
    pub mutations: usize,
    /// Number of queue messages
    pub enqueues: usize,
}

/// Checks, mutations and queue messages committed as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AtomicTransaction {
    checks: Vec<Check>,
    mutations: Vec<Mutation>,
    enqueues: Vec<Enqueue>,
}

impl AtomicTransaction {
    /// Create an empty transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a precondition
    pub fn check(&mut self, key: Key, versionstamp: Option<Versionstamp>) -> &mut Self {
        self.checks.push(Check { key, versionstamp });
        self
    }

    /// Add a prepared precondition
    pub fn push_check(&mut self, check: Check) -> &mut Self {
        self.checks.push(check);
        self
    }

    /// Store `value` at `key`
    pub fn set(&mut self, key: Key, value: RawValue) -> &mut Self {
        self.push_mutation(Mutation {
            key,
            kind: MutationKind::Set(value),
        })
    }

    /// Remove `key`
    pub fn delete(&mut self, key: Key) -> &mut Self {
        self.push_mutation(Mutation {
            key,
            kind: MutationKind::Delete,
        })
    }

    /// Wrapping add onto the counter at `key`
    pub fn sum(&mut self, key: Key, operand: u64) -> &mut Self {
        self.push_mutation(Mutation {
            key,
            kind: MutationKind::Sum(operand),
        })
    }

    /// Minimum of the counter at `key` and `operand`
    pub fn min(&mut self, key: Key, operand: u64) -> &mut Self {
        self.push_mutation(Mutation {
            key,
            kind: MutationKind::Min(operand),
        })
    }

    /// Maximum of the counter at `key` and `operand`
    pub fn max(&mut self, key: Key, operand: u64) -> &mut Self {
        self.push_mutation(Mutation {
            key,
            kind: MutationKind::Max(operand),
        })
    }

    /// Add a prepared mutation
    pub fn push_mutation(&mut self, mutation: Mutation) -> &mut Self {
        self.mutations.push(mutation);
        self
    }

    /// Attach a queue message
    pub fn enqueue(&mut self, message: Enqueue) -> &mut Self {
        self.enqueues.push(message);
        self
    }

    /// Append everything buffered in `other`
    pub fn extend(&mut self, other: AtomicTransaction) -> &mut Self {
        self.checks.extend(other.checks);
        self.mutations.extend(other.mutations);
        self.enqueues.extend(other.enqueues);
        self
    }

    /// Buffered checks
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Buffered mutations, in application order
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    /// Buffered queue messages
    pub fn enqueues(&self) -> &[Enqueue] {
        &self.enqueues
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty() && self.mutations.is_empty() && self.enqueues.is_empty()
    }

    /// Counts of buffered operations
    pub fn pending(&self) -> PendingOperations {
        PendingOperations {
            checks: self.checks.len(),
            mutations: self.mutations.len(),
            enqueues: self.enqueues.len(),
        }
    }

    /// Consume into `(checks, mutations, enqueues)`
    pub fn into_parts(self) -> (Vec<Check>, Vec<Mutation>, Vec<Enqueue>) {
        (self.checks, self.mutations, self.enqueues)
    }
}

/// Outcome of one atomic commit
#[derive(Debug, Clone)]
pub enum CommitResult {
    /// All checks held and every mutation was applied
    Committed {
        /// Versionstamp shared by every key written
        versionstamp: Versionstamp,
    },
    /// At least one check failed; nothing was applied
    Conflict(ValidationResult),
}

impl CommitResult {
    /// True if the commit was applied
    pub fn is_ok(&self) -> bool {
        matches!(self, CommitResult::Committed { .. })
    }

    /// Versionstamp of an applied commit
    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            CommitResult::Committed { versionstamp } => Some(*versionstamp),
            CommitResult::Conflict(_) => None,
        }
    }
}
