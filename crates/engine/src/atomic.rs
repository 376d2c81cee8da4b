//! Atomic transaction builder
//!
//! Accumulates operations against one or more collections and commits them
//! as exactly one substrate transaction. Every operation is validated when
//! it is added; the only substrate access before the commit itself is the
//! read a delete needs to find index entries and segment chunks.
//!
//! Operations that would need a read-modify-write cycle the single commit
//! cannot interleave are rejected with `Error::Unsupported` at build time:
//!
//! | Operation | Rejected on |
//! |-----------|-------------|
//! | `set` with overwrite | indexable or segmented collections |
//! | `sum` / `min` / `max` | indexable, segmented or history collections |
//!
//! # Example
//!
//! ```ignore
//! let outcome = db
//!     .atomic()
//!     .select(&users)
//!     .add(alice)?
//!     .check("bob", Some(bob_versionstamp))?
//!     .select(&stats)
//!     .sum("signups", 1)?
//!     .commit()
//!     .await?;
//! ```

use crate::collection::{Collection, Prepared};
use crate::database::Shared;
use crate::document::SetOptions;
use crate::queue::EnqueueOptions;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use stratadex_concurrency::{AtomicTransaction, CommitResult, Enqueue};
use stratadex_core::{DocumentId, Error, Key, Result, Value, Versionstamp};
use tracing::debug;

/// Result of an atomic commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOutcome {
    /// Every operation took effect
    Committed {
        /// Versionstamp shared by every written key
        versionstamp: Versionstamp,
    },
    /// A check failed; nothing took effect
    Conflict,
}

impl AtomicOutcome {
    /// True if committed
    pub fn is_ok(&self) -> bool {
        matches!(self, AtomicOutcome::Committed { .. })
    }

    /// Commit versionstamp, if committed
    pub fn versionstamp(&self) -> Option<Versionstamp> {
        match self {
            AtomicOutcome::Committed { versionstamp } => Some(*versionstamp),
            AtomicOutcome::Conflict => None,
        }
    }
}

/// One operation of [`AtomicBuilder::mutate`]
#[derive(Debug, Clone, PartialEq)]
pub enum AtomicMutation {
    /// Add under a generated id
    Add {
        /// Document value
        value: Value,
    },
    /// Store under `id`
    Set {
        /// Target id
        id: DocumentId,
        /// Document value
        value: Value,
        /// Overwrite options
        options: SetOptions,
    },
    /// Delete `id`
    Delete {
        /// Target id
        id: DocumentId,
    },
    /// Wrapping add on a counter
    Sum {
        /// Target id
        id: DocumentId,
        /// Operand
        operand: u64,
    },
    /// Keep the smaller of counter and operand
    Min {
        /// Target id
        id: DocumentId,
        /// Operand
        operand: u64,
    },
    /// Keep the larger of counter and operand
    Max {
        /// Target id
        id: DocumentId,
        /// Operand
        operand: u64,
    },
}

#[derive(Debug, Clone, Copy)]
enum CounterOp {
    Sum,
    Min,
    Max,
}

impl CounterOp {
    fn name(self) -> &'static str {
        match self {
            CounterOp::Sum => "sum",
            CounterOp::Min => "min",
            CounterOp::Max => "max",
        }
    }
}

enum Op {
    Insert {
        collection: Collection,
        id: Option<DocumentId>,
        prepared: Prepared,
    },
    Overwrite {
        collection: Collection,
        id: DocumentId,
        prepared: Prepared,
    },
    Delete {
        collection: Collection,
        id: DocumentId,
    },
    Counter {
        collection: Collection,
        id: DocumentId,
        op: CounterOp,
        operand: u64,
    },
    Check {
        collection: Collection,
        id: DocumentId,
        versionstamp: Option<Versionstamp>,
    },
    Enqueue(Enqueue),
}

/// Builder of one cross-collection transaction
pub struct AtomicBuilder {
    shared: Arc<Shared>,
    target: Option<Collection>,
    ops: Vec<Op>,
}

impl AtomicBuilder {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        AtomicBuilder {
            shared,
            target: None,
            ops: Vec::new(),
        }
    }

    /// Direct the following operations at `collection`
    pub fn select(mut self, collection: &Collection) -> Self {
        self.target = Some(collection.clone());
        self
    }

    fn target(&self, operation: &str) -> Result<Collection> {
        let collection = self.target.clone().ok_or_else(|| {
            Error::validation(format!("atomic {}: no collection selected", operation))
        })?;
        if !Arc::ptr_eq(collection.shared(), &self.shared) {
            return Err(Error::validation(format!(
                "atomic {}: collection '{}' belongs to another database",
                operation,
                collection.name()
            )));
        }
        Ok(collection)
    }

    // ========== Operations ==========

    /// Add a document under a generated id
    pub fn add(mut self, value: impl Into<Value>) -> Result<Self> {
        let collection = self.target("add")?;
        let prepared = collection.prepare(value.into())?;
        self.ops.push(Op::Insert {
            collection,
            id: None,
            prepared,
        });
        Ok(self)
    }

    /// Store a document under `id`
    ///
    /// # Errors
    ///
    /// Overwrite on an indexable or segmented collection is
    /// `Error::Unsupported`: retiring the old entries needs a prior read.
    pub fn set(mut self, id: impl Into<DocumentId>, value: impl Into<Value>, options: SetOptions) -> Result<Self> {
        let collection = self.target("set")?;
        if options.overwrite && !collection.is_plain() {
            return Err(Error::unsupported(
                "set",
                format!(
                    "overwrite in '{}' must retire index entries or chunks; use Collection::set",
                    collection.name()
                ),
            ));
        }
        let prepared = collection.prepare(value.into())?;
        let id = id.into();
        self.ops.push(if options.overwrite {
            Op::Overwrite {
                collection,
                id,
                prepared,
            }
        } else {
            Op::Insert {
                collection,
                id: Some(id),
                prepared,
            }
        });
        Ok(self)
    }

    /// Delete a document with everything attached to it
    pub fn delete(mut self, id: impl Into<DocumentId>) -> Result<Self> {
        let collection = self.target("delete")?;
        self.ops.push(Op::Delete {
            collection,
            id: id.into(),
        });
        Ok(self)
    }

    fn counter(mut self, id: DocumentId, op: CounterOp, operand: u64) -> Result<Self> {
        let collection = self.target(op.name())?;
        if !collection.is_plain() || collection.has_history() {
            return Err(Error::unsupported(
                op.name(),
                format!(
                    "counters need a plain collection without history; '{}' is not",
                    collection.name()
                ),
            ));
        }
        self.ops.push(Op::Counter {
            collection,
            id,
            op,
            operand,
        });
        Ok(self)
    }

    /// Wrapping add on the counter at `id`
    pub fn sum(self, id: impl Into<DocumentId>, operand: u64) -> Result<Self> {
        self.counter(id.into(), CounterOp::Sum, operand)
    }

    /// Keep the smaller of the counter at `id` and `operand`
    pub fn min(self, id: impl Into<DocumentId>, operand: u64) -> Result<Self> {
        self.counter(id.into(), CounterOp::Min, operand)
    }

    /// Keep the larger of the counter at `id` and `operand`
    pub fn max(self, id: impl Into<DocumentId>, operand: u64) -> Result<Self> {
        self.counter(id.into(), CounterOp::Max, operand)
    }

    /// Require `id` to be at `versionstamp`, or absent for `None`
    pub fn check(mut self, id: impl Into<DocumentId>, versionstamp: Option<Versionstamp>) -> Result<Self> {
        let collection = self.target("check")?;
        self.ops.push(Op::Check {
            collection,
            id: id.into(),
            versionstamp,
        });
        Ok(self)
    }

    /// Queue a message with the transaction
    ///
    /// Scoped to the selected collection, or to the database when none is
    /// selected.
    pub fn enqueue(mut self, data: impl Into<Value>, options: EnqueueOptions) -> Result<Self> {
        let keys = match &self.target {
            Some(_) => self.target("enqueue")?.keys().clone(),
            None => self.shared.root.clone(),
        };
        let message = options.to_enqueue(keys.base(), |id| keys.undelivered_key(id), data.into())?;
        self.ops.push(Op::Enqueue(message));
        Ok(self)
    }

    /// Apply a list of mutations to the selected collection
    pub fn mutate(self, mutations: impl IntoIterator<Item = AtomicMutation>) -> Result<Self> {
        let mut builder = self;
        for mutation in mutations {
            builder = match mutation {
                AtomicMutation::Add { value } => builder.add(value)?,
                AtomicMutation::Set { id, value, options } => builder.set(id, value, options)?,
                AtomicMutation::Delete { id } => builder.delete(id)?,
                AtomicMutation::Sum { id, operand } => builder.sum(id, operand)?,
                AtomicMutation::Min { id, operand } => builder.min(id, operand)?,
                AtomicMutation::Max { id, operand } => builder.max(id, operand)?,
            };
        }
        Ok(builder)
    }

    /// Number of buffered operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True if nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    // ========== Commit ==========

    /// Commit every buffered operation as one transaction
    pub async fn commit(self) -> Result<AtomicOutcome> {
        let mut txn = AtomicTransaction::new();
        let mut claimed: HashSet<Vec<u8>> = HashSet::new();
        let mut duplicate: Option<Key> = None;

        for op in self.ops {
            match op {
                Op::Insert {
                    collection,
                    id,
                    prepared,
                } => {
                    let id = match id {
                        Some(id) => id,
                        None => collection.generate_id(&prepared.value).await?,
                    };
                    txn.check(collection.keys().id_key(&id), None);
                    for key in collection.plan_write(&mut txn, &id, None, &prepared)? {
                        if !claimed.insert(key.pack()) {
                            duplicate.get_or_insert(key);
                        }
                    }
                }
                Op::Overwrite {
                    collection,
                    id,
                    prepared,
                } => {
                    collection.plan_write(&mut txn, &id, None, &prepared)?;
                }
                Op::Delete { collection, id } => {
                    let key = collection.keys().id_key(&id);
                    if collection.is_plain() && !collection.has_history() {
                        txn.delete(key);
                        continue;
                    }
                    match collection.load(&id).await? {
                        Some(stored) => {
                            txn.check(key, Some(stored.doc.versionstamp));
                            collection.plan_delete(&mut txn, &stored)?;
                        }
                        None => {
                            txn.check(key, None);
                        }
                    }
                }
                Op::Counter {
                    collection,
                    id,
                    op,
                    operand,
                } => {
                    let key = collection.keys().id_key(&id);
                    match op {
                        CounterOp::Sum => txn.sum(key, operand),
                        CounterOp::Min => txn.min(key, operand),
                        CounterOp::Max => txn.max(key, operand),
                    };
                }
                Op::Check {
                    collection,
                    id,
                    versionstamp,
                } => {
                    txn.check(collection.keys().id_key(&id), versionstamp);
                }
                Op::Enqueue(message) => {
                    txn.enqueue(message);
                }
            }
        }

        if let Some(key) = duplicate {
            debug!(
                target: "stratadex::index",
                key = %key,
                "Atomic batch claims one primary index value twice"
            );
            return Ok(AtomicOutcome::Conflict);
        }

        match self.shared.commit(txn).await? {
            CommitResult::Committed { versionstamp } => Ok(AtomicOutcome::Committed { versionstamp }),
            CommitResult::Conflict(_) => Ok(AtomicOutcome::Conflict),
        }
    }
}

impl fmt::Debug for AtomicBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomicBuilder")
            .field("target", &self.target.as_ref().map(Collection::name))
            .field("ops", &self.ops.len())
            .finish()
    }
}
