//! Concurrency layer for stratadex
//!
//! This crate implements the optimistic concurrency model every substrate
//! commits with:
//! - AtomicTransaction: checks, mutations and queue messages as one unit
//! - Validation: versionstamp preconditions evaluated at commit time
//! - Mutation application, including 64-bit counter arithmetic
//! - The `Substrate` trait that backends implement

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod mutation;
pub mod substrate;
pub mod transaction;
pub mod validation;

pub use mutation::apply_mutation;
pub use substrate::{QueueHandler, Substrate};
pub use transaction::{
    AtomicTransaction, Check, CommitResult, Enqueue, Mutation, MutationKind, PendingOperations,
};
pub use validation::{validate_check, validate_checks, validate_limits, ConflictType, ValidationResult};
