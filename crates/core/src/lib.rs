//! Core types for stratadex
//!
//! This crate defines the foundational types used throughout the system:
//! - KeyPart / Key: Typed composite keys with order-preserving packing
//! - Value: Closed sum type for document values
//! - Versionstamp, Entry, RawValue: The substrate's read shape
//! - ListSelector, ListOptions: Ordered range listing
//! - KeyWatch, TaskHandle: Cancellable background tasks
//! - Limits: Substrate size limits
//! - Error: Error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod contract;
pub mod error;
pub mod key;
pub mod limits;
pub mod types;
pub mod value;

pub use contract::{
    Entry, KeyWatch, ListOptions, ListSelector, RawValue, TaskHandle, Timestamp, Versionstamp,
};
pub use error::{Error, Result};
pub use key::{validate_key_with_limits, PREFIX_END};
pub use limits::Limits;
pub use types::{DocumentId, Key, KeyPart};
pub use value::Value;
