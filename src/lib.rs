//! stratadex - typed document collections over an ordered key-value substrate
//!
//! Collections hold documents addressed by id, with optional primary
//! (unique) and secondary indices, value segmentation, history, watches and
//! a message queue. Writes are guarded by versionstamp checks; several
//! collections can be changed in one atomic commit.
//!
//! # Quick Start
//!
//! ```ignore
//! use stratadex::{CollectionOptions, Database, QueryOptions};
//!
//! let db = Database::in_memory();
//! let users = db.collection("users", CollectionOptions::new().primary_index("email"))?;
//! users.add(value).await?;
//! let page = users.get_many(QueryOptions::new().limit(10)).await?;
//! ```
//!
//! # Architecture
//!
//! - `stratadex-core`: keys, values, selectors, errors
//! - `stratadex-concurrency`: atomic transactions and the `Substrate` trait
//! - `stratadex-storage`: the in-memory substrate
//! - `stratadex-engine`: databases, collections, codec, queue and watches
//!
//! Only the engine API and the types it takes or returns are re-exported.

pub use stratadex_concurrency::{AtomicTransaction, CommitResult, QueueHandler, Substrate};
pub use stratadex_core::{
    DocumentId, Entry, Error, Key, KeyPart, Limits, ListOptions, ListSelector, RawValue, Result,
    Timestamp, Value, Versionstamp,
};
pub use stratadex_engine::*;
pub use stratadex_storage::MemorySubstrate;
