//! Document engine for stratadex
//!
//! This crate layers typed document collections over an ordered key-value
//! substrate:
//! - Database: configuration, collection registry, cross-collection ops
//! - Collection: CRUD with optimistic concurrency, indices, pagination
//! - Codec: serializer, compression and value segmentation
//! - AtomicBuilder: several collections in one commit
//! - Watch aggregator, queue router and history log
//!
//! The engine holds no locks across substrate calls. All consistency comes
//! from versionstamp checks committed with the writes they guard.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod codec;
pub mod collection;
pub mod database;
pub mod document;
pub mod history;
pub mod index;
pub mod keyspace;
pub mod merge;
pub mod model;
pub mod query;
pub mod queue;
pub mod watch;

pub use atomic::{AtomicBuilder, AtomicMutation, AtomicOutcome};
pub use codec::{Codec, Compression, SegmentHeader, SerializerKind};
pub use collection::{Collection, CollectionOptions};
pub use database::{CommitMetrics, Database, DatabaseBuilder, DatabaseConfig, MetricsSnapshot};
pub use document::{CommitOutcome, Document, SetOptions};
pub use history::{HistoryEntry, HistoryKind};
pub use index::{IndexKind, IndexSpec};
pub use keyspace::KeySpace;
pub use merge::{merge_deep, merge_shallow, UpdateStrategy};
pub use model::{AnyModel, FnIdGenerator, FnModel, IdGenerator, Model, UuidV7Ids};
pub use query::{Filter, PaginationResult, QueryOptions};
pub use queue::{EnqueueOptions, MessageHandler, QueueListener, QueueMessage};
pub use watch::WatchHandle;

/// Listing options of `find_history`
pub type HistoryOptions = QueryOptions<HistoryEntry>;
