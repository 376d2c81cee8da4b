//! Storage layer for stratadex
//!
//! This crate implements the in-memory substrate:
//! - MemorySubstrate: BTreeMap over packed keys with RwLock and a commit sequence
//! - WatchRegistry: per-key broadcast channels for change streams
//! - MessageQueue: at-least-once delivery with redelivery and undelivered keys

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod queue;
pub mod stored_value;
pub mod watch;

pub use memory::MemorySubstrate;
pub use queue::{MessageQueue, QueuedMessage};
pub use stored_value::StoredValue;
pub use watch::WatchRegistry;
