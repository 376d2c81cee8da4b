//! Contract types shared by every substrate and the document layer
//!
//! ## Module Structure
//!
//! - `versionstamp`: commit tokens used as optimistic-concurrency preconditions
//! - `entry`: stored values and the `(key, value, versionstamp)` read shape
//! - `list`: half-open ranges over packed keys
//! - `task`: cancellable background tasks and key watches
//! - `timestamp`: microsecond timestamps for history keys

pub mod entry;
pub mod list;
pub mod task;
pub mod timestamp;
pub mod versionstamp;

pub use entry::{Entry, RawValue};
pub use list::{ListOptions, ListSelector};
pub use task::{KeyWatch, TaskHandle};
pub use timestamp::Timestamp;
pub use versionstamp::Versionstamp;
