//! The ordered key-value substrate contract
//!
//! Everything the document layer needs from a store:
//! - point reads (`get`, `get_many`)
//! - ordered half-open range listing, forward or reverse
//! - atomic commit of checks + mutations + queue messages
//! - per-key change streams
//! - an at-least-once queue with a single listener per substrate
//!
//! Implementations must be safe to call concurrently from many tasks.

use crate::transaction::{AtomicTransaction, CommitResult, Enqueue};
use async_trait::async_trait;
use std::sync::Arc;
use stratadex_core::{Entry, Key, KeyWatch, Limits, ListOptions, ListSelector, Result, TaskHandle};

/// Receives queue payloads
///
/// Returning `Err` marks the delivery as failed; the substrate redelivers per
/// the message's backoff schedule and finally writes the payload to the
/// message's `keys_if_undelivered`.
#[async_trait]
pub trait QueueHandler: Send + Sync {
    /// Handle one delivery
    async fn handle(&self, payload: Vec<u8>) -> Result<()>;
}

/// Ordered key-value store with atomic compare-and-swap commits
#[async_trait]
pub trait Substrate: Send + Sync + 'static {
    /// Limits enforced by `commit`
    fn limits(&self) -> &Limits;

    /// Read one key
    async fn get(&self, key: &Key) -> Result<Option<Entry>>;

    /// Read several keys; results are in request order
    async fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Entry>>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push(self.get(key).await?);
        }
        Ok(out)
    }

    /// List entries inside `selector` in key order
    async fn list(&self, selector: &ListSelector, options: ListOptions) -> Result<Vec<Entry>>;

    /// Commit atomically
    ///
    /// A failed check is reported as `CommitResult::Conflict`, never as `Err`.
    async fn commit(&self, txn: AtomicTransaction) -> Result<CommitResult>;

    /// Commit a transaction holding a single queue message
    async fn enqueue(&self, message: Enqueue) -> Result<CommitResult> {
        let mut txn = AtomicTransaction::new();
        txn.enqueue(message);
        self.commit(txn).await
    }

    /// Subscribe to changes of one key; the current state is delivered first
    async fn watch(&self, key: &Key) -> Result<KeyWatch>;

    /// Start delivering queue messages to `handler`
    async fn listen_queue(&self, handler: Arc<dyn QueueHandler>) -> Result<TaskHandle>;
}

#[async_trait]
impl<T: Substrate + ?Sized> Substrate for Arc<T> {
    fn limits(&self) -> &Limits {
        (**self).limits()
    }

    async fn get(&self, key: &Key) -> Result<Option<Entry>> {
        (**self).get(key).await
    }

    async fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Entry>>> {
        (**self).get_many(keys).await
    }

    async fn list(&self, selector: &ListSelector, options: ListOptions) -> Result<Vec<Entry>> {
        (**self).list(selector, options).await
    }

    async fn commit(&self, txn: AtomicTransaction) -> Result<CommitResult> {
        (**self).commit(txn).await
    }

    async fn watch(&self, key: &Key) -> Result<KeyWatch> {
        (**self).watch(key).await
    }

    async fn listen_queue(&self, handler: Arc<dyn QueueHandler>) -> Result<TaskHandle> {
        (**self).listen_queue(handler).await
    }
}
