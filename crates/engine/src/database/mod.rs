//! Database: collections over one substrate
//!
//! A `Database` owns the substrate handle, the configuration, the collection
//! registry, the queue router and commit metrics. It is cheap to clone; all
//! clones share state.
//!
//! ## Cross-collection operations
//!
//! - `atomic()` - batch writes to several collections into one commit
//! - `count_all()`, `delete_all()`, `wipe()`
//! - database-level `enqueue` / `listen_queue` and undelivered payloads

mod builder;
mod config;
mod metrics;
mod registry;

pub use builder::DatabaseBuilder;
pub use config::{DatabaseConfig, DEFAULT_BATCH_SIZE, DEFAULT_KEY_PREFIX, DEFAULT_MAX_VALUE_BYTES};
pub use metrics::{CommitMetrics, MetricsSnapshot};

use crate::atomic::AtomicBuilder;
use crate::collection::{Collection, CollectionOptions};
use crate::document::Document;
use crate::keyspace::KeySpace;
use crate::query::QueryOptions;
use crate::queue::{handler_id, EnqueueOptions, MessageHandler, QueueListener, QueueMessage, QueueRouter};
use registry::CollectionRegistry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use stratadex_concurrency::{AtomicTransaction, CommitResult, Substrate};
use stratadex_core::{DocumentId, Error, ListOptions, ListSelector, Result, Timestamp, Value, Versionstamp};
use stratadex_storage::MemorySubstrate;
use tracing::{debug, info};

/// State shared by a database and its collections
pub(crate) struct Shared {
    pub substrate: Arc<dyn Substrate>,
    pub config: DatabaseConfig,
    pub metrics: CommitMetrics,
    pub router: Arc<QueueRouter>,
    pub root: KeySpace,
    /// Last history timestamp handed out, in micros
    clock: AtomicU64,
}

impl Shared {
    /// Largest chunk / inline value size
    pub fn chunk_size(&self) -> usize {
        self.config
            .max_value_bytes
            .min(self.substrate.limits().max_value_bytes)
            .max(1)
    }

    /// Wall-clock time, strictly increasing across calls
    pub fn next_timestamp(&self) -> Timestamp {
        let now = Timestamp::now().as_micros();
        let prev = self
            .clock
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |prev| Some(now.max(prev + 1)))
            .unwrap_or_else(|prev| prev);
        Timestamp::from_micros(now.max(prev + 1))
    }

    /// Commit and count the result
    pub async fn commit(&self, txn: AtomicTransaction) -> Result<CommitResult> {
        let pending = txn.pending();
        let result = self.substrate.commit(txn).await?;
        self.metrics.record(&result);
        match &result {
            CommitResult::Committed { versionstamp } => debug!(
                target: "stratadex::txn",
                versionstamp = %versionstamp,
                checks = pending.checks,
                mutations = pending.mutations,
                "Transaction committed"
            ),
            CommitResult::Conflict(validation) => debug!(
                target: "stratadex::txn",
                conflicts = validation.conflict_count(),
                "Transaction rejected"
            ),
        }
        Ok(result)
    }

    /// Delete every key in `selector`, in bounded batches
    pub async fn purge(&self, selector: ListSelector) -> Result<usize> {
        let batch = self
            .substrate
            .limits()
            .max_mutations
            .min(self.config.default_batch_size)
            .max(1);
        let mut selector = selector;
        let mut removed = 0;
        loop {
            let entries = self
                .substrate
                .list(&selector, ListOptions::limited(batch))
                .await?;
            let Some(last) = entries.last() else {
                break;
            };
            selector = selector.after(&last.key.pack());
            let fetched = entries.len();
            let mut txn = AtomicTransaction::new();
            for entry in entries {
                txn.delete(entry.key);
            }
            self.commit(txn).await?;
            removed += fetched;
            if fetched < batch {
                break;
            }
        }
        Ok(removed)
    }

    /// Queue `data` from the key space `keys`
    pub async fn enqueue_in(
        &self,
        keys: &KeySpace,
        data: Value,
        options: &EnqueueOptions,
    ) -> Result<Versionstamp> {
        let message = options.to_enqueue(keys.base(), |id| keys.undelivered_key(id), data)?;
        let mut txn = AtomicTransaction::new();
        txn.enqueue(message);
        match self.commit(txn).await? {
            CommitResult::Committed { versionstamp } => Ok(versionstamp),
            CommitResult::Conflict(_) => Err(Error::substrate("enqueue without checks was rejected")),
        }
    }

    /// Register a handler for `(keys, topic)`
    pub async fn listen_in(
        &self,
        keys: &KeySpace,
        topic: Option<&str>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<QueueListener> {
        self.router
            .register(
                self.substrate.as_ref(),
                handler_id(keys.base(), topic),
                handler,
            )
            .await
    }

    /// Payload kept after exhausted delivery
    pub async fn find_undelivered_in(
        &self,
        keys: &KeySpace,
        id: &DocumentId,
    ) -> Result<Option<Document>> {
        let Some(entry) = self.substrate.get(&keys.undelivered_key(id)).await? else {
            return Ok(None);
        };
        let payload = entry
            .value
            .as_bytes()
            .ok_or_else(|| Error::corruption("undelivered payload is not bytes"))?;
        let message = QueueMessage::from_bytes(payload)?;
        Ok(Some(Document {
            id: id.clone(),
            value: message.data,
            versionstamp: entry.versionstamp,
        }))
    }

    /// Drop a kept payload
    pub async fn delete_undelivered_in(&self, keys: &KeySpace, id: &DocumentId) -> Result<()> {
        let mut txn = AtomicTransaction::new();
        txn.delete(keys.undelivered_key(id));
        self.commit(txn).await?;
        Ok(())
    }
}

/// Document database over an ordered key-value substrate
///
/// # Example
///
/// ```ignore
/// let db = Database::builder().key_prefix("app").open()?;
/// let users = db.collection(
///     "users",
///     CollectionOptions::new().primary_index("email").secondary_index("age"),
/// )?;
/// users.add(value).await?;
/// ```
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
    collections: Arc<CollectionRegistry>,
}

impl Database {
    /// Fluent builder
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Database over a fresh `MemorySubstrate` with the default configuration
    pub fn in_memory() -> Self {
        Self::assemble(Arc::new(MemorySubstrate::new()), DatabaseConfig::default())
    }

    /// Database over `substrate`
    ///
    /// # Errors
    ///
    /// Returns a validation error if the configuration is unusable.
    pub fn open(substrate: Arc<dyn Substrate>, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::assemble(substrate, config))
    }

    fn assemble(substrate: Arc<dyn Substrate>, config: DatabaseConfig) -> Self {
        info!(
            target: "stratadex::db",
            key_prefix = %config.key_prefix,
            max_value_bytes = config.max_value_bytes,
            "Database opened"
        );
        let root = KeySpace::root(&config.key_prefix);
        Database {
            shared: Arc::new(Shared {
                substrate,
                config,
                metrics: CommitMetrics::new(),
                router: Arc::new(QueueRouter::new()),
                root,
                clock: AtomicU64::new(0),
            }),
            collections: Arc::new(CollectionRegistry::new()),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.shared.config
    }

    /// Underlying substrate
    pub fn substrate(&self) -> &Arc<dyn Substrate> {
        &self.shared.substrate
    }

    /// Commit counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    // ========== Collections ==========

    /// Define a collection
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad name, bad index declarations, or
    /// a name already defined on this database.
    pub fn collection(&self, name: &str, options: CollectionOptions) -> Result<Collection> {
        let collection = Collection::new(Arc::clone(&self.shared), name, options)?;
        self.collections.register(collection.clone())?;
        Ok(collection)
    }

    /// A collection defined earlier
    pub fn get_collection(&self, name: &str) -> Option<Collection> {
        self.collections.get(name)
    }

    /// Every defined collection, ordered by name
    pub fn collections(&self) -> Vec<Collection> {
        self.collections.all()
    }

    /// Start a multi-collection transaction
    pub fn atomic(&self) -> AtomicBuilder {
        AtomicBuilder::new(Arc::clone(&self.shared))
    }

    // ========== Whole-database operations ==========

    /// Documents across every defined collection
    pub async fn count_all(&self) -> Result<usize> {
        let mut total = 0;
        for collection in self.collections.all() {
            total += collection.count(QueryOptions::new()).await?;
        }
        Ok(total)
    }

    /// Delete every document of every defined collection
    ///
    /// History and undelivered payloads are kept; see [`Database::wipe`].
    /// Every document is attempted; the first failure is returned after.
    pub async fn delete_all(&self) -> Result<()> {
        let mut first_error = None;
        for collection in self.collections.all() {
            for outcome in collection.delete_many(QueryOptions::new()).await? {
                if let Err(e) = outcome {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Remove every key under the database prefix, history included
    pub async fn wipe(&self) -> Result<()> {
        let removed = self.shared.purge(self.shared.root.everything()).await?;
        info!(target: "stratadex::db", removed, "Database wiped");
        Ok(())
    }

    // ========== Queue ==========

    /// Queue a database-level message
    pub async fn enqueue(&self, data: impl Into<Value>, options: EnqueueOptions) -> Result<Versionstamp> {
        self.shared
            .enqueue_in(&self.shared.root, data.into(), &options)
            .await
    }

    /// Receive database-level messages of `topic`
    pub async fn listen_queue<H>(&self, topic: Option<&str>, handler: H) -> Result<QueueListener>
    where
        H: MessageHandler + 'static,
    {
        self.shared
            .listen_in(&self.shared.root, topic, Arc::new(handler))
            .await
    }

    /// Database-level payload kept after exhausted delivery
    pub async fn find_undelivered(&self, id: impl Into<DocumentId>) -> Result<Option<Document>> {
        self.shared
            .find_undelivered_in(&self.shared.root, &id.into())
            .await
    }

    /// Drop a database-level kept payload
    pub async fn delete_undelivered(&self, id: impl Into<DocumentId>) -> Result<()> {
        self.shared
            .delete_undelivered_in(&self.shared.root, &id.into())
            .await
    }

    /// Stop the queue listener and every registered handler
    pub async fn close(&self) {
        self.shared.router.shutdown().await;
        info!(target: "stratadex::db", "Database closed");
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.shared.config)
            .field("collections", &self.collections.names())
            .field("queue_handlers", &self.shared.router.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratadex_core::Limits;

    #[test]
    fn test_chunk_size_respects_substrate_limit() {
        let db = Database::builder()
            .substrate(MemorySubstrate::with_limits(Limits::with_small_limits()))
            .max_value_bytes(1_000)
            .open()
            .unwrap();
        assert_eq!(db.shared.chunk_size(), Limits::with_small_limits().max_value_bytes);
    }

    #[test]
    fn test_duplicate_collection_rejected() {
        let db = Database::in_memory();
        db.collection("users", CollectionOptions::new()).unwrap();
        let err = db.collection("users", CollectionOptions::new()).unwrap_err();
        assert!(err.is_validation());
        assert!(db.get_collection("users").is_some());
    }

    #[tokio::test]
    async fn test_purge_spans_batches() {
        let db = Database::builder().default_batch_size(3).open().unwrap();
        let mut txn = AtomicTransaction::new();
        for i in 0..10i64 {
            txn.set(db.shared.root.base().child(i), stratadex_core::RawValue::U64(1));
        }
        db.shared.commit(txn).await.unwrap();
        assert_eq!(db.shared.purge(db.shared.root.everything()).await.unwrap(), 10);
        let left = db
            .substrate()
            .list(&db.shared.root.everything(), ListOptions::default())
            .await
            .unwrap();
        assert!(left.is_empty());
    }

    #[tokio::test]
    async fn test_database_queue_undelivered() {
        let db = Database::in_memory();
        assert!(db.find_undelivered("x").await.unwrap().is_none());
        let message = QueueMessage {
            handler_id: "h".into(),
            data: Value::from(5i64),
        };
        let mut txn = AtomicTransaction::new();
        txn.set(
            db.shared.root.undelivered_key(&"x".into()),
            stratadex_core::RawValue::Bytes(message.to_bytes().unwrap()),
        );
        db.shared.commit(txn).await.unwrap();

        let doc = db.find_undelivered("x").await.unwrap().unwrap();
        assert_eq!(doc.value, Value::Int(5));
        db.delete_undelivered("x").await.unwrap();
        assert!(db.find_undelivered("x").await.unwrap().is_none());
    }
}
