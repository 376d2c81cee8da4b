//! Collections
//!
//! A [`Collection`] is a named document set inside a [`Database`]. Every
//! operation compiles into substrate transactions over the collection's
//! [`KeySpace`]:
//!
//! - the document entry at `id/<id>` (codec bytes, a native counter, or a
//!   segment header for segmented collections)
//! - segment chunks at `segment/<id>/<n>`
//! - primary and secondary index entries
//! - history records
//!
//! Writes that depend on a prior read carry that read's versionstamp as a
//! check, so concurrent writers race only at commit time.
//!
//! The public surface is split by concern:
//! - `documents`: add/set/write/delete/find/update/upsert
//! - `listing`: ranged reads and bulk operations over ids or index order
//! - `indexed`: primary and secondary index lookups
//! - `watching`, `messaging`, `history`
//!
//! [`Database`]: crate::Database

mod documents;
mod history;
mod indexed;
mod listing;
mod messaging;
mod watching;

use crate::atomic::AtomicBuilder;
use crate::codec::{segment, Codec, Compression, SegmentHeader, SerializerKind};
use crate::database::Shared;
use crate::document::{CommitOutcome, Document};
use crate::index::{self, IndexEntries, IndexKind, IndexSpec};
use crate::keyspace::KeySpace;
use crate::model::{default_id_generator, default_model, IdGenerator, Model};
use std::fmt;
use std::sync::Arc;
use stratadex_concurrency::{AtomicTransaction, CommitResult};
use stratadex_core::{DocumentId, Entry, Error, Key, ListOptions, ListSelector, RawValue, Result, Value};
use tracing::debug;

const LOAD_ATTEMPTS: usize = 3;

/// Options of one collection
///
/// # Example
///
/// ```ignore
/// let options = CollectionOptions::new()
///     .primary_index("email")
///     .secondary_index("age")
///     .history(true);
/// ```
#[derive(Clone)]
pub struct CollectionOptions {
    indices: Vec<(String, IndexKind)>,
    history: Option<bool>,
    segmented: bool,
    compression: Compression,
    serializer: SerializerKind,
    model: Arc<dyn Model>,
    id_generator: Arc<dyn IdGenerator>,
}

impl CollectionOptions {
    /// No indices, no history, whole-value storage
    pub fn new() -> Self {
        CollectionOptions {
            indices: Vec::new(),
            history: None,
            segmented: false,
            compression: Compression::None,
            serializer: SerializerKind::MessagePack,
            model: default_model(),
            id_generator: default_id_generator(),
        }
    }

    /// Unique index on `field`
    pub fn primary_index(mut self, field: impl Into<String>) -> Self {
        self.indices.push((field.into(), IndexKind::Primary));
        self
    }

    /// Ordered, non-unique index on `field`
    pub fn secondary_index(mut self, field: impl Into<String>) -> Self {
        self.indices.push((field.into(), IndexKind::Secondary));
        self
    }

    /// Record history; defaults to the database's `history_by_default`
    pub fn history(mut self, enabled: bool) -> Self {
        self.history = Some(enabled);
        self
    }

    /// Split encoded values across several entries
    pub fn segmented(mut self, enabled: bool) -> Self {
        self.segmented = enabled;
        self
    }

    /// Compress encoded values
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Value serializer
    pub fn serializer(mut self, serializer: SerializerKind) -> Self {
        self.serializer = serializer;
        self
    }

    /// Validate every written value
    pub fn model<M: Model + 'static>(mut self, model: M) -> Self {
        self.model = Arc::new(model);
        self
    }

    /// Id source for `add`
    pub fn id_generator<G: IdGenerator + 'static>(mut self, generator: G) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }
}

impl Default for CollectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CollectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionOptions")
            .field("indices", &self.indices)
            .field("history", &self.history)
            .field("segmented", &self.segmented)
            .field("compression", &self.compression)
            .field("serializer", &self.serializer)
            .finish()
    }
}

/// Handle to a collection; cheap to clone
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

pub(crate) struct CollectionInner {
    pub name: String,
    pub keys: KeySpace,
    pub indices: IndexSpec,
    pub history: bool,
    pub segmented: bool,
    pub codec: Codec,
    pub model: Arc<dyn Model>,
    pub id_generator: Arc<dyn IdGenerator>,
    pub shared: Arc<Shared>,
}

/// A document as read, with what is needed to rewrite or delete it
#[derive(Debug, Clone)]
pub(crate) struct Stored {
    pub doc: Document,
    /// Segment chunks currently stored; 0 for whole-value collections
    pub chunks: u32,
}

/// Encoded form of a value, ready to be written
#[derive(Debug, Clone)]
pub(crate) struct Encoded {
    pub head: RawValue,
    pub chunks: Vec<Vec<u8>>,
}

/// A validated value with its encoding and index entries
#[derive(Debug, Clone)]
pub(crate) struct Prepared {
    pub value: Value,
    pub entries: IndexEntries,
    pub encoded: Encoded,
}

enum Decoded {
    Ready(Stored),
    /// Chunks and header come from different commits
    Torn,
}

impl Collection {
    pub(crate) fn new(shared: Arc<Shared>, name: &str, options: CollectionOptions) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::validation("collection name is empty"));
        }
        if name.starts_with("__") {
            return Err(Error::validation(format!(
                "collection name '{}' uses the reserved '__' prefix",
                name
            )));
        }
        let indices = IndexSpec::from_fields(options.indices)?;
        let history = options.history.unwrap_or(shared.config.history_by_default);
        let keys = KeySpace::new(&shared.config.key_prefix, name);
        Ok(Collection {
            inner: Arc::new(CollectionInner {
                name: name.to_string(),
                keys,
                indices,
                history,
                segmented: options.segmented,
                codec: Codec::new(options.serializer, options.compression),
                model: options.model,
                id_generator: options.id_generator,
                shared,
            }),
        })
    }

    /// Collection name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Declared indices
    pub fn indices(&self) -> &IndexSpec {
        &self.inner.indices
    }

    /// True if any field is indexed
    pub fn is_indexable(&self) -> bool {
        !self.inner.indices.is_empty()
    }

    /// True if values are stored as header plus chunks
    pub fn is_segmented(&self) -> bool {
        self.inner.segmented
    }

    /// True if writes and deletes are recorded
    pub fn has_history(&self) -> bool {
        self.inner.history
    }

    pub(crate) fn keys(&self) -> &KeySpace {
        &self.inner.keys
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    /// Whole-value, unindexed: writes need no prior read
    pub(crate) fn is_plain(&self) -> bool {
        self.inner.indices.is_empty() && !self.inner.segmented
    }

    pub(crate) async fn generate_id(&self, value: &Value) -> Result<DocumentId> {
        self.inner.id_generator.generate(value).await
    }

    /// Atomic builder with this collection selected
    pub fn atomic(&self) -> AtomicBuilder {
        AtomicBuilder::new(Arc::clone(&self.inner.shared)).select(self)
    }

    // ========== Encoding ==========

    /// Run the model, compute index entries and encode
    ///
    /// Fails before any substrate call.
    pub(crate) fn prepare(&self, input: Value) -> Result<Prepared> {
        let value = self.inner.model.parse(input)?;
        let entries = self.inner.indices.entries(&value)?;
        let encoded = self.encode(&value)?;
        Ok(Prepared {
            value,
            entries,
            encoded,
        })
    }

    fn encode(&self, value: &Value) -> Result<Encoded> {
        let chunk_size = self.inner.shared.chunk_size();
        if !self.inner.segmented {
            if let Value::Counter(n) = value {
                return Ok(Encoded {
                    head: RawValue::U64(*n),
                    chunks: Vec::new(),
                });
            }
            let bytes = self.inner.codec.encode(value)?;
            if bytes.len() > chunk_size {
                return Err(Error::validation(format!(
                    "encoded value of {} bytes exceeds the {} byte limit; use a segmented collection",
                    bytes.len(),
                    chunk_size
                )));
            }
            return Ok(Encoded {
                head: RawValue::Bytes(bytes),
                chunks: Vec::new(),
            });
        }

        let bytes = self.inner.codec.encode(value)?;
        let header = SegmentHeader::describe(&bytes, chunk_size);
        let chunks = segment::split(&bytes, chunk_size)
            .into_iter()
            .map(<[u8]>::to_vec)
            .collect();
        Ok(Encoded {
            head: RawValue::Bytes(header.to_bytes()?),
            chunks,
        })
    }

    async fn decode_entry(&self, id: &DocumentId, entry: Entry) -> Result<Decoded> {
        if !self.inner.segmented {
            let value = match &entry.value {
                RawValue::U64(n) => Value::Counter(*n),
                RawValue::Bytes(bytes) => self.inner.codec.decode(bytes)?,
            };
            return Ok(Decoded::Ready(Stored {
                doc: Document {
                    id: id.clone(),
                    value,
                    versionstamp: entry.versionstamp,
                },
                chunks: 0,
            }));
        }

        let header_bytes = entry
            .value
            .as_bytes()
            .ok_or_else(|| Error::corruption(format!("segment header of {} is not bytes", id)))?;
        let header = SegmentHeader::from_bytes(header_bytes)?;
        let selector = ListSelector::prefix(&self.inner.keys.segment_prefix(id));
        let listed = self
            .inner
            .shared
            .substrate
            .list(&selector, ListOptions::default())
            .await?;
        if listed.len() != header.chunk_count as usize
            || listed.iter().any(|c| c.versionstamp != entry.versionstamp)
        {
            return Ok(Decoded::Torn);
        }
        let mut chunks = Vec::with_capacity(listed.len());
        for chunk in listed {
            match chunk.value {
                RawValue::Bytes(bytes) => chunks.push(bytes),
                RawValue::U64(_) => {
                    return Err(Error::corruption(format!("segment chunk of {} is not bytes", id)))
                }
            }
        }
        let bytes = segment::reassemble(&header, chunks)?;
        Ok(Decoded::Ready(Stored {
            doc: Document {
                id: id.clone(),
                value: self.inner.codec.decode(&bytes)?,
                versionstamp: entry.versionstamp,
            },
            chunks: header.chunk_count,
        }))
    }

    /// Read one document
    ///
    /// A segmented read that straddles a commit is retried; persistent
    /// inconsistency is reported as corruption.
    pub(crate) async fn load(&self, id: &DocumentId) -> Result<Option<Stored>> {
        let key = self.inner.keys.id_key(id);
        for _ in 0..LOAD_ATTEMPTS {
            let Some(entry) = self.inner.shared.substrate.get(&key).await? else {
                return Ok(None);
            };
            match self.decode_entry(id, entry).await? {
                Decoded::Ready(stored) => return Ok(Some(stored)),
                Decoded::Torn => {
                    debug!(target: "stratadex::segment", id = %id, "Segmented read straddled a commit, retrying");
                }
            }
        }
        Err(Error::corruption(format!(
            "segments of {} in '{}' do not match their header",
            id, self.inner.name
        )))
    }

    /// Decode a listed document entry, re-reading on a torn segmented read
    pub(crate) async fn load_entry(&self, entry: Entry) -> Result<Option<Stored>> {
        let id = self
            .inner
            .keys
            .id_of(&entry.key)
            .ok_or_else(|| Error::corruption(format!("{} is not a document key", entry.key)))?;
        match self.decode_entry(&id, entry).await? {
            Decoded::Ready(stored) => Ok(Some(stored)),
            Decoded::Torn => self.load(&id).await,
        }
    }

    // ========== Transaction planning ==========

    /// Fold a write of `prepared` over `old` into `txn`
    ///
    /// Returns the primary index keys newly claimed.
    pub(crate) fn plan_write(
        &self,
        txn: &mut AtomicTransaction,
        id: &DocumentId,
        old: Option<&Stored>,
        prepared: &Prepared,
    ) -> Result<Vec<Key>> {
        let keys = &self.inner.keys;
        txn.set(keys.id_key(id), prepared.encoded.head.clone());

        if self.inner.segmented {
            let count = prepared.encoded.chunks.len() as u32;
            for (n, chunk) in prepared.encoded.chunks.iter().enumerate() {
                txn.set(keys.segment_key(id, n as u32), RawValue::Bytes(chunk.clone()));
            }
            if let Some(old) = old.filter(|old| old.chunks > count) {
                for n in count..old.chunks {
                    txn.delete(keys.segment_key(id, n));
                }
                debug!(
                    target: "stratadex::segment",
                    id = %id,
                    from = old.chunks,
                    to = count,
                    "Dropping trailing chunks"
                );
            }
        }

        let claimed = if self.inner.indices.is_empty() {
            Vec::new()
        } else {
            let old_entries = old.map(|o| self.inner.indices.existing_entries(&o.doc.value));
            index::plan_write(txn, keys, id, old_entries.as_ref(), &prepared.entries)
        };

        if self.inner.history {
            self.plan_history_write(txn, id, Some(&prepared.value))?;
        }
        Ok(claimed)
    }

    /// Fold the removal of `stored` into `txn`
    pub(crate) fn plan_delete(&self, txn: &mut AtomicTransaction, stored: &Stored) -> Result<()> {
        let keys = &self.inner.keys;
        let id = &stored.doc.id;
        txn.delete(keys.id_key(id));
        for n in 0..stored.chunks {
            txn.delete(keys.segment_key(id, n));
        }
        if !self.inner.indices.is_empty() {
            let entries = self.inner.indices.existing_entries(&stored.doc.value);
            index::plan_delete(txn, keys, id, &entries);
        }
        if self.inner.history {
            self.plan_history_write(txn, id, None)?;
        }
        Ok(())
    }

    /// Commit a transaction that targets one document
    pub(crate) async fn commit_for(
        &self,
        id: &DocumentId,
        txn: AtomicTransaction,
        claimed: &[Key],
    ) -> Result<CommitOutcome> {
        match self.inner.shared.commit(txn).await? {
            CommitResult::Committed { versionstamp } => Ok(CommitOutcome::Committed {
                id: id.clone(),
                versionstamp,
            }),
            CommitResult::Conflict(validation) => {
                for conflict in &validation.conflicts {
                    if claimed.contains(conflict.key()) {
                        debug!(
                            target: "stratadex::index",
                            collection = %self.inner.name,
                            id = %id,
                            key = %conflict.key(),
                            "Primary index value already taken"
                        );
                    }
                }
                Ok(CommitOutcome::Conflict { id: id.clone() })
            }
        }
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .field("indices", &self.inner.indices)
            .field("history", &self.inner.history)
            .field("segmented", &self.inner.segmented)
            .finish()
    }
}
