//! MemorySubstrate: in-memory ordered substrate
//!
//! This module implements the `Substrate` trait using:
//! - `BTreeMap<Vec<u8>, StoredValue>` keyed by packed key bytes, so map order
//!   is tuple order
//! - `parking_lot::RwLock` for thread-safe access (never held across `.await`)
//! - `AtomicU64` commit sequence, allocated under the write lock so
//!   versionstamps increase in commit order
//! - a broadcast registry for per-key watches
//! - an in-memory queue with redelivery and undelivered-key persistence
//!
//! # Commit
//!
//! 1. Limits are validated (error, nothing applied)
//! 2. Checks are validated under the write lock (conflict, nothing applied)
//! 3. Mutations are staged in order against the current state; a counter
//!    mutation on a bytes value is an error and nothing is applied
//! 4. Staged values are written with one versionstamp, watchers are notified,
//!    queue messages are released

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use stratadex_concurrency::{
    apply_mutation, validate_checks, validate_limits, AtomicTransaction, CommitResult, Enqueue,
    QueueHandler, Substrate,
};
use stratadex_core::{
    Entry, Error, Key, KeyWatch, Limits, ListOptions, ListSelector, RawValue, Result, TaskHandle,
    Versionstamp,
};

use crate::queue::{MessageQueue, QueuedMessage};
use crate::stored_value::StoredValue;
use crate::watch::WatchRegistry;

const WATCH_BUFFER: usize = 16;

fn default_backoff() -> Vec<Duration> {
    vec![
        Duration::from_millis(100),
        Duration::from_millis(500),
        Duration::from_secs(2),
    ]
}

#[derive(Debug)]
struct Inner {
    data: RwLock<BTreeMap<Vec<u8>, StoredValue>>,
    sequence: AtomicU64,
    limits: Limits,
    watches: WatchRegistry,
    queue: MessageQueue,
}

/// In-memory implementation of the substrate contract
///
/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone)]
pub struct MemorySubstrate {
    inner: Arc<Inner>,
}

impl Default for MemorySubstrate {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySubstrate {
    /// Create an empty substrate with default limits
    pub fn new() -> Self {
        Self::with_config(Limits::default(), default_backoff())
    }

    /// Create an empty substrate with custom limits
    pub fn with_limits(limits: Limits) -> Self {
        Self::with_config(limits, default_backoff())
    }

    /// Create an empty substrate with custom limits and default redelivery schedule
    pub fn with_config(limits: Limits, default_backoff: Vec<Duration>) -> Self {
        MemorySubstrate {
            inner: Arc::new(Inner {
                data: RwLock::new(BTreeMap::new()),
                sequence: AtomicU64::new(0),
                limits,
                watches: WatchRegistry::new(),
                queue: MessageQueue::new(default_backoff),
            }),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    /// True if nothing is stored
    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }

    /// Every stored entry in key order
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let data = self.inner.data.read();
        data.iter().map(|(packed, sv)| sv.to_entry(packed)).collect()
    }

    /// Number of commits applied so far
    pub fn commit_count(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    /// Number of keys with at least one live watch
    pub fn watched_keys(&self) -> usize {
        self.inner.watches.watched_keys()
    }
}

impl Inner {
    fn current(&self, key: &Key) -> Option<Entry> {
        let data = self.data.read();
        data.get(&key.pack()).map(|sv| entry_for(key, sv))
    }

    fn commit_now(&self, txn: AtomicTransaction) -> Result<CommitResult> {
        validate_limits(&txn, &self.limits)?;
        let (checks, mutations, enqueues) = txn.into_parts();

        let mut data = self.data.write();

        let validation = validate_checks(&checks, |key| {
            data.get(&key.pack()).map(StoredValue::versionstamp)
        });
        if !validation.is_valid() {
            debug!(
                target: "stratadex::txn",
                conflicts = validation.conflict_count(),
                first = %validation.conflicts[0].key(),
                "commit rejected"
            );
            return Ok(CommitResult::Conflict(validation));
        }

        let mut staged: BTreeMap<Vec<u8>, (Key, Option<RawValue>)> = BTreeMap::new();
        for mutation in &mutations {
            let packed = mutation.key.pack();
            let current = match staged.get(&packed) {
                Some((_, value)) => value.clone(),
                None => data.get(&packed).map(|sv| sv.value().clone()),
            };
            let next = apply_mutation(&mutation.kind, current.as_ref())?;
            staged.insert(packed, (mutation.key.clone(), next));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let versionstamp = Versionstamp::from_sequence(sequence);

        for (packed, (key, next)) in staged {
            let state = match next {
                Some(value) => {
                    let stored = StoredValue::new(value, versionstamp);
                    let state = entry_for(&key, &stored);
                    data.insert(packed.clone(), stored);
                    Some(state)
                }
                None => {
                    // Deleting an absent key is not a change
                    if data.remove(&packed).is_none() {
                        continue;
                    }
                    None
                }
            };
            self.watches.publish(&packed, state);
        }
        drop(data);

        for message in enqueues {
            let delay = message.delay;
            self.queue.push(QueuedMessage { message, attempt: 0 }, delay);
        }

        trace!(
            target: "stratadex::txn",
            versionstamp = %versionstamp,
            mutations = mutations.len(),
            "commit applied"
        );
        Ok(CommitResult::Committed { versionstamp })
    }

    async fn run_listener(
        self: Arc<Self>,
        mut receiver: mpsc::UnboundedReceiver<QueuedMessage>,
        handler: Arc<dyn QueueHandler>,
        token: CancellationToken,
    ) {
        info!(target: "stratadex::queue", "queue listener started");
        loop {
            let queued = tokio::select! {
                _ = token.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(queued) => queued,
                    None => break,
                },
            };
            self.deliver(queued, handler.as_ref()).await;
        }
        self.queue.restore_receiver(receiver);
        info!(target: "stratadex::queue", "queue listener stopped");
    }

    async fn deliver(&self, queued: QueuedMessage, handler: &dyn QueueHandler) {
        let error = match handler.handle(queued.message.payload.clone()).await {
            Ok(()) => return,
            Err(e) => e,
        };
        let schedule = self.queue.backoff_for(&queued.message);
        if let Some(delay) = schedule.get(queued.attempt).copied() {
            debug!(
                target: "stratadex::queue",
                attempt = queued.attempt + 1,
                error = %error,
                "delivery failed, retrying"
            );
            self.queue.push(
                QueuedMessage {
                    message: queued.message,
                    attempt: queued.attempt + 1,
                },
                Some(delay),
            );
            return;
        }
        warn!(
            target: "stratadex::queue",
            attempts = queued.attempt + 1,
            error = %error,
            "message undeliverable"
        );
        self.persist_undelivered(&queued.message);
    }

    fn persist_undelivered(&self, message: &Enqueue) {
        if message.keys_if_undelivered.is_empty() {
            return;
        }
        let mut txn = AtomicTransaction::new();
        for key in &message.keys_if_undelivered {
            txn.set(key.clone(), RawValue::Bytes(message.payload.clone()));
        }
        if let Err(e) = self.commit_now(txn) {
            warn!(target: "stratadex::queue", error = %e, "failed to persist undelivered message");
        }
    }
}

fn entry_for(key: &Key, stored: &StoredValue) -> Entry {
    Entry {
        key: key.clone(),
        value: stored.value().clone(),
        versionstamp: stored.versionstamp(),
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    fn limits(&self) -> &Limits {
        &self.inner.limits
    }

    async fn get(&self, key: &Key) -> Result<Option<Entry>> {
        Ok(self.inner.current(key))
    }

    async fn get_many(&self, keys: &[Key]) -> Result<Vec<Option<Entry>>> {
        let data = self.inner.data.read();
        Ok(keys
            .iter()
            .map(|key| data.get(&key.pack()).map(|sv| entry_for(key, sv)))
            .collect())
    }

    async fn list(&self, selector: &ListSelector, options: ListOptions) -> Result<Vec<Entry>> {
        if selector.is_empty() || options.limit == Some(0) {
            return Ok(Vec::new());
        }
        let limit = options.limit.unwrap_or(usize::MAX);
        let data = self.inner.data.read();
        let range = data.range::<[u8], _>((
            Bound::Included(selector.start()),
            Bound::Excluded(selector.end()),
        ));
        if options.reverse {
            range
                .rev()
                .take(limit)
                .map(|(packed, sv)| sv.to_entry(packed))
                .collect()
        } else {
            range
                .take(limit)
                .map(|(packed, sv)| sv.to_entry(packed))
                .collect()
        }
    }

    async fn commit(&self, txn: AtomicTransaction) -> Result<CommitResult> {
        self.inner.commit_now(txn)
    }

    async fn watch(&self, key: &Key) -> Result<KeyWatch> {
        let packed = key.pack();
        let (mut updates, initial) = {
            let data = self.inner.data.read();
            let updates = self.inner.watches.subscribe(&packed);
            (updates, data.get(&packed).map(|sv| entry_for(key, sv)))
        };

        let (sender, receiver) = mpsc::channel(WATCH_BUFFER);
        let token = CancellationToken::new();
        let child = token.clone();
        let inner = Arc::clone(&self.inner);
        let key = key.clone();

        let join = tokio::spawn(async move {
            if sender.send(initial).await.is_err() {
                return;
            }
            loop {
                let state = tokio::select! {
                    _ = child.cancelled() => break,
                    update = updates.recv() => match update {
                        Ok(state) => state,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            debug!(target: "stratadex::watch", key = %key, skipped, "watch lagged, resyncing");
                            inner.current(&key)
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                };
                let sent = tokio::select! {
                    _ = child.cancelled() => break,
                    sent = sender.send(state) => sent,
                };
                if sent.is_err() {
                    break;
                }
            }
            trace!(target: "stratadex::watch", key = %key, "watch closed");
        });

        Ok(KeyWatch::new(receiver, TaskHandle::new(token, join)))
    }

    async fn listen_queue(&self, handler: Arc<dyn QueueHandler>) -> Result<TaskHandle> {
        let receiver = self.inner.queue.take_receiver().ok_or_else(|| {
            Error::unsupported("listen_queue", "a queue listener is already running")
        })?;
        let token = CancellationToken::new();
        let child = token.clone();
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(inner.run_listener(receiver, handler, child));
        Ok(TaskHandle::new(token, join))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratadex_concurrency::ConflictType;
    use stratadex_core::KeyPart;

    fn key(parts: &[&str]) -> Key {
        Key::from_parts(parts.iter().copied())
    }

    fn bytes(b: &[u8]) -> RawValue {
        RawValue::Bytes(b.to_vec())
    }

    async fn put(store: &MemorySubstrate, k: Key, v: RawValue) -> Versionstamp {
        let mut txn = AtomicTransaction::new();
        txn.set(k, v);
        store.commit(txn).await.unwrap().versionstamp().unwrap()
    }

    #[tokio::test]
    async fn test_commit_shares_one_versionstamp() {
        let store = MemorySubstrate::new();
        let mut txn = AtomicTransaction::new();
        txn.set(key(&["a"]), bytes(b"1")).set(key(&["b"]), bytes(b"2"));
        let vs = store.commit(txn).await.unwrap().versionstamp().unwrap();

        let a = store.get(&key(&["a"])).await.unwrap().unwrap();
        let b = store.get(&key(&["b"])).await.unwrap().unwrap();
        assert_eq!(a.versionstamp, vs);
        assert_eq!(b.versionstamp, vs);
    }

    #[tokio::test]
    async fn test_versionstamps_increase() {
        let store = MemorySubstrate::new();
        let v1 = put(&store, key(&["a"]), bytes(b"1")).await;
        let v2 = put(&store, key(&["a"]), bytes(b"2")).await;
        assert!(v2 > v1);
        assert_eq!(store.commit_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_check_applies_nothing() {
        let store = MemorySubstrate::new();
        let vs = put(&store, key(&["a"]), bytes(b"1")).await;

        let mut txn = AtomicTransaction::new();
        txn.check(key(&["a"]), None)
            .set(key(&["a"]), bytes(b"2"))
            .set(key(&["b"]), bytes(b"3"));
        let result = store.commit(txn).await.unwrap();
        match result {
            CommitResult::Conflict(v) => {
                assert!(matches!(v.conflicts[0], ConflictType::KeyExists { .. }))
            }
            other => panic!("expected conflict, got {:?}", other),
        }

        let a = store.get(&key(&["a"])).await.unwrap().unwrap();
        assert_eq!(a.value, bytes(b"1"));
        assert_eq!(a.versionstamp, vs);
        assert!(store.get(&key(&["b"])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counter_error_applies_nothing() {
        let store = MemorySubstrate::new();
        put(&store, key(&["s"]), bytes(b"x")).await;

        let mut txn = AtomicTransaction::new();
        txn.set(key(&["other"]), bytes(b"y")).sum(key(&["s"]), 1);
        assert!(store.commit(txn).await.is_err());
        assert!(store.get(&key(&["other"])).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mutations_on_same_key_apply_in_order() {
        let store = MemorySubstrate::new();
        let mut txn = AtomicTransaction::new();
        txn.sum(key(&["n"]), 2).sum(key(&["n"]), 3).max(key(&["n"]), 4);
        store.commit(txn).await.unwrap();
        let n = store.get(&key(&["n"])).await.unwrap().unwrap();
        assert_eq!(n.value, RawValue::U64(5));
    }

    #[tokio::test]
    async fn test_list_forward_reverse_and_limit() {
        let store = MemorySubstrate::new();
        for id in ["c", "a", "b"] {
            put(&store, key(&["p", id]), bytes(id.as_bytes())).await;
        }
        put(&store, key(&["q", "z"]), bytes(b"z")).await;

        let sel = ListSelector::prefix(&key(&["p"]));
        let fwd = store.list(&sel, ListOptions::default()).await.unwrap();
        let ids: Vec<_> = fwd.iter().map(|e| e.key.last().cloned().unwrap()).collect();
        assert_eq!(
            ids,
            vec![KeyPart::from("a"), KeyPart::from("b"), KeyPart::from("c")]
        );

        let rev = store
            .list(&sel, ListOptions::default().reverse(true))
            .await
            .unwrap();
        let mut expected = fwd.clone();
        expected.reverse();
        assert_eq!(rev, expected);

        let limited = store.list(&sel, ListOptions::limited(2)).await.unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn test_limits_rejected_before_apply() {
        let store = MemorySubstrate::with_limits(Limits::with_small_limits());
        let mut txn = AtomicTransaction::new();
        txn.set(key(&["big"]), RawValue::Bytes(vec![0; 1024]));
        assert!(matches!(
            store.commit(txn).await,
            Err(Error::LimitExceeded(_))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_watch_initial_then_changes() {
        let store = MemorySubstrate::new();
        let k = key(&["w"]);
        let mut watch = store.watch(&k).await.unwrap();
        assert_eq!(watch.next().await, Some(None));

        put(&store, k.clone(), bytes(b"1")).await;
        let first = watch.next().await.unwrap().unwrap();
        assert_eq!(first.value, bytes(b"1"));

        let mut txn = AtomicTransaction::new();
        txn.delete(k.clone());
        store.commit(txn).await.unwrap();
        assert_eq!(watch.next().await, Some(None));

        watch.cancel().await;
        put(&store, k, bytes(b"2")).await;
        assert_eq!(store.watched_keys(), 0);
    }

    #[tokio::test]
    async fn test_deleting_absent_key_notifies_nobody() {
        let store = MemorySubstrate::new();
        let k = key(&["w"]);
        let mut watch = store.watch(&k).await.unwrap();
        assert_eq!(watch.next().await, Some(None));

        let mut txn = AtomicTransaction::new();
        txn.delete(k.clone());
        assert!(store.commit(txn).await.unwrap().is_ok());

        put(&store, k.clone(), bytes(b"1")).await;
        let next = watch.next().await.unwrap().unwrap();
        assert_eq!(next.value, bytes(b"1"));
        watch.cancel().await;
    }

    struct Recorder {
        seen: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
        fail: bool,
    }

    #[async_trait]
    impl QueueHandler for Recorder {
        async fn handle(&self, payload: Vec<u8>) -> Result<()> {
            let _ = self.seen.send(payload);
            if self.fail {
                Err(Error::substrate("handler failed"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_queue_delivers_committed_messages() {
        let store = MemorySubstrate::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = store
            .listen_queue(Arc::new(Recorder {
                seen: tx,
                fail: false,
            }))
            .await
            .unwrap();

        store.enqueue(Enqueue::new(vec![7])).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), vec![7]);
        listener.cancel().await;
    }

    #[tokio::test]
    async fn test_second_listener_rejected_until_first_stops() {
        let store = MemorySubstrate::new();
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let handler = Arc::new(Recorder {
            seen: tx,
            fail: false,
        });
        let first = store.listen_queue(handler.clone()).await.unwrap();
        assert!(store.listen_queue(handler.clone()).await.is_err());
        first.cancel().await;
        let second = store.listen_queue(handler).await.unwrap();
        second.cancel().await;
    }

    #[tokio::test]
    async fn test_undeliverable_message_persisted() {
        let store = MemorySubstrate::with_config(Limits::default(), vec![]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let listener = store
            .listen_queue(Arc::new(Recorder { seen: tx, fail: true }))
            .await
            .unwrap();

        let mut message = Enqueue::new(vec![1, 2]);
        message.backoff_schedule = Some(vec![Duration::from_millis(1)]);
        message.keys_if_undelivered = vec![key(&["dead", "1"])];
        store.enqueue(message).await.unwrap();

        // first attempt + one retry
        assert_eq!(rx.recv().await.unwrap(), vec![1, 2]);
        assert_eq!(rx.recv().await.unwrap(), vec![1, 2]);

        let mut stored = None;
        for _ in 0..100 {
            stored = store.get(&key(&["dead", "1"])).await.unwrap();
            if stored.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(stored.unwrap().value, bytes(&[1, 2]));
        listener.cancel().await;
    }
}
