//! Watch aggregator
//!
//! `watch` turns one substrate key stream into document snapshots delivered
//! to a callback. `watch_many` fans several streams into one callback that
//! always receives the full snapshot array in request order.
//!
//! Every watch is an owned task. [`WatchHandle::cancel`] returns once the
//! task and its substrate subscriptions are gone.

use crate::document::Document;
use std::future::Future;
use stratadex_concurrency::Substrate;
use stratadex_core::{Entry, Key, KeyWatch, Result, TaskHandle};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const FAN_IN_BUFFER: usize = 64;

/// Owner of a running watch
#[derive(Debug)]
pub struct WatchHandle {
    task: TaskHandle,
}

impl WatchHandle {
    fn new(task: TaskHandle) -> Self {
        WatchHandle { task }
    }

    /// True once the watch has stopped on its own
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the watch and wait until its subscriptions are released
    pub async fn cancel(self) {
        self.task.cancel().await;
    }
}

/// Watch one key, resolving each raw state before calling back
///
/// The first callback carries the state at subscription time.
pub(crate) async fn watch_one<R, Fut, F>(
    substrate: &dyn Substrate,
    key: &Key,
    resolve: R,
    callback: F,
) -> Result<WatchHandle>
where
    R: Fn(Option<Entry>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Document>>> + Send,
    F: Fn(Option<Document>) + Send + Sync + 'static,
{
    let mut stream = substrate.watch(key).await?;
    let token = CancellationToken::new();
    let child = token.clone();
    let key = key.clone();

    let join = tokio::spawn(async move {
        loop {
            let state = tokio::select! {
                _ = child.cancelled() => break,
                next = stream.next() => match next {
                    Some(state) => state,
                    None => break,
                },
            };
            match resolve(state).await {
                Ok(doc) => callback(doc),
                Err(e) => warn!(target: "stratadex::watch", key = %key, error = %e, "Failed to resolve watched document"),
            }
        }
        stream.cancel().await;
        debug!(target: "stratadex::watch", key = %key, "Watch stopped");
    });
    Ok(WatchHandle::new(TaskHandle::new(token, join)))
}

/// Watch several keys through one callback
///
/// Initial states seed the snapshot array without a callback; afterwards
/// every change to any key calls back once with the whole array.
pub(crate) async fn watch_many<R, Fut, F>(
    substrate: &dyn Substrate,
    keys: &[Key],
    resolve: R,
    callback: F,
) -> Result<WatchHandle>
where
    R: Fn(usize, Option<Entry>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Document>>> + Send,
    F: Fn(Vec<Option<Document>>) + Send + Sync + 'static,
{
    let mut streams: Vec<KeyWatch> = Vec::with_capacity(keys.len());
    for key in keys {
        match substrate.watch(key).await {
            Ok(stream) => streams.push(stream),
            Err(e) => {
                for stream in streams {
                    stream.cancel().await;
                }
                return Err(e);
            }
        }
    }

    let token = CancellationToken::new();
    let (sender, mut receiver) = mpsc::channel::<(usize, Option<Entry>)>(FAN_IN_BUFFER);
    let mut forwarders = JoinSet::new();
    for (slot, mut stream) in streams.into_iter().enumerate() {
        let sender = sender.clone();
        let stop = token.child_token();
        forwarders.spawn(async move {
            loop {
                let state = tokio::select! {
                    _ = stop.cancelled() => break,
                    next = stream.next() => match next {
                        Some(state) => state,
                        None => break,
                    },
                };
                if sender.send((slot, state)).await.is_err() {
                    break;
                }
            }
            stream.cancel().await;
        });
    }
    drop(sender);

    let count = keys.len();
    let stop = token.clone();
    let join = tokio::spawn(async move {
        let mut snapshots: Vec<Option<Document>> = vec![None; count];
        let mut seeded = vec![false; count];
        loop {
            let (slot, state) = tokio::select! {
                _ = stop.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(item) => item,
                    None => break,
                },
            };
            let first = !seeded[slot];
            seeded[slot] = true;
            match resolve(slot, state).await {
                Ok(doc) => snapshots[slot] = doc,
                Err(e) => {
                    warn!(target: "stratadex::watch", slot, error = %e, "Failed to resolve watched document");
                    continue;
                }
            }
            if !first {
                callback(snapshots.clone());
            }
        }
        stop.cancel();
        drop(receiver);
        while forwarders.join_next().await.is_some() {}
        debug!(target: "stratadex::watch", keys = count, "Watch group stopped");
    });
    Ok(WatchHandle::new(TaskHandle::new(token, join)))
}
