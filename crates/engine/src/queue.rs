//! Queue router
//!
//! One substrate queue is shared by every collection and topic. Payloads
//! travel inside a [`QueueMessage`] envelope tagged with a handler id
//! derived from `(base key, topic)`; the database runs a single substrate
//! listener and hands each message only to handlers registered under its
//! id.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use stratadex_concurrency::{Enqueue, QueueHandler, Substrate};
use stratadex_core::{DocumentId, Error, Key, Result, TaskHandle, Value};
use tracing::{debug, info};

/// Envelope of every queued payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Receiving handler
    pub handler_id: String,
    /// Payload
    pub data: Value,
}

impl QueueMessage {
    /// Encode for the substrate queue
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(|e| Error::serialization(e.to_string()))
    }

    /// Decode a substrate payload
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(|e| Error::serialization(e.to_string()))
    }
}

/// Handler id of `(base key, topic)`
pub fn handler_id(base: &Key, topic: Option<&str>) -> String {
    format!("{}#{}", base, topic.unwrap_or(""))
}

/// Options of `enqueue`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnqueueOptions {
    /// Deliver no earlier than this
    pub delay: Option<Duration>,
    /// Topic inside the collection
    pub topic: Option<String>,
    /// Ids under which the payload is kept if every delivery fails
    pub ids_if_undelivered: Vec<DocumentId>,
    /// Redelivery delays; the substrate default when `None`
    pub backoff_schedule: Option<Vec<Duration>>,
}

impl EnqueueOptions {
    /// No delay, no topic
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay delivery
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Route to a topic
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Keep the payload under `id` if delivery is exhausted
    pub fn id_if_undelivered(mut self, id: impl Into<DocumentId>) -> Self {
        self.ids_if_undelivered.push(id.into());
        self
    }

    /// Redelivery delays
    pub fn backoff_schedule(mut self, schedule: Vec<Duration>) -> Self {
        self.backoff_schedule = Some(schedule);
        self
    }

    /// Substrate message for `data` sent from the key space at `base`
    pub(crate) fn to_enqueue(
        &self,
        base: &Key,
        undelivered: impl Fn(&DocumentId) -> Key,
        data: Value,
    ) -> Result<Enqueue> {
        let message = QueueMessage {
            handler_id: handler_id(base, self.topic.as_deref()),
            data,
        };
        Ok(Enqueue {
            payload: message.to_bytes()?,
            delay: self.delay,
            keys_if_undelivered: self.ids_if_undelivered.iter().map(undelivered).collect(),
            backoff_schedule: self.backoff_schedule.clone(),
        })
    }
}

/// Receives queue payloads addressed to one collection/topic
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle one payload; `Err` asks for redelivery
    async fn handle(&self, data: Value) -> Result<()>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, data: Value) -> Result<()> {
        (self)(data).await
    }
}

type Routes = HashMap<String, Vec<(u64, Arc<dyn MessageHandler>)>>;

/// Demultiplexer over the shared substrate queue
pub(crate) struct QueueRouter {
    routes: RwLock<Routes>,
    next_route: AtomicU64,
    listener: tokio::sync::Mutex<Option<TaskHandle>>,
}

impl QueueRouter {
    pub(crate) fn new() -> Self {
        QueueRouter {
            routes: RwLock::new(HashMap::new()),
            next_route: AtomicU64::new(1),
            listener: tokio::sync::Mutex::new(None),
        }
    }

    /// Register a handler, starting the substrate listener if needed
    pub(crate) async fn register(
        self: &Arc<Self>,
        substrate: &dyn Substrate,
        handler_id: String,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<QueueListener> {
        let mut listener = self.listener.lock().await;
        let route = self.next_route.fetch_add(1, Ordering::Relaxed);
        self.routes
            .write()
            .entry(handler_id.clone())
            .or_default()
            .push((route, handler));

        let running = listener.as_ref().is_some_and(|task| !task.is_finished());
        if !running {
            let dispatch = Arc::new(Dispatch {
                router: Arc::downgrade(self),
            });
            match substrate.listen_queue(dispatch).await {
                Ok(task) => {
                    info!(target: "stratadex::queue", "Queue listener started");
                    *listener = Some(task);
                }
                Err(e) => {
                    self.remove(&handler_id, route);
                    return Err(e);
                }
            }
        }
        debug!(target: "stratadex::queue", handler = %handler_id, "Queue handler registered");

        Ok(QueueListener {
            router: Arc::downgrade(self),
            handler_id,
            route,
        })
    }

    fn remove(&self, handler_id: &str, route: u64) -> bool {
        let mut routes = self.routes.write();
        if let Some(handlers) = routes.get_mut(handler_id) {
            handlers.retain(|(r, _)| *r != route);
            if handlers.is_empty() {
                routes.remove(handler_id);
            }
        }
        routes.is_empty()
    }

    async fn unregister(&self, handler_id: &str, route: u64) {
        let mut listener = self.listener.lock().await;
        if self.remove(handler_id, route) {
            if let Some(task) = listener.take() {
                task.cancel().await;
                info!(target: "stratadex::queue", "Queue listener stopped");
            }
        }
    }

    /// Stop the substrate listener and forget every handler
    pub(crate) async fn shutdown(&self) {
        let mut listener = self.listener.lock().await;
        self.routes.write().clear();
        if let Some(task) = listener.take() {
            task.cancel().await;
        }
    }

    /// Number of registered handlers
    pub(crate) fn handler_count(&self) -> usize {
        self.routes.read().values().map(Vec::len).sum()
    }

    async fn dispatch(&self, payload: Vec<u8>) -> Result<()> {
        let message = QueueMessage::from_bytes(&payload)?;
        let handlers: Vec<Arc<dyn MessageHandler>> = self
            .routes
            .read()
            .get(&message.handler_id)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        if handlers.is_empty() {
            debug!(target: "stratadex::queue", handler = %message.handler_id, "No handler for queued message");
            return Ok(());
        }
        for handler in handlers {
            handler.handle(message.data.clone()).await?;
        }
        Ok(())
    }
}

struct Dispatch {
    router: Weak<QueueRouter>,
}

#[async_trait]
impl QueueHandler for Dispatch {
    async fn handle(&self, payload: Vec<u8>) -> Result<()> {
        match self.router.upgrade() {
            Some(router) => router.dispatch(payload).await,
            None => Err(Error::substrate("database closed")),
        }
    }
}

/// Registration of one queue handler
///
/// Cancelling removes the handler; the substrate listener stops once no
/// handler is left.
#[derive(Debug)]
pub struct QueueListener {
    router: Weak<QueueRouter>,
    handler_id: String,
    route: u64,
}

impl QueueListener {
    /// Handler id this listener receives
    pub fn handler_id(&self) -> &str {
        &self.handler_id
    }

    /// Remove the handler and wait for teardown
    pub async fn cancel(self) {
        if let Some(router) = self.router.upgrade() {
            router.unregister(&self.handler_id, self.route).await;
        }
    }
}
