//! In-memory at-least-once message queue
//!
//! Messages enter the queue only from successful commits. A single listener
//! owns the receiving end at a time; when the listener stops, the receiver
//! is handed back so a later listener picks up whatever is still queued.

use parking_lot::Mutex;
use std::time::Duration;
use stratadex_concurrency::Enqueue;
use tokio::sync::mpsc;

/// A message plus its delivery attempt count
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    /// The committed message
    pub message: Enqueue,
    /// Failed deliveries so far
    pub attempt: usize,
}

/// Unbounded message channel with a single detachable receiver
#[derive(Debug)]
pub struct MessageQueue {
    sender: mpsc::UnboundedSender<QueuedMessage>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<QueuedMessage>>>,
    default_backoff: Vec<Duration>,
}

impl MessageQueue {
    /// Create a queue with the redelivery schedule used when a message has none
    pub fn new(default_backoff: Vec<Duration>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        MessageQueue {
            sender,
            receiver: Mutex::new(Some(receiver)),
            default_backoff,
        }
    }

    /// Queue a message, optionally after a delay
    pub fn push(&self, queued: QueuedMessage, delay: Option<Duration>) {
        match (delay, tokio::runtime::Handle::try_current()) {
            (Some(delay), Ok(handle)) if !delay.is_zero() => {
                let sender = self.sender.clone();
                handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = sender.send(queued);
                });
            }
            _ => {
                // Fails only once the receiver is gone.
                let _ = self.sender.send(queued);
            }
        }
    }

    /// Detach the receiver; `None` while a listener holds it
    pub fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<QueuedMessage>> {
        self.receiver.lock().take()
    }

    /// Hand the receiver back after a listener stops
    pub fn restore_receiver(&self, receiver: mpsc::UnboundedReceiver<QueuedMessage>) {
        *self.receiver.lock() = Some(receiver);
    }

    /// Redelivery delays for a message
    pub fn backoff_for<'a>(&'a self, message: &'a Enqueue) -> &'a [Duration] {
        message
            .backoff_schedule
            .as_deref()
            .unwrap_or(&self.default_backoff)
    }
}
