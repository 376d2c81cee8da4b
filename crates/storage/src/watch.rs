//! Per-key change notification
//!
//! One broadcast channel per watched packed key. Commits publish the new
//! state of every key they touch; a channel whose last receiver is gone is
//! dropped on the next publish.

use parking_lot::Mutex;
use std::collections::HashMap;
use stratadex_core::Entry;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Registry of live key subscriptions
#[derive(Debug, Default)]
pub struct WatchRegistry {
    senders: Mutex<HashMap<Vec<u8>, broadcast::Sender<Option<Entry>>>>,
}

impl WatchRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes of one packed key
    pub fn subscribe(&self, packed: &[u8]) -> broadcast::Receiver<Option<Entry>> {
        let mut senders = self.senders.lock();
        senders
            .entry(packed.to_vec())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish the new state of one packed key
    pub fn publish(&self, packed: &[u8], state: Option<Entry>) {
        let mut senders = self.senders.lock();
        if let Some(sender) = senders.get(packed) {
            if sender.send(state).is_err() {
                senders.remove(packed);
            }
        }
    }

    /// Number of keys with a live channel
    pub fn watched_keys(&self) -> usize {
        self.senders.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let registry = WatchRegistry::new();
        let mut rx = registry.subscribe(b"k");
        registry.publish(b"k", None);
        assert_eq!(rx.recv().await.unwrap(), None);
    }

    #[test]
    fn test_publish_without_subscribers_drops_channel() {
        let registry = WatchRegistry::new();
        let rx = registry.subscribe(b"k");
        assert_eq!(registry.watched_keys(), 1);
        drop(rx);
        registry.publish(b"k", None);
        assert_eq!(registry.watched_keys(), 0);
    }

    #[test]
    fn test_publish_unwatched_key_is_noop() {
        let registry = WatchRegistry::new();
        registry.publish(b"nobody", None);
        assert_eq!(registry.watched_keys(), 0);
    }
}
