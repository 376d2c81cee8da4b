//! Cancellable background tasks
//!
//! Watch streams and queue listeners run as tokio tasks. Each is owned by a
//! handle holding its `CancellationToken`; `cancel().await` returns only once
//! the task has exited and released its subscription. Dropping a handle
//! without awaiting still signals cancellation.

use super::Entry;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owner of one cancellable background task
#[derive(Debug)]
pub struct TaskHandle {
    token: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Wrap a spawned task and the token it observes
    pub fn new(token: CancellationToken, join: JoinHandle<()>) -> Self {
        TaskHandle {
            token,
            join: Some(join),
        }
    }

    /// The token the task observes
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the task has exited
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, |j| j.is_finished())
    }

    /// Signal cancellation and wait for the task to exit
    pub async fn cancel(mut self) {
        self.token.cancel();
        if let Some(join) = self.join.take() {
            // A panicked task has released its resources as well.
            let _ = join.await;
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Change stream for one substrate key
///
/// Yields `Some(entry)` for the current value and `None` when the key is
/// absent. The first item is the state at subscription time.
#[derive(Debug)]
pub struct KeyWatch {
    receiver: mpsc::Receiver<Option<Entry>>,
    task: TaskHandle,
}

impl KeyWatch {
    /// Assemble a watch from its channel and forwarding task
    pub fn new(receiver: mpsc::Receiver<Option<Entry>>, task: TaskHandle) -> Self {
        KeyWatch { receiver, task }
    }

    /// Next snapshot; `None` once the stream has ended
    pub async fn next(&mut self) -> Option<Option<Entry>> {
        self.receiver.recv().await
    }

    /// Stop the stream and wait for teardown
    pub async fn cancel(self) {
        let KeyWatch { receiver, task } = self;
        drop(receiver);
        task.cancel().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_waits_for_exit() {
        let token = CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move {
            child.cancelled().await;
        });
        let handle = TaskHandle::new(token, join);
        assert!(!handle.is_finished());
        handle.cancel().await;
    }

    #[tokio::test]
    async fn test_drop_signals_cancellation() {
        let token = CancellationToken::new();
        let observer = token.clone();
        let join = tokio::spawn(async {});
        drop(TaskHandle::new(token, join));
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn test_key_watch_yields_sent_items() {
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let child = token.clone();
        let join = tokio::spawn(async move {
            let _ = tx.send(None).await;
            child.cancelled().await;
        });
        let mut watch = KeyWatch::new(rx, TaskHandle::new(token, join));
        assert_eq!(watch.next().await, Some(None));
        watch.cancel().await;
    }
}
