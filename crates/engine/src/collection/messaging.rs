//! Collection-scoped queue messages

use super::Collection;
use crate::document::Document;
use crate::queue::{EnqueueOptions, MessageHandler, QueueListener};
use std::sync::Arc;
use stratadex_core::{DocumentId, Result, Value, Versionstamp};

impl Collection {
    /// Queue `data` for this collection's listeners of `options.topic`
    pub async fn enqueue(&self, data: impl Into<Value>, options: EnqueueOptions) -> Result<Versionstamp> {
        self.shared()
            .enqueue_in(self.keys(), data.into(), &options)
            .await
    }

    /// Receive messages queued on this collection under `topic`
    ///
    /// ```ignore
    /// let listener = users
    ///     .listen_queue(Some("welcome"), |data: Value| async move {
    ///         send_mail(data).await
    ///     })
    ///     .await?;
    /// ```
    pub async fn listen_queue<H>(&self, topic: Option<&str>, handler: H) -> Result<QueueListener>
    where
        H: MessageHandler + 'static,
    {
        self.shared()
            .listen_in(self.keys(), topic, Arc::new(handler))
            .await
    }

    /// Payload kept under `id` after delivery was exhausted
    pub async fn find_undelivered(&self, id: impl Into<DocumentId>) -> Result<Option<Document>> {
        self.shared()
            .find_undelivered_in(self.keys(), &id.into())
            .await
    }

    /// Drop a kept payload
    pub async fn delete_undelivered(&self, id: impl Into<DocumentId>) -> Result<()> {
        self.shared()
            .delete_undelivered_in(self.keys(), &id.into())
            .await
    }
}
