//! Document watches

use super::Collection;
use crate::document::Document;
use crate::watch::{self, WatchHandle};
use stratadex_core::{DocumentId, Entry, Result};

impl Collection {
    async fn resolve_watched(&self, id: &DocumentId, entry: Option<Entry>) -> Result<Option<Document>> {
        match entry {
            None => Ok(None),
            Some(entry) if !self.is_segmented() => Ok(self.load_entry(entry).await?.map(|s| s.doc)),
            // The header alone does not carry the value
            Some(_) => Ok(self.load(id).await?.map(|s| s.doc)),
        }
    }

    /// Watch one document
    ///
    /// `callback` first receives the current state, then one snapshot per
    /// change; `None` means absent.
    ///
    /// ```ignore
    /// let handle = users.watch("u1", |doc| println!("{:?}", doc)).await?;
    /// handle.cancel().await;
    /// ```
    pub async fn watch<F>(&self, id: impl Into<DocumentId>, callback: F) -> Result<WatchHandle>
    where
        F: Fn(Option<Document>) + Send + Sync + 'static,
    {
        let id = id.into();
        let key = self.keys().id_key(&id);
        let collection = self.clone();
        watch::watch_one(
            self.shared().substrate.as_ref(),
            &key,
            move |entry| {
                let collection = collection.clone();
                let id = id.clone();
                async move { collection.resolve_watched(&id, entry).await }
            },
            callback,
        )
        .await
    }

    /// Watch several documents through one callback
    ///
    /// Initial states are collected without a callback; afterwards each
    /// change calls back once with every snapshot, in `ids` order.
    pub async fn watch_many<I, F>(&self, ids: I, callback: F) -> Result<WatchHandle>
    where
        I: IntoIterator,
        I::Item: Into<DocumentId>,
        F: Fn(Vec<Option<Document>>) + Send + Sync + 'static,
    {
        let ids: Vec<DocumentId> = ids.into_iter().map(Into::into).collect();
        let keys: Vec<_> = ids.iter().map(|id| self.keys().id_key(id)).collect();
        let collection = self.clone();
        watch::watch_many(
            self.shared().substrate.as_ref(),
            &keys,
            move |slot, entry| {
                let collection = collection.clone();
                let id = ids[slot].clone();
                async move { collection.resolve_watched(&id, entry).await }
            },
            callback,
        )
        .await
    }
}
