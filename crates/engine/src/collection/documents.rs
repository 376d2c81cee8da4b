//! Single-document operations

use super::{Collection, Prepared};
use crate::document::{CommitOutcome, Document, SetOptions};
use crate::merge::UpdateStrategy;
use stratadex_concurrency::AtomicTransaction;
use stratadex_core::{DocumentId, Result, Value};

impl Collection {
    // ========== Writes ==========

    /// Add a document under a generated id
    ///
    /// Fails with `Conflict` if the id or a primary index value is taken.
    pub async fn add(&self, value: impl Into<Value>) -> Result<CommitOutcome> {
        let prepared = self.prepare(value.into())?;
        let id = self.inner.id_generator.generate(&prepared.value).await?;
        self.insert(&id, &prepared).await
    }

    /// Add several documents, one transaction each
    ///
    /// Every value gets its own result, in input order. A value the model
    /// rejects fails alone; the others are still added.
    pub async fn add_many<I>(&self, values: I) -> Vec<Result<CommitOutcome>>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut outcomes = Vec::new();
        for value in values {
            outcomes.push(self.add(value).await);
        }
        outcomes
    }

    /// Store a document under `id`
    ///
    /// Without `overwrite` this behaves like `add` with a given id.
    pub async fn set(
        &self,
        id: impl Into<DocumentId>,
        value: impl Into<Value>,
        options: SetOptions,
    ) -> Result<CommitOutcome> {
        let id = id.into();
        let prepared = self.prepare(value.into())?;
        if options.overwrite {
            self.replace(&id, &prepared).await
        } else {
            self.insert(&id, &prepared).await
        }
    }

    /// Unconditional upsert: `set` with overwrite
    pub async fn write(&self, id: impl Into<DocumentId>, value: impl Into<Value>) -> Result<CommitOutcome> {
        self.set(id, value, SetOptions::overwrite()).await
    }

    pub(crate) async fn insert(&self, id: &DocumentId, prepared: &Prepared) -> Result<CommitOutcome> {
        let mut txn = AtomicTransaction::new();
        txn.check(self.keys().id_key(id), None);
        let claimed = self.plan_write(&mut txn, id, None, prepared)?;
        self.commit_for(id, txn, &claimed).await
    }

    async fn replace(&self, id: &DocumentId, prepared: &Prepared) -> Result<CommitOutcome> {
        let mut txn = AtomicTransaction::new();
        if self.is_plain() {
            let claimed = self.plan_write(&mut txn, id, None, prepared)?;
            return self.commit_for(id, txn, &claimed).await;
        }
        let old = self.load(id).await?;
        txn.check(
            self.keys().id_key(id),
            old.as_ref().map(|s| s.doc.versionstamp),
        );
        let claimed = self.plan_write(&mut txn, id, old.as_ref(), prepared)?;
        self.commit_for(id, txn, &claimed).await
    }

    /// Delete a document and everything attached to it
    ///
    /// Committed means the document is absent as of the returned
    /// versionstamp; deleting a missing document commits a no-op.
    pub async fn delete(&self, id: impl Into<DocumentId>) -> Result<CommitOutcome> {
        let id = id.into();
        let key = self.keys().id_key(&id);
        let mut txn = AtomicTransaction::new();
        if self.is_plain() && !self.has_history() {
            txn.delete(key);
            return self.commit_for(&id, txn, &[]).await;
        }
        match self.load(&id).await? {
            Some(stored) => {
                txn.check(key, Some(stored.doc.versionstamp));
                self.plan_delete(&mut txn, &stored)?;
            }
            None => {
                txn.check(key, None);
            }
        }
        self.commit_for(&id, txn, &[]).await
    }

    // ========== Reads ==========

    /// Document by id
    pub async fn find(&self, id: impl Into<DocumentId>) -> Result<Option<Document>> {
        Ok(self.load(&id.into()).await?.map(|s| s.doc))
    }

    /// Documents for `ids` that exist, in request order
    pub async fn find_many<I>(&self, ids: I) -> Result<Vec<Document>>
    where
        I: IntoIterator,
        I::Item: Into<DocumentId>,
    {
        Ok(self.get_many_by_ids(ids).await?.into_iter().flatten().collect())
    }

    /// One slot per requested id, `None` where the document is missing
    pub async fn get_many_by_ids<I>(&self, ids: I) -> Result<Vec<Option<Document>>>
    where
        I: IntoIterator,
        I::Item: Into<DocumentId>,
    {
        let ids: Vec<DocumentId> = ids.into_iter().map(Into::into).collect();
        if self.is_segmented() {
            let mut docs = Vec::with_capacity(ids.len());
            for id in &ids {
                docs.push(self.load(id).await?.map(|s| s.doc));
            }
            return Ok(docs);
        }

        let keys: Vec<_> = ids.iter().map(|id| self.keys().id_key(id)).collect();
        let entries = self.shared().substrate.get_many(&keys).await?;
        let mut docs = Vec::with_capacity(entries.len());
        for entry in entries {
            docs.push(match entry {
                Some(entry) => self.load_entry(entry).await?.map(|s| s.doc),
                None => None,
            });
        }
        Ok(docs)
    }

    // ========== Updates ==========

    /// Merge `value` into an existing document
    ///
    /// A missing document yields `Conflict`.
    pub async fn update(
        &self,
        id: impl Into<DocumentId>,
        value: impl Into<Value>,
        strategy: UpdateStrategy,
    ) -> Result<CommitOutcome> {
        let id = id.into();
        match self.load(&id).await? {
            Some(stored) => self.update_stored(&stored, value.into(), strategy).await,
            None => Ok(CommitOutcome::Conflict { id }),
        }
    }

    /// Update if present, otherwise store `set_value` under `id`
    pub async fn upsert(
        &self,
        id: impl Into<DocumentId>,
        set_value: impl Into<Value>,
        update_value: impl Into<Value>,
        strategy: UpdateStrategy,
    ) -> Result<CommitOutcome> {
        let id = id.into();
        match self.load(&id).await? {
            Some(stored) => self.update_stored(&stored, update_value.into(), strategy).await,
            None => {
                let prepared = self.prepare(set_value.into())?;
                self.insert(&id, &prepared).await
            }
        }
    }

    /// Read-merge-write of one loaded document, guarded by its versionstamp
    pub(crate) async fn update_stored(
        &self,
        stored: &super::Stored,
        value: Value,
        strategy: UpdateStrategy,
    ) -> Result<CommitOutcome> {
        let id = &stored.doc.id;
        let merged = strategy.apply(stored.doc.value.clone(), value);
        let prepared = self.prepare(merged)?;
        let mut txn = AtomicTransaction::new();
        txn.check(self.keys().id_key(id), Some(stored.doc.versionstamp));
        let claimed = self.plan_write(&mut txn, id, Some(stored), &prepared)?;
        self.commit_for(id, txn, &claimed).await
    }

    /// Delete one loaded document, guarded by its versionstamp
    pub(crate) async fn delete_stored(&self, stored: &super::Stored) -> Result<CommitOutcome> {
        let mut txn = AtomicTransaction::new();
        txn.check(self.keys().id_key(&stored.doc.id), Some(stored.doc.versionstamp));
        self.plan_delete(&mut txn, stored)?;
        self.commit_for(&stored.doc.id, txn, &[]).await
    }
}
