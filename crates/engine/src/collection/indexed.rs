//! Lookups through primary and secondary indices

use super::{Collection, Stored};
use crate::document::{CommitOutcome, Document};
use crate::index::{self, IndexKind};
use crate::merge::UpdateStrategy;
use crate::query::{PaginationResult, QueryOptions};
use stratadex_core::{KeyPart, Result, Value};

impl Collection {
    async fn load_by_primary_index(&self, field: &str, value: KeyPart) -> Result<Option<Stored>> {
        self.indices().require(field, IndexKind::Primary)?;
        let key = self.keys().primary_index_key(field, &index::lookup_part(value));
        let Some(entry) = self.shared().substrate.get(&key).await? else {
            return Ok(None);
        };
        let id = index::dereference(&entry.value)?;
        self.load(&id).await
    }

    // ========== Primary index ==========

    /// The document owning `value` for `field`
    pub async fn find_by_primary_index(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
    ) -> Result<Option<Document>> {
        Ok(self
            .load_by_primary_index(field, value.into())
            .await?
            .map(|s| s.doc))
    }

    /// Delete the document owning `value`; `None` if there is none
    pub async fn delete_by_primary_index(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
    ) -> Result<Option<CommitOutcome>> {
        match self.load_by_primary_index(field, value.into()).await? {
            Some(stored) => Ok(Some(self.delete_stored(&stored).await?)),
            None => Ok(None),
        }
    }

    /// Update the document owning `value`; `None` if there is none
    pub async fn update_by_primary_index(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
        update: impl Into<Value>,
        strategy: UpdateStrategy,
    ) -> Result<Option<CommitOutcome>> {
        match self.load_by_primary_index(field, value.into()).await? {
            Some(stored) => Ok(Some(self.update_stored(&stored, update.into(), strategy).await?)),
            None => Ok(None),
        }
    }

    /// Update the document owning `value`, or add `set_value` if none does
    pub async fn upsert_by_primary_index(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
        set_value: impl Into<Value>,
        update: impl Into<Value>,
        strategy: UpdateStrategy,
    ) -> Result<CommitOutcome> {
        match self.load_by_primary_index(field, value.into()).await? {
            Some(stored) => self.update_stored(&stored, update.into(), strategy).await,
            None => {
                let prepared = self.prepare(set_value.into())?;
                let id = self.inner.id_generator.generate(&prepared.value).await?;
                self.insert(&id, &prepared).await
            }
        }
    }

    // ========== Secondary index ==========

    /// Documents whose `field` equals `value`, in id order
    pub async fn find_by_secondary_index(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
        options: QueryOptions<Document>,
    ) -> Result<PaginationResult<Document>> {
        let source = self.secondary_value_source(field, value.into())?;
        self.page(&source, &options).await
    }

    /// Delete the documents whose `field` equals `value`
    pub async fn delete_by_secondary_index(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
        options: QueryOptions<Document>,
    ) -> Result<Vec<Result<CommitOutcome>>> {
        let source = self.secondary_value_source(field, value.into())?;
        self.delete_in(&source, &options).await
    }

    /// Update the documents whose `field` equals `value`
    pub async fn update_by_secondary_index(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
        update: impl Into<Value>,
        strategy: UpdateStrategy,
        options: QueryOptions<Document>,
    ) -> Result<Vec<Result<CommitOutcome>>> {
        let source = self.secondary_value_source(field, value.into())?;
        self.update_in(&source, &update.into(), strategy, &options)
            .await
    }

    /// Number of documents whose `field` equals `value`
    pub async fn count_by_secondary_index(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
        options: QueryOptions<Document>,
    ) -> Result<usize> {
        let source = self.secondary_value_source(field, value.into())?;
        self.count_in(&source, &options).await
    }

    /// Call `f` for each document whose `field` equals `value`
    pub async fn for_each_by_secondary_index<F>(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
        options: QueryOptions<Document>,
        f: F,
    ) -> Result<Option<String>>
    where
        F: FnMut(Document),
    {
        let source = self.secondary_value_source(field, value.into())?;
        self.each(&source, &options, f).await
    }

    /// Map each document whose `field` equals `value`
    pub async fn map_by_secondary_index<U, F>(
        &self,
        field: &str,
        value: impl Into<KeyPart>,
        options: QueryOptions<Document>,
        f: F,
    ) -> Result<PaginationResult<U>>
    where
        F: FnMut(Document) -> U,
    {
        Ok(self
            .find_by_secondary_index(field, value, options)
            .await?
            .map(f))
    }
}
