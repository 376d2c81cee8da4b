//! Ranged reads and bulk operations
//!
//! Every listing walks one of three key ranges:
//!
//! | Source | Range | Order |
//! |--------|-------|-------|
//! | ids | `id/*`, bounded by `start_id`/`end_id` | id |
//! | secondary value | `index_secondary/<field>/<value>/*` | id |
//! | secondary order | `index_secondary/<field>/*` | `(value, id)` |
//!
//! Index entries are dereferenced through the id key; an entry whose
//! document vanished in between is skipped. Bulk writes run one
//! transaction per matched document.

use super::{Collection, Stored};
use crate::document::{CommitOutcome, Document};
use crate::index::{self, IndexKind};
use crate::merge::UpdateStrategy;
use crate::query::{self, PaginationResult, QueryOptions};
use stratadex_core::{Entry, KeyPart, ListSelector, Result, Value};
use tracing::debug;

/// Key range a listing walks
#[derive(Debug, Clone)]
pub(crate) enum Source {
    Ids,
    SecondaryValue { field: String, value: KeyPart },
    SecondaryOrder { field: String },
}

impl Collection {
    pub(crate) fn secondary_value_source(&self, field: &str, value: KeyPart) -> Result<Source> {
        self.indices().require(field, IndexKind::Secondary)?;
        Ok(Source::SecondaryValue {
            field: field.to_string(),
            value: index::lookup_part(value),
        })
    }

    fn secondary_order_source(&self, field: &str) -> Result<Source> {
        self.indices().require(field, IndexKind::Secondary)?;
        Ok(Source::SecondaryOrder {
            field: field.to_string(),
        })
    }

    fn selector(&self, source: &Source, options: &QueryOptions<Document>) -> ListSelector {
        let keys = self.keys();
        match source {
            Source::Ids => {
                let mut selector = ListSelector::prefix(&keys.id_prefix());
                if let Some(start) = &options.start_id {
                    selector = selector.at_or_after(&keys.id_key(start).pack());
                }
                if let Some(end) = &options.end_id {
                    selector = selector.before(&keys.id_key(end).pack());
                }
                selector
            }
            Source::SecondaryValue { field, value } => {
                ListSelector::prefix(&keys.secondary_value_prefix(field, value))
            }
            Source::SecondaryOrder { field } => {
                ListSelector::prefix(&keys.secondary_field_prefix(field))
            }
        }
    }

    async fn resolve(&self, source: &Source, entry: Entry) -> Result<Option<Stored>> {
        match source {
            Source::Ids => self.load_entry(entry).await,
            Source::SecondaryValue { .. } | Source::SecondaryOrder { .. } => {
                let id = index::dereference(&entry.value)?;
                self.load(&id).await
            }
        }
    }

    /// One page of loaded documents from `source`
    pub(crate) async fn scan_stored(
        &self,
        source: &Source,
        options: &QueryOptions<Document>,
    ) -> Result<PaginationResult<Stored>> {
        let scan_options = options.scan_options(self.shared().config.default_batch_size);
        query::scan(
            self.shared().substrate.as_ref(),
            self.selector(source, options),
            &scan_options,
            move |entry| self.resolve(source, entry),
            |stored: &Stored| options.accepts(&stored.doc),
        )
        .await
    }

    pub(crate) async fn page(
        &self,
        source: &Source,
        options: &QueryOptions<Document>,
    ) -> Result<PaginationResult<Document>> {
        Ok(self.scan_stored(source, options).await?.map(|s| s.doc))
    }

    async fn first(&self, source: &Source, options: QueryOptions<Document>) -> Result<Option<Document>> {
        let page = self.page(source, &options.take(1)).await?;
        Ok(page.result.into_iter().next())
    }

    pub(crate) async fn each<F>(
        &self,
        source: &Source,
        options: &QueryOptions<Document>,
        mut f: F,
    ) -> Result<Option<String>>
    where
        F: FnMut(Document),
    {
        let page = self.page(source, options).await?;
        for doc in page.result {
            f(doc);
        }
        Ok(page.cursor)
    }

    pub(crate) async fn count_in(&self, source: &Source, options: &QueryOptions<Document>) -> Result<usize> {
        if options.filter.is_some() || !matches!(source, Source::Ids) {
            return Ok(self.scan_stored(source, options).await?.result.len());
        }
        let scan_options = options.scan_options(self.shared().config.default_batch_size);
        let page = query::scan(
            self.shared().substrate.as_ref(),
            self.selector(source, options),
            &scan_options,
            |_entry| async { Ok(Some(())) },
            |_: &()| true,
        )
        .await?;
        Ok(page.result.len())
    }

    pub(crate) async fn delete_in(
        &self,
        source: &Source,
        options: &QueryOptions<Document>,
    ) -> Result<Vec<Result<CommitOutcome>>> {
        let page = self.scan_stored(source, options).await?;
        let mut outcomes = Vec::with_capacity(page.result.len());
        for stored in &page.result {
            outcomes.push(self.delete_stored(stored).await);
        }
        Ok(outcomes)
    }

    pub(crate) async fn update_in(
        &self,
        source: &Source,
        value: &Value,
        strategy: UpdateStrategy,
        options: &QueryOptions<Document>,
    ) -> Result<Vec<Result<CommitOutcome>>> {
        let page = self.scan_stored(source, options).await?;
        let mut outcomes = Vec::with_capacity(page.result.len());
        for stored in &page.result {
            let outcome = self.update_stored(stored, value.clone(), strategy).await;
            if let Err(e) = &outcome {
                debug!(
                    target: "stratadex::collection",
                    collection = %self.name(),
                    id = %stored.doc.id,
                    error = %e,
                    "Bulk update failed for one document"
                );
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    // ========== By id ==========

    /// Documents in id order
    pub async fn get_many(&self, options: QueryOptions<Document>) -> Result<PaginationResult<Document>> {
        self.page(&Source::Ids, &options).await
    }

    /// First matching document in id order
    pub async fn get_one(&self, options: QueryOptions<Document>) -> Result<Option<Document>> {
        self.first(&Source::Ids, options).await
    }

    /// Call `f` for every matching document; returns the resume cursor
    pub async fn for_each<F>(&self, options: QueryOptions<Document>, f: F) -> Result<Option<String>>
    where
        F: FnMut(Document),
    {
        self.each(&Source::Ids, &options, f).await
    }

    /// Map every matching document
    pub async fn map<U, F>(&self, options: QueryOptions<Document>, f: F) -> Result<PaginationResult<U>>
    where
        F: FnMut(Document) -> U,
    {
        Ok(self.get_many(options).await?.map(f))
    }

    /// Number of matching documents
    pub async fn count(&self, options: QueryOptions<Document>) -> Result<usize> {
        self.count_in(&Source::Ids, &options).await
    }

    /// Delete every matching document, one transaction each
    ///
    /// Each document gets its own result; one failure does not stop the rest.
    pub async fn delete_many(&self, options: QueryOptions<Document>) -> Result<Vec<Result<CommitOutcome>>> {
        self.delete_in(&Source::Ids, &options).await
    }

    /// Update every matching document, one transaction each
    ///
    /// Each document gets its own result; a merged value the model rejects
    /// fails only that document.
    pub async fn update_many(
        &self,
        value: impl Into<Value>,
        strategy: UpdateStrategy,
        options: QueryOptions<Document>,
    ) -> Result<Vec<Result<CommitOutcome>>> {
        self.update_in(&Source::Ids, &value.into(), strategy, &options)
            .await
    }

    /// Update the first matching document
    pub async fn update_one(
        &self,
        value: impl Into<Value>,
        strategy: UpdateStrategy,
        options: QueryOptions<Document>,
    ) -> Result<Option<CommitOutcome>> {
        let outcomes = self
            .update_in(&Source::Ids, &value.into(), strategy, &options.take(1))
            .await?;
        outcomes.into_iter().next().transpose()
    }

    // ========== By secondary order ==========

    /// First document in `(field value, id)` order
    pub async fn get_one_by_secondary_order(
        &self,
        field: &str,
        options: QueryOptions<Document>,
    ) -> Result<Option<Document>> {
        let source = self.secondary_order_source(field)?;
        self.first(&source, options).await
    }

    /// Documents in `(field value, id)` order
    pub async fn get_many_by_secondary_order(
        &self,
        field: &str,
        options: QueryOptions<Document>,
    ) -> Result<PaginationResult<Document>> {
        let source = self.secondary_order_source(field)?;
        self.page(&source, &options).await
    }

    /// `for_each` in `(field value, id)` order
    pub async fn for_each_by_secondary_order<F>(
        &self,
        field: &str,
        options: QueryOptions<Document>,
        f: F,
    ) -> Result<Option<String>>
    where
        F: FnMut(Document),
    {
        let source = self.secondary_order_source(field)?;
        self.each(&source, &options, f).await
    }

    /// `map` in `(field value, id)` order
    pub async fn map_by_secondary_order<U, F>(
        &self,
        field: &str,
        options: QueryOptions<Document>,
        f: F,
    ) -> Result<PaginationResult<U>>
    where
        F: FnMut(Document) -> U,
    {
        Ok(self.get_many_by_secondary_order(field, options).await?.map(f))
    }

    /// Documents with a value for `field`
    pub async fn count_by_secondary_order(&self, field: &str, options: QueryOptions<Document>) -> Result<usize> {
        let source = self.secondary_order_source(field)?;
        self.count_in(&source, &options).await
    }

    /// `delete_many` in `(field value, id)` order
    pub async fn delete_by_secondary_order(
        &self,
        field: &str,
        options: QueryOptions<Document>,
    ) -> Result<Vec<Result<CommitOutcome>>> {
        let source = self.secondary_order_source(field)?;
        self.delete_in(&source, &options).await
    }

    /// `update_many` in `(field value, id)` order
    pub async fn update_by_secondary_order(
        &self,
        field: &str,
        value: impl Into<Value>,
        strategy: UpdateStrategy,
        options: QueryOptions<Document>,
    ) -> Result<Vec<Result<CommitOutcome>>> {
        let source = self.secondary_order_source(field)?;
        self.update_in(&source, &value.into(), strategy, &options).await
    }
}
