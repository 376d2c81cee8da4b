//! History log of a collection

use super::Collection;
use crate::codec::{segment, SegmentHeader};
use crate::history::{HistoryEntry, HistoryKind, HistoryRecord, StoredHistoryValue};
use crate::query::{self, PaginationResult, QueryOptions};
use std::mem;
use stratadex_concurrency::AtomicTransaction;
use stratadex_core::{
    DocumentId, Entry, Error, KeyPart, ListOptions, ListSelector, RawValue, Result, Timestamp, Value,
};
use uuid::Uuid;

impl Collection {
    /// Append a history record for `id` to `txn`; `None` records a delete
    pub(crate) fn plan_history_write(
        &self,
        txn: &mut AtomicTransaction,
        id: &DocumentId,
        value: Option<&Value>,
    ) -> Result<()> {
        let keys = self.keys();
        let entry_id = Uuid::now_v7().to_string();
        let timestamp = self.shared().next_timestamp();
        let mut record = HistoryRecord {
            kind: if value.is_some() {
                HistoryKind::Write
            } else {
                HistoryKind::Delete
            },
            timestamp: timestamp.as_micros(),
            value: match value {
                Some(v) => StoredHistoryValue::Inline(self.inner.codec.encode(v)?),
                None => StoredHistoryValue::None,
            },
        };
        let mut bytes = record.to_bytes()?;

        let chunk_size = self.shared().chunk_size();
        if bytes.len() > chunk_size {
            if let StoredHistoryValue::Inline(encoded) =
                mem::replace(&mut record.value, StoredHistoryValue::None)
            {
                for (n, chunk) in segment::split(&encoded, chunk_size).into_iter().enumerate() {
                    txn.set(
                        keys.history_segment_key(&entry_id, n as u32),
                        RawValue::Bytes(chunk.to_vec()),
                    );
                }
                record.value = StoredHistoryValue::Segmented(SegmentHeader::describe(&encoded, chunk_size));
                bytes = record.to_bytes()?;
            }
        }

        txn.set(keys.history_key(id, timestamp, &entry_id), RawValue::Bytes(bytes));
        Ok(())
    }

    async fn decode_history(&self, id: &DocumentId, entry: Entry) -> Result<Option<HistoryEntry>> {
        let bytes = entry
            .value
            .as_bytes()
            .ok_or_else(|| Error::corruption(format!("history record at {} is not bytes", entry.key)))?;
        let record = HistoryRecord::from_bytes(bytes)?;
        let value = match record.value {
            StoredHistoryValue::None => None,
            StoredHistoryValue::Inline(encoded) => Some(self.inner.codec.decode(&encoded)?),
            StoredHistoryValue::Segmented(header) => {
                let entry_id = history_entry_id(&entry)?;
                let selector = ListSelector::prefix(&self.keys().history_segment_prefix(entry_id));
                let chunks = self
                    .shared()
                    .substrate
                    .list(&selector, ListOptions::default())
                    .await?
                    .into_iter()
                    .map(|chunk| match chunk.value {
                        RawValue::Bytes(bytes) => Ok(bytes),
                        RawValue::U64(_) => Err(Error::corruption("history chunk is not bytes")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Some(self.inner.codec.decode(&segment::reassemble(&header, chunks)?)?)
            }
        };
        Ok(Some(HistoryEntry {
            id: id.clone(),
            timestamp: Timestamp::from_micros(record.timestamp),
            kind: record.kind,
            value,
        }))
    }

    /// History of one document, oldest first
    ///
    /// `start_id`/`end_id` do not apply.
    pub async fn find_history(
        &self,
        id: impl Into<DocumentId>,
        options: QueryOptions<HistoryEntry>,
    ) -> Result<PaginationResult<HistoryEntry>> {
        let id = id.into();
        let selector = ListSelector::prefix(&self.keys().history_prefix(&id));
        let scan_options = options.scan_options(self.shared().config.default_batch_size);
        let id = &id;
        query::scan(
            self.shared().substrate.as_ref(),
            selector,
            &scan_options,
            move |entry| self.decode_history(id, entry),
            |entry: &HistoryEntry| options.accepts(entry),
        )
        .await
    }

    /// Remove the history of one document
    pub async fn delete_history(&self, id: impl Into<DocumentId>) -> Result<()> {
        let selector = ListSelector::prefix(&self.keys().history_prefix(&id.into()));
        let records = self
            .shared()
            .substrate
            .list(&selector, ListOptions::default())
            .await?;
        for entry in &records {
            let segmented = entry
                .value
                .as_bytes()
                .map(HistoryRecord::from_bytes)
                .transpose()?
                .is_some_and(|r| matches!(r.value, StoredHistoryValue::Segmented(_)));
            if segmented {
                let prefix = self.keys().history_segment_prefix(history_entry_id(entry)?);
                self.shared().purge(ListSelector::prefix(&prefix)).await?;
            }
        }
        self.shared().purge(selector).await?;
        Ok(())
    }

    /// Remove the history of every document
    pub async fn delete_all_history(&self) -> Result<()> {
        let keys = self.keys();
        self.shared()
            .purge(ListSelector::prefix(&keys.history_root()))
            .await?;
        self.shared()
            .purge(ListSelector::prefix(&keys.history_segment_root()))
            .await?;
        Ok(())
    }
}

fn history_entry_id(entry: &Entry) -> Result<&str> {
    entry
        .key
        .last()
        .and_then(KeyPart::as_str)
        .ok_or_else(|| Error::corruption(format!("{} is not a history key", entry.key)))
}
