//! Query & pagination engine
//!
//! Listing operations scan one ordered key range in batches:
//!
//! - `offset` skips that many entries first
//! - `limit` bounds the entries consumed after the offset, whatever the
//!   filter pass rate
//! - `take` bounds the filter-passing results
//! - `cursor` resumes strictly after (or, reversed, before) the last
//!   consumed key
//!
//! The returned cursor is the last consumed key when the scan stopped on
//! `limit` or `take`, and `None` once the range is exhausted. Feeding it back
//! partitions the range with no gaps or overlaps.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use stratadex_concurrency::Substrate;
use stratadex_core::{DocumentId, Entry, Error, ListOptions, ListSelector, Result};

/// Result predicate
pub type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Options of a listing operation
///
/// ```ignore
/// let page = users
///     .get_many(QueryOptions::new().limit(20).reverse().filter(|d| d.value.get("active").is_some()))
///     .await?;
/// ```
pub struct QueryOptions<T> {
    /// Entries consumed after the offset
    pub limit: Option<usize>,
    /// Filter-passing results returned
    pub take: Option<usize>,
    /// Resume token from a previous page
    pub cursor: Option<String>,
    /// Entries skipped before collecting
    pub offset: Option<usize>,
    /// Inclusive lower id bound (id scans only)
    pub start_id: Option<DocumentId>,
    /// Exclusive upper id bound (id scans only)
    pub end_id: Option<DocumentId>,
    /// Descending key order
    pub reverse: bool,
    /// Result predicate
    pub filter: Option<Filter<T>>,
    /// Entries fetched per substrate call
    pub batch_size: Option<usize>,
}

impl<T> QueryOptions<T> {
    /// Unbounded forward scan
    pub fn new() -> Self {
        QueryOptions {
            limit: None,
            take: None,
            cursor: None,
            offset: None,
            start_id: None,
            end_id: None,
            reverse: false,
            filter: None,
            batch_size: None,
        }
    }

    /// Bound consumed entries
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Bound returned results
    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    /// Resume from a cursor
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Resume from an optional cursor
    pub fn maybe_cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    /// Skip entries
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Inclusive lower id bound
    pub fn start_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.start_id = Some(id.into());
        self
    }

    /// Exclusive upper id bound
    pub fn end_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.end_id = Some(id.into());
        self
    }

    /// Descending order
    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Keep only results passing `filter`
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// Entries per substrate call
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub(crate) fn accepts(&self, item: &T) -> bool {
        self.filter.as_ref().map_or(true, |f| f(item))
    }

    pub(crate) fn scan_options(&self, default_batch: usize) -> ScanOptions {
        ScanOptions {
            limit: self.limit,
            take: self.take,
            cursor: self.cursor.clone(),
            offset: self.offset.unwrap_or(0),
            reverse: self.reverse,
            batch_size: self.batch_size.unwrap_or(default_batch).max(1),
        }
    }
}

impl<T> Default for QueryOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for QueryOptions<T> {
    fn clone(&self) -> Self {
        QueryOptions {
            limit: self.limit,
            take: self.take,
            cursor: self.cursor.clone(),
            offset: self.offset,
            start_id: self.start_id.clone(),
            end_id: self.end_id.clone(),
            reverse: self.reverse,
            filter: self.filter.clone(),
            batch_size: self.batch_size,
        }
    }
}

impl<T> fmt::Debug for QueryOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("limit", &self.limit)
            .field("take", &self.take)
            .field("cursor", &self.cursor)
            .field("offset", &self.offset)
            .field("start_id", &self.start_id)
            .field("end_id", &self.end_id)
            .field("reverse", &self.reverse)
            .field("filter", &self.filter.is_some())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq)]
pub struct PaginationResult<T> {
    /// Results in scan order
    pub result: Vec<T>,
    /// Resume token; `None` when the range is exhausted
    pub cursor: Option<String>,
}

impl<T> PaginationResult<T> {
    /// Map every result
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PaginationResult<U> {
        PaginationResult {
            result: self.result.into_iter().map(f).collect(),
            cursor: self.cursor,
        }
    }
}

/// Encode a packed key as a cursor
pub fn encode_cursor(packed: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(packed)
}

/// Decode a cursor into a packed key
pub fn decode_cursor(cursor: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| Error::InvalidKey(format!("malformed cursor: {}", e)))
}

/// Non-generic part of [`QueryOptions`] used by the scan loop
#[derive(Debug, Clone)]
pub(crate) struct ScanOptions {
    pub limit: Option<usize>,
    pub take: Option<usize>,
    pub cursor: Option<String>,
    pub offset: usize,
    pub reverse: bool,
    pub batch_size: usize,
}

/// Scan `selector` in batches, resolving each entry and keeping accepted ones
///
/// `resolve` may return `None` to drop an entry (for example a dangling
/// index entry); the entry still counts as consumed.
pub(crate) async fn scan<T, R, Fut, A>(
    substrate: &dyn Substrate,
    selector: ListSelector,
    options: &ScanOptions,
    mut resolve: R,
    accept: A,
) -> Result<PaginationResult<T>>
where
    R: FnMut(Entry) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
    A: Fn(&T) -> bool,
{
    let mut selector = selector;
    if let Some(cursor) = &options.cursor {
        let packed = decode_cursor(cursor)?;
        if !selector.contains(&packed) {
            return Err(Error::InvalidKey("cursor does not belong to this range".into()));
        }
        selector = if options.reverse {
            selector.before(&packed)
        } else {
            selector.after(&packed)
        };
    }

    let mut result = Vec::new();
    let mut consumed = 0usize;
    let mut last: Option<Vec<u8>> = None;
    let mut stopped = false;

    if options.take == Some(0) {
        return Ok(PaginationResult { result, cursor: None });
    }

    'scan: loop {
        let mut want = options.batch_size;
        if let Some(limit) = options.limit {
            let remaining = (options.offset + limit).saturating_sub(consumed);
            if remaining == 0 {
                stopped = true;
                break;
            }
            want = want.min(remaining);
        }
        if selector.is_empty() {
            break;
        }

        let batch = substrate
            .list(
                &selector,
                ListOptions {
                    limit: Some(want),
                    reverse: options.reverse,
                },
            )
            .await?;
        let fetched = batch.len();

        for entry in batch {
            let packed = entry.key.pack();
            consumed += 1;
            selector = if options.reverse {
                selector.before(&packed)
            } else {
                selector.after(&packed)
            };
            last = Some(packed);
            if consumed <= options.offset {
                continue;
            }
            if let Some(item) = resolve(entry).await? {
                if accept(&item) {
                    result.push(item);
                    if options.take.is_some_and(|take| result.len() >= take) {
                        stopped = true;
                        break 'scan;
                    }
                }
            }
        }

        if fetched < want {
            break;
        }
    }

    let cursor = if stopped {
        last.as_deref().map(encode_cursor)
    } else {
        None
    };
    Ok(PaginationResult { result, cursor })
}
