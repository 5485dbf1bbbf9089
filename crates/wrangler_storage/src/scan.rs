//! Lazy, paged range scans.

use crate::error::StorageResult;
use crate::range::KeyRange;
use crate::store::{KvPair, KvStore};
use std::collections::VecDeque;
use std::sync::Arc;

/// Default number of pairs fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// A lazy scan over a key range.
///
/// `Scan` fetches one page at a time through [`KvStore::scan_page`], so a
/// large range is never buffered whole. Writes committed between pages are
/// visible to later pages.
///
/// Dropping the iterator cancels the scan: no further pages are requested.
/// [`Scan::restart`] rewinds to the start of the range.
pub struct Scan {
    store: Arc<dyn KvStore>,
    range: KeyRange,
    page_size: usize,
    cursor: Option<Vec<u8>>,
    buffer: VecDeque<KvPair>,
    exhausted: bool,
    pages_fetched: usize,
}

impl Scan {
    /// Creates a scan over `range`.
    ///
    /// A `page_size` of zero is treated as one.
    pub fn new(store: Arc<dyn KvStore>, range: KeyRange, page_size: usize) -> Self {
        let exhausted = range.is_empty();
        Self {
            store,
            range,
            page_size: page_size.max(1),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted,
            pages_fetched: 0,
        }
    }

    /// Returns the scanned range.
    #[must_use]
    pub fn range(&self) -> &KeyRange {
        &self.range
    }

    /// Returns how many pages have been requested from the store so far.
    #[must_use]
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Rewinds the scan to the start of its range.
    pub fn restart(&mut self) {
        self.cursor = None;
        self.buffer.clear();
        self.exhausted = self.range.is_empty();
    }

    fn fill(&mut self) -> StorageResult<()> {
        let page = self
            .store
            .scan_page(&self.range, self.cursor.as_deref(), self.page_size)?;
        self.pages_fetched += 1;

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if let Some((last, _)) = page.last() {
            self.cursor = Some(last.clone());
        }
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for Scan {
    type Item = StorageResult<KvPair>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fill() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

impl std::fmt::Debug for Scan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scan")
            .field("range", &self.range)
            .field("page_size", &self.page_size)
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}
