//! Cursor pagination over the orders connection
//!
//! Walks pages strictly in sequence until the store reports no next page,
//! the optional limit is reached, a page fails or the run is cancelled.
//! Retrying is left to the transport; an early stop keeps whatever was
//! collected.

use crate::cancel::CancelSignal;
use crate::error::{PaginationError, TransportError};
use crate::transport::ShopApi;
use crate::types::{PageCursor, Record};
use std::collections::HashSet;

/// Records collected by one walk
#[derive(Debug, Clone, Default)]
pub struct Fetched {
    /// Records in arrival order
    pub records: Vec<Record>,
    /// Page requests issued
    pub pages_requested: usize,
    /// Why the walk ended early, if it did
    pub interrupted: Option<PaginationError>,
}

impl Fetched {
    /// Whether every page was fetched (or the limit was reached) without error
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none()
    }
}

/// Sequential page walker
#[derive(Debug, Clone)]
pub struct Paginator {
    api: ShopApi,
    page_size: usize,
    cancel: CancelSignal,
}

impl Paginator {
    /// Create paginator
    #[inline]
    #[must_use]
    pub fn new(api: ShopApi, page_size: usize) -> Self {
        Self {
            api,
            page_size: page_size.max(1),
            cancel: CancelSignal::new(),
        }
    }

    /// With a cancellation signal checked before every page
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fetch every record, or the first `limit` of them
    pub async fn fetch_all(&self, limit: Option<usize>) -> Fetched {
        let mut fetched = Fetched::default();
        if limit == Some(0) {
            return fetched;
        }

        let mut cursor: Option<PageCursor> = None;
        let mut seen = HashSet::new();
        loop {
            let page_no = fetched.pages_requested + 1;
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    "Fetching cancelled before page {} | Total: {}",
                    page_no,
                    fetched.records.len()
                );
                fetched.interrupted = Some(PaginationError::Cancelled { page: page_no });
                return fetched;
            }
            fetched.pages_requested = page_no;

            let page = match self.api.orders_page(self.page_size, cursor.as_ref()).await {
                Ok(page) => page,
                Err(TransportError::Cancelled) => {
                    tracing::warn!(
                        "Fetching cancelled during page {} | Total: {}",
                        page_no,
                        fetched.records.len()
                    );
                    fetched.interrupted = Some(PaginationError::Cancelled { page: page_no });
                    return fetched;
                }
                Err(source) => {
                    tracing::error!("Failed to fetch orders: page {}: {}", page_no, source);
                    fetched.interrupted = Some(PaginationError::PageFailed {
                        page: page_no,
                        source,
                    });
                    return fetched;
                }
            };

            let retrieved = page.items.len();
            fetched.records.extend(page.items);

            if let Some(limit) = limit {
                if fetched.records.len() >= limit {
                    fetched.records.truncate(limit);
                    tracing::info!(
                        "Fetched orders: Page {} | Retrieved {} orders | Total: {} | Status: Test limit reached",
                        page_no,
                        retrieved,
                        fetched.records.len()
                    );
                    return fetched;
                }
            }

            if !page.has_next_page {
                tracing::info!(
                    "Fetched orders: Page {} | Retrieved {} orders | Total: {} | Status: Complete",
                    page_no,
                    retrieved,
                    fetched.records.len()
                );
                return fetched;
            }

            match page.end_cursor {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                _ => {
                    tracing::error!(
                        "Failed to fetch orders: page {} reported a next page without an unseen cursor",
                        page_no
                    );
                    fetched.interrupted = Some(PaginationError::StalledCursor { page: page_no });
                    return fetched;
                }
            }

            tracing::info!(
                "Fetched orders: Page {} | Retrieved {} orders | Total so far: {} | Fetching next page...",
                page_no,
                retrieved,
                fetched.records.len()
            );
        }
    }
}
