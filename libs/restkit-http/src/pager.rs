//! Offset/limit pagination as a `Stream` of items
//!
//! [`OffsetPager`] turns a page-fetching closure into a lazy stream of items,
//! hiding offset bookkeeping from the caller. [`crate::RequestExecutor::paginate`]
//! wires it to an HTTP list endpoint.
//!
//! ```rust,ignore
//! use futures_util::StreamExt;
//!
//! let mut users = client.paginate::<User>(RequestDescriptor::get("/users"), 50);
//! while let Some(user) = users.next().await {
//!     let user = user?;
//!     println!("{}", user.name);
//! }
//! ```

use crate::error::ApiError;
use futures_core::Stream;
use pin_project_lite::pin_project;
use serde::Deserialize;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// One page of a list endpoint: `{"items": [...], "offset": 0, "limit": 10, "total": 25}`
///
/// `total` may be omitted by the server; traversal then ends on the first
/// empty page or at the page bound.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T = serde_json::Value> {
    #[serde(default)]
    pub items: Vec<T>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub total: Option<u64>,
}

/// Window requested from the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

pin_project! {
    /// Lazy item stream over an offset/limit paginated source
    ///
    /// A page is fetched only when the consumer polls past the buffered
    /// items, and at most one fetch is in flight. The stream ends when the
    /// server reports no more items, on an empty page, or on the first
    /// fetch error (yielded once).
    pub struct OffsetPager<T, F, Fut>
    where
        F: FnMut(PageRequest) -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiError>>,
    {
        page_size: u64,
        max_pages: usize,
        pages_fetched: usize,
        next_offset: u64,
        buffer: VecDeque<T>,
        done: bool,
        fetcher: F,
        #[pin]
        current_fetch: Option<Fut>,
    }
}

impl<T, F, Fut> OffsetPager<T, F, Fut>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    /// Create a pager starting at offset 0
    ///
    /// A `page_size` of 0 is treated as 1.
    #[must_use]
    pub fn new(page_size: u64, max_pages: usize, fetcher: F) -> Self {
        Self {
            page_size: page_size.max(1),
            max_pages,
            pages_fetched: 0,
            next_offset: 0,
            buffer: VecDeque::new(),
            done: false,
            fetcher,
            current_fetch: None,
        }
    }
}

impl<T, F, Fut> Stream for OffsetPager<T, F, Fut>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    type Item = Result<T, ApiError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(item) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok(item)));
            }

            if *this.done {
                return Poll::Ready(None);
            }

            if let Some(fut) = this.current_fetch.as_mut().as_pin_mut() {
                match fut.poll(cx) {
                    Poll::Ready(Ok(page)) => {
                        this.current_fetch.set(None);
                        *this.pages_fetched += 1;

                        let requested = *this.next_offset;
                        let returned = u64::try_from(page.items.len()).unwrap_or(u64::MAX);
                        if returned > *this.page_size {
                            tracing::warn!(
                                offset = requested,
                                page_size = *this.page_size,
                                returned,
                                "Server returned more items than requested"
                            );
                        }

                        let exhausted = returned == 0
                            || page
                                .total
                                .is_some_and(|total| requested.saturating_add(returned) >= total);
                        if exhausted {
                            *this.done = true;
                        } else {
                            *this.next_offset = requested.saturating_add(*this.page_size);
                        }

                        this.buffer.extend(page.items);
                    }
                    Poll::Ready(Err(e)) => {
                        this.current_fetch.set(None);
                        *this.done = true;
                        return Poll::Ready(Some(Err(e)));
                    }
                    Poll::Pending => return Poll::Pending,
                }
                continue;
            }

            if *this.pages_fetched >= *this.max_pages {
                *this.done = true;
                tracing::warn!(
                    max_pages = *this.max_pages,
                    next_offset = *this.next_offset,
                    "Pagination stopped at page bound; server metadata may be inconsistent"
                );
                return Poll::Ready(Some(Err(ApiError::Pagination(format!(
                    "stopped after {} pages at offset {}",
                    this.max_pages, this.next_offset
                )))));
            }

            let request = PageRequest {
                offset: *this.next_offset,
                limit: *this.page_size,
            };
            this.current_fetch.set(Some((this.fetcher)(request)));
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::{Arc, Mutex};

    /// Serves `0..total` in windows and records every request
    #[derive(Clone)]
    struct FakeFetcher {
        total: u64,
        report_total: Option<u64>,
        fail_at_offset: Option<u64>,
        requests: Arc<Mutex<Vec<PageRequest>>>,
    }

    impl FakeFetcher {
        fn new(total: u64) -> Self {
            Self {
                total,
                report_total: Some(total),
                fail_at_offset: None,
                requests: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn fetch(&self, request: PageRequest) -> std::future::Ready<Result<Page<u64>, ApiError>> {
            self.requests.lock().unwrap().push(request);
            if self.fail_at_offset == Some(request.offset) {
                return std::future::ready(Err(ApiError::Pagination("boom".to_owned())));
            }
            let end = (request.offset + request.limit).min(self.total);
            let items = (request.offset..end).collect();
            std::future::ready(Ok(Page {
                items,
                offset: request.offset,
                limit: request.limit,
                total: self.report_total,
            }))
        }

        fn offsets(&self) -> Vec<u64> {
            self.requests.lock().unwrap().iter().map(|r| r.offset).collect()
        }

        fn pager(
            &self,
            page_size: u64,
            max_pages: usize,
        ) -> impl Stream<Item = Result<u64, ApiError>> + Unpin {
            let fetcher = self.clone();
            Box::pin(OffsetPager::new(page_size, max_pages, move |request| {
                fetcher.fetch(request)
            }))
        }
    }

    #[tokio::test]
    async fn test_empty_collection_yields_nothing() {
        let fetcher = FakeFetcher::new(0);
        let items: Vec<_> = fetcher.pager(10, 100).collect().await;

        assert!(items.is_empty());
        assert_eq!(fetcher.offsets(), vec![0]);
    }

    #[tokio::test]
    async fn test_walks_pages_in_order() {
        let fetcher = FakeFetcher::new(25);
        let items: Vec<u64> = fetcher.pager(10, 100).map(Result::unwrap).collect().await;

        assert_eq!(items, (0..25).collect::<Vec<_>>());
        assert_eq!(fetcher.offsets(), vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_exact_multiple_stops_without_extra_fetch() {
        let fetcher = FakeFetcher::new(20);
        let items: Vec<_> = fetcher.pager(10, 100).collect().await;

        assert_eq!(items.len(), 20);
        assert_eq!(fetcher.offsets(), vec![0, 10]);
    }

    #[tokio::test]
    async fn test_empty_page_ends_stream_when_total_lies() {
        let mut fetcher = FakeFetcher::new(15);
        fetcher.report_total = Some(1_000);
        let items: Vec<_> = fetcher.pager(10, 100).collect().await;

        assert_eq!(items.len(), 15);
        assert_eq!(fetcher.offsets(), vec![0, 10, 20]);
    }

    #[tokio::test]
    async fn test_missing_total_relies_on_empty_page() {
        let mut fetcher = FakeFetcher::new(12);
        fetcher.report_total = None;
        let items: Vec<_> = fetcher.pager(5, 100).collect().await;

        assert_eq!(items.len(), 12);
        assert_eq!(fetcher.offsets(), vec![0, 5, 10, 15]);
    }

    #[tokio::test]
    async fn test_max_pages_bound() {
        let fetcher = FakeFetcher::new(100);
        let results: Vec<_> = fetcher.pager(10, 2).collect().await;

        assert_eq!(results.len(), 21);
        assert!(results[..20].iter().all(Result::is_ok));
        assert!(matches!(results[20], Err(ApiError::Pagination(_))));
        assert_eq!(fetcher.offsets(), vec![0, 10]);
    }

    #[tokio::test]
    async fn test_fetch_error_is_yielded_once() {
        let mut fetcher = FakeFetcher::new(30);
        fetcher.fail_at_offset = Some(10);
        let results: Vec<_> = fetcher.pager(10, 100).collect().await;

        assert_eq!(results.len(), 11);
        assert!(results[10].is_err());
        assert_eq!(fetcher.offsets(), vec![0, 10]);
    }

    #[tokio::test]
    async fn test_fetches_lazily() {
        let fetcher = FakeFetcher::new(30);
        let mut pager = fetcher.pager(10, 100);

        assert_eq!(pager.next().await.unwrap().unwrap(), 0);
        assert_eq!(fetcher.offsets(), vec![0]);

        for expected in 1..10 {
            assert_eq!(pager.next().await.unwrap().unwrap(), expected);
        }
        assert_eq!(fetcher.offsets(), vec![0]);

        assert_eq!(pager.next().await.unwrap().unwrap(), 10);
        assert_eq!(fetcher.offsets(), vec![0, 10]);
    }

    #[tokio::test]
    async fn test_zero_page_size_is_clamped() {
        let fetcher = FakeFetcher::new(3);
        let items: Vec<_> = fetcher.pager(0, 100).collect().await;

        assert_eq!(items.len(), 3);
        assert_eq!(fetcher.offsets(), vec![0, 1, 2]);
    }

    #[test]
    fn test_page_deserializes_with_defaults() {
        #[derive(Debug, Deserialize)]
        struct Record {
            id: u32,
        }

        let page: Page = serde_json::from_str(r#"{"items": [{"id": 1}], "total": 1}"#).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.offset, 0);
        assert_eq!(page.total, Some(1));

        let page: Page<Record> =
            serde_json::from_str(r#"{"items": [{"id": 3}, {"id": 4}], "total": 2}"#).unwrap();
        assert_eq!(page.items[1].id, 4);

        let page: Page<u32> = serde_json::from_str("{}").unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, None);
    }
}
