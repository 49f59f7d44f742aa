//! Full-collection retrieval over page-based list endpoints
//!
//! The loop is resource-agnostic: it only knows how to ask for page `n` of
//! size `k` and how to decide whether another page exists.
//!
//! Continuation, in priority order:
//! 1. `meta.current_page` / `meta.last_page` present: continue while
//!    `current_page < last_page`, next page is `current_page + 1`
//! 2. otherwise stop once a page comes back shorter than the page size
//!
//! An empty page always stops.

use std::future::Future;

use tracing::debug;

use crate::api::models::PageMeta;
use crate::error::Result;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Where to start and how many records to ask for per page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub start_page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            start_page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn with_page_size(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            ..Default::default()
        }
    }
}

/// One page of records
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: Option<PageMeta>,
    /// Records the server sent, including any dropped while decoding
    pub received: usize,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>) -> Self {
        let received = data.len();
        Self { data, meta: None, received }
    }

    pub fn with_meta(data: Vec<T>, current_page: u32, last_page: u32) -> Self {
        Self {
            meta: Some(PageMeta {
                current_page: Some(current_page),
                last_page: Some(last_page),
                ..Default::default()
            }),
            ..Self::new(data)
        }
    }

    /// Count records that were sent but could not be decoded
    pub fn with_dropped(mut self, dropped: usize) -> Self {
        self.received = self.data.len() + dropped;
        self
    }
}

/// Next page to request, or `None` when the collection is exhausted
fn next_page(meta: Option<&PageMeta>, page: u32, received: usize, page_size: u32) -> Option<u32> {
    if received == 0 {
        return None;
    }

    // Zero is treated like an absent value, as the API sends 0 on empty collections
    let bounds = meta.and_then(|m| match (m.current_page, m.last_page) {
        (Some(current), Some(last)) if current > 0 && last > 0 => Some((current, last)),
        _ => None,
    });

    match bounds {
        Some((current, last)) => (current < last).then_some(current + 1),
        None if received < page_size as usize => None,
        None => Some(page + 1),
    }
}

/// Fetch every page and concatenate the records.
///
/// `fetch_page(page, page_size)` performs one request. Its errors are
/// returned unchanged; nothing is retried here.
pub async fn paginate<T, F, Fut>(request: PageRequest, mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(u32, u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let page_size = request.page_size.max(1);
    let mut page = request.start_page.max(1);
    let mut all = Vec::new();

    loop {
        let Page { data, meta, received } = fetch_page(page, page_size).await?;
        let received = received.max(data.len());
        all.extend(data);

        debug!(page, received, total = all.len(), "Fetched page");

        match next_page(meta.as_ref(), page, received, page_size) {
            Some(next) => page = next,
            None => break,
        }
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_short_page_terminates() {
        let sizes = [100usize, 100, 37];
        let calls = Arc::new(AtomicU32::new(0));

        let records = paginate(PageRequest::default(), |page, size| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                assert_eq!(size, 100);
                let n = sizes[(page - 1) as usize];
                Ok(Page::new(vec![page; n]))
            }
        })
        .await
        .unwrap();

        assert_eq!(records.len(), 237);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_meta_drives_iteration() {
        let calls = Arc::new(AtomicU32::new(0));

        // Short pages would stop a size-based loop early; meta wins
        let records = paginate(PageRequest::default(), |page, _| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Page::with_meta(vec![page; 5], page, 3))
            }
        })
        .await
        .unwrap();

        assert_eq!(records.len(), 15);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(records.last(), Some(&3));
    }

    #[tokio::test]
    async fn test_empty_page_stops_despite_meta() {
        let calls = Arc::new(AtomicU32::new(0));

        let records: Vec<u32> = paginate(PageRequest::default(), |page, _| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Page::with_meta(Vec::new(), page, 10))
            }
        })
        .await
        .unwrap();

        assert!(records.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_full_pages_keep_paging_until_empty() {
        let records = paginate(PageRequest::with_page_size(2), |page, size| async move {
            let data = if page <= 2 { vec![page; size as usize] } else { Vec::new() };
            Ok(Page::new(data))
        })
        .await
        .unwrap();

        assert_eq!(records, vec![1, 1, 2, 2]);
    }

    #[tokio::test]
    async fn test_dropped_records_do_not_shorten_page() {
        let records = paginate(PageRequest::with_page_size(3), |page, _| async move {
            match page {
                // One of three records failed to decode
                1 => Ok(Page::new(vec![1, 1]).with_dropped(1)),
                2 => Ok(Page::new(vec![2])),
                _ => panic!("page {} should not be requested", page),
            }
        })
        .await
        .unwrap();

        assert_eq!(records, vec![1, 1, 2]);
    }

    #[tokio::test]
    async fn test_start_page_is_honoured() {
        let first = Arc::new(AtomicU32::new(0));

        let _ = paginate(
            PageRequest {
                start_page: 4,
                page_size: 10,
            },
            |page, _| {
                let first = Arc::clone(&first);
                async move {
                    let _ = first.compare_exchange(0, page, Ordering::SeqCst, Ordering::SeqCst);
                    Ok(Page::new(vec![(); 1]))
                }
            },
        )
        .await
        .unwrap();

        assert_eq!(first.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_error_is_propagated() {
        let result: Result<Vec<u32>> = paginate(PageRequest::default(), |page, _| async move {
            if page == 2 {
                Err(SyncError::Transport("connection reset".to_string()))
            } else {
                Ok(Page::new(vec![page; 100]))
            }
        })
        .await;

        assert!(matches!(result, Err(SyncError::Transport(_))));
    }
}
