// src/ingest/fetcher.rs
//! Walks every page of a [`ListingsSource`], politely.

use std::time::{Duration, Instant};

use metrics::{counter, histogram};

use crate::error::FetchError;
use crate::ingest::types::{ListingsPage, ListingsSource, RawListing};

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

/// Everything one complete fetch produced.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub listings: Vec<RawListing>,
    pub copyright: String,
    pub pages: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct PaginatedFetcher {
    page_size: usize,
    page_delay: Duration,
}

impl Default for PaginatedFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE, DEFAULT_PAGE_DELAY)
    }
}

impl PaginatedFetcher {
    pub fn new(page_size: usize, page_delay: Duration) -> Self {
        Self {
            page_size: page_size.max(1),
            page_delay,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    async fn page(&self, source: &dyn ListingsSource, offset: usize) -> Result<ListingsPage, FetchError> {
        let t0 = Instant::now();
        let res = source.fetch_page(offset, self.page_size).await;
        histogram!("fetch_page_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("fetch_pages_total").increment(1);

        let page = res?;
        // a missing status is tolerated; an explicit non-OK one is not
        if page.errors.is_empty()
            && !page.status.is_empty()
            && !page.status.eq_ignore_ascii_case("OK")
        {
            return Err(FetchError::Upstream {
                offset,
                errors: vec![format!("status {}", page.status)],
            });
        }
        if !page.errors.is_empty() {
            return Err(FetchError::Upstream {
                offset,
                errors: page.errors,
            });
        }
        tracing::debug!(
            target: "ingest",
            source = source.name(),
            offset,
            got = page.results.len(),
            total = page.num_results,
            "fetched page"
        );
        Ok(page)
    }

    /// Fetch all pages. The first response fixes the total and the
    /// attribution; any failure discards everything gathered so far.
    ///
    /// `num_results` is only trusted as an upper bound: an empty page ends
    /// the walk early.
    pub async fn fetch_all(&self, source: &dyn ListingsSource) -> Result<FetchOutcome, FetchError> {
        let first = self.page(source, 0).await?;
        let total = first.num_results;

        let mut last_len = first.results.len();
        let mut listings = first.results;
        let mut pages = 1usize;

        let mut offset = self.page_size;
        while offset < total && last_len > 0 {
            // rate limit ourselves between requests
            tokio::time::sleep(self.page_delay).await;
            let page = self.page(source, offset).await?;
            last_len = page.results.len();
            listings.extend(page.results);
            pages += 1;
            offset = match offset.checked_add(self.page_size) {
                Some(next) => next,
                None => break,
            };
        }
        if offset < total && last_len == 0 {
            tracing::warn!(
                target: "ingest",
                source = source.name(),
                claimed = total,
                got = listings.len(),
                "upstream ran out of listings before num_results"
            );
        }

        Ok(FetchOutcome {
            listings,
            copyright: first.copyright,
            pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Serves `total` synthetic records; fails at `fail_at` if set.
    struct Pages {
        total: usize,
        fail_at: Option<usize>,
        offsets: Mutex<Vec<usize>>,
    }

    impl Pages {
        fn new(total: usize) -> Self {
            Self {
                total,
                fail_at: None,
                offsets: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ListingsSource for Pages {
        async fn fetch_page(&self, offset: usize, limit: usize) -> Result<ListingsPage, FetchError> {
            self.offsets.lock().unwrap().push(offset);
            if self.fail_at == Some(offset) {
                return Err(FetchError::Status { status: 503, offset });
            }
            let end = (offset + limit).min(self.total);
            let results = (offset..end)
                .map(|i| RawListing {
                    event_id: i as i64,
                    ..Default::default()
                })
                .collect();
            Ok(ListingsPage {
                status: "OK".into(),
                num_results: self.total,
                results,
                copyright: format!("page@{offset}"),
                ..Default::default()
            })
        }
        fn name(&self) -> &'static str {
            "pages"
        }
    }

    fn fetcher() -> PaginatedFetcher {
        PaginatedFetcher::new(100, Duration::ZERO)
    }

    #[tokio::test]
    async fn requests_ceil_total_over_page_size() {
        for (total, want_pages) in [(0usize, 1usize), (1, 1), (100, 1), (101, 2), (250, 3)] {
            let src = Pages::new(total);
            let out = fetcher().fetch_all(&src).await.unwrap();
            assert_eq!(out.pages, want_pages, "total={total}");
            assert_eq!(out.listings.len(), total);
            let expected: Vec<usize> = (0..want_pages).map(|p| p * 100).collect();
            assert_eq!(*src.offsets.lock().unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn copyright_comes_from_first_page_and_order_is_kept() {
        let src = Pages::new(205);
        let out = fetcher().fetch_all(&src).await.unwrap();
        assert_eq!(out.copyright, "page@0");
        let ids: Vec<i64> = out.listings.iter().map(|l| l.event_id).collect();
        assert_eq!(ids, (0..205).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn failure_mid_way_aborts_whole_fetch() {
        let mut src = Pages::new(300);
        src.fail_at = Some(100);
        let err = fetcher().fetch_all(&src).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, offset: 100 }));
        // nothing after the failing page is requested
        assert_eq!(*src.offsets.lock().unwrap(), vec![0, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_pages_but_not_before_first() {
        let src = Pages::new(300);
        let f = PaginatedFetcher::new(100, Duration::from_secs(1));
        let t0 = tokio::time::Instant::now();
        let out = f.fetch_all(&src).await.unwrap();
        assert_eq!(out.pages, 3);
        // two gaps between three requests
        let waited = t0.elapsed();
        assert!(waited >= Duration::from_secs(2), "waited {waited:?}");
        assert!(waited < Duration::from_secs(3), "waited {waited:?}");
    }

    #[tokio::test]
    async fn upstream_error_list_is_a_failure() {
        struct Complains;
        #[async_trait]
        impl ListingsSource for Complains {
            async fn fetch_page(&self, _o: usize, _l: usize) -> Result<ListingsPage, FetchError> {
                Ok(ListingsPage {
                    status: "ERROR".into(),
                    errors: vec!["bad api-key".into()],
                    ..Default::default()
                })
            }
            fn name(&self) -> &'static str {
                "complains"
            }
        }
        let err = fetcher().fetch_all(&Complains).await.unwrap_err();
        assert!(err.to_string().contains("bad api-key"));
    }

    /// Claims `claimed` results but only ever has `real` of them.
    struct Overclaims {
        claimed: usize,
        real: usize,
        status: &'static str,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl ListingsSource for Overclaims {
        async fn fetch_page(&self, offset: usize, limit: usize) -> Result<ListingsPage, FetchError> {
            *self.calls.lock().unwrap() += 1;
            let end = (offset.saturating_add(limit)).min(self.real);
            Ok(ListingsPage {
                status: self.status.into(),
                num_results: self.claimed,
                results: (offset.min(end)..end)
                    .map(|i| RawListing {
                        event_id: i as i64,
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            })
        }
        fn name(&self) -> &'static str {
            "overclaims"
        }
    }

    #[tokio::test]
    async fn absurd_num_results_neither_panics_nor_loops() {
        let src = Arc::new(Overclaims {
            claimed: usize::MAX / 2,
            real: 0,
            status: "OK",
            calls: Mutex::new(0),
        });
        let task_src = src.clone();
        let joined = tokio::spawn(async move { fetcher().fetch_all(task_src.as_ref()).await }).await;
        let out = joined.expect("fetch task must not panic").unwrap();
        assert_eq!(out.pages, 1);
        assert!(out.listings.is_empty());
        assert_eq!(*src.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_page_ends_paging_early() {
        let src = Overclaims {
            claimed: usize::MAX,
            real: 250,
            status: "OK",
            calls: Mutex::new(0),
        };
        let out = fetcher().fetch_all(&src).await.unwrap();
        assert_eq!(out.listings.len(), 250);
        // three data pages plus the empty one that ends it
        assert_eq!(out.pages, 4);
    }

    #[tokio::test]
    async fn non_ok_status_without_errors_is_a_failure() {
        let src = Overclaims {
            claimed: 10,
            real: 10,
            status: "ERROR",
            calls: Mutex::new(0),
        };
        let err = fetcher().fetch_all(&src).await.unwrap_err();
        assert!(matches!(err, FetchError::Upstream { offset: 0, .. }));
        assert!(err.to_string().contains("status ERROR"));

        // a missing status is not an error
        let quiet = Overclaims {
            claimed: 10,
            real: 10,
            status: "",
            calls: Mutex::new(0),
        };
        assert_eq!(fetcher().fetch_all(&quiet).await.unwrap().listings.len(), 10);
    }
}
