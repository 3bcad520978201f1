//! Spiders for the Naver Finance and Naver News portals.
//!
//! Each spider follows the same shape:
//!
//! 1. **List parsing**: a pure function turns a list page into rows
//!    (link + raw date + hints) and pagination metadata
//! 2. **Pagination**: [`crate::pagination::Paginator`] picks rows and decides
//!    whether to fetch the next page
//! 3. **Detail parsing**: a pure function turns a detail page into a record
//!
//! The async `crawl` entry point of each module glues these together over a
//! [`FetchAsync`].
//!
//! # Spiders
//!
//! | Spider | Module | Input | Cutoff policy |
//! |--------|--------|-------|---------------|
//! | Stock news | [`item_news`] | stock codes | skip stale rows, drop undated |
//! | Section news | [`section_news`] | section ids | date archive walk / per-article cutoff |
//! | Discussion board | [`board`] | stock codes | skip stale rows, keep undated |
//! | Research reports | [`reports`] | research index | stop at first stale row |
//! | Market codes | [`market_codes`] | market (KOSPI/KOSDAQ) | none, last page |

use futures::stream::{self, StreamExt};
use scraper::Html;
use std::error::Error;
use tracing::{error, instrument};
use url::Url;

use crate::fetch::{FetchAsync, PageRequest};

pub mod board;
pub mod item_news;
pub mod market_codes;
pub mod reports;
pub mod section_news;

/// Fetch and parse one page.
#[instrument(level = "debug", skip_all, fields(url = %req.url))]
pub async fn fetch_document<F: FetchAsync>(
    fetcher: &F,
    req: &PageRequest,
) -> Result<Html, Box<dyn Error>> {
    let body = fetcher.fetch(req).await?;
    Ok(Html::parse_document(&body))
}

/// A fetched detail page together with the payload it was scheduled with.
#[derive(Debug)]
pub struct Fetched<T> {
    pub url: Url,
    pub payload: T,
    pub body: String,
}

/// Fetch `jobs` with up to `concurrency` requests in flight, keeping input
/// order. Failed fetches are logged and dropped.
pub async fn fetch_all<F, T>(
    fetcher: &F,
    jobs: Vec<(PageRequest, T)>,
    concurrency: usize,
) -> Vec<Fetched<T>>
where
    F: FetchAsync,
{
    stream::iter(jobs)
        .map(|(req, payload)| async move {
            match fetcher.fetch(&req).await {
                Ok(body) => Some(Fetched {
                    url: req.url,
                    payload,
                    body,
                }),
                Err(e) => {
                    error!(url = %req.url, error = %e, "Detail fetch failed; skipping");
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .filter_map(std::future::ready)
        .collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::StubFetcher;

    #[tokio::test]
    async fn test_fetch_all_keeps_order_and_skips_failures() {
        let fetcher = StubFetcher::new()
            .page("https://finance.naver.com/a", "A")
            .page("https://finance.naver.com/c", "C");
        let jobs = ["a", "b", "c"]
            .iter()
            .map(|p| {
                let url = Url::parse(&format!("https://finance.naver.com/{p}")).unwrap();
                (PageRequest::new(url), p.to_string())
            })
            .collect();
        let fetched = fetch_all(&fetcher, jobs, 2).await;
        let got: Vec<(String, String)> = fetched
            .into_iter()
            .map(|f| (f.payload, f.body))
            .collect();
        assert_eq!(
            got,
            vec![("a".to_string(), "A".to_string()), ("c".to_string(), "C".to_string())]
        );
    }
}
