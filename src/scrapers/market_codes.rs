//! Stock-code collector for the market-capitalisation listing.
//!
//! Walks every page of `sise_market_sum.naver` for one market and returns the
//! sorted set of six-digit codes. The codes file it writes is the input of the
//! per-code spiders.

use clap::ValueEnum;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};
use url::Url;

use crate::codes::{is_stock_code, write_codes};
use crate::fetch::{FetchAsync, PageRequest};
use crate::links::query_param;
use crate::pagination::{CutoffPolicy, ListRow, Paginator, detect_last_page};
use crate::scrapers::fetch_document;

static CODE_LINKS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("#contentarea > div.box_type_l > table.type_2 > tbody > tr > td:nth-child(2) > a")
        .expect("Failed to parse market code link selector")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Market {
    Kospi,
    Kosdaq,
}

impl Market {
    /// The `sosok` query value.
    pub fn sosok(self) -> u8 {
        match self {
            Market::Kospi => 0,
            Market::Kosdaq => 1,
        }
    }

    pub fn default_output(self) -> PathBuf {
        match self {
            Market::Kospi => PathBuf::from("codes_kospi.txt"),
            Market::Kosdaq => PathBuf::from("codes_kosdaq.txt"),
        }
    }
}

pub fn list_url(market: Market, page: u32) -> String {
    format!(
        "https://finance.naver.com/sise/sise_market_sum.naver?sosok={}&page={page}",
        market.sosok()
    )
}

/// Codes linked from the name column of a listing page.
pub fn parse_codes_page(doc: &Html, base: &Url) -> Vec<String> {
    doc.select(&CODE_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| query_param(base, href, "code"))
        .filter(|code| is_stock_code(code))
        .collect()
}

/// Collect every code listed for `market`.
///
/// Pages are walked until the listing's last page or `max_pages`. A page with
/// no usable codes does not end the walk.
#[instrument(level = "info", skip_all, fields(market = ?market))]
pub async fn crawl<F: FetchAsync>(
    fetcher: &F,
    market: Market,
    max_pages: Option<u32>,
) -> Result<BTreeSet<String>, Box<dyn Error>> {
    let paginator = Paginator::new(None, CutoffPolicy::Unbounded, max_pages);
    let mut codes = BTreeSet::new();
    let mut page = 1;

    loop {
        let url = Url::parse(&list_url(market, page))?;
        let req = PageRequest::new(url.clone()).with_referer("https://finance.naver.com/");
        let doc = fetch_document(fetcher, &req).await?;
        let found = parse_codes_page(&doc, &url);
        let last_page = detect_last_page(&doc, &url).unwrap_or(1);
        drop(doc);

        debug!(page, last_page, found = found.len(), "Parsed market listing");
        let request_next = if found.is_empty() {
            paginator.within_ceilings(page, Some(last_page))
        } else {
            let rows = found.into_iter().map(|c| ListRow::new(c, None)).collect();
            let decision = paginator.evaluate(page, rows, Some(last_page));
            codes.extend(decision.scheduled);
            decision.request_next
        };

        if !request_next {
            break;
        }
        page += 1;
    }

    info!(count = codes.len(), pages = page, "Collected market codes");
    Ok(codes)
}

/// Crawl `market` and write its codes to `out`.
pub async fn collect_to_file<F: FetchAsync>(
    fetcher: &F,
    market: Market,
    max_pages: Option<u32>,
    out: &Path,
) -> Result<usize, Box<dyn Error>> {
    let codes = crawl(fetcher, market, max_pages).await?;
    let count = codes.len();
    write_codes(out, codes).await?;
    info!(count, path = %out.display(), "Saved market codes");
    Ok(count)
}
