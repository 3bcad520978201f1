//! Per-stock news spider.
//!
//! Walks the news tab of every stock (`/item/news_news.naver?code=…`), keeps
//! rows published on or after the cutoff, and follows each row to the desktop
//! article page on `news.naver.com` for the body text.
//!
//! # Pagination
//!
//! Rows older than the cutoff, or without a readable date, are skipped. The
//! next list page is requested only when at least one row on the current page
//! was recent, the optional `max_pages` ceiling has not been reached, and the
//! page's own "last page" link does not say this was the end.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dates::{now_kst_string, parse_opt_date, to_yymmdd};
use crate::dedupe::SeenSet;
use crate::extract::{TextMode, clean, first_attr, first_element, first_text, root, text_of};
use crate::fetch::{FetchAsync, PageRequest};
use crate::links::{ArticleLink, canonicalize};
use crate::models::ItemNewsRecord;
use crate::pagination::{CutoffPolicy, ListRow, Paginator, last_page_link};
use crate::scrapers::{fetch_all, fetch_document};

pub const LIST_BASE: &str = "https://finance.naver.com/item/news_news.naver";
const REFERER_HOME: &str = "https://finance.naver.com/";

/// Body containers on the article page, in priority order.
pub const BODY_SELECTORS: &[&str] = &[
    "#dic_area",
    "#newsct_article",
    "#contents",
    "article",
    "[itemprop='articleBody']",
];

/// Options for one run.
#[derive(Debug, Clone)]
pub struct ItemNewsOptions {
    pub codes: Vec<String>,
    pub cutoff: NaiveDate,
    pub max_pages: Option<u32>,
}

/// List URL for `code`. Page 1 is requested with an empty `page` parameter.
pub fn list_url(code: &str, page: u32) -> String {
    if page <= 1 {
        format!("{LIST_BASE}?code={code}&page=&clusterId=")
    } else {
        format!("{LIST_BASE}?code={code}&page={page}&clusterId=")
    }
}

/// What the list row knows about an article before its page is fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemNewsRow {
    pub article: ArticleLink,
    pub title_hint: Option<String>,
    pub press_hint: Option<String>,
    /// Listing date as `YY.MM.DD`.
    pub published_hint: Option<String>,
}

/// A parsed list page.
#[derive(Debug)]
pub struct ItemNewsListPage {
    pub rows: Vec<ListRow<ItemNewsRow>>,
    /// From the "last page" link only; row links carry their own `page=`.
    pub last_page: Option<u32>,
}

static LIST_ROWS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("table.type5 > tbody > tr").expect("Failed to parse news row selector")
});

/// Parse a stock news list page.
pub fn parse_list(doc: &Html, base: &Url) -> ItemNewsListPage {
    let rows = doc
        .select(&LIST_ROWS)
        .filter_map(|tr| parse_row(tr, base))
        .collect();
    ItemNewsListPage {
        rows,
        last_page: last_page_link(doc, base),
    }
}

fn parse_row(tr: ElementRef<'_>, base: &Url) -> Option<ListRow<ItemNewsRow>> {
    let anchor = first_element(tr, r#"a[href*="news_read.naver"]"#)
        .or_else(|| first_element(tr, r#"a[href*="read.naver"]"#))?;
    let href = anchor.value().attr("href")?;
    let abs = base.join(href).ok()?;

    let date_text = first_text(
        tr,
        &["td.date", "span.date", "td[align='right']", "td:nth-last-child(1)"],
        TextMode::Flatten,
    );
    let date = parse_opt_date(date_text.as_deref());

    let row = ItemNewsRow {
        article: canonicalize(abs.as_str()),
        title_hint: clean(&anchor.text().collect::<String>()),
        press_hint: first_text(tr, &["td.info", "span.press", "td:nth-child(3)"], TextMode::Flatten),
        published_hint: to_yymmdd(date_text.as_deref()),
    };
    Some(ListRow::new(row, date))
}

/// Raw publish timestamp from the article header.
pub fn article_timestamp(page: ElementRef<'_>) -> Option<String> {
    let stamp = first_element(page, ".media_end_head_info_datestamp_time")?;
    let el = stamp.value();
    el.attr("data-date-time")
        .or_else(|| el.attr("data-modify-date-time"))
        .and_then(clean)
        .or_else(|| clean(&stamp.text().collect::<String>()))
}

/// Press name from the article header, trying logo title, meta tags and
/// header text in that order.
pub fn article_press(page: ElementRef<'_>) -> Option<String> {
    first_attr(
        page,
        &[
            (
                "#ct > div.media_end_head.go_trans > div.media_end_head_top._LAZY_LOADING_WRAP > a > img:nth-child(1)",
                "title",
            ),
            ("div.media_end_head_top a img", "title"),
            (r#"meta[property="og:article:author"]"#, "content"),
            (r#"meta[name="twitter:creator"]"#, "content"),
        ],
    )
    .or_else(|| {
        first_text(
            page,
            &[
                ".media_end_head_top_logo",
                ".media_end_linked_more",
                ".media_end_head_top a",
            ],
            TextMode::Flatten,
        )
    })
}

/// Article headline.
pub fn article_title(page: ElementRef<'_>) -> Option<String> {
    first_text(
        page,
        &[
            "#title_area > span",
            "#title_area",
            "h2.media_end_head_headline",
            "h1, h2",
        ],
        TextMode::Flatten,
    )
}

/// Build the record for a fetched article page.
pub fn parse_article(doc: &Html, url: &Url, code: &str, row: &ItemNewsRow) -> ItemNewsRecord {
    let page = root(doc);
    let article = canonicalize(url.as_str());
    let created_at = now_kst_string();

    ItemNewsRecord {
        uuid: article.stable_id(),
        press: article_press(page).or_else(|| row.press_hint.clone()),
        article_id: article.aid.clone().or_else(|| row.article.aid.clone()),
        title: article_title(page).or_else(|| row.title_hint.clone()),
        code: code.to_string(),
        link: article.link,
        texts: first_text(page, BODY_SELECTORS, TextMode::Lines)
            .or_else(|| text_of(page, "body", TextMode::Flatten)),
        article_published_at: to_yymmdd(article_timestamp(page).as_deref())
            .or_else(|| row.published_hint.clone()),
        latest_scraped_at: created_at.clone(),
        created_at,
    }
}

/// Crawl news for every code in `opts`.
#[instrument(level = "info", skip_all, fields(codes = opts.codes.len(), cutoff = %opts.cutoff))]
pub async fn crawl<F: FetchAsync>(
    fetcher: &F,
    opts: &ItemNewsOptions,
    concurrency: usize,
) -> Result<Vec<ItemNewsRecord>, Box<dyn Error>> {
    let paginator = Paginator::new(
        Some(opts.cutoff),
        CutoffPolicy::SkipStale {
            keep_undated: false,
        },
        opts.max_pages,
    );
    let mut seen = SeenSet::new();
    let mut records = Vec::new();

    for code in &opts.codes {
        let before = records.len();
        crawl_code(fetcher, code, &paginator, &mut seen, concurrency, &mut records).await?;
        info!(%code, count = records.len() - before, "Finished stock news");
    }

    info!(count = records.len(), "Collected stock news articles");
    Ok(records)
}

async fn crawl_code<F: FetchAsync>(
    fetcher: &F,
    code: &str,
    paginator: &Paginator,
    seen: &mut SeenSet<String>,
    concurrency: usize,
    records: &mut Vec<ItemNewsRecord>,
) -> Result<(), Box<dyn Error>> {
    let mut page = 1u32;
    loop {
        let list = Url::parse(&list_url(code, page))?;
        let req = PageRequest::new(list.clone()).with_referer(REFERER_HOME);
        let doc = match fetch_document(fetcher, &req).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(%code, page, error = %e, "List page fetch failed; moving to next code");
                return Ok(());
            }
        };
        let parsed = parse_list(&doc, &list);
        drop(doc);

        let decision = paginator.evaluate(page, parsed.rows, parsed.last_page);
        let jobs: Vec<(PageRequest, ItemNewsRow)> = decision
            .scheduled
            .into_iter()
            .filter(|row| seen.insert(row.article.link.clone()))
            .filter_map(|row| {
                let url = Url::parse(&row.article.link).ok()?;
                Some((PageRequest::new(url).with_referer(list.as_str()), row))
            })
            .collect();
        debug!(%code, page, jobs = jobs.len(), skipped = decision.skipped, "Scheduling articles");

        for fetched in fetch_all(fetcher, jobs, concurrency).await {
            let doc = Html::parse_document(&fetched.body);
            records.push(parse_article(&doc, &fetched.url, code, &fetched.payload));
        }

        if !decision.request_next {
            return Ok(());
        }
        page += 1;
    }
}
