//! Discussion-board spider.
//!
//! Lists posts from `/item/board.naver?code=…`, keeps posts on or after the
//! cutoff, and reads each post. Newer posts render their body in an iframe
//! pointing at the mobile site, which is a Next.js app; the body is then read
//! from the `__NEXT_DATA__` payload instead of the HTML.
//!
//! # Pagination
//!
//! Rows without a readable date are kept. The next list page is requested
//! while at least one row on the current page was kept, up to `end_page`.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::error::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dates::{now_kst_string, parse_opt_date, to_yymmdd};
use crate::dedupe::SeenSet;
use crate::extract::{
    TextMode, element_text, first_attr, first_element, first_text, html_to_text, root,
    sw_json_values, text_of,
};
use crate::fetch::{FetchAsync, PageRequest};
use crate::links::{query_param, resolve, stable_id};
use crate::models::BoardPostRecord;
use crate::pagination::{CutoffPolicy, ListRow, Paginator};
use crate::scrapers::{fetch_all, fetch_document};
use crate::utils::truncate_for_log;

const REFERER_HOME: &str = "https://finance.naver.com/";
const DISCUSSION_DETAIL_KEY: &str = "/discussion/detail";

const TITLE_SELECTORS: &[&str] = &[
    "#content > div.section.inner_sub > table.view > tbody > tr:nth-child(1) > th:nth-child(1)",
    "#content .section.inner_sub .view strong",
    "#content .section.inner_sub h3",
];
const BODY_SELECTORS: &[&str] = &[
    "#content > div.section.inner_sub > table.view > tbody > tr:nth-child(3) > td",
    "#body",
    "#content .section.inner_sub .view #body",
    "#content .section.inner_sub .view td",
];
const IFRAME_BODY_SELECTORS: &[&str] = &["#body", "body", "td, div"];

/// Options for one run.
#[derive(Debug, Clone)]
pub struct BoardOptions {
    pub codes: Vec<String>,
    pub start_page: u32,
    /// Last list page to fetch; `None` lets the cutoff decide.
    pub end_page: Option<u32>,
    pub cutoff: NaiveDate,
}

pub fn list_url(code: &str, page: u32) -> String {
    format!("https://finance.naver.com/item/board.naver?code={code}&page={page}")
}

pub fn detail_url(code: &str, nid: &str, page: u32) -> String {
    format!("https://finance.naver.com/item/board_read.naver?code={code}&nid={nid}&page={page}")
}

/// A list row: the post id and its listing date.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardRow {
    pub nid: String,
    /// `YY.MM.DD`.
    pub uploaded_at: Option<String>,
}

static LIST_ROWS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("#content > div.section.inner_sub > table.type2 > tbody > tr")
        .expect("Failed to parse board row selector")
});

/// Parse a board list page.
pub fn parse_list(doc: &Html, base: &Url) -> Vec<ListRow<BoardRow>> {
    doc.select(&LIST_ROWS)
        .filter_map(|tr| parse_row(tr, base))
        .collect()
}

fn parse_row(tr: ElementRef<'_>, base: &Url) -> Option<ListRow<BoardRow>> {
    let anchor = first_element(tr, "td.title > a")?;
    let href = anchor.value().attr("href")?;
    if !href.contains("board_read.naver") {
        return None;
    }
    let nid = query_param(base, href, "nid")?;
    let raw_date = text_of(tr, "td:nth-child(1) > span", TextMode::Flatten);
    Some(ListRow::new(
        BoardRow {
            nid,
            uploaded_at: to_yymmdd(raw_date.as_deref()),
        },
        parse_opt_date(raw_date.as_deref()),
    ))
}

/// Result of reading a post page.
#[derive(Debug, PartialEq)]
pub enum DetailOutcome {
    /// The post is complete.
    Done(BoardPostRecord),
    /// The body lives in an iframe; fetch it and finish with
    /// [`parse_iframe`].
    Iframe {
        url: Url,
        title: Option<String>,
    },
}

fn post_record(
    code: &str,
    link: &str,
    title: Option<String>,
    uploaded_at: Option<String>,
    texts: Option<String>,
) -> BoardPostRecord {
    BoardPostRecord {
        id: stable_id(link),
        code: code.to_string(),
        title,
        link: link.to_string(),
        uploaded_at,
        latest_scraped_at: now_kst_string(),
        texts,
    }
}

/// Read a post page.
pub fn parse_detail(doc: &Html, url: &Url, code: &str, row: &BoardRow) -> DetailOutcome {
    let page = root(doc);
    let title = first_text(page, TITLE_SELECTORS, TextMode::Flatten);

    if let Some(texts) = first_text(page, BODY_SELECTORS, TextMode::Flatten) {
        return DetailOutcome::Done(post_record(
            code,
            url.as_str(),
            title,
            row.uploaded_at.clone(),
            Some(texts),
        ));
    }

    let iframe = first_attr(
        page,
        &[
            ("#pc-iframe-content", "src"),
            ("#pc-iframe-content iframe", "src"),
            (".view iframe", "src"),
        ],
    )
    .and_then(|src| resolve(url, &src));

    match iframe {
        Some(iframe_url) => DetailOutcome::Iframe {
            url: iframe_url,
            title,
        },
        None => DetailOutcome::Done(post_record(
            code,
            url.as_str(),
            title,
            row.uploaded_at.clone(),
            None,
        )),
    }
}

/// Extract the post body from a Next.js `__NEXT_DATA__` payload.
///
/// The structured `contentJsonSwReplaced` document wins over `contentHtml`.
/// Errors only when the payload is not JSON.
pub fn next_data_texts(raw: &str) -> Result<Option<String>, serde_json::Error> {
    let data: Value = serde_json::from_str(raw)?;
    let queries = data
        .pointer("/props/pageProps/dehydratedState/queries")
        .and_then(Value::as_array);

    let result = queries.into_iter().flatten().find_map(|q| {
        let key_url = q.pointer("/queryKey/0/url").and_then(Value::as_str);
        (key_url == Some(DISCUSSION_DETAIL_KEY))
            .then(|| q.pointer("/state/data/result"))
            .flatten()
    });
    let Some(result) = result else {
        return Ok(None);
    };

    let structured = result
        .get("contentJsonSwReplaced")
        .and_then(Value::as_str)
        .and_then(sw_json_values);
    let from_html = || {
        result
            .get("contentHtml")
            .and_then(Value::as_str)
            .and_then(html_to_text)
    };
    Ok(structured.or_else(from_html))
}

/// Finish a post from its iframe document.
pub fn parse_iframe(
    doc: &Html,
    code: &str,
    detail_link: &str,
    title: Option<String>,
    row: &BoardRow,
) -> BoardPostRecord {
    let page = root(doc);
    if let Some(script) = first_element(page, "#__NEXT_DATA__") {
        let raw = element_text(&script);
        match next_data_texts(&raw) {
            Ok(texts) => {
                return post_record(code, detail_link, title, row.uploaded_at.clone(), texts);
            }
            Err(e) => {
                debug!(
                    error = %e,
                    payload = %truncate_for_log(&raw, 200),
                    "Unreadable __NEXT_DATA__; falling back to HTML"
                );
            }
        }
    }
    let texts = first_text(page, IFRAME_BODY_SELECTORS, TextMode::Flatten);
    post_record(code, detail_link, title, row.uploaded_at.clone(), texts)
}

/// Crawl the board of every code in `opts`.
#[instrument(level = "info", skip_all, fields(codes = opts.codes.len(), cutoff = %opts.cutoff))]
pub async fn crawl<F: FetchAsync>(
    fetcher: &F,
    opts: &BoardOptions,
    concurrency: usize,
) -> Result<Vec<BoardPostRecord>, Box<dyn Error>> {
    let paginator = Paginator::new(
        Some(opts.cutoff),
        CutoffPolicy::SkipStale { keep_undated: true },
        opts.end_page,
    );
    let mut records = Vec::new();
    for code in &opts.codes {
        let before = records.len();
        crawl_code(fetcher, code, opts.start_page, &paginator, concurrency, &mut records).await?;
        info!(%code, count = records.len() - before, "Finished board");
    }
    info!(count = records.len(), "Collected board posts");
    Ok(records)
}

async fn crawl_code<F: FetchAsync>(
    fetcher: &F,
    code: &str,
    start_page: u32,
    paginator: &Paginator,
    concurrency: usize,
    records: &mut Vec<BoardPostRecord>,
) -> Result<(), Box<dyn Error>> {
    let mut seen_nids = SeenSet::new();
    let mut page = start_page.max(1);

    loop {
        let list = Url::parse(&list_url(code, page))?;
        let req = PageRequest::new(list.clone()).with_referer(REFERER_HOME);
        let doc = match fetch_document(fetcher, &req).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(%code, page, error = %e, "Board list fetch failed; moving to next code");
                return Ok(());
            }
        };
        let rows = parse_list(&doc, &list);
        drop(doc);

        let decision = paginator.evaluate(page, rows, None);
        let mut jobs = Vec::new();
        for row in decision.scheduled {
            if !seen_nids.insert(row.nid.clone()) {
                continue;
            }
            let url = Url::parse(&detail_url(code, &row.nid, page))?;
            jobs.push((PageRequest::new(url).with_referer(list.as_str()), row));
        }
        debug!(%code, page, jobs = jobs.len(), skipped = decision.skipped, "Scheduling posts");

        let mut iframes = Vec::new();
        for fetched in fetch_all(fetcher, jobs, concurrency).await {
            let doc = Html::parse_document(&fetched.body);
            match parse_detail(&doc, &fetched.url, code, &fetched.payload) {
                DetailOutcome::Done(record) => records.push(record),
                DetailOutcome::Iframe { url, title } => {
                    let req = PageRequest::new(url).with_referer(fetched.url.as_str());
                    iframes.push((req, (fetched.url.to_string(), title, fetched.payload)));
                }
            }
        }

        for fetched in fetch_all(fetcher, iframes, concurrency).await {
            let (detail_link, title, row) = fetched.payload;
            let doc = Html::parse_document(&fetched.body);
            records.push(parse_iframe(&doc, code, &detail_link, title, &row));
        }

        if !decision.request_next {
            return Ok(());
        }
        page += 1;
    }
}
