//! Research report spider.
//!
//! Starts at the research index, follows every section tab and walks each
//! section's list newest-first until the first report older than the cutoff.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dates::{now_kst_string, parse_date};
use crate::extract::{LINKS, clean, element_text, first_element, root, text_nodes};
use crate::fetch::{FetchAsync, PageRequest};
use crate::links::{page_param, query_param, resolve};
use crate::models::ReportRecord;
use crate::pagination::{CutoffPolicy, ListRow, Paginator};
use crate::scrapers::{fetch_all, fetch_document};

pub const INDEX_URL: &str = "https://finance.naver.com/research/";

const STOCK_ANALYSIS: &str = "종목분석";
const INDUSTRY_ANALYSIS: &str = "산업분석";
const PROGRESS_EVERY: u32 = 10;
const PROGRESS_BAR_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct ReportsOptions {
    pub cutoff: NaiveDate,
    pub max_pages: Option<u32>,
}

/// A tab on the research index, e.g. `종목분석 리포트`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportSection {
    /// First word of the tab label.
    pub name: Option<String>,
    pub url: Url,
}

static SECTION_ITEMS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("ul.nav1 li").expect("Failed to parse section selector"));
static LIST_ROWS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.type_1 tr").expect("Failed to parse report row selector"));

pub fn parse_sections(doc: &Html, base: &Url) -> Vec<ReportSection> {
    doc.select(&SECTION_ITEMS)
        .filter_map(|item| {
            let href = first_element(item, "a")?.value().attr("href")?;
            let url = resolve(base, href)?;
            let name = first_element(item, "a strong span.blind")
                .and_then(|span| clean(&element_text(&span)))
                .and_then(|label| label.split_whitespace().next().map(str::to_string));
            Some(ReportSection { name, url })
        })
        .collect()
}

#[derive(Debug)]
pub struct ReportListPage {
    pub rows: Vec<ListRow<ReportRecord>>,
    /// The page after the highlighted one, if any.
    pub next: Option<Url>,
    /// From the "last page" link.
    pub total_pages: Option<u32>,
}

pub fn parse_list(doc: &Html, base: &Url, report_name: Option<&str>) -> ReportListPage {
    let rows = doc
        .select(&LIST_ROWS)
        .filter(|row| first_element(*row, "td.date").is_some())
        .filter_map(|row| parse_row(row, base, report_name))
        .collect();

    let page = root(doc);
    let next = first_element(page, "td.on")
        .and_then(|on| on.next_siblings().filter_map(ElementRef::wrap).next())
        .and_then(|td| first_element(td, "a"))
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve(base, href));
    let total_pages = first_element(page, "td.pgRR a")
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| page_param(base, href));

    ReportListPage {
        rows,
        next,
        total_pages,
    }
}

fn cells(row: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| el.value().name() == "td")
        .collect()
}

fn cell_text(cells: &[ElementRef<'_>], idx: usize) -> Option<String> {
    cells.get(idx).and_then(|td| clean(&element_text(td)))
}

fn anchor_texts(el: ElementRef<'_>) -> Vec<String> {
    text_nodes(el, "a")
}

fn parse_row(row: ElementRef<'_>, base: &Url, report_name: Option<&str>) -> Option<ListRow<ReportRecord>> {
    let raw_date = first_element(row, "td.date").and_then(|td| clean(&element_text(&td)));
    // Rows with an unreadable date are not reports.
    let date = parse_date(raw_date.as_deref()?)?;
    let tds = cells(row);
    let anchors = anchor_texts(row);

    let mut record = ReportRecord {
        report_name: report_name.map(str::to_string),
        ..ReportRecord::default()
    };
    match report_name {
        Some(STOCK_ANALYSIS) => {
            record.stock_name = anchors.first().cloned();
            record.title = anchors.get(1).cloned();
        }
        Some(INDUSTRY_ANALYSIS) => {
            record.category = cell_text(&tds, 0);
            record.title = tds.get(1).and_then(|td| anchor_texts(*td).into_iter().next());
        }
        _ => record.title = anchors.first().cloned(),
    }

    let link = row
        .select(&LINKS)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| href.contains("_read.naver"))
        .and_then(|href| resolve(base, href));
    record.original_id = link
        .as_ref()
        .and_then(|l| query_param(l, l.as_str(), "nid"));
    record.link = link.map(String::from);
    record.firm_name = cell_text(&tds, 2).or_else(|| cell_text(&tds, 1));
    record.article_published_at = raw_date;

    let now = now_kst_string();
    record.created_at = now.clone();
    record.latest_scraped_at = now;
    Some(ListRow::new(record, Some(date)))
}

/// Report body: the `view_cnt` cell's text nodes joined by spaces.
pub fn parse_detail(doc: &Html) -> Option<String> {
    let page = root(doc);
    let mut parts = text_nodes(page, "td.view_cnt");
    if parts.is_empty() {
        parts = text_nodes(page, r#"div.view_cnt, div[class*="report_view"]"#);
    }
    (!parts.is_empty()).then(|| parts.join(" "))
}

/// Crawl progress across all sections.
#[derive(Debug)]
pub struct Progress {
    started: Instant,
    pub processed: u32,
    pub total: u32,
}

impl Progress {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            processed: 0,
            total: 0,
        }
    }

    /// Count one finished list page. Returns a progress line every
    /// few pages and on the last one.
    pub fn tick(&mut self) -> Option<String> {
        self.processed += 1;
        if self.processed % PROGRESS_EVERY == 0 || self.processed == self.total {
            Some(progress_line(self.processed, self.total, self.started.elapsed()))
        } else {
            None
        }
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

/// `[████----] Page 10/40 | ETA: 1.5m`
pub fn progress_line(processed: u32, total: u32, elapsed: Duration) -> String {
    let filled = if total == 0 {
        0
    } else {
        (PROGRESS_BAR_LEN * processed as usize / total as usize).min(PROGRESS_BAR_LEN)
    };
    let bar = format!(
        "{}{}",
        "█".repeat(filled),
        "-".repeat(PROGRESS_BAR_LEN - filled)
    );
    let per_page = if processed == 0 {
        0.0
    } else {
        elapsed.as_secs_f64() / f64::from(processed)
    };
    let eta_minutes = per_page * f64::from(total.saturating_sub(processed)) / 60.0;
    format!("[{bar}] Page {processed}/{total} | ETA: {eta_minutes:.1}m")
}

/// Crawl every research section.
#[instrument(level = "info", skip_all, fields(cutoff = %opts.cutoff))]
pub async fn crawl<F: FetchAsync>(
    fetcher: &F,
    opts: &ReportsOptions,
    concurrency: usize,
) -> Result<Vec<ReportRecord>, Box<dyn Error>> {
    let index = Url::parse(INDEX_URL)?;
    let doc = fetch_document(fetcher, &PageRequest::new(index.clone())).await?;
    let sections = parse_sections(&doc, &index);
    drop(doc);
    info!(count = sections.len(), "Found research sections");

    let paginator = Paginator::new(Some(opts.cutoff), CutoffPolicy::StopAtFirstStale, opts.max_pages);
    let mut progress = Progress::new();
    let mut records = Vec::new();

    for section in sections {
        let before = records.len();
        crawl_section(fetcher, &section, &paginator, &mut progress, concurrency, &mut records).await;
        info!(
            section = section.name.as_deref().unwrap_or("-"),
            count = records.len() - before,
            "Finished research section"
        );
    }
    info!(count = records.len(), "Collected reports");
    Ok(records)
}

async fn crawl_section<F: FetchAsync>(
    fetcher: &F,
    section: &ReportSection,
    paginator: &Paginator,
    progress: &mut Progress,
    concurrency: usize,
    records: &mut Vec<ReportRecord>,
) {
    let name = section.name.as_deref();
    let mut url = section.url.clone();
    let mut page = 1;

    loop {
        let req = PageRequest::new(url.clone()).with_referer(INDEX_URL);
        let doc = match fetch_document(fetcher, &req).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(section = name.unwrap_or("-"), page, error = %e, "Report list fetch failed");
                return;
            }
        };
        let list = parse_list(&doc, &url, name);
        drop(doc);
        if page == 1 {
            progress.total += list.total_pages.unwrap_or(1);
        }

        let decision = paginator.evaluate(page, list.rows, None);
        let mut jobs = Vec::new();
        for record in decision.scheduled {
            match record.link.as_deref().map(Url::parse) {
                Some(Ok(link)) => {
                    jobs.push((PageRequest::new(link).with_referer(url.as_str()), record))
                }
                _ => records.push(record),
            }
        }
        debug!(page, jobs = jobs.len(), "Scheduling report details");

        for fetched in fetch_all(fetcher, jobs, concurrency).await {
            let mut record = fetched.payload;
            record.texts = parse_detail(&Html::parse_document(&fetched.body));
            records.push(record);
        }

        let next = match list.next {
            Some(next) if decision.request_next => next,
            _ => return,
        };
        if let Some(line) = progress.tick() {
            info!("{line}");
        }
        url = next;
        page += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::format_yymmdd;
    use crate::fetch::testing::StubFetcher;

    const INDEX: &str = r#"<html><body><ul class="nav1">
        <li><a href="/research/company_list.naver"><strong><span class="blind">종목분석 리포트</span></strong></a></li>
        <li><a href="/research/industry_list.naver"><strong><span class="blind">산업분석 리포트</span></strong></a></li>
        <li><a href="/research/market_info_list.naver"><strong><span class="blind">시황정보 리포트</span></strong></a></li>
    </ul></body></html>"#;

    fn company_list(rows: &[(&str, &str)], next: Option<&str>) -> String {
        let mut html = String::from(r#"<html><body><table class="type_1"><tr><th>종목명</th></tr>"#);
        for (nid, date) in rows {
            html.push_str(&format!(
                r#"<tr>
                    <td><a href="/item/main.naver?code=005930">삼성전자</a></td>
                    <td><a href="company_read.naver?nid={nid}&page=1">실적 개선 지속</a></td>
                    <td>미래에셋증권</td>
                    <td class="file"><a href="https://stock.pstatic.net/x.pdf"><img></a></td>
                    <td class="date">{date}</td>
                </tr>"#
            ));
        }
        html.push_str("</table><table class=\"Nnavi\"><tr><td class=\"on\"><a href=\"?page=1\">1</a></td>");
        if let Some(next) = next {
            html.push_str(&format!(r#"<td><a href="{next}">2</a></td>"#));
        }
        html.push_str("</tr></table></body></html>");
        html
    }

    #[test]
    fn test_parse_sections() {
        let base = Url::parse(INDEX_URL).unwrap();
        let sections = parse_sections(&Html::parse_document(INDEX), &base);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].name.as_deref(), Some("종목분석"));
        assert_eq!(
            sections[1].url.as_str(),
            "https://finance.naver.com/research/industry_list.naver"
        );
    }

    #[test]
    fn test_company_row_layout() {
        let base = Url::parse("https://finance.naver.com/research/company_list.naver").unwrap();
        let html = company_list(&[("9001", "25.10.24"), ("9000", "날짜없음")], Some("?page=2"));
        let list = parse_list(&Html::parse_document(&html), &base, Some(STOCK_ANALYSIS));
        assert_eq!(list.rows.len(), 1);
        let r = &list.rows[0].item;
        assert_eq!(r.stock_name.as_deref(), Some("삼성전자"));
        assert_eq!(r.title.as_deref(), Some("실적 개선 지속"));
        assert_eq!(r.firm_name.as_deref(), Some("미래에셋증권"));
        assert_eq!(r.original_id.as_deref(), Some("9001"));
        assert_eq!(
            r.link.as_deref(),
            Some("https://finance.naver.com/research/company_read.naver?nid=9001&page=1")
        );
        assert_eq!(r.article_published_at.as_deref(), Some("25.10.24"));
        assert_eq!(list.rows[0].date, NaiveDate::from_ymd_opt(2025, 10, 24));
        assert_eq!(
            list.next.as_ref().map(Url::as_str),
            Some("https://finance.naver.com/research/company_list.naver?page=2")
        );
    }

    #[test]
    fn test_industry_and_generic_row_layouts() {
        let base = Url::parse("https://finance.naver.com/research/industry_list.naver").unwrap();
        let html = r#"<table class="type_1"><tr>
            <td> 반도체 </td>
            <td><a href="industry_read.naver?nid=77&page=1">메모리 업사이클</a></td>
            <td>  </td>
            <td class="date">25.10.23</td>
        </tr></table>"#;
        let doc = Html::parse_document(html);
        let industry = parse_list(&doc, &base, Some(INDUSTRY_ANALYSIS));
        let r = &industry.rows[0].item;
        assert_eq!(r.category.as_deref(), Some("반도체"));
        assert_eq!(r.title.as_deref(), Some("메모리 업사이클"));
        assert_eq!(r.stock_name, None);
        // third cell is blank, so the firm falls back to the second cell
        assert_eq!(r.firm_name.as_deref(), Some("메모리 업사이클"));

        let generic = parse_list(&doc, &base, Some("시황정보"));
        assert_eq!(generic.rows[0].item.title.as_deref(), Some("메모리 업사이클"));
        assert_eq!(generic.rows[0].item.category, None);
        assert!(generic.next.is_none());
    }

    #[test]
    fn test_parse_detail() {
        let doc = Html::parse_document(
            r#"<table><tr><td class="view_cnt"><p> 목표주가 상향 </p><p>투자의견 매수</p></td></tr></table>"#,
        );
        assert_eq!(parse_detail(&doc).as_deref(), Some("목표주가 상향 투자의견 매수"));
        let fallback = Html::parse_document(r#"<div class="report_view_wrap">요약</div>"#);
        assert_eq!(parse_detail(&fallback).as_deref(), Some("요약"));
        assert_eq!(parse_detail(&Html::parse_document("<p></p>")), None);
    }

    #[test]
    fn test_progress_line() {
        let line = progress_line(10, 40, Duration::from_secs(60));
        assert_eq!(line, "[█████---------------] Page 10/40 | ETA: 3.0m");
        assert_eq!(progress_line(0, 0, Duration::ZERO), "[--------------------] Page 0/0 | ETA: 0.0m");
    }

    #[tokio::test]
    async fn test_crawl_stops_at_first_stale_report() {
        let today = crate::dates::today_kst();
        let fresh = format_yymmdd(today);
        let stale = format_yymmdd(today - chrono::Duration::days(30));
        let index = r#"<ul class="nav1"><li><a href="/research/company_list.naver"><strong><span class="blind">종목분석 리포트</span></strong></a></li></ul>"#;

        let fetcher = StubFetcher::new()
            .page(INDEX_URL, index)
            .page(
                "https://finance.naver.com/research/company_list.naver",
                &company_list(&[("3", &fresh)], Some("?page=2")),
            )
            .page(
                "https://finance.naver.com/research/company_list.naver?page=2",
                &company_list(&[("2", &fresh), ("1", &stale)], Some("?page=3")),
            )
            .page(
                "https://finance.naver.com/research/company_read.naver?nid=3&page=1",
                r#"<td class="view_cnt">셋</td>"#,
            )
            .page(
                "https://finance.naver.com/research/company_read.naver?nid=2&page=1",
                r#"<td class="view_cnt">둘</td>"#,
            );
        let opts = ReportsOptions {
            cutoff: today - chrono::Duration::days(3),
            max_pages: None,
        };
        let records = crawl(&fetcher, &opts, 2).await.unwrap();
        let ids: Vec<_> = records.iter().filter_map(|r| r.original_id.as_deref()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(records[1].texts.as_deref(), Some("둘"));
        assert!(
            !fetcher
                .requested()
                .iter()
                .any(|u| u.ends_with("company_list.naver?page=3"))
        );
    }
}
