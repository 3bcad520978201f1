//! Section news spider (politics, economy, society, world, ...).
//!
//! Two discovery modes:
//!
//! - **Archive** (default): walks the per-day archive listing of each section
//!   from today back to the cutoff date. Each day is paged until a page adds no
//!   new links or `max_pages` is reached.
//! - **Section**: reads the live section front page, its headline block and
//!   its latest-articles block, following the "more" links. This cannot reach
//!   far into the past, so per-section caps bound it.
//!
//! In both modes the cutoff is enforced on the article page itself: articles
//! without a readable publish time, or published before the cutoff, are
//! dropped.

use chrono::{Duration, NaiveDate};
use clap::ValueEnum;
use scraper::Html;
use std::collections::{HashMap, VecDeque};
use std::error::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::dates::{format_yymmdd, now_kst_string, parse_opt_date, today_kst};
use crate::dedupe::SeenSet;
use crate::extract::{TextMode, first_text, root, selector};
use crate::fetch::{FetchAsync, PageRequest};
use crate::links::{canonicalize, resolve};
use crate::models::{ListType, SectionNewsRecord};
use crate::pagination::{CutoffPolicy, ListRow, Paginator};
use crate::scrapers::item_news::{article_press, article_timestamp, article_title};
use crate::scrapers::{fetch_all, fetch_document};

const REFERER_HOME: &str = "https://news.naver.com/";

const ARCHIVE_LINKS: &str = ".list_body .type06_headline li dt a, \
     .list_body .type06 li dt a, \
     #main_content .list_body li dt a";
const HEADLINE_LINKS: &str = r#"ul[id^="_SECTION_HEADLINE_LIST_"] li .sa_text > a"#;
const HEADLINE_MORE: &str = "#newsct div.as_section_headline._PERSIST_CONTENT \
     div.section_more._SECTION_HEADLINE_MORE_BUTTON_WRAP > a";
const LATEST_LINKS: &str = "#newsct > div.section_latest \
     div.section_latest_article._CONTENT_LIST._PERSIST_META .sa_text > a";
const LATEST_MORE: &str = "#newsct > div.section_latest > div > div.section_more > a";

const BODY_SELECTORS: &[&str] = &["#dic_area", "#newsct_article", "#contents", "article"];

/// How article links are discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NewsMode {
    Archive,
    Section,
}

/// Options for one run.
#[derive(Debug, Clone)]
pub struct SectionNewsOptions {
    pub sections: Vec<String>,
    pub mode: NewsMode,
    pub cutoff: NaiveDate,
    /// Ceiling on list pages per archive day, or on "more" hops per section.
    pub max_pages: Option<u32>,
    pub max_headlines: usize,
    pub max_latest: usize,
}

/// Archive listing URL for one section and day.
pub fn archive_url(section: &str, day: NaiveDate, page: u32) -> String {
    format!(
        "https://news.naver.com/main/list.naver?mode=LSD&mid=sec&sid1={section}&date={}&page={page}",
        day.format("%Y%m%d")
    )
}

/// Section front page URL.
pub fn section_url(section: &str) -> String {
    format!("https://news.naver.com/section/{section}")
}

fn links_matching(doc: &Html, base: &Url, css: &str) -> Vec<Url> {
    let Some(sel) = selector(css) else {
        return Vec::new();
    };
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve(base, href))
        .collect()
}

fn first_link(doc: &Html, base: &Url, css: &str) -> Option<Url> {
    links_matching(doc, base, css).into_iter().next()
}

/// Article links on an archive listing page, in page order.
pub fn parse_archive_links(doc: &Html, base: &Url) -> Vec<Url> {
    links_matching(doc, base, ARCHIVE_LINKS)
}

/// Links found on a section front page.
#[derive(Debug, Default, PartialEq)]
pub struct SectionPage {
    pub headlines: Vec<Url>,
    pub latest: Vec<Url>,
    pub more_headline: Option<Url>,
    pub more_latest: Option<Url>,
}

pub fn parse_section_page(doc: &Html, base: &Url) -> SectionPage {
    SectionPage {
        headlines: links_matching(doc, base, HEADLINE_LINKS),
        latest: links_matching(doc, base, LATEST_LINKS),
        more_headline: first_link(doc, base, HEADLINE_MORE),
        more_latest: first_link(doc, base, LATEST_MORE),
    }
}

/// Build the record for an article page, or `None` when the article has no
/// readable publish date or predates `cutoff`.
pub fn parse_article(
    doc: &Html,
    url: &Url,
    section: &str,
    list_type: ListType,
    cutoff: NaiveDate,
) -> Option<SectionNewsRecord> {
    let page = root(doc);
    let published = parse_opt_date(article_timestamp(page).as_deref());
    let Some(published) = published.filter(|d| *d >= cutoff) else {
        debug!(%url, ?published, %cutoff, "Dropping article outside the cutoff window");
        return None;
    };

    let article = canonicalize(url.as_str());
    let created_at = now_kst_string();
    Some(SectionNewsRecord {
        uuid: article.stable_id(),
        article_id: article.aid.clone(),
        section: section.to_string(),
        list_type,
        press: article_press(page),
        link: article.link,
        title: article_title(page),
        texts: first_text(page, BODY_SELECTORS, TextMode::Flatten),
        article_published_at: Some(format_yymmdd(published)),
        latest_scraped_at: created_at.clone(),
        created_at,
    })
}

/// Crawl every section in `opts`.
#[instrument(level = "info", skip_all, fields(mode = ?opts.mode, cutoff = %opts.cutoff))]
pub async fn crawl<F: FetchAsync>(
    fetcher: &F,
    opts: &SectionNewsOptions,
    concurrency: usize,
) -> Result<Vec<SectionNewsRecord>, Box<dyn Error>> {
    info!(
        sections = %opts.sections.join(","),
        max_pages = ?opts.max_pages,
        "Starting section news crawl"
    );
    let mut seen = SeenSet::new();
    let mut records = Vec::new();

    for section in &opts.sections {
        let before = records.len();
        let batch = match opts.mode {
            NewsMode::Archive => crawl_archive(fetcher, section, opts, &mut seen, concurrency).await?,
            NewsMode::Section => crawl_section(fetcher, section, opts, &mut seen, concurrency).await?,
        };
        records.extend(batch);
        info!(%section, count = records.len() - before, "Finished section");
    }

    info!(count = records.len(), "Collected section news articles");
    Ok(records)
}

async fn fetch_articles<F: FetchAsync>(
    fetcher: &F,
    urls: Vec<Url>,
    referer: &Url,
    section: &str,
    list_type: ListType,
    cutoff: NaiveDate,
    concurrency: usize,
) -> Vec<SectionNewsRecord> {
    let jobs = urls
        .into_iter()
        .map(|u| (PageRequest::new(u).with_referer(referer.as_str()), ()))
        .collect();
    fetch_all(fetcher, jobs, concurrency)
        .await
        .into_iter()
        .filter_map(|f| {
            let doc = Html::parse_document(&f.body);
            parse_article(&doc, &f.url, section, list_type, cutoff)
        })
        .collect()
}

async fn crawl_archive<F: FetchAsync>(
    fetcher: &F,
    section: &str,
    opts: &SectionNewsOptions,
    seen: &mut SeenSet<String>,
    concurrency: usize,
) -> Result<Vec<SectionNewsRecord>, Box<dyn Error>> {
    let paginator = Paginator::new(None, CutoffPolicy::Unbounded, opts.max_pages);
    let mut records = Vec::new();
    let mut day = today_kst();

    while day >= opts.cutoff {
        let mut page = 1u32;
        loop {
            let list = Url::parse(&archive_url(section, day, page))?;
            let req = PageRequest::new(list.clone()).with_referer(REFERER_HOME);
            let doc = match fetch_document(fetcher, &req).await {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(%section, %day, page, error = %e, "Archive page fetch failed; moving to next day");
                    break;
                }
            };
            let rows: Vec<ListRow<Url>> = parse_archive_links(&doc, &list)
                .into_iter()
                .filter(|u| seen.insert(u.to_string()))
                .map(|u| ListRow::new(u, None))
                .collect();
            drop(doc);

            let decision = paginator.evaluate(page, rows, None);
            records.extend(
                fetch_articles(
                    fetcher,
                    decision.scheduled,
                    &list,
                    section,
                    ListType::Archive,
                    opts.cutoff,
                    concurrency,
                )
                .await,
            );
            if !decision.request_next {
                break;
            }
            page += 1;
        }
        day -= Duration::days(1);
    }
    Ok(records)
}

async fn crawl_section<F: FetchAsync>(
    fetcher: &F,
    section: &str,
    opts: &SectionNewsOptions,
    seen: &mut SeenSet<String>,
    concurrency: usize,
) -> Result<Vec<SectionNewsRecord>, Box<dyn Error>> {
    let mut counts: HashMap<ListType, usize> = HashMap::new();
    let caps = [
        (ListType::Headline, opts.max_headlines),
        (ListType::Latest, opts.max_latest),
    ];
    let mut queue = VecDeque::from([(Url::parse(&section_url(section))?, 1u32)]);
    let mut records = Vec::new();

    while let Some((url, page_idx)) = queue.pop_front() {
        let req = PageRequest::new(url.clone()).with_referer(REFERER_HOME);
        let doc = match fetch_document(fetcher, &req).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!(%section, %url, error = %e, "Section page fetch failed");
                continue;
            }
        };
        let parsed = parse_section_page(&doc, &url);
        drop(doc);

        let may_follow = opts.max_pages.is_none_or(|max| page_idx < max);
        for (list_type, cap) in caps {
            let (links, more) = match list_type {
                ListType::Headline => (&parsed.headlines, &parsed.more_headline),
                _ => (&parsed.latest, &parsed.more_latest),
            };
            let count = counts.entry(list_type).or_default();
            let mut picked = Vec::new();
            for link in links {
                if *count >= cap {
                    break;
                }
                if seen.insert(link.to_string()) {
                    *count += 1;
                    picked.push(link.clone());
                }
            }
            let under_cap = *count < cap;
            records.extend(
                fetch_articles(fetcher, picked, &url, section, list_type, opts.cutoff, concurrency)
                    .await,
            );
            if let Some(more) = more {
                if may_follow && under_cap {
                    queue.push_back((more.clone(), page_idx + 1));
                }
            }
        }
    }
    Ok(records)
}
