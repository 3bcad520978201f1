//! Cutoff-driven pagination.
//!
//! Every list page is reduced to a sequence of [`ListRow`]s carrying the row's
//! parsed publish date. [`Paginator::evaluate`] then decides which rows get a
//! detail fetch and whether the next list page is requested.

use chrono::NaiveDate;
use scraper::Html;
use tracing::debug;
use url::Url;

use crate::extract::{LINKS, selector};
use crate::links::{max_page_in_links, page_param};

/// How rows older than the cutoff affect scheduling and pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutoffPolicy {
    /// Rows are assumed to be newest-first. Undated rows are skipped; the
    /// first stale row ends both the page scan and the pagination.
    StopAtFirstStale,
    /// Stale rows are skipped and the whole page is scanned. The next page is
    /// requested only if at least one row on this page was scheduled.
    SkipStale { keep_undated: bool },
    /// No date filtering; only page ceilings end the crawl.
    Unbounded,
}

/// One list row: the payload to schedule and its parsed date.
#[derive(Debug, Clone, PartialEq)]
pub struct ListRow<T> {
    pub item: T,
    pub date: Option<NaiveDate>,
}

impl<T> ListRow<T> {
    pub fn new(item: T, date: Option<NaiveDate>) -> Self {
        Self { item, date }
    }
}

/// Outcome of evaluating one list page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageDecision<T> {
    /// Rows that passed the cutoff, in page order.
    pub scheduled: Vec<T>,
    /// Whether the next list page should be fetched.
    pub request_next: bool,
    /// Rows skipped as stale or undated.
    pub skipped: usize,
}

/// Per-crawl pagination settings.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    pub cutoff: Option<NaiveDate>,
    pub policy: CutoffPolicy,
    /// Highest page number that may be fetched.
    pub max_pages: Option<u32>,
}

impl Paginator {
    pub fn new(cutoff: Option<NaiveDate>, policy: CutoffPolicy, max_pages: Option<u32>) -> Self {
        Self {
            cutoff,
            policy,
            max_pages,
        }
    }

    fn is_recent(&self, date: NaiveDate) -> bool {
        self.cutoff.is_none_or(|cutoff| date >= cutoff)
    }

    /// Whether a page after `page` is allowed by `max_pages` and by the
    /// listing's own last page.
    pub fn within_ceilings(&self, page: u32, last_page: Option<u32>) -> bool {
        self.max_pages.is_none_or(|max| page < max) && last_page.is_none_or(|last| page < last)
    }

    /// Evaluate `rows` from list page `page`.
    ///
    /// # Arguments
    ///
    /// * `page` - 1-based number of the list page the rows came from
    /// * `rows` - The page's rows in document order, with their parsed dates
    /// * `last_page` - The last page advertised by the page's own pagination
    ///   links, when one was found
    ///
    /// # Returns
    ///
    /// The rows that pass the cutoff policy, in page order, and whether the
    /// next list page should be fetched. An empty page never requests more.
    pub fn evaluate<T>(
        &self,
        page: u32,
        rows: Vec<ListRow<T>>,
        last_page: Option<u32>,
    ) -> PageDecision<T> {
        if rows.is_empty() {
            debug!(page, "Empty list page; stopping");
            return PageDecision {
                scheduled: Vec::new(),
                request_next: false,
                skipped: 0,
            };
        }

        let total = rows.len();
        let mut scheduled = Vec::with_capacity(total);
        let mut hit_stale = false;

        match self.policy {
            CutoffPolicy::StopAtFirstStale => {
                for row in rows {
                    match row.date {
                        None => continue,
                        Some(d) if !self.is_recent(d) => {
                            hit_stale = true;
                            break;
                        }
                        Some(_) => scheduled.push(row.item),
                    }
                }
            }
            CutoffPolicy::SkipStale { keep_undated } => {
                for row in rows {
                    let keep = match row.date {
                        None => keep_undated,
                        Some(d) => self.is_recent(d),
                    };
                    if keep {
                        scheduled.push(row.item);
                    }
                }
            }
            CutoffPolicy::Unbounded => {
                scheduled.extend(rows.into_iter().map(|r| r.item));
            }
        }

        let by_dates = match self.policy {
            CutoffPolicy::StopAtFirstStale => !hit_stale,
            CutoffPolicy::SkipStale { .. } => !scheduled.is_empty(),
            CutoffPolicy::Unbounded => true,
        };
        let request_next = by_dates && self.within_ceilings(page, last_page);

        debug!(
            page,
            total,
            scheduled = scheduled.len(),
            hit_stale,
            ?last_page,
            request_next,
            "Evaluated list page"
        );

        PageDecision {
            skipped: total - scheduled.len(),
            scheduled,
            request_next,
        }
    }
}

/// Page number of the "last page" (`pgRR`) link, if the listing has one.
///
/// Naver omits the link on the final pages of a listing.
pub fn last_page_link(doc: &Html, base: &Url) -> Option<u32> {
    ["a.pgRR", "td.pgRR a"]
        .iter()
        .filter_map(|css| selector(css))
        .find_map(|sel| {
            doc.select(&sel)
                .filter_map(|a| a.value().attr("href"))
                .find_map(|href| page_param(base, href))
        })
}

/// Find the last page number of a paginated listing.
///
/// The "last page" (`pgRR`) link is preferred. Without it, the largest
/// `page=` value among all links on the page is used.
///
/// # Arguments
///
/// * `doc` - The parsed list page
/// * `base` - URL of the list page, used to resolve relative links
///
/// # Returns
///
/// The last page number, or `None` when the page links to no other page.
pub fn detect_last_page(doc: &Html, base: &Url) -> Option<u32> {
    if let Some(last) = last_page_link(doc, base) {
        return Some(last);
    }
    max_page_in_links(base, doc.select(&LINKS).filter_map(|a| a.value().attr("href")))
}
