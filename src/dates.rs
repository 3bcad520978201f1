//! Publish-date parsing and the KST clock.
//!
//! Every listing on the portal prints dates a little differently
//! (`2025.10.24`, `2025-10-24 09:10`, `25.10.24`, ...). The matcher searches
//! for the first date-looking token and ignores anything around it.
//!
//! All "now" values are computed in Korea Standard Time (UTC+09:00, no DST),
//! which is the zone the portal publishes in.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use tracing::debug;

const KST_OFFSET_SECS: i32 = 9 * 3600;

static FOUR_DIGIT_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[./-](\d{1,2})[./-](\d{1,2})").unwrap());
static TWO_DIGIT_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})[./-](\d{1,2})[./-](\d{1,2})").unwrap());

/// The fixed KST offset.
pub fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).expect("KST offset is in range")
}

/// Current wall-clock time in KST.
pub fn now_kst() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&kst())
}

/// Current KST time as `YYYY-MM-DD HH:MM:SS`, the format used for
/// `created_at` / `latest_scraped_at` columns.
pub fn now_kst_string() -> String {
    now_kst().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Today's date in KST.
pub fn today_kst() -> NaiveDate {
    now_kst().date_naive()
}

/// Parse the first date found in `text`.
///
/// Four-digit years are tried first. Two-digit years are read as `2000 + YY`.
/// Returns `None` when no pattern matches or the match is not a real calendar
/// date (e.g. `2025.02.30`).
///
/// ```ignore
/// assert_eq!(parse_date("2025/10/24 09:10"), NaiveDate::from_ymd_opt(2025, 10, 24));
/// assert_eq!(parse_date("25.10.24"), NaiveDate::from_ymd_opt(2025, 10, 24));
/// ```
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = FOUR_DIGIT_YEAR.captures(text) {
        return ymd_from_captures(&caps, 0);
    }
    if let Some(caps) = TWO_DIGIT_YEAR.captures(text) {
        return ymd_from_captures(&caps, 2000);
    }
    None
}

fn ymd_from_captures(caps: &regex::Captures<'_>, year_base: i32) -> Option<NaiveDate> {
    let y: i32 = caps.get(1)?.as_str().parse().ok()?;
    let m: u32 = caps.get(2)?.as_str().parse().ok()?;
    let d: u32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year_base + y, m, d)
}

/// Parse an optional raw string; `None` in, `None` out.
pub fn parse_opt_date(text: Option<&str>) -> Option<NaiveDate> {
    text.and_then(parse_date)
}

/// Render a date as `YY.MM.DD`.
pub fn format_yymmdd(date: NaiveDate) -> String {
    format!(
        "{:02}.{:02}.{:02}",
        date.year().rem_euclid(100),
        date.month(),
        date.day()
    )
}

/// Parse and re-render as `YY.MM.DD`.
pub fn to_yymmdd(text: Option<&str>) -> Option<String> {
    parse_opt_date(text).map(format_yymmdd)
}

/// Compute the earliest publish date still collected.
///
/// An explicit `since_date` wins over `since_days`. A `since_date` that does
/// not parse is an error, and so is a `since_days` that reaches past the
/// calendar range.
pub fn cutoff_from(
    today: NaiveDate,
    since_days: i64,
    since_date: Option<&str>,
) -> Result<NaiveDate, Box<dyn Error>> {
    let cutoff = match since_date {
        Some(raw) => parse_date(raw)
            .ok_or_else(|| format!("invalid since_date: {raw:?} (expected e.g. 2024-10-28)"))?,
        None => Duration::try_days(since_days)
            .and_then(|span| today.checked_sub_signed(span))
            .ok_or_else(|| format!("since_days out of range: {since_days}"))?,
    };
    debug!(%cutoff, since_days, ?since_date, "Computed cutoff date");
    Ok(cutoff)
}
