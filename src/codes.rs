//! Stock-code input and output.
//!
//! Code files are plain text, one six-digit code per line:
//!
//! ```text
//! # KOSPI large caps
//! 005930
//! 000660
//! ```
//!
//! Blank lines and `#` comments are ignored, a UTF-8 BOM is tolerated, and
//! anything that is not exactly six digits is skipped.

use itertools::Itertools;
use std::error::Error;
use std::io;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// `true` for exactly six ASCII digits.
pub fn is_stock_code(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse the contents of a code file, preserving first-seen order.
pub fn parse_codes(text: &str) -> Vec<String> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    text.lines()
        .map(str::trim)
        .filter(|ln| !ln.is_empty() && !ln.starts_with('#'))
        .filter(|ln| {
            let ok = is_stock_code(ln);
            if !ok {
                warn!(line = *ln, "Skipping malformed stock code");
            }
            ok
        })
        .unique()
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated code list such as `005930,000660`.
pub fn parse_code_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unique()
        .map(str::to_string)
        .collect()
}

/// Load codes from `path`.
///
/// # Errors
///
/// A missing file, an unreadable file, or a file without a single valid code
/// is an error.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_codes(path: &Path) -> Result<Vec<String>, Box<dyn Error>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Err(Box::new(io::Error::new(
            io::ErrorKind::NotFound,
            format!("codes file not found: {}", path.display()),
        )));
    }
    let text = fs::read_to_string(path).await?;
    let codes = parse_codes(&text);
    if codes.is_empty() {
        return Err(format!("no six-digit stock codes found in {}", path.display()).into());
    }
    info!(count = codes.len(), "Loaded stock codes");
    Ok(codes)
}

/// Write `codes` sorted, one per line.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_codes<I>(path: &Path, codes: I) -> Result<(), Box<dyn Error>>
where
    I: IntoIterator<Item = String>,
{
    let sorted = codes.into_iter().sorted().dedup().collect::<Vec<_>>();
    fs::write(path, sorted.join("\n")).await?;
    info!(count = sorted.len(), "Wrote stock codes");
    Ok(())
}

/// Pick the codes for a per-code crawl.
///
/// A single `code` wins over a comma-separated `codes` list, which wins over
/// the codes file. The result is sorted and de-duplicated, then cut to the
/// first `first_n` codes.
pub async fn select_codes(
    code: Option<&str>,
    codes: Option<&str>,
    codes_file: &Path,
    first_n: Option<usize>,
) -> Result<Vec<String>, Box<dyn Error>> {
    let base = match (code.map(str::trim).filter(|c| !c.is_empty()), codes) {
        (Some(one), _) => vec![one.to_string()],
        (None, Some(list)) => parse_code_list(list),
        (None, None) => load_codes(codes_file).await?,
    };
    let mut selected = base.into_iter().sorted().dedup().collect::<Vec<_>>();
    if let Some(n) = first_n.filter(|n| *n > 0) {
        selected.truncate(n);
    }
    if selected.is_empty() {
        return Err("no stock codes to crawl".into());
    }
    info!(count = selected.len(), "Selected stock codes");
    Ok(selected)
}
