//! Feed writers.
//!
//! Every crawl ends with one feed file in the output directory:
//!
//! ```text
//! output_dir/
//! ├── item_news_2025-10-24T09-30-00.csv
//! ├── news_2025-10-24T09-41-12.csv
//! ├── reports_2025-10-24T10-02-55.csv
//! └── boards_2025-10-24T10-15-03.json
//! ```
//!
//! # Submodules
//!
//! - [`csv`]: UTF-8 CSV, BOM-prefixed so spreadsheet tools detect the encoding
//! - [`json`]: pretty-printed JSON array

use clap::ValueEnum;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

use crate::dates::now_kst;
use crate::models::FeedRecord;

pub mod csv;
pub mod json;

/// Feed file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeedFormat {
    Csv,
    Json,
}

impl FeedFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FeedFormat::Csv => "csv",
            FeedFormat::Json => "json",
        }
    }
}

/// Writer options shared by every spider.
#[derive(Debug, Clone, Copy)]
pub struct FeedOptions {
    pub format: FeedFormat,
    /// Prefix CSV output with a UTF-8 byte order mark.
    pub bom: bool,
}

/// `{dir}/{name}_{YYYY-MM-DDTHH-MM-SS}.{ext}`, timestamped in KST.
pub fn feed_path(dir: &Path, name: &str, format: FeedFormat) -> PathBuf {
    let stamp = now_kst().format("%Y-%m-%dT%H-%M-%S");
    dir.join(format!("{name}_{stamp}.{}", format.extension()))
}

/// Serialize `records` and write them to a new feed file under `dir`.
///
/// Returns the path written.
#[instrument(level = "info", skip_all, fields(name = %name, count = records.len()))]
pub async fn write_feed<R: FeedRecord>(
    records: &[R],
    dir: &Path,
    name: &str,
    opts: FeedOptions,
) -> Result<PathBuf, Box<dyn Error>> {
    let bytes = match opts.format {
        FeedFormat::Csv => csv::to_csv_bytes(records, opts.bom)?,
        FeedFormat::Json => json::to_json_bytes(records)?,
    };
    let path = feed_path(dir, name, opts.format);
    fs::write(&path, bytes).await?;
    info!(path = %path.display(), "Wrote feed");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportRecord;

    #[test]
    fn test_feed_path_shape() {
        let path = feed_path(Path::new("/tmp/out"), "reports", FeedFormat::Csv);
        let file = path.file_name().unwrap().to_str().unwrap();
        assert!(file.starts_with("reports_"));
        assert!(file.ends_with(".csv"));
        // reports_ + YYYY-MM-DDTHH-MM-SS + .csv
        assert_eq!(file.len(), "reports_".len() + 19 + 4);
        assert!(!file.contains(':'));
    }

    #[tokio::test]
    async fn test_write_feed_json() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![ReportRecord {
            title: Some("반도체 전망".to_string()),
            original_id: Some("1".to_string()),
            ..ReportRecord::default()
        }];
        let opts = FeedOptions {
            format: FeedFormat::Json,
            bom: true,
        };
        let path = write_feed(&records, dir.path(), "reports", opts).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with('['));
        assert!(text.contains("반도체 전망"));
    }
}
