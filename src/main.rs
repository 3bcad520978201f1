//! # finance_crawler
//!
//! Crawlers for Naver Finance and Naver News that write flat CSV or JSON
//! feeds for downstream analysis.
//!
//! ## Features
//!
//! - Stock news per code, general section news, discussion-board posts and
//!   analyst research reports
//! - Publish-date cutoffs (`--since-days` / `--since-date`) that also end
//!   pagination
//! - Canonical article URLs and stable UUIDv5 record ids
//! - Selector fallback chains for article bodies across page layouts
//! - Per-run de-duplication
//! - Market code collection for KOSPI and KOSDAQ
//!
//! ## Usage
//!
//! ```sh
//! finance_crawler market-codes --market kosdaq --out codes_all.txt
//! finance_crawler -o ./feeds item-news --since-days 30
//! ```
//!
//! ## Architecture
//!
//! 1. **Listing**: walk list pages, stopping at the date cutoff
//! 2. **Fetching**: download detail pages a few at a time
//! 3. **Extraction**: turn each detail page into a flat record
//! 4. **Output**: de-duplicate and write the feed file

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod codes;
mod config;
mod dates;
mod dedupe;
mod extract;
mod fetch;
mod links;
mod models;
mod outputs;
mod pagination;
mod scrapers;
mod utils;

use cli::{Cli, Command};
use codes::{load_codes, parse_code_list, select_codes};
use config::load_settings;
use dates::{cutoff_from, today_kst};
use dedupe::DedupePipeline;
use fetch::build_fetcher;
use models::FeedRecord;
use outputs::{FeedFormat, FeedOptions, write_feed};
use scrapers::{board, item_news, market_codes, reports, section_news};
use utils::ensure_writable_dir;

const DEFAULT_SINCE_DAYS: i64 = 365;
const DEFAULT_REPORT_SINCE_DAYS: i64 = 3;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("finance_crawler starting up");

    let args = Cli::parse();
    debug!(?args.command, output_dir = %args.output_dir.display(), "Parsed CLI arguments");

    let settings = load_settings(args.config.as_deref()).await?;
    let concurrency = settings.effective_concurrency();
    let fetcher = build_fetcher(&settings)?;
    let today = today_kst();

    let output = |default: FeedFormat| FeedOptions {
        format: args.format.unwrap_or(default),
        bom: !args.no_bom,
    };

    match &args.command {
        Command::ItemNews(a) => {
            let opts = item_news::ItemNewsOptions {
                codes: load_codes(&a.codes_file).await?,
                cutoff: cutoff_from(today, a.since.days_or(DEFAULT_SINCE_DAYS), a.since.since_date.as_deref())?,
                max_pages: a.max_pages,
            };
            check_output_dir(&args.output_dir).await?;
            let records = item_news::crawl(&fetcher, &opts, concurrency).await?;
            emit(records, &args.output_dir, "item_news", output(FeedFormat::Csv)).await?;
        }
        Command::News(a) => {
            let opts = section_news::SectionNewsOptions {
                sections: parse_code_list(&a.sections),
                mode: a.mode,
                cutoff: cutoff_from(today, a.since.days_or(DEFAULT_SINCE_DAYS), a.since.since_date.as_deref())?,
                max_pages: a.max_pages,
                max_headlines: a.max_headlines,
                max_latest: a.max_latest,
            };
            check_output_dir(&args.output_dir).await?;
            let records = section_news::crawl(&fetcher, &opts, concurrency).await?;
            emit(records, &args.output_dir, "news", output(FeedFormat::Csv)).await?;
        }
        Command::Board(a) => {
            let opts = board::BoardOptions {
                codes: select_codes(a.code.as_deref(), a.codes.as_deref(), &a.codes_file, a.first_n)
                    .await?,
                start_page: a.start_page,
                end_page: a.end_page,
                cutoff: cutoff_from(today, a.since.days_or(DEFAULT_SINCE_DAYS), a.since.since_date.as_deref())?,
            };
            check_output_dir(&args.output_dir).await?;
            let records = board::crawl(&fetcher, &opts, concurrency).await?;
            emit(records, &args.output_dir, "boards", output(FeedFormat::Json)).await?;
        }
        Command::Reports(a) => {
            let opts = reports::ReportsOptions {
                cutoff: cutoff_from(
                    today,
                    a.since.days_or(DEFAULT_REPORT_SINCE_DAYS),
                    a.since.since_date.as_deref(),
                )?,
                max_pages: a.max_pages,
            };
            check_output_dir(&args.output_dir).await?;
            let records = reports::crawl(&fetcher, &opts, concurrency).await?;
            emit(records, &args.output_dir, "reports", output(FeedFormat::Csv)).await?;
        }
        Command::MarketCodes(a) => {
            let out = a.out.clone().unwrap_or_else(|| a.market.default_output());
            market_codes::collect_to_file(&fetcher, a.market, a.max_pages, &out).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

async fn check_output_dir(dir: &Path) -> Result<(), Box<dyn Error>> {
    if let Err(e) = ensure_writable_dir(dir).await {
        error!(
            path = %dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }
    Ok(())
}

/// De-duplicate and write one feed.
async fn emit<R: FeedRecord>(
    records: Vec<R>,
    dir: &Path,
    name: &str,
    opts: FeedOptions,
) -> Result<(), Box<dyn Error>> {
    let scraped = records.len();
    let mut pipeline = DedupePipeline::new();
    let records = pipeline.filter(records);
    info!(scraped, kept = records.len(), dropped = pipeline.dropped(), "De-duplicated feed");
    write_feed(&records, dir, name, opts).await?;
    Ok(())
}
