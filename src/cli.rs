//! Command-line interface definitions.
//!
//! One subcommand per spider; output and config options are global.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::outputs::FeedFormat;
use crate::scrapers::market_codes::Market;
use crate::scrapers::section_news::NewsMode;

/// Command-line arguments for the finance crawler.
///
/// # Examples
///
/// ```sh
/// # Stock news for the last 30 days, codes from codes_all.txt
/// finance_crawler item-news --since-days 30
///
/// # Discussion board for two codes, first 5 list pages, JSON feed
/// finance_crawler -o ./feeds board --codes 005930,000660 --end-page 5
///
/// # Refresh the KOSDAQ code list
/// finance_crawler market-codes --market kosdaq
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML crawl settings file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory the feed file is written to
    #[arg(short, long, global = true, default_value = ".")]
    pub output_dir: PathBuf,

    /// Feed format (defaults to the spider's usual format)
    #[arg(long, global = true, value_enum)]
    pub format: Option<FeedFormat>,

    /// Do not prefix CSV feeds with a UTF-8 byte order mark
    #[arg(long, global = true)]
    pub no_bom: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// News attached to each stock code
    ItemNews(ItemNewsArgs),
    /// General news from portal sections
    News(NewsArgs),
    /// Stock discussion-board posts
    Board(BoardArgs),
    /// Analyst research reports
    Reports(ReportsArgs),
    /// Collect the stock codes of one market into a text file
    MarketCodes(MarketCodesArgs),
}

/// Date cutoff shared by the dated spiders.
#[derive(Args, Debug, Clone)]
pub struct SinceArgs {
    /// Keep items published within this many days
    #[arg(long)]
    pub since_days: Option<i64>,

    /// Keep items published on or after this date (YYYY-MM-DD); overrides --since-days
    #[arg(long)]
    pub since_date: Option<String>,
}

impl SinceArgs {
    pub fn days_or(&self, default: i64) -> i64 {
        self.since_days.unwrap_or(default)
    }
}

#[derive(Args, Debug)]
pub struct ItemNewsArgs {
    /// File with one six-digit code per line
    #[arg(long, default_value = "codes_all.txt")]
    pub codes_file: PathBuf,

    #[command(flatten)]
    pub since: SinceArgs,

    /// Last list page to fetch per code
    #[arg(long)]
    pub max_pages: Option<u32>,
}

#[derive(Args, Debug)]
pub struct NewsArgs {
    /// Comma-separated section ids
    #[arg(long, default_value = "100,101,102,104")]
    pub sections: String,

    #[arg(long, value_enum, default_value_t = NewsMode::Archive)]
    pub mode: NewsMode,

    #[command(flatten)]
    pub since: SinceArgs,

    /// Page ceiling per archive day or per section list
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Headline articles per section (section mode)
    #[arg(long, default_value_t = 1000)]
    pub max_headlines: usize,

    /// Latest-list articles per section (section mode)
    #[arg(long, default_value_t = 1000)]
    pub max_latest: usize,
}

#[derive(Args, Debug)]
pub struct BoardArgs {
    /// A single stock code
    #[arg(long)]
    pub code: Option<String>,

    /// Comma-separated stock codes
    #[arg(long)]
    pub codes: Option<String>,

    /// Code file used when neither --code nor --codes is given
    #[arg(long, default_value = "codes_all.txt")]
    pub codes_file: PathBuf,

    /// Only crawl the first N codes after sorting
    #[arg(long)]
    pub first_n: Option<usize>,

    #[arg(long, default_value_t = 1)]
    pub start_page: u32,

    /// Last list page to fetch per code
    #[arg(long)]
    pub end_page: Option<u32>,

    #[command(flatten)]
    pub since: SinceArgs,
}

#[derive(Args, Debug)]
pub struct ReportsArgs {
    #[command(flatten)]
    pub since: SinceArgs,

    /// Last list page to fetch per research section
    #[arg(long)]
    pub max_pages: Option<u32>,
}

#[derive(Args, Debug)]
pub struct MarketCodesArgs {
    #[arg(long, value_enum, default_value_t = Market::Kosdaq)]
    pub market: Market,

    /// Last listing page to fetch (default: the listing's own last page)
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Output file (default: codes_<market>.txt)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_item_news_defaults() {
        let cli = Cli::parse_from(["finance_crawler", "item-news"]);
        assert_eq!(cli.output_dir, PathBuf::from("."));
        assert!(!cli.no_bom);
        let Command::ItemNews(args) = cli.command else {
            panic!("expected item-news");
        };
        assert_eq!(args.codes_file, PathBuf::from("codes_all.txt"));
        assert_eq!(args.since.days_or(365), 365);
        assert_eq!(args.max_pages, None);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "finance_crawler",
            "board",
            "--codes",
            "005930,000660",
            "--end-page",
            "5",
            "-o",
            "/tmp/feeds",
            "--format",
            "csv",
            "--no-bom",
        ]);
        assert_eq!(cli.output_dir, PathBuf::from("/tmp/feeds"));
        assert_eq!(cli.format, Some(FeedFormat::Csv));
        assert!(cli.no_bom);
        let Command::Board(args) = cli.command else {
            panic!("expected board");
        };
        assert_eq!(args.codes.as_deref(), Some("005930,000660"));
        assert_eq!(args.start_page, 1);
        assert_eq!(args.end_page, Some(5));
    }

    #[test]
    fn test_cli_news_mode_and_since_date() {
        let cli = Cli::parse_from([
            "finance_crawler",
            "news",
            "--mode",
            "section",
            "--since-date",
            "2024-10-28",
        ]);
        let Command::News(args) = cli.command else {
            panic!("expected news");
        };
        assert_eq!(args.mode, NewsMode::Section);
        assert_eq!(args.sections, "100,101,102,104");
        assert_eq!(args.since.since_date.as_deref(), Some("2024-10-28"));
        assert_eq!(args.max_headlines, 1000);
    }

    #[test]
    fn test_cli_market_codes() {
        let cli = Cli::parse_from(["finance_crawler", "market-codes", "--market", "kospi"]);
        let Command::MarketCodes(args) = cli.command else {
            panic!("expected market-codes");
        };
        assert_eq!(args.market, Market::Kospi);
        assert_eq!(args.out, None);
        assert_eq!(args.max_pages, None);
    }
}
