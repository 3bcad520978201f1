//! Crawl settings.
//!
//! Settings come from an optional YAML file passed with `--config`. Every key
//! is optional; missing keys take the defaults below, which mirror a polite
//! desktop browser.
//!
//! ```yaml
//! download_delay_ms: 600
//! concurrency: 2
//! max_retries: 2
//! ```

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{info, instrument};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "ko-KR,ko;q=0.9,en-US;q=0.8,en;q=0.7";
pub const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// HTTP and politeness settings shared by all spiders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlSettings {
    pub user_agent: String,
    pub accept_language: String,
    pub accept: String,
    /// Base delay before each request, in milliseconds.
    pub download_delay_ms: u64,
    /// Scale each delay by a random factor in `0.5..1.5`.
    pub randomize_delay: bool,
    /// Detail pages fetched in parallel.
    pub concurrency: usize,
    /// Retries after the first failed attempt.
    pub max_retries: usize,
    pub retry_base_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Hosts the crawler may contact; subdomains included.
    pub allowed_domains: Vec<String>,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            download_delay_ms: 600,
            randomize_delay: true,
            concurrency: 2,
            max_retries: 2,
            retry_base_delay_ms: 1000,
            request_timeout_secs: 30,
            allowed_domains: vec!["naver.com".to_string()],
        }
    }
}

impl CrawlSettings {
    pub fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parallelism for detail fetches, never zero.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }

    /// Whether `host` is covered by `allowed_domains`.
    pub fn is_allowed_host(&self, host: &str) -> bool {
        self.allowed_domains.is_empty()
            || self
                .allowed_domains
                .iter()
                .any(|d| host == d || host.ends_with(&format!(".{d}")))
    }

    pub fn from_yaml(text: &str) -> Result<Self, Box<dyn Error>> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Load settings from `path`, or defaults when no path is given.
#[instrument(level = "info")]
pub async fn load_settings(path: Option<&Path>) -> Result<CrawlSettings, Box<dyn Error>> {
    let Some(path) = path else {
        info!("No config file given; using default crawl settings");
        return Ok(CrawlSettings::default());
    };
    let text = fs::read_to_string(path).await?;
    let settings = CrawlSettings::from_yaml(&text)?;
    info!(
        path = %path.display(),
        delay_ms = settings.download_delay_ms,
        concurrency = settings.concurrency,
        "Loaded crawl settings"
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let settings = CrawlSettings::from_yaml("download_delay_ms: 250\nconcurrency: 4\n").unwrap();
        assert_eq!(settings.download_delay(), Duration::from_millis(250));
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(settings.max_retries, 2);
    }

    #[test]
    fn test_invalid_yaml_is_error() {
        assert!(CrawlSettings::from_yaml("concurrency: [").is_err());
        assert!(CrawlSettings::from_yaml("concurrency: lots").is_err());
    }

    #[test]
    fn test_allowed_hosts() {
        let settings = CrawlSettings::default();
        assert!(settings.is_allowed_host("naver.com"));
        assert!(settings.is_allowed_host("n.news.naver.com"));
        assert!(!settings.is_allowed_host("evilnaver.com"));
        assert!(!settings.is_allowed_host("example.com"));
    }

    #[test]
    fn test_effective_concurrency_never_zero() {
        let settings = CrawlSettings {
            concurrency: 0,
            ..CrawlSettings::default()
        };
        assert_eq!(settings.effective_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_load_settings_default_and_file() {
        assert_eq!(load_settings(None).await.unwrap(), CrawlSettings::default());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crawl.yaml");
        std::fs::write(&path, "max_retries: 5\n").unwrap();
        assert_eq!(load_settings(Some(&path)).await.unwrap().max_retries, 5);
    }
}
