//! Page fetching with politeness delay and exponential-backoff retries.
//!
//! # Architecture
//!
//! - [`FetchAsync`]: core trait, "give me the body of this page"
//! - [`HttpFetcher`]: `reqwest` implementation with browser-like headers
//! - [`RetryFetch`]: decorator adding retries to any [`FetchAsync`]
//!
//! Spiders are generic over [`FetchAsync`], so tests drive them with canned
//! HTML instead of the network.
//!
//! # Retry Strategy
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```
//!
//! Only transient failures are retried: 5xx, 408 and 429 responses and
//! transport errors. Other HTTP statuses and refused off-site requests fail
//! on the first attempt.

use rand::{Rng, rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, REFERER};
use reqwest::{Client, StatusCode};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};
use url::Url;

use crate::config::CrawlSettings;

/// A single GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub url: Url,
    /// Sent as the `Referer` header when present.
    pub referer: Option<String>,
}

impl PageRequest {
    pub fn new(url: Url) -> Self {
        Self { url, referer: None }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }
}

/// Returned when a request targets a host outside the allow-list.
#[derive(Debug)]
pub struct OffSiteRequest(pub Url);

impl fmt::Display for OffSiteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "refusing off-site request to {}", self.0)
    }
}

impl Error for OffSiteRequest {}

/// Whether a response status is worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Classify a fetch error as transient or permanent.
///
/// # Arguments
///
/// * `e` - The error returned by a [`FetchAsync`] implementation
///
/// # Returns
///
/// `false` for off-site refusals, request-building errors and HTTP statuses
/// other than 5xx, 408 and 429. `true` for everything else, including
/// connection and timeout errors.
pub fn is_retryable(e: &(dyn Error + 'static)) -> bool {
    if e.is::<OffSiteRequest>() {
        return false;
    }
    match e.downcast_ref::<reqwest::Error>() {
        Some(re) if re.is_builder() => false,
        Some(re) => re.status().is_none_or(is_retryable_status),
        None => true,
    }
}

/// Trait for fetching a page body.
pub trait FetchAsync {
    /// Fetch `req` and return the decoded response body.
    ///
    /// # Errors
    ///
    /// Returns an error when the request fails, the server answers with a
    /// non-success status, or the body cannot be decoded.
    async fn fetch(&self, req: &PageRequest) -> Result<String, Box<dyn Error>>;
}

impl<T: FetchAsync> FetchAsync for &T {
    async fn fetch(&self, req: &PageRequest) -> Result<String, Box<dyn Error>> {
        (**self).fetch(req).await
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`FetchAsync`].
pub struct RetryFetch<T> {
    inner: T,
    /// Retries after the first failed attempt.
    max_retries: usize,
    /// Initial delay between retries (doubles with each attempt).
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T: FetchAsync> RetryFetch<T> {
    /// Wrap `inner` with retries.
    ///
    /// # Arguments
    ///
    /// * `inner` - The fetcher to retry
    /// * `max_retries` - Attempts allowed after the first failure
    /// * `base_delay` - Delay before the first retry; doubles per attempt, capped at 30s
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T: FetchAsync> FetchAsync for RetryFetch<T> {
    #[instrument(level = "debug", skip_all, fields(url = %req.url))]
    async fn fetch(&self, req: &PageRequest) -> Result<String, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.fetch(req).await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if !is_retryable(e.as_ref()) {
                        warn!(
                            attempt,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            error = %e,
                            "fetch() failed permanently; not retrying"
                        );
                        return Err(e);
                    }

                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis(),
                            elapsed_ms_total = total_dt.as_millis(),
                            error = %e,
                            "fetch() exhausted retries"
                        );
                        return Err(e);
                    }

                    let shift = (attempt - 1).min(16) as u32;
                    let delay = self
                        .base_delay
                        .saturating_mul(1u32 << shift)
                        .min(self.max_delay);
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + StdDuration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis(),
                        ?delay,
                        error = %e,
                        "fetch() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// `reqwest`-backed fetcher with static browser headers and a randomised
/// politeness delay before every request.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    settings: CrawlSettings,
}

impl HttpFetcher {
    pub fn new(settings: &CrawlSettings) -> Result<Self, Box<dyn Error>> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_str(&settings.accept_language)?);
        headers.insert(ACCEPT, HeaderValue::from_str(&settings.accept)?);
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .default_headers(headers)
            .timeout(settings.request_timeout())
            .build()?;
        Ok(Self {
            client,
            settings: settings.clone(),
        })
    }

    fn politeness_delay(&self) -> StdDuration {
        let base = self.settings.download_delay();
        if !self.settings.randomize_delay || base.is_zero() {
            return base;
        }
        base.mul_f64(rng().random_range(0.5..1.5))
    }
}

impl FetchAsync for HttpFetcher {
    #[instrument(level = "debug", skip_all, fields(url = %req.url))]
    async fn fetch(&self, req: &PageRequest) -> Result<String, Box<dyn Error>> {
        let host = req.url.host_str().unwrap_or_default();
        if !self.settings.is_allowed_host(host) {
            return Err(OffSiteRequest(req.url.clone()).into());
        }

        sleep(self.politeness_delay()).await;

        let t0 = Instant::now();
        let mut builder = self.client.get(req.url.clone());
        if let Some(referer) = &req.referer {
            builder = builder.header(REFERER, referer);
        }
        let resp = builder.send().await?.error_for_status()?;
        let body = resp.text().await?;
        debug!(
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Fetched page"
        );
        Ok(body)
    }
}

/// Build the production fetcher stack from settings.
///
/// # Errors
///
/// Returns an error if a configured header value is invalid or the HTTP
/// client cannot be built.
pub fn build_fetcher(settings: &CrawlSettings) -> Result<RetryFetch<HttpFetcher>, Box<dyn Error>> {
    let http = HttpFetcher::new(settings)?;
    Ok(RetryFetch::new(
        http,
        settings.max_retries,
        settings.retry_base_delay(),
    ))
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory fetcher used by spider tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Debug, Default)]
    pub struct StubFetcher {
        pages: HashMap<String, String>,
        pub requested: RefCell<Vec<String>>,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn page(mut self, url: &str, body: &str) -> Self {
            self.pages.insert(url.to_string(), body.to_string());
            self
        }

        pub fn requested(&self) -> Vec<String> {
            self.requested.borrow().clone()
        }
    }

    impl FetchAsync for StubFetcher {
        async fn fetch(&self, req: &PageRequest) -> Result<String, Box<dyn Error>> {
            self.requested.borrow_mut().push(req.url.to_string());
            self.pages
                .get(req.url.as_str())
                .cloned()
                .ok_or_else(|| format!("404 {}", req.url).into())
        }
    }
}
