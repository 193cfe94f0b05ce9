// HTTP page fetcher. One shared client, polite request spacing.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{info, warn};

use wikitrends_common::{Result, TrendsError};

/// A fetched response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// A failed fetch, classified so callers know whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct FetchFailure {
    pub status: Option<u16>,
    pub reason: String,
    transient: bool,
}

impl FetchFailure {
    /// Connection failures, timeouts, 5xx and 429.
    pub fn transient(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            transient: true,
        }
    }

    pub fn permanent(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            transient: false,
        }
    }

    pub fn from_status(status: u16) -> Self {
        let reason = format!("HTTP {status}");
        if status == 429 || (500..600).contains(&status) {
            Self::transient(Some(status), reason)
        } else {
            Self::permanent(Some(status), reason)
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    pub fn into_error(self, url: &str) -> TrendsError {
        TrendsError::FetchError {
            url: url.to_string(),
            status: self.status,
            reason: self.reason,
        }
    }
}

/// Page fetching seam. Production uses `HttpPageFetcher`; tests plug in mocks.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn get(&self, url: &str) -> std::result::Result<FetchedPage, FetchFailure>;

    /// Fetcher name for logging.
    fn name(&self) -> &str {
        "unknown"
    }
}

/// reqwest-backed fetcher. Successive requests are spaced by at least
/// `rate_limit`, across every task sharing this fetcher.
pub struct HttpPageFetcher {
    client: reqwest::Client,
    rate_limit: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpPageFetcher {
    pub fn new(user_agent: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| TrendsError::Config(format!("Failed to build HTTP client: {e}")))?;
        info!(user_agent, timeout_secs = request_timeout.as_secs(), "HttpPageFetcher initialized");
        Ok(Self {
            client,
            rate_limit: Duration::ZERO,
            last_request: Mutex::new(None),
        })
    }

    pub fn with_rate_limit(mut self, rate_limit: Duration) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Wait until `rate_limit` has passed since the previous request.
    /// The lock is held through the sleep so concurrent callers queue up.
    async fn pace(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.rate_limit {
                tokio::time::sleep(self.rate_limit - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn classify(e: &reqwest::Error) -> FetchFailure {
    let status = e.status().map(|s| s.as_u16());
    if e.is_timeout() || e.is_connect() {
        FetchFailure::transient(status, e.to_string())
    } else if let Some(code) = status {
        FetchFailure::from_status(code)
    } else if e.is_body() || e.is_request() {
        FetchFailure::transient(None, e.to_string())
    } else {
        FetchFailure::permanent(None, e.to_string())
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn get(&self, url: &str) -> std::result::Result<FetchedPage, FetchFailure> {
        self.pace().await;
        info!(url, fetcher = "http", "Fetching page");

        let resp = self.client.get(url).send().await.map_err(|e| classify(&e))?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();

        if !resp.status().is_success() {
            warn!(url, status, "Non-success HTTP status");
            return Err(FetchFailure::from_status(status));
        }

        let body = resp.text().await.map_err(|e| classify(&e))?;
        info!(url, fetcher = "http", bytes = body.len(), "Fetched successfully");

        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
