use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{info, warn};

use wikitrends_archive::{parse_page, resolve_locator, FetchFailure, FetchedPage, PageFetcher};
use wikitrends_common::{RawRecord, Result, ScrapeConfig, Topic, TrendsError};

use crate::tracker::IncrementalTracker;

/// Upper bound on random jitter added to each retry delay.
const RETRY_JITTER_MS: u64 = 250;

/// Fetches one topic's article and turns it into a raw record.
///
/// Never commits: the pipeline commits only after the record has landed.
pub struct Scraper {
    fetcher: Arc<dyn PageFetcher>,
    tracker: Arc<IncrementalTracker>,
    config: ScrapeConfig,
}

impl Scraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, tracker: Arc<IncrementalTracker>, config: ScrapeConfig) -> Self {
        Self {
            fetcher,
            tracker,
            config,
        }
    }

    pub fn tracker(&self) -> &Arc<IncrementalTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// `NotDue` when the tracker says skip, `FetchError` on any network, HTTP,
    /// parse or timeout failure. `now` becomes the record's `scraped_at`.
    pub async fn fetch(&self, topic: &Topic, now: DateTime<Utc>) -> Result<RawRecord> {
        if !self
            .tracker
            .due(&topic.name, now, self.config.min_interval())
            .await?
        {
            return Err(TrendsError::NotDue(topic.name.clone()));
        }

        let url = resolve_locator(&topic.source_locator, &self.config.wiki_base_url)?;
        let timeout = self.config.fetch_timeout();
        let page = match tokio::time::timeout(timeout, self.get_with_retry(&url)).await {
            Ok(result) => result.map_err(|failure| failure.into_error(&url))?,
            Err(_) => {
                return Err(TrendsError::fetch(
                    &url,
                    format!("timed out after {}s", timeout.as_secs()),
                ))
            }
        };

        let payload = parse_page(&page.body, &page.url, page.status);
        if payload.content.is_empty() {
            return Err(TrendsError::fetch(&url, "no article content found"));
        }
        info!(
            topic = topic.name.as_str(),
            title = payload.title.as_str(),
            content_length = payload.content_length,
            links = payload.links.len(),
            "Article parsed"
        );

        let payload = serde_json::to_value(&payload)
            .map_err(|e| TrendsError::fetch(&url, format!("unserializable payload: {e}")))?;
        Ok(RawRecord::new(topic.name.clone(), now, payload))
    }

    /// Bounded retry of transient failures, delay `retry_base * 3^attempt` plus jitter.
    async fn get_with_retry(&self, url: &str) -> std::result::Result<FetchedPage, FetchFailure> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match self.fetcher.get(url).await {
                Ok(page) => return Ok(page),
                Err(failure) if failure.is_transient() && attempt + 1 < max_attempts => {
                    let delay = backoff(self.config.retry_base(), attempt);
                    warn!(
                        url,
                        fetcher = self.fetcher.name(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Transient fetch failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

fn backoff(base: Duration, attempt: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    let jitter = Duration::from_millis(rand::rng().random_range(0..RETRY_JITTER_MS));
    base.saturating_mul(3u32.saturating_pow(attempt)) + jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{article_html, MockFetcher};
    use chrono::TimeZone;
    use wikitrends_archive::MemoryStateStore;
    use wikitrends_common::PagePayload;

    const URL: &str = "https://en.wikipedia.org/wiki/Rust_(programming_language)";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()
    }

    fn topic() -> Topic {
        Topic::new("Rust", "Rust (programming language)", now())
    }

    fn config() -> ScrapeConfig {
        ScrapeConfig {
            retry_base_ms: 0,
            ..ScrapeConfig::default()
        }
    }

    fn scraper(fetcher: Arc<MockFetcher>, config: ScrapeConfig) -> Scraper {
        let tracker = Arc::new(IncrementalTracker::new(Arc::new(MemoryStateStore::new())));
        Scraper::new(fetcher, tracker, config)
    }

    #[tokio::test]
    async fn title_locator_resolves_and_record_is_stamped_with_now() {
        let fetcher = Arc::new(MockFetcher::new().on_page(URL, article_html("Rust", "Rust is fast.", 7)));
        let scraper = scraper(fetcher.clone(), config());

        let record = scraper.fetch(&topic(), now()).await.unwrap();

        assert_eq!(record.topic_name, "Rust");
        assert_eq!(record.scraped_at, now());
        let payload: PagePayload = serde_json::from_value(record.payload).unwrap();
        assert_eq!(payload.title, "Rust");
        assert_eq!(payload.revision_id, Some(7));
        assert!(payload.content.contains("Rust is fast."));
        assert_eq!(fetcher.calls(URL), 1);
    }

    #[tokio::test]
    async fn not_due_topic_is_not_fetched() {
        let fetcher = Arc::new(MockFetcher::new().on_page(URL, article_html("Rust", "text", 1)));
        let scraper = scraper(fetcher.clone(), config());
        scraper.tracker().commit("Rust", now()).await.unwrap();

        let err = scraper.fetch(&topic(), now()).await.unwrap_err();
        assert!(matches!(err, TrendsError::NotDue(name) if name == "Rust"));
        assert_eq!(fetcher.calls(URL), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .fail_next(URL, FetchFailure::from_status(503))
                .fail_next(URL, FetchFailure::transient(None, "connection reset"))
                .on_page(URL, article_html("Rust", "text", 1)),
        );
        let scraper = scraper(fetcher.clone(), config());

        scraper.fetch(&topic(), now()).await.unwrap();
        assert_eq!(fetcher.calls(URL), 3);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .fail_next(URL, FetchFailure::from_status(503))
                .fail_next(URL, FetchFailure::from_status(503))
                .on_page(URL, article_html("Rust", "text", 1)),
        );
        let scraper = scraper(
            fetcher.clone(),
            ScrapeConfig {
                max_attempts: 2,
                ..config()
            },
        );

        let err = scraper.fetch(&topic(), now()).await.unwrap_err();
        assert!(matches!(err, TrendsError::FetchError { status: Some(503), .. }));
        assert_eq!(fetcher.calls(URL), 2);
    }

    #[tokio::test]
    async fn client_errors_fail_without_retry() {
        let fetcher = Arc::new(MockFetcher::new().fail_next(URL, FetchFailure::from_status(404)));
        let scraper = scraper(fetcher.clone(), config());

        let err = scraper.fetch(&topic(), now()).await.unwrap_err();
        match err {
            TrendsError::FetchError { url, status, .. } => {
                assert_eq!(url, URL);
                assert_eq!(status, Some(404));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(fetcher.calls(URL), 1);
    }

    #[tokio::test]
    async fn page_without_article_content_is_a_fetch_error() {
        let fetcher = Arc::new(MockFetcher::new().on_page(URL, "<html><body>maintenance</body></html>"));
        let scraper = scraper(fetcher, config());

        let err = scraper.fetch(&topic(), now()).await.unwrap_err();
        assert!(matches!(err, TrendsError::FetchError { .. }));
    }

    #[tokio::test]
    async fn unsupported_scheme_is_a_fetch_error() {
        let fetcher = Arc::new(MockFetcher::new());
        let scraper = scraper(fetcher, config());
        let topic = Topic::new("Rust", "ftp://example.org/rust", now());

        let err = scraper.fetch(&topic, now()).await.unwrap_err();
        assert!(matches!(err, TrendsError::FetchError { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .on_page(URL, article_html("Rust", "text", 1))
                .with_delay(Duration::from_secs(120)),
        );
        let scraper = scraper(
            fetcher,
            ScrapeConfig {
                fetch_timeout_secs: 5,
                ..config()
            },
        );

        let err = scraper.fetch(&topic(), now()).await.unwrap_err();
        match err {
            TrendsError::FetchError { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn backoff_grows_by_powers_of_three() {
        let base = Duration::from_millis(100);
        let jitter = Duration::from_millis(RETRY_JITTER_MS);
        for (attempt, factor) in [(0, 1), (1, 3), (2, 9)] {
            let delay = backoff(base, attempt);
            assert!(delay >= base * factor);
            assert!(delay < base * factor + jitter);
        }
        assert_eq!(backoff(Duration::ZERO, 4), Duration::ZERO);
    }
}
