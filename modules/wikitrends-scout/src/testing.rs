// Test doubles and fixtures for network-free pipeline tests.
//
// - MockFetcher (PageFetcher): URL -> HTML map, queued one-shot failures, call counts
// - article_html: minimal rendered-article markup the extractor understands
// - page_payload / page_record: raw records without going through a fetch

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use wikitrends_archive::{FetchFailure, FetchedPage, PageFetcher};
use wikitrends_common::{content_hash, PagePayload, RawRecord};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// HashMap-based page fetcher. Unregistered URLs fail with a permanent 404.
/// Builder pattern: `.on_page()`, `.fail_next()`, `.with_delay()`.
#[derive(Default)]
pub struct MockFetcher {
    pages: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, VecDeque<FetchFailure>>>,
    calls: Mutex<HashMap<String, usize>>,
    delay: Option<Duration>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_page(self, url: &str, html: impl Into<String>) -> Self {
        self.set_page(url, html);
        self
    }

    /// Queue a failure returned before the page on the next call for `url`.
    pub fn fail_next(self, url: &str, failure: FetchFailure) -> Self {
        self.push_failure(url, failure);
        self
    }

    /// Sleep this long inside every `get`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace a page's HTML, e.g. to simulate an edit between runs.
    pub fn set_page(&self, url: &str, html: impl Into<String>) {
        lock(&self.pages).insert(url.to_string(), html.into());
    }

    pub fn push_failure(&self, url: &str, failure: FetchFailure) {
        lock(&self.failures)
            .entry(url.to_string())
            .or_default()
            .push_back(failure);
    }

    /// Number of `get` calls made for `url`.
    pub fn calls(&self, url: &str) -> usize {
        lock(&self.calls).get(url).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).values().sum()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait]
impl PageFetcher for MockFetcher {
    async fn get(&self, url: &str) -> Result<FetchedPage, FetchFailure> {
        *lock(&self.calls).entry(url.to_string()).or_default() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = lock(&self.failures).get_mut(url).and_then(VecDeque::pop_front) {
            return Err(failure);
        }
        match lock(&self.pages).get(url) {
            Some(body) => Ok(FetchedPage {
                url: url.to_string(),
                status: 200,
                body: body.clone(),
            }),
            None => Err(FetchFailure::from_status(404)),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A rendered article with a heading, body paragraph, one internal link and
/// one category.
pub fn article_html(title: &str, body: &str, revision_id: u64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html><head><title>{title} - Wikipedia</title>
<script>RLCONF={{"wgRevisionId":{revision_id}}};</script>
</head><body>
<h1 id="firstHeading" class="firstHeading">{title}</h1>
<div id="mw-content-text" class="mw-body-content"><div class="mw-parser-output">
<p>{body}</p>
<p>See also <a href="/wiki/Computer_science">computer science</a>.</p>
</div></div>
<div id="catlinks" class="catlinks"><div id="mw-normal-catlinks" class="mw-normal-catlinks"><ul><li><a href="/wiki/Category:{title}">{title}</a></li></ul></div></div>
</body></html>"#
    )
}

/// Payload as the scraper would store it for `content`.
pub fn page_payload(title: &str, content: &str, revision_id: Option<u64>) -> PagePayload {
    PagePayload {
        title: title.to_string(),
        url: format!("https://en.wikipedia.org/wiki/{}", title.replace(' ', "_")),
        content: content.to_string(),
        content_length: content.chars().count(),
        content_hash: content_hash(content),
        categories: Vec::new(),
        links: Vec::new(),
        revision_id,
        http_status: 200,
    }
}

pub fn page_record(topic: &str, scraped_at: DateTime<Utc>, payload: &PagePayload) -> RawRecord {
    let value = serde_json::to_value(payload).unwrap_or_default();
    RawRecord::new(topic, scraped_at, value)
}
