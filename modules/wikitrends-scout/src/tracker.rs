use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use wikitrends_archive::StateStore;
use wikitrends_common::{Checkpoint, Result};

/// Decides whether a topic is due, from its last successful checkpoint.
///
/// Commits happen only after a raw write succeeds, so a crash in between
/// leaves a missing or stale checkpoint and the topic is simply re-scraped.
pub struct IncrementalTracker {
    store: Arc<dyn StateStore>,
}

impl IncrementalTracker {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub async fn checkpoint(&self, topic: &str) -> Result<Option<Checkpoint>> {
        self.store.load(topic).await
    }

    pub async fn due(&self, topic: &str, now: DateTime<Utc>, min_interval: Duration) -> Result<bool> {
        let checkpoint = self.store.load(topic).await?;
        Ok(is_due(checkpoint.as_ref(), now, min_interval))
    }

    /// Record a successful scrape, overwriting any previous checkpoint.
    pub async fn commit(&self, topic: &str, at: DateTime<Utc>) -> Result<()> {
        self.store
            .save(&Checkpoint {
                topic_name: topic.to_string(),
                last_scraped_at: at,
            })
            .await
    }
}

/// Due when never scraped, or when `min_interval` has elapsed since the checkpoint.
pub fn is_due(checkpoint: Option<&Checkpoint>, now: DateTime<Utc>, min_interval: Duration) -> bool {
    match checkpoint {
        None => true,
        Some(c) => now - c.last_scraped_at >= min_interval,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wikitrends_archive::MemoryStateStore;

    fn tracker() -> IncrementalTracker {
        IncrementalTracker::new(Arc::new(MemoryStateStore::new()))
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn due_before_any_checkpoint() {
        let tracker = tracker();
        for interval in [Duration::zero(), Duration::hours(1), Duration::days(365)] {
            assert!(tracker.due("Rust", at(1, 0), interval).await.unwrap());
        }
    }

    #[tokio::test]
    async fn not_due_at_commit_time_for_positive_interval() {
        let tracker = tracker();
        let t = at(1, 8);
        tracker.commit("Rust", t).await.unwrap();
        for interval in [Duration::seconds(1), Duration::hours(24), Duration::days(30)] {
            assert!(!tracker.due("Rust", t, interval).await.unwrap());
        }
    }

    #[tokio::test]
    async fn becomes_due_once_interval_elapses() {
        let tracker = tracker();
        let t = at(1, 8);
        let interval = Duration::hours(24);
        tracker.commit("Rust", t).await.unwrap();

        assert!(!tracker.due("Rust", t + interval - Duration::seconds(1), interval).await.unwrap());
        assert!(tracker.due("Rust", t + interval, interval).await.unwrap());
        assert!(tracker.due("Rust", t + interval * 2, interval).await.unwrap());
    }

    #[tokio::test]
    async fn daily_run_starting_slightly_earlier_is_still_due() {
        let tracker = tracker();
        let interval = wikitrends_common::ScrapeConfig::default().min_interval();
        tracker
            .commit("Rust", Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 1).unwrap())
            .await
            .unwrap();

        assert!(tracker.due("Rust", at(2, 8), interval).await.unwrap());
        assert!(tracker.due("Rust", at(2, 6), interval).await.unwrap());
        assert!(!tracker.due("Rust", at(1, 20), interval).await.unwrap());
    }

    #[tokio::test]
    async fn commit_overwrites() {
        let tracker = tracker();
        tracker.commit("Rust", at(1, 0)).await.unwrap();
        tracker.commit("Rust", at(2, 0)).await.unwrap();
        let checkpoint = tracker.checkpoint("Rust").await.unwrap().unwrap();
        assert_eq!(checkpoint.last_scraped_at, at(2, 0));
    }

    #[tokio::test]
    async fn checkpoints_are_per_topic() {
        let tracker = tracker();
        tracker.commit("Rust", at(1, 0)).await.unwrap();
        assert!(tracker.due("Go", at(1, 0), Duration::hours(1)).await.unwrap());
    }
}
