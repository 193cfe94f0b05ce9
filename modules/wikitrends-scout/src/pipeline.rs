// Batch runs: scrape every due topic, then process landed partitions.
//
// Per-item failures are logged and collected into the run stats; one bad
// topic or partition never aborts the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use wikitrends_archive::RawStore;
use wikitrends_common::{PartitionRef, Result, Topic, TrendsError};

use crate::processor::{BatchProcessor, ProcessOutcome};
use crate::scraper::Scraper;
use crate::stats::{ProcessStats, ScrapeStats};

enum TopicOutcome {
    Scraped { bytes: u64 },
    NotDue,
    Failed(TrendsError),
}

pub struct ScrapePipeline {
    scraper: Arc<Scraper>,
    raw: Arc<RawStore>,
    max_concurrent: usize,
}

impl ScrapePipeline {
    pub fn new(scraper: Arc<Scraper>, raw: Arc<RawStore>, max_concurrent: usize) -> Self {
        Self {
            scraper,
            raw,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Scrape each topic that is due at `now`, at most `max_concurrent` at a time.
    pub async fn run(&self, topics: &[Topic], now: DateTime<Utc>) -> ScrapeStats {
        let mut stats = ScrapeStats {
            topics_total: topics.len() as u32,
            ..Default::default()
        };
        info!(topics = topics.len(), max_concurrent = self.max_concurrent, "Starting scrape run");

        let outcomes: Vec<_> = stream::iter(topics.iter().map(|topic| async move {
            (topic.name.as_str(), self.scrape_topic(topic, now).await)
        }))
        .buffer_unordered(self.max_concurrent)
        .collect()
        .await;

        for (topic, outcome) in outcomes {
            match outcome {
                TopicOutcome::Scraped { bytes } => {
                    stats.scraped += 1;
                    stats.bytes_written += bytes;
                }
                TopicOutcome::NotDue => stats.not_due += 1,
                TopicOutcome::Failed(e) => {
                    warn!(topic, kind = e.kind(), error = %e, "Topic scrape failed");
                    stats.record_failure(topic, &e);
                }
            }
        }

        info!(
            scraped = stats.scraped,
            not_due = stats.not_due,
            failed = stats.failed,
            "Scrape run finished"
        );
        stats
    }

    /// fetch -> write -> commit, strictly in that order. Nothing is committed
    /// unless the record landed.
    async fn scrape_topic(&self, topic: &Topic, now: DateTime<Utc>) -> TopicOutcome {
        let record = match self.scraper.fetch(topic, now).await {
            Ok(record) => record,
            Err(TrendsError::NotDue(_)) => {
                info!(topic = topic.name.as_str(), "Not due, skipping");
                return TopicOutcome::NotDue;
            }
            Err(e) => return TopicOutcome::Failed(e),
        };

        let path = match self.raw.write(&record).await {
            Ok(path) => path,
            Err(e) => return TopicOutcome::Failed(e),
        };
        let bytes = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);

        // A failed commit leaves the topic due; the next run re-scrapes it.
        if let Err(e) = self
            .scraper
            .tracker()
            .commit(&topic.name, record.scraped_at)
            .await
        {
            return TopicOutcome::Failed(e);
        }

        TopicOutcome::Scraped { bytes }
    }
}

pub struct ProcessPipeline {
    processor: Arc<BatchProcessor>,
    max_concurrent: usize,
}

impl ProcessPipeline {
    pub fn new(processor: Arc<BatchProcessor>, max_concurrent: usize) -> Self {
        Self {
            processor,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Process every pending partition. Errors only if the pending set
    /// cannot be determined.
    pub async fn run(&self, now: DateTime<Utc>, include_open: bool) -> Result<ProcessStats> {
        let pending = self.processor.pending(now, include_open).await?;
        Ok(self.run_partitions(&pending).await)
    }

    pub async fn run_partitions(&self, partitions: &[PartitionRef]) -> ProcessStats {
        let mut stats = ProcessStats {
            partitions_pending: partitions.len() as u32,
            ..Default::default()
        };

        let results: Vec<(&PartitionRef, Result<ProcessOutcome>)> =
            stream::iter(partitions.iter().map(|partition| async move {
                (
                    partition,
                    self.processor.process(&partition.topic, partition.key).await,
                )
            }))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for (partition, result) in results {
            match result {
                Ok(outcome) => {
                    stats.processed += 1;
                    stats.records_processed += outcome.records_processed as u64;
                    stats.records_skipped += outcome.records_skipped as u64;
                }
                Err(e) => {
                    warn!(partition = %partition, kind = e.kind(), error = %e, "Partition processing failed");
                    stats.record_failure(partition, &e);
                }
            }
        }

        info!(
            processed = stats.processed,
            skipped_records = stats.records_skipped,
            failed = stats.failed,
            "Processing run finished"
        );
        stats
    }
}
