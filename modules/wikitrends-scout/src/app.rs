use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use wikitrends_archive::{
    FileStateStore, HttpPageFetcher, PageFetcher, PartitionLocks, ProcessedStore, RawStore, StateStore,
};
use wikitrends_common::{FileConfig, Result, Topic, TrendsError};

use crate::pipeline::{ProcessPipeline, ScrapePipeline};
use crate::processor::BatchProcessor;
use crate::registry::TopicRegistry;
use crate::scraper::Scraper;
use crate::stats::{ProcessStats, ScrapeStats};
use crate::tracker::IncrementalTracker;

/// One run's wiring: config, a registry snapshot, and the stores.
pub struct App {
    config: FileConfig,
    registry: TopicRegistry,
    raw: Arc<RawStore>,
    processed: Arc<ProcessedStore>,
    tracker: Arc<IncrementalTracker>,
    fetcher: Arc<dyn PageFetcher>,
}

impl App {
    /// Production wiring with the HTTP fetcher.
    pub async fn open(config: FileConfig) -> Result<Self> {
        let fetcher = HttpPageFetcher::new(&config.scrape.user_agent, config.scrape.request_timeout())?
            .with_rate_limit(config.scrape.rate_limit());
        Self::with_fetcher(config, Arc::new(fetcher)).await
    }

    pub async fn with_fetcher(config: FileConfig, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        let registry = TopicRegistry::load(&config.storage.topics_file).await?;
        let state: Arc<dyn StateStore> = Arc::new(FileStateStore::open(&config.storage.state_file).await?);
        Ok(Self::from_parts(config, registry, state, fetcher))
    }

    pub fn from_parts(
        config: FileConfig,
        registry: TopicRegistry,
        state: Arc<dyn StateStore>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let locks = PartitionLocks::new();
        Self {
            raw: Arc::new(RawStore::with_locks(&config.storage.raw_dir, locks)),
            processed: Arc::new(ProcessedStore::new(&config.storage.processed_dir)),
            tracker: Arc::new(IncrementalTracker::new(state)),
            registry,
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    pub fn registry(&self) -> &TopicRegistry {
        &self.registry
    }

    pub fn tracker(&self) -> &Arc<IncrementalTracker> {
        &self.tracker
    }

    pub fn raw_store(&self) -> &Arc<RawStore> {
        &self.raw
    }

    pub fn processed_store(&self) -> &Arc<ProcessedStore> {
        &self.processed
    }

    /// The named topics in registry order, or every topic when `names` is empty.
    pub fn select_topics(&self, names: &[String]) -> Result<Vec<Topic>> {
        if let Some(unknown) = names.iter().find(|n| self.registry.get(n).is_none()) {
            return Err(TrendsError::NotFound(unknown.clone()));
        }
        Ok(self
            .registry
            .list()
            .iter()
            .filter(|t| names.is_empty() || names.contains(&t.name))
            .cloned()
            .collect())
    }

    pub async fn scrape(&self, names: &[String], now: DateTime<Utc>) -> Result<ScrapeStats> {
        let topics = self.select_topics(names)?;
        let scraper = Arc::new(Scraper::new(
            self.fetcher.clone(),
            self.tracker.clone(),
            self.config.scrape.clone(),
        ));
        let pipeline = ScrapePipeline::new(scraper, self.raw.clone(), self.config.scrape.max_concurrent);
        info!(fetcher = self.fetcher.name(), topics = topics.len(), "Scrape run starting");
        Ok(pipeline.run(&topics, now).await)
    }

    pub async fn process(&self, now: DateTime<Utc>, include_open: bool) -> Result<ProcessStats> {
        let pipeline = ProcessPipeline::new(self.processor(), self.config.process.max_concurrent);
        pipeline.run(now, include_open).await
    }

    pub fn processor(&self) -> Arc<BatchProcessor> {
        Arc::new(BatchProcessor::new(self.raw.clone(), self.processed.clone()))
    }
}
