pub mod metrics;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use wikitrends_archive::{ProcessedStore, RawStore};
use wikitrends_common::{
    validate_topic_name, PagePayload, PartitionKey, PartitionRef, ProcessedRecord, RawRecord, Result,
    TrendsError,
};

pub use metrics::{default_aggregations, Aggregation};

/// One parsed raw record, as the aggregations see it.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub record_id: String,
    pub scraped_at: DateTime<Utc>,
    pub page: PagePayload,
}

impl Snapshot {
    /// Validate a raw record against the partition it was read from.
    fn from_record(partition: &PartitionRef, record_id: &str, record: RawRecord) -> Result<Self> {
        let target = format!("{partition}/{record_id}");
        if record.topic_name != partition.topic || record.partition_key != partition.key {
            return Err(TrendsError::processing(
                target,
                format!("record belongs to {}", record.partition()),
            ));
        }
        if record.id() != record_id {
            return Err(TrendsError::processing(
                target,
                format!("scraped_at does not match file name ({})", record.id()),
            ));
        }
        let page: PagePayload = serde_json::from_value(record.payload)
            .map_err(|e| TrendsError::processing(&target, format!("payload is not a page: {e}")))?;
        Ok(Self {
            record_id: record_id.to_string(),
            scraped_at: record.scraped_at,
            page,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub partition: PartitionRef,
    pub path: PathBuf,
    pub records_processed: usize,
    pub records_skipped: usize,
}

/// Turns raw partitions into processed metrics. Stateless between calls;
/// reprocessing the same inputs rewrites byte-identical output.
pub struct BatchProcessor {
    raw: Arc<RawStore>,
    processed: Arc<ProcessedStore>,
    aggregations: Vec<Box<dyn Aggregation>>,
}

impl BatchProcessor {
    pub fn new(raw: Arc<RawStore>, processed: Arc<ProcessedStore>) -> Self {
        Self::with_aggregations(raw, processed, default_aggregations())
    }

    pub fn with_aggregations(
        raw: Arc<RawStore>,
        processed: Arc<ProcessedStore>,
        aggregations: Vec<Box<dyn Aggregation>>,
    ) -> Self {
        Self {
            raw,
            processed,
            aggregations,
        }
    }

    pub fn processed_store(&self) -> &ProcessedStore {
        &self.processed
    }

    /// Compute and write one partition's metrics, replacing prior output.
    ///
    /// `MissingInput` for an empty or absent partition (nothing written).
    /// Malformed records are skipped and counted; if none survive the
    /// partition fails with `ProcessingError`.
    pub async fn process(&self, topic: &str, key: PartitionKey) -> Result<ProcessOutcome> {
        validate_topic_name(topic)?;
        let partition = PartitionRef::new(topic, key);
        let _guard = self.raw.locks().lock(&partition).await;

        let entries = self.raw.read_partition(&partition).await?;
        if entries.is_empty() {
            return Err(TrendsError::MissingInput(partition.to_string()));
        }

        let mut source_records = Vec::with_capacity(entries.len());
        let mut snapshots = Vec::with_capacity(entries.len());
        let mut skipped = 0;
        for (id, parsed) in entries {
            match parsed.and_then(|record| Snapshot::from_record(&partition, &id, record)) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => {
                    warn!(partition = %partition, record_id = id.as_str(), error = %e, "Skipping malformed record");
                    skipped += 1;
                }
            }
            source_records.push(id);
        }
        if snapshots.is_empty() {
            return Err(TrendsError::processing(
                &partition,
                format!("all {skipped} records are malformed"),
            ));
        }

        let mut derived_metrics = BTreeMap::new();
        for aggregation in &self.aggregations {
            for (name, value) in aggregation.compute(&snapshots) {
                if value.is_finite() {
                    derived_metrics.insert(name, value);
                } else {
                    debug!(aggregation = aggregation.name(), metric = name.as_str(), "Dropping non-finite metric");
                }
            }
        }

        let record = ProcessedRecord {
            topic_name: topic.to_string(),
            partition_key: key,
            derived_metrics,
            records_processed: snapshots.len(),
            records_skipped: skipped,
            source_records,
        };
        let path = self.processed.write(&record).await?;

        Ok(ProcessOutcome {
            partition,
            path,
            records_processed: record.records_processed,
            records_skipped: skipped,
        })
    }

    /// Landed partitions whose processed output is missing or was computed
    /// from a different set of raw records. Today's (UTC) and later
    /// partitions are still filling up and are left out unless `include_open`.
    pub async fn pending(&self, now: DateTime<Utc>, include_open: bool) -> Result<Vec<PartitionRef>> {
        let today = now.date_naive();
        let mut pending = Vec::new();
        for topic in self.raw.topics().await? {
            let Some(mut range) = self.raw.span(&topic).await? else {
                continue;
            };
            if !include_open {
                range.end = range.end.min(today.pred_opt().unwrap_or(NaiveDate::MIN));
            }
            for key in self.raw.landed_partitions(&topic, range).await? {
                let partition = PartitionRef::new(topic.clone(), key);
                let ids = self.raw.record_ids(&partition).await?;
                match self.processed.read(&partition).await {
                    Ok(Some(done)) if done.source_records == ids => continue,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(partition = %partition, error = %e, "Unreadable processed output, reprocessing");
                    }
                }
                pending.push(partition);
            }
        }
        info!(partitions = pending.len(), include_open, "Pending partitions found");
        Ok(pending)
    }
}
