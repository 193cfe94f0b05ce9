// Processed partitions mirror the raw layout, one metrics.json per partition.

use std::path::{Path, PathBuf};

use tracing::info;

use wikitrends_common::{PartitionRef, ProcessedRecord, Result, TrendsError};

use crate::fs::write_atomic;

pub const METRICS_FILE: &str = "metrics.json";

pub struct ProcessedStore {
    root: PathBuf,
}

impl ProcessedStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, partition: &PartitionRef) -> PathBuf {
        self.root.join(partition.relative_path()).join(METRICS_FILE)
    }

    /// Canonical byte encoding. Same record, same bytes.
    pub fn encode(record: &ProcessedRecord) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(record).map_err(|e| {
            TrendsError::processing(&record.topic_name, format!("unserializable metrics: {e}"))
        })?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Replace the partition's output atomically.
    pub async fn write(&self, record: &ProcessedRecord) -> Result<PathBuf> {
        let partition = PartitionRef::new(record.topic_name.clone(), record.partition_key);
        let path = self.path(&partition);
        let bytes = Self::encode(record)?;
        write_atomic(&path, &bytes).await?;
        info!(
            partition = %partition,
            metrics = record.derived_metrics.len(),
            records = record.records_processed,
            "Processed partition written"
        );
        Ok(path)
    }

    /// The partition's current output, if any.
    pub async fn read(&self, partition: &PartitionRef) -> Result<Option<ProcessedRecord>> {
        let path = self.path(partition);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TrendsError::read(&path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| TrendsError::processing(partition, format!("malformed processed output: {e}")))
    }
}
