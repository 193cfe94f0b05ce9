// Partitioned raw record store on the local filesystem.
//
// Layout: <root>/<topic>/year=YYYY/month=MM/day=DD/<record_id>.json

use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use chrono::{Months, NaiveDate};
use tracing::{debug, info, warn};

use wikitrends_common::{
    validate_topic_name, DateRange, PartitionKey, PartitionRef, RawRecord, Result, TrendsError,
};

use crate::fs::{record_file_id, write_atomic, RECORD_EXT};
use crate::locks::PartitionLocks;

pub struct RawStore {
    root: PathBuf,
    locks: PartitionLocks,
}

impl RawStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_locks(root, PartitionLocks::new())
    }

    /// Share a lock table with other partition users (the batch processor).
    pub fn with_locks(root: impl Into<PathBuf>, locks: PartitionLocks) -> Self {
        Self {
            root: root.into(),
            locks,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn locks(&self) -> &PartitionLocks {
        &self.locks
    }

    pub fn partition_dir(&self, partition: &PartitionRef) -> PathBuf {
        self.root.join(partition.relative_path())
    }

    pub fn record_path(&self, record: &RawRecord) -> PathBuf {
        self.partition_dir(&record.partition())
            .join(format!("{}{RECORD_EXT}", record.id()))
    }

    /// Land a record. Serialized per partition; the file appears atomically.
    /// Rewriting an identical record replaces the same file.
    pub async fn write(&self, record: &RawRecord) -> Result<PathBuf> {
        validate_topic_name(&record.topic_name)?;
        let partition = record.partition();
        let path = self.record_path(record);
        let bytes = serde_json::to_vec_pretty(record).map_err(|e| {
            TrendsError::write(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        let _guard = self.locks.lock(&partition).await;
        write_atomic(&path, &bytes).await?;

        info!(
            topic = record.topic_name.as_str(),
            partition = %record.partition_key,
            record_id = %record.id(),
            bytes = bytes.len(),
            "Raw record landed"
        );
        Ok(path)
    }

    /// Lazily walk `range` day by day, yielding partitions that hold at least
    /// one landed record. Finite, and restartable via `PartitionIter::resume_after`.
    ///
    /// The iterator reads the filesystem synchronously; async callers go
    /// through [`RawStore::landed_partitions`].
    pub fn list_partitions(&self, topic: &str, range: DateRange) -> Result<PartitionIter> {
        validate_topic_name(topic)?;
        Ok(PartitionIter {
            topic_dir: self.root.join(topic),
            next_day: (!range.is_empty()).then_some(range.start),
            end: range.end,
        })
    }

    /// Collect `list_partitions` on the blocking pool.
    pub async fn landed_partitions(&self, topic: &str, range: DateRange) -> Result<Vec<PartitionKey>> {
        let iter = self.list_partitions(topic, range)?;
        let topic_dir = iter.topic_dir.clone();
        tokio::task::spawn_blocking(move || iter.collect())
            .await
            .map_err(|e| TrendsError::read(topic_dir, std::io::Error::other(e)))
    }

    /// Calendar days covered by a topic's month directories, from the first
    /// day of the earliest month to the last day of the latest. `None` when
    /// nothing has landed.
    pub async fn span(&self, topic: &str) -> Result<Option<DateRange>> {
        validate_topic_name(topic)?;
        let topic_dir = self.root.join(topic);
        let mut months = Vec::new();
        for year in subdirectories(&topic_dir).await? {
            let Some(y) = PartitionKey::parse_segment(&year, "year").and_then(|y| i32::try_from(y).ok()) else {
                warn!(topic, year = year.as_str(), "Skipping unrecognized year directory");
                continue;
            };
            for month in subdirectories(&topic_dir.join(&year)).await? {
                match PartitionKey::parse_segment(&month, "month")
                    .and_then(|m| NaiveDate::from_ymd_opt(y, m, 1))
                {
                    Some(first) => months.push(first),
                    None => warn!(topic, year = year.as_str(), month = month.as_str(), "Skipping unrecognized month directory"),
                }
            }
        }
        let (Some(first), Some(last)) = (months.iter().min(), months.iter().max()) else {
            return Ok(None);
        };
        let end = last
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        Ok(Some(DateRange::new(*first, end)))
    }

    /// Record ids landed in a partition, sorted. Missing partition -> empty.
    pub async fn record_ids(&self, partition: &PartitionRef) -> Result<Vec<String>> {
        let dir = self.partition_dir(partition);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(TrendsError::read(&dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TrendsError::read(&dir, e))?
        {
            let name = entry.file_name();
            let Some(id) = record_file_id(&name.to_string_lossy()).map(str::to_string) else {
                continue;
            };
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Every landed record in a partition, sorted by id. A file that cannot be
    /// read or parsed yields an error entry; the rest are still returned.
    pub async fn read_partition(
        &self,
        partition: &PartitionRef,
    ) -> Result<Vec<(String, Result<RawRecord>)>> {
        let dir = self.partition_dir(partition);
        let mut out = Vec::new();
        for id in self.record_ids(partition).await? {
            let path = dir.join(format!("{id}{RECORD_EXT}"));
            let parsed = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<RawRecord>(&bytes).map_err(|e| {
                    TrendsError::processing(format!("{partition}/{id}"), format!("malformed record: {e}"))
                }),
                Err(e) => Err(TrendsError::read(&path, e)),
            };
            out.push((id, parsed));
        }
        debug!(partition = %partition, records = out.len(), "Read raw partition");
        Ok(out)
    }

    /// Topic directories present in the store, sorted.
    pub async fn topics(&self) -> Result<Vec<String>> {
        let mut topics = subdirectories(&self.root).await?;
        topics.retain(|name| validate_topic_name(name).is_ok());
        Ok(topics)
    }

    /// Every partition of a topic that holds at least one record, sorted.
    pub async fn partitions(&self, topic: &str) -> Result<Vec<PartitionKey>> {
        match self.span(topic).await? {
            Some(range) => self.landed_partitions(topic, range).await,
            None => Ok(Vec::new()),
        }
    }
}

/// Sorted names of the directories directly under `dir`. Missing dir -> empty.
async fn subdirectories(dir: &Path) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(TrendsError::read(dir, e)),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| TrendsError::read(dir, e))?
    {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

fn holds_records(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(entries) => entries.flatten().any(|entry| {
            entry.file_type().map(|t| t.is_file()).unwrap_or(false)
                && record_file_id(&entry.file_name().to_string_lossy()).is_some()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Unreadable partition directory");
            false
        }
    }
}

/// Day-by-day walk over a topic's partitions. Each `next` inspects one
/// directory at a time, so nothing is listed up front.
#[derive(Debug, Clone)]
pub struct PartitionIter {
    topic_dir: PathBuf,
    next_day: Option<NaiveDate>,
    end: NaiveDate,
}

impl PartitionIter {
    /// Continue from the day after `key`, e.g. after a crash mid-iteration.
    pub fn resume_after(mut self, key: PartitionKey) -> Self {
        let after = key.date().succ_opt();
        self.next_day = match (self.next_day, after) {
            (Some(current), Some(after)) => Some(current.max(after)),
            _ => None,
        }
        .filter(|d| *d <= self.end);
        self
    }
}

impl Iterator for PartitionIter {
    type Item = PartitionKey;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let day = self.next_day?;
            self.next_day = day.succ_opt().filter(|d| *d <= self.end);
            let key = PartitionKey::from_date(day);
            if holds_records(&self.topic_dir.join(key.relative_path())) {
                return Some(key);
            }
        }
    }
}

impl FusedIterator for PartitionIter {}
