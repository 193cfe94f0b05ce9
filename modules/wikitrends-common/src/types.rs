use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TrendsError;

// =============================================================================
// Topics and checkpoints
// =============================================================================

/// A tracked subject (a Wikipedia article) whose trend signals are collected over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique identifier. Doubles as the top-level directory in the stores.
    pub name: String,
    /// Absolute page URL, or an article title resolved against the wiki base URL.
    pub source_locator: String,
    pub added_at: DateTime<Utc>,
}

impl Topic {
    pub fn new(name: impl Into<String>, source_locator: impl Into<String>, added_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            source_locator: source_locator.into(),
            added_at,
        }
    }
}

/// Topic names become directory names, so anything that could escape or
/// hide inside the store layout is rejected.
pub fn validate_topic_name(name: &str) -> Result<(), TrendsError> {
    let reason = if name.trim().is_empty() {
        Some("name is empty")
    } else if name != name.trim() {
        Some("name has leading or trailing whitespace")
    } else if name.contains('/') || name.contains('\\') {
        Some("name contains a path separator")
    } else if name.starts_with('.') {
        Some("name starts with a dot")
    } else if name.chars().any(char::is_control) {
        Some("name contains control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(TrendsError::InvalidTopic {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// The last time a topic was successfully scraped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub topic_name: String,
    pub last_scraped_at: DateTime<Utc>,
}

// =============================================================================
// Partitions
// =============================================================================

/// A UTC calendar day. Rendered as `year=YYYY/month=MM/day=DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(NaiveDate);

/// Map a timestamp to the partition it lands in. Independent of storage backend.
pub fn partition_for(ts: DateTime<Utc>) -> PartitionKey {
    PartitionKey(ts.date_naive())
}

impl PartitionKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    /// The three directory segments, in order.
    pub fn segments(&self) -> [String; 3] {
        [
            format!("year={:04}", self.year()),
            format!("month={:02}", self.month()),
            format!("day={:02}", self.day()),
        ]
    }

    /// Relative path of the partition directory.
    pub fn relative_path(&self) -> PathBuf {
        self.segments().iter().collect()
    }

    /// Parse a single `name=value` directory segment.
    pub fn parse_segment(segment: &str, name: &str) -> Option<u32> {
        let value = segment.strip_prefix(name)?.strip_prefix('=')?;
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        value.parse().ok()
    }

    /// Rebuild a key from its three directory segments.
    pub fn from_segments(year: &str, month: &str, day: &str) -> Option<Self> {
        let y = Self::parse_segment(year, "year")?;
        let m = Self::parse_segment(month, "month")?;
        let d = Self::parse_segment(day, "day")?;
        Self::from_ymd(i32::try_from(y).ok()?, m, d)
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [y, m, d] = self.segments();
        write!(f, "{y}/{m}/{d}")
    }
}

impl FromStr for PartitionKey {
    type Err = TrendsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        let key = match parts.as_slice() {
            [y, m, d] => Self::from_segments(y, m, d),
            _ => None,
        };
        key.ok_or_else(|| TrendsError::Config(format!("malformed partition key: {s}")))
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = TrendsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.to_string()
    }
}

/// One topic's partition: the unit of raw writes and batch processing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionRef {
    pub topic: String,
    pub key: PartitionKey,
}

impl PartitionRef {
    pub fn new(topic: impl Into<String>, key: PartitionKey) -> Self {
        Self {
            topic: topic.into(),
            key,
        }
    }

    /// `<topic>/year=YYYY/month=MM/day=DD`
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.topic).join(self.key.relative_path())
    }
}

impl fmt::Display for PartitionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.key)
    }
}

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Every day in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        let end = self.end;
        std::iter::successors((!self.is_empty()).then_some(self.start), move |d| {
            d.succ_opt().filter(|next| *next <= end)
        })
    }
}

// =============================================================================
// Records
// =============================================================================

/// Stable record id derived from the scrape instant. Sorts chronologically,
/// and rewriting the same record lands on the same id.
pub fn record_id(scraped_at: DateTime<Utc>) -> String {
    scraped_at.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}

/// Unprocessed fetched content. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub topic_name: String,
    pub scraped_at: DateTime<Utc>,
    pub partition_key: PartitionKey,
    pub payload: serde_json::Value,
}

impl RawRecord {
    pub fn new(topic_name: impl Into<String>, scraped_at: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self {
            topic_name: topic_name.into(),
            scraped_at,
            partition_key: partition_for(scraped_at),
            payload,
        }
    }

    pub fn id(&self) -> String {
        record_id(self.scraped_at)
    }

    pub fn partition(&self) -> PartitionRef {
        PartitionRef::new(self.topic_name.clone(), self.partition_key)
    }
}

/// What the Wikipedia scraper stores as a raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePayload {
    pub title: String,
    pub url: String,
    pub content: String,
    pub content_length: usize,
    pub content_hash: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub revision_id: Option<u64>,
    pub http_status: u16,
}

/// Derived trend metrics for one partition.
///
/// Carries no wall-clock field: reprocessing the same inputs is byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRecord {
    pub topic_name: String,
    pub partition_key: PartitionKey,
    pub derived_metrics: BTreeMap<String, f64>,
    pub records_processed: usize,
    pub records_skipped: usize,
    /// Sorted ids of the raw records this output was computed from.
    pub source_records: Vec<String>,
}

/// SHA-256 of the text, hex encoded.
pub fn content_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(text.as_bytes()))
}
