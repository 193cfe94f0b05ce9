use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TrendsError;

/// TOML-backed configuration loaded from disk. Every field has a default,
/// so an empty file is a valid config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub storage: StorageConfig,
    pub scrape: ScrapeConfig,
    pub process: ProcessConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
    pub state_file: PathBuf,
    pub topics_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::rooted_at(Path::new("data"), Path::new("topics.toml"))
    }
}

impl StorageConfig {
    /// Standard layout under one data directory.
    pub fn rooted_at(data_dir: &Path, topics_file: &Path) -> Self {
        Self {
            raw_dir: data_dir.join("raw"),
            processed_dir: data_dir.join("processed"),
            state_file: data_dir.join("state").join("checkpoints.json"),
            topics_file: topics_file.to_path_buf(),
        }
    }

    /// Resolve relative paths against `base` (the config file's directory).
    pub fn resolve(&mut self, base: &Path) {
        for path in [
            &mut self.raw_dir,
            &mut self.processed_dir,
            &mut self.state_file,
            &mut self.topics_file,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScrapeConfig {
    /// Minimum time between two scrapes of the same topic. Below 24 so a
    /// daily run that starts a little earlier than yesterday's is still due.
    pub min_interval_hours: u64,
    /// Topics fetched concurrently.
    pub max_concurrent: usize,
    /// Upper bound on one topic's fetch, retries included.
    pub fetch_timeout_secs: u64,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Minimum spacing between successive requests.
    pub rate_limit_ms: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub user_agent: String,
    /// Article titles are resolved against this prefix.
    pub wiki_base_url: String,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            min_interval_hours: 20,
            max_concurrent: 4,
            fetch_timeout_secs: 60,
            request_timeout_secs: 20,
            rate_limit_ms: 1000,
            max_attempts: 3,
            retry_base_ms: 1000,
            user_agent: "WikiTrendsTracker/1.0".to_string(),
            wiki_base_url: "https://en.wikipedia.org/wiki/".to_string(),
        }
    }
}

impl ScrapeConfig {
    pub fn min_interval(&self) -> chrono::Duration {
        // Capped at a century; chrono panics on out-of-range hours.
        chrono::Duration::hours(self.min_interval_hours.min(24 * 365 * 100) as i64)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessConfig {
    /// Partitions processed concurrently.
    pub max_concurrent: usize,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

impl FileConfig {
    /// Reject values that would stall or disable the pipeline.
    pub fn validate(&self) -> std::result::Result<(), TrendsError> {
        if self.scrape.max_concurrent == 0 {
            return Err(TrendsError::Config("scrape.max_concurrent must be at least 1".into()));
        }
        if self.process.max_concurrent == 0 {
            return Err(TrendsError::Config("process.max_concurrent must be at least 1".into()));
        }
        if self.scrape.max_attempts == 0 {
            return Err(TrendsError::Config("scrape.max_attempts must be at least 1".into()));
        }
        if self.scrape.fetch_timeout_secs == 0 || self.scrape.request_timeout_secs == 0 {
            return Err(TrendsError::Config("scrape timeouts must be non-zero".into()));
        }
        if self.scrape.user_agent.trim().is_empty() {
            return Err(TrendsError::Config("scrape.user_agent must not be empty".into()));
        }
        if !(self.scrape.wiki_base_url.starts_with("http://")
            || self.scrape.wiki_base_url.starts_with("https://"))
        {
            return Err(TrendsError::Config(format!(
                "scrape.wiki_base_url must be http(s), got {}",
                self.scrape.wiki_base_url
            )));
        }
        Ok(())
    }
}

/// Parse a TOML config string. Relative storage paths are left as written.
pub fn parse_config(content: &str) -> Result<FileConfig> {
    let config: FileConfig = toml::from_str(content).context("Failed to parse config as TOML")?;
    config.validate()?;
    Ok(config)
}

/// Load and parse a TOML config file. Relative storage paths are resolved
/// against the file's directory.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config = parse_config(&content)
        .with_context(|| format!("Invalid config file: {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.storage.resolve(base);
    Ok(config)
}
