use std::fmt;

/// Stats from a scrape run.
#[derive(Debug, Default)]
pub struct ScrapeStats {
    pub topics_total: u32,
    pub scraped: u32,
    pub not_due: u32,
    pub failed: u32,
    pub bytes_written: u64,
    /// `(topic, error)` per failed topic, in completion order.
    pub failures: Vec<(String, String)>,
}

impl ScrapeStats {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn record_failure(&mut self, topic: &str, error: impl fmt::Display) {
        self.failed += 1;
        self.failures.push((topic.to_string(), error.to_string()));
    }
}

impl fmt::Display for ScrapeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Scrape Run Complete ===")?;
        writeln!(f, "Topics:        {}", self.topics_total)?;
        writeln!(f, "Scraped:       {}", self.scraped)?;
        writeln!(f, "Not due:       {}", self.not_due)?;
        writeln!(f, "Failed:        {}", self.failed)?;
        writeln!(f, "Bytes written: {}", self.bytes_written)?;
        if !self.failures.is_empty() {
            writeln!(f, "\nFailures:")?;
            for (topic, error) in &self.failures {
                writeln!(f, "  {topic}: {error}")?;
            }
        }
        Ok(())
    }
}

/// Stats from a processing run.
#[derive(Debug, Default)]
pub struct ProcessStats {
    pub partitions_pending: u32,
    pub processed: u32,
    pub records_processed: u64,
    pub records_skipped: u64,
    pub failed: u32,
    pub failures: Vec<(String, String)>,
}

impl ProcessStats {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn record_failure(&mut self, partition: impl fmt::Display, error: impl fmt::Display) {
        self.failed += 1;
        self.failures.push((partition.to_string(), error.to_string()));
    }
}

impl fmt::Display for ProcessStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Processing Run Complete ===")?;
        writeln!(f, "Partitions pending: {}", self.partitions_pending)?;
        writeln!(f, "Processed:          {}", self.processed)?;
        writeln!(f, "Records processed:  {}", self.records_processed)?;
        writeln!(f, "Records skipped:    {}", self.records_skipped)?;
        writeln!(f, "Failed:             {}", self.failed)?;
        if !self.failures.is_empty() {
            writeln!(f, "\nFailures:")?;
            for (partition, error) in &self.failures {
                writeln!(f, "  {partition}: {error}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lists_each_failure() {
        let mut stats = ScrapeStats {
            topics_total: 3,
            scraped: 1,
            not_due: 1,
            ..Default::default()
        };
        stats.record_failure("Rust", "fetch failed for https://x: HTTP 404");

        let text = stats.to_string();
        assert!(!stats.is_success());
        assert!(text.contains("Failed:        1"));
        assert!(text.contains("  Rust: fetch failed for https://x: HTTP 404"));
    }

    #[test]
    fn clean_run_has_no_failure_section() {
        let stats = ProcessStats {
            partitions_pending: 2,
            processed: 2,
            ..Default::default()
        };
        assert!(stats.is_success());
        assert!(!stats.to_string().contains("Failures:"));
    }
}
