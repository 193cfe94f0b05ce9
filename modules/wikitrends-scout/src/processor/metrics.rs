// Named aggregations over a partition's snapshots.
//
// Every aggregation is pure over its input; the processor hands them
// snapshots sorted by record id, which is chronological.

use std::collections::HashSet;

use super::Snapshot;

/// A pluggable metric family. `compute` returns `(metric_name, value)` pairs
/// and is only called with a non-empty slice.
pub trait Aggregation: Send + Sync {
    fn name(&self) -> &str;
    fn compute(&self, snapshots: &[Snapshot]) -> Vec<(String, f64)>;
}

pub fn default_aggregations() -> Vec<Box<dyn Aggregation>> {
    vec![
        Box::new(RecordCount),
        Box::new(SizeDistribution),
        Box::new(ChangeRate),
        Box::new(LinkStats),
        Box::new(CategoryStats),
    ]
}

pub struct RecordCount;

impl Aggregation for RecordCount {
    fn name(&self) -> &str {
        "count"
    }

    fn compute(&self, snapshots: &[Snapshot]) -> Vec<(String, f64)> {
        vec![("record_count".into(), snapshots.len() as f64)]
    }
}

/// Content length distribution.
pub struct SizeDistribution;

impl Aggregation for SizeDistribution {
    fn name(&self) -> &str {
        "size"
    }

    fn compute(&self, snapshots: &[Snapshot]) -> Vec<(String, f64)> {
        let mut lengths: Vec<f64> = snapshots
            .iter()
            .map(|s| s.page.content_length as f64)
            .collect();
        if lengths.is_empty() {
            return Vec::new();
        }
        lengths.sort_by(f64::total_cmp);
        let n = lengths.len();
        let mean = lengths.iter().sum::<f64>() / n as f64;
        vec![
            ("content_length.min".into(), lengths[0]),
            ("content_length.max".into(), lengths[n - 1]),
            ("content_length.mean".into(), mean),
            ("content_length.p50".into(), median(&lengths)),
        ]
    }
}

/// Median of a sorted, non-empty slice. Even lengths average the middle pair.
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

/// How much the article moved within the partition.
pub struct ChangeRate;

impl Aggregation for ChangeRate {
    fn name(&self) -> &str {
        "change"
    }

    fn compute(&self, snapshots: &[Snapshot]) -> Vec<(String, f64)> {
        let (Some(first), Some(last)) = (snapshots.first(), snapshots.last()) else {
            return Vec::new();
        };

        let revisions = snapshots
            .iter()
            .map(|s| s.page.content_hash.as_str())
            .collect::<HashSet<_>>()
            .len();
        let changes = snapshots
            .windows(2)
            .filter(|pair| pair[0].page.content_hash != pair[1].page.content_hash)
            .count();
        let rate = if snapshots.len() > 1 {
            changes as f64 / (snapshots.len() - 1) as f64
        } else {
            0.0
        };

        let mut out = vec![
            ("change.revisions".into(), revisions as f64),
            ("change.rate".into(), rate),
            (
                "change.length_delta".into(),
                last.page.content_length as f64 - first.page.content_length as f64,
            ),
        ];
        if let (Some(a), Some(b)) = (first.page.revision_id, last.page.revision_id) {
            out.push(("change.revision_span".into(), b as f64 - a as f64));
        }
        out
    }
}

pub struct LinkStats;

impl Aggregation for LinkStats {
    fn name(&self) -> &str {
        "links"
    }

    fn compute(&self, snapshots: &[Snapshot]) -> Vec<(String, f64)> {
        if snapshots.is_empty() {
            return Vec::new();
        }
        let total: usize = snapshots.iter().map(|s| s.page.links.len()).sum();
        let unique = snapshots
            .iter()
            .flat_map(|s| s.page.links.iter())
            .collect::<HashSet<_>>()
            .len();
        vec![
            ("links.mean".into(), total as f64 / snapshots.len() as f64),
            ("links.unique".into(), unique as f64),
        ]
    }
}

pub struct CategoryStats;

impl Aggregation for CategoryStats {
    fn name(&self) -> &str {
        "categories"
    }

    fn compute(&self, snapshots: &[Snapshot]) -> Vec<(String, f64)> {
        let unique = snapshots
            .iter()
            .flat_map(|s| s.page.categories.iter())
            .collect::<HashSet<_>>()
            .len();
        vec![("categories.unique".into(), unique as f64)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::page_payload;
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn snapshot(hour: u32, content: &str, revision: Option<u64>) -> Snapshot {
        Snapshot {
            record_id: format!("20240101T{hour:02}0000.000000Z"),
            scraped_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            page: page_payload("Rust", content, revision),
        }
    }

    fn metrics(agg: &dyn Aggregation, snapshots: &[Snapshot]) -> BTreeMap<String, f64> {
        agg.compute(snapshots).into_iter().collect()
    }

    #[test]
    fn size_distribution_with_even_count_averages_middle_pair() {
        let snaps = [
            snapshot(1, "aaaa", None),
            snapshot(2, "aa", None),
            snapshot(3, "aaaaaaaa", None),
            snapshot(4, "aaaaaa", None),
        ];
        let m = metrics(&SizeDistribution, &snaps);
        assert_eq!(m["content_length.min"], 2.0);
        assert_eq!(m["content_length.max"], 8.0);
        assert_eq!(m["content_length.mean"], 5.0);
        assert_eq!(m["content_length.p50"], 5.0);
    }

    #[test]
    fn change_rate_counts_transitions_between_consecutive_snapshots() {
        let snaps = [
            snapshot(1, "v1", Some(100)),
            snapshot(2, "v1", Some(100)),
            snapshot(3, "version two", Some(105)),
            snapshot(4, "v1", Some(109)),
            snapshot(5, "v1", Some(109)),
        ];
        let m = metrics(&ChangeRate, &snaps);
        assert_eq!(m["change.revisions"], 2.0);
        assert_eq!(m["change.rate"], 0.5);
        assert_eq!(m["change.length_delta"], 0.0);
        assert_eq!(m["change.revision_span"], 9.0);
    }

    #[test]
    fn single_snapshot_has_zero_change_rate() {
        let m = metrics(&ChangeRate, &[snapshot(1, "only", None)]);
        assert_eq!(m["change.rate"], 0.0);
        assert_eq!(m["change.revisions"], 1.0);
        assert!(!m.contains_key("change.revision_span"));
    }

    #[test]
    fn link_and_category_uniques_span_the_partition() {
        let mut a = snapshot(1, "a", None);
        a.page.links = vec!["x".into(), "y".into()];
        a.page.categories = vec!["Languages".into()];
        let mut b = snapshot(2, "b", None);
        b.page.links = vec!["y".into(), "z".into(), "w".into(), "x".into()];
        b.page.categories = vec!["Languages".into(), "Mozilla".into()];

        let links = metrics(&LinkStats, &[a.clone(), b.clone()]);
        assert_eq!(links["links.mean"], 3.0);
        assert_eq!(links["links.unique"], 4.0);

        let categories = metrics(&CategoryStats, &[a, b]);
        assert_eq!(categories["categories.unique"], 2.0);
    }

    #[test]
    fn default_set_has_distinct_names() {
        let names: HashSet<_> = default_aggregations()
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names.len(), 5);
    }
}
