// Tracked topics, loaded once per run from a TOML topics file.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use wikitrends_archive::write_atomic;
use wikitrends_common::{validate_topic_name, Result, Topic, TrendsError};

/// On-disk shape: an ordered `[[topics]]` array.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct TopicsFile {
    #[serde(default)]
    topics: Vec<Topic>,
}

/// Insertion-ordered set of topics, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicRegistry {
    topics: Vec<Topic>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, enforcing the same rules as `add`.
    pub fn from_topics(topics: impl IntoIterator<Item = Topic>) -> Result<Self> {
        let mut registry = Self::new();
        for topic in topics {
            registry.add(topic)?;
        }
        Ok(registry)
    }

    pub fn add(&mut self, topic: Topic) -> Result<()> {
        validate_topic_name(&topic.name)?;
        if self.get(&topic.name).is_some() {
            return Err(TrendsError::DuplicateTopic(topic.name));
        }
        self.topics.push(topic);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<Topic> {
        let idx = self
            .topics
            .iter()
            .position(|t| t.name == name)
            .ok_or_else(|| TrendsError::NotFound(name.to_string()))?;
        Ok(self.topics.remove(idx))
    }

    /// Topics in insertion order.
    pub fn list(&self) -> &[Topic] {
        &self.topics
    }

    pub fn get(&self, name: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.name == name)
    }

    /// The only permitted in-place mutation of a topic.
    pub fn update_locator(&mut self, name: &str, locator: impl Into<String>) -> Result<()> {
        let topic = self
            .topics
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| TrendsError::NotFound(name.to_string()))?;
        topic.source_locator = locator.into();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn parse(content: &str) -> Result<Self> {
        let file: TopicsFile = toml::from_str(content)
            .map_err(|e| TrendsError::Config(format!("invalid topics file: {e}")))?;
        Self::from_topics(file.topics)
    }

    pub fn to_toml(&self) -> Result<String> {
        let file = TopicsFile {
            topics: self.topics.clone(),
        };
        toml::to_string(&file).map_err(|e| TrendsError::Config(format!("unserializable topics: {e}")))
    }

    /// Load the topics file. A missing file is an empty registry.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No topics file, starting empty");
                return Ok(Self::new());
            }
            Err(e) => return Err(TrendsError::read(path, e)),
        };
        let registry = Self::parse(&content)?;
        info!(path = %path.display(), topics = registry.len(), "Topics loaded");
        Ok(registry)
    }

    /// Atomically replace the topics file.
    pub async fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.to_toml()?.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn topic(name: &str) -> Topic {
        Topic::new(
            name,
            format!("https://en.wikipedia.org/wiki/{name}"),
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut registry = TopicRegistry::new();
        registry.add(topic("Rust")).unwrap();
        let err = registry.add(topic("Rust")).unwrap_err();
        assert!(matches!(err, TrendsError::DuplicateTopic(name) if name == "Rust"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let mut registry = TopicRegistry::new();
        assert!(matches!(registry.remove("Rust"), Err(TrendsError::NotFound(_))));
    }

    #[test]
    fn list_preserves_insertion_order() {
        let mut registry = TopicRegistry::new();
        for name in ["Zebra", "Apple", "Mango"] {
            registry.add(topic(name)).unwrap();
        }
        registry.remove("Apple").unwrap();
        registry.add(topic("Apple")).unwrap();
        let names: Vec<_> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra", "Mango", "Apple"]);
    }

    #[test]
    fn update_locator_changes_only_the_locator() {
        let mut registry = TopicRegistry::from_topics([topic("Rust")]).unwrap();
        registry.update_locator("Rust", "Rust (programming language)").unwrap();
        let rust = registry.get("Rust").unwrap();
        assert_eq!(rust.source_locator, "Rust (programming language)");
        assert_eq!(rust.added_at, topic("Rust").added_at);
        assert!(matches!(
            registry.update_locator("Go", "x"),
            Err(TrendsError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let mut registry = TopicRegistry::new();
        assert!(matches!(
            registry.add(topic("../etc")),
            Err(TrendsError::InvalidTopic { .. })
        ));
    }

    #[test]
    fn toml_round_trip_keeps_order() {
        let registry = TopicRegistry::from_topics([topic("B"), topic("A")]).unwrap();
        let text = registry.to_toml().unwrap();
        assert!(text.contains("[[topics]]"));
        assert_eq!(TopicRegistry::parse(&text).unwrap(), registry);
    }

    #[test]
    fn duplicate_names_in_file_are_rejected() {
        let text = r#"
            [[topics]]
            name = "Rust"
            source_locator = "Rust"
            added_at = "2024-01-01T00:00:00Z"

            [[topics]]
            name = "Rust"
            source_locator = "Rust_(programming_language)"
            added_at = "2024-01-02T00:00:00Z"
        "#;
        assert!(matches!(
            TopicRegistry::parse(text),
            Err(TrendsError::DuplicateTopic(_))
        ));
    }

    #[tokio::test]
    async fn missing_file_loads_empty_and_save_creates_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topics.toml");
        let mut registry = TopicRegistry::load(&path).await.unwrap();
        assert!(registry.is_empty());

        registry.add(topic("ArtificialIntelligence")).unwrap();
        registry.save(&path).await.unwrap();

        let reloaded = TopicRegistry::load(&path).await.unwrap();
        assert_eq!(reloaded, registry);
    }
}
