use std::path::PathBuf;

use crate::file_config::{FileConfig, StorageConfig};

/// Environment overrides applied on top of the TOML `FileConfig`.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// `WIKITRENDS_DATA_DIR`: relocates raw, processed and state storage.
    pub data_dir: Option<PathBuf>,
    /// `WIKITRENDS_USER_AGENT`
    pub user_agent: Option<String>,
}

impl AppConfig {
    /// Read overrides from the environment, loading `.env` first if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let config = Self {
            data_dir: non_empty_env("WIKITRENDS_DATA_DIR").map(PathBuf::from),
            user_agent: non_empty_env("WIKITRENDS_USER_AGENT"),
        };
        config.log_overrides();
        config
    }

    pub fn apply(&self, file_config: &mut FileConfig) {
        if let Some(dir) = &self.data_dir {
            let topics_file = file_config.storage.topics_file.clone();
            file_config.storage = StorageConfig::rooted_at(dir, &topics_file);
        }
        if let Some(agent) = &self.user_agent {
            file_config.scrape.user_agent = agent.clone();
        }
    }

    fn log_overrides(&self) {
        if let Some(dir) = &self.data_dir {
            tracing::info!(data_dir = %dir.display(), "WIKITRENDS_DATA_DIR override");
        }
        if let Some(agent) = &self.user_agent {
            tracing::info!(user_agent = agent.as_str(), "WIKITRENDS_USER_AGENT override");
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
