// Durable checkpoint storage: topic -> last successful scrape.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use wikitrends_common::{Checkpoint, Result, TrendsError};

use crate::fs::write_atomic;

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, topic: &str) -> Result<Option<Checkpoint>>;

    /// Write or overwrite the topic's checkpoint.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Every checkpoint, ordered by topic name.
    async fn all(&self) -> Result<Vec<Checkpoint>>;
}

type StateMap = BTreeMap<String, DateTime<Utc>>;

fn to_checkpoints(map: &StateMap) -> Vec<Checkpoint> {
    map.iter()
        .map(|(topic, at)| Checkpoint {
            topic_name: topic.clone(),
            last_scraped_at: *at,
        })
        .collect()
}

/// JSON state file (`{"topic": "2024-01-01T00:00:00Z"}`), read once at open
/// and atomically replaced on every save.
pub struct FileStateStore {
    path: PathBuf,
    state: AsyncMutex<StateMap>,
}

impl FileStateStore {
    /// Open the state file. A missing file is an empty state.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StateMap>(&bytes).map_err(|e| {
                TrendsError::read(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StateMap::new(),
            Err(e) => return Err(TrendsError::read(&path, e)),
        };
        info!(path = %path.display(), checkpoints = state.len(), "State file loaded");
        Ok(Self {
            path,
            state: AsyncMutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn load(&self, topic: &str) -> Result<Option<Checkpoint>> {
        let state = self.state.lock().await;
        Ok(state.get(topic).map(|at| Checkpoint {
            topic_name: topic.to_string(),
            last_scraped_at: *at,
        }))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        // Held across the file write so concurrent commits replace the file in order.
        let mut state = self.state.lock().await;
        let mut next = state.clone();
        next.insert(checkpoint.topic_name.clone(), checkpoint.last_scraped_at);

        let bytes = serde_json::to_vec_pretty(&next).map_err(|e| {
            TrendsError::write(&self.path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        write_atomic(&self.path, &bytes).await?;
        *state = next;

        debug!(
            topic = checkpoint.topic_name.as_str(),
            at = %checkpoint.last_scraped_at,
            "Checkpoint committed"
        );
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Checkpoint>> {
        Ok(to_checkpoints(&*self.state.lock().await))
    }
}

/// In-memory state, for tests and dry runs.
#[derive(Default)]
pub struct MemoryStateStore {
    state: Mutex<StateMap>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn load(&self, topic: &str) -> Result<Option<Checkpoint>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.get(topic).map(|at| Checkpoint {
            topic_name: topic.to_string(),
            last_scraped_at: *at,
        }))
    }

    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.insert(checkpoint.topic_name.clone(), checkpoint.last_scraped_at);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<Checkpoint>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(to_checkpoints(&state))
    }
}
