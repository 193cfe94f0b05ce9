use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use wikitrends_common::PartitionRef;

/// Single-writer-per-partition locks. Distinct partitions never contend.
/// Cloning shares the lock table.
#[derive(Debug, Clone, Default)]
pub struct PartitionLocks {
    inner: Arc<Mutex<HashMap<PartitionRef, Arc<AsyncMutex<()>>>>>,
}

impl PartitionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a partition. Released when the guard drops.
    ///
    /// Entries nobody holds or waits on are swept here, so the table stays
    /// bounded by the partitions currently in use.
    pub async fn lock(&self, partition: &PartitionRef) -> OwnedMutexGuard<()> {
        let lock = {
            let mut table = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
            table.entry(partition.clone()).or_default().clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
