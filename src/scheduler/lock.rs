use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;

/// Per-story mutual exclusion for story record read-modify-write.
///
/// Each story id maps to its own FIFO-fair async mutex, so merges for one
/// story are totally ordered while different stories never wait on each
/// other. Entries are created on first use and never removed; there is one
/// per story touched during the process lifetime.
#[derive(Debug, Default, Clone)]
pub struct StoryLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl StoryLocks {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, story_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(story_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `work` while holding the lock for `story_id`.
    ///
    /// The guard is released when `work` finishes, whether it returned an
    /// error or not, so a failed merge never blocks later ones.
    pub async fn with_lock<F, Fut, T>(&self, story_id: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = self.lock_for(story_id).await;
        let _guard = lock.lock().await;
        tracing::trace!(story_id, "Story lock acquired");
        work().await
    }

    /// Number of stories that have ever been locked.
    pub async fn tracked_stories(&self) -> usize {
        self.locks.lock().await.len()
    }
}
