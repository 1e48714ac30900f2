use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Concurrency used when the configured limit is zero.
pub const DEFAULT_CONCURRENCY: usize = 3;

const QUEUE_FILE: &str = "queue.json";
const STORIES_DIR: &str = "stories";
const CHAPTERS_DIR: &str = "chapters";

/// Configuration for the download subsystem.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    /// Maximum number of jobs executing at once. Zero falls back to
    /// [`DEFAULT_CONCURRENCY`].
    pub concurrency: usize,
    /// Fallback re-check interval for the scheduling loop.
    pub poll_interval_ms: u64,
    /// Cleaned chapter text shorter than this is rejected.
    pub min_content_chars: usize,
    /// Root directory for the job queue, story records and chapter files.
    pub data_dir: PathBuf,
    /// Buffer size of the lifecycle event channel.
    pub event_capacity: usize,
    /// Minimum spacing between progress log lines.
    pub progress_throttle_ms: u64,
    /// Address for the JSON dashboard, if enabled.
    pub dashboard_addr: Option<SocketAddr>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval_ms: 100,
            min_content_chars: 50,
            data_dir: PathBuf::from("./library"),
            event_capacity: 1024,
            progress_throttle_ms: 1000,
            dashboard_addr: None,
        }
    }
}

impl DownloaderConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_min_content_chars(mut self, min_content_chars: usize) -> Self {
        self.min_content_chars = min_content_chars;
        self
    }

    pub fn with_dashboard(mut self, addr: SocketAddr) -> Self {
        self.dashboard_addr = Some(addr);
        self
    }

    /// Concurrency limit actually enforced by the scheduler (always >= 1).
    pub fn effective_concurrency(&self) -> usize {
        if self.concurrency == 0 {
            tracing::warn!(
                fallback = DEFAULT_CONCURRENCY,
                "Invalid concurrency limit 0, using default"
            );
            DEFAULT_CONCURRENCY
        } else {
            self.concurrency
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn queue_path(&self) -> PathBuf {
        self.data_dir.join(QUEUE_FILE)
    }

    pub fn stories_dir(&self) -> PathBuf {
        self.data_dir.join(STORIES_DIR)
    }

    pub fn chapters_dir(&self) -> PathBuf {
        self.data_dir.join(CHAPTERS_DIR)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
