use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    // Older queue files wrote in-flight jobs as "downloading".
    #[serde(alias = "downloading")]
    Active,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Active => write!(f, "active"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What to fetch for a chapter. Opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterRef {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// One chapter download attempt tracked by the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub story_id: String,
    pub chapter_index: usize,
    pub chapter: ChapterRef,
    #[serde(default = "default_status")]
    pub status: JobStatus,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default = "Utc::now")]
    pub enqueued_at: DateTime<Utc>,
}

fn default_status() -> JobStatus {
    JobStatus::Pending
}

impl Job {
    pub fn new(story_id: impl Into<String>, chapter_index: usize, chapter: ChapterRef) -> Self {
        let story_id = story_id.into();
        Self {
            id: Self::job_id(&story_id, chapter_index),
            story_id,
            chapter_index,
            chapter,
            status: JobStatus::Pending,
            attempt_count: 0,
            last_error: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Job ids are derived from the story and chapter position, so enqueuing
    /// the same chapter twice always hits the same queue entry.
    pub fn job_id(story_id: &str, chapter_index: usize) -> String {
        format!("{}:{}", story_id, chapter_index)
    }

    /// Fresh pending copy used when a finished job is enqueued again.
    pub fn requeued(mut self) -> Self {
        self.status = JobStatus::Pending;
        self.attempt_count = 0;
        self.last_error = None;
        self.enqueued_at = Utc::now();
        self
    }
}

/// Queue counters exposed to progress UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}
