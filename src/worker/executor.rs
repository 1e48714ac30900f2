use std::sync::Arc;

use crate::error::{DownloadError, Result};
use crate::provider::ProviderResolver;
use crate::scheduler::{Job, JobStatus, StoryLocks};
use crate::storage::{clean_content, ChapterStorage};
use crate::story::StoryStore;

/// Result of running one job
#[derive(Debug)]
pub struct ExecutionResult {
    pub job_id: String,
    pub status: JobStatus,
    pub content_path: Option<String>,
    pub error: Option<String>,
}

/// Runs the per-chapter pipeline: fetch, validate, save, then merge the
/// result into the story record.
///
/// Fetching and saving run without any lock so chapters of the same story
/// download in parallel. Only the story record read-modify-write happens
/// under the story's lock, and it always re-reads the record so merges from
/// sibling jobs are never lost.
#[derive(Clone)]
pub struct ChapterDownloader {
    stories: Arc<dyn StoryStore>,
    providers: Arc<dyn ProviderResolver>,
    storage: Arc<dyn ChapterStorage>,
    locks: StoryLocks,
    min_content_chars: usize,
}

impl ChapterDownloader {
    pub fn new(
        stories: Arc<dyn StoryStore>,
        providers: Arc<dyn ProviderResolver>,
        storage: Arc<dyn ChapterStorage>,
        locks: StoryLocks,
        min_content_chars: usize,
    ) -> Self {
        Self {
            stories,
            providers,
            storage,
            locks,
            min_content_chars,
        }
    }

    pub fn stories(&self) -> &Arc<dyn StoryStore> {
        &self.stories
    }

    /// Execute a job. Never fails outright; errors land in the result.
    pub async fn execute(&self, job: &Job) -> ExecutionResult {
        tracing::info!(
            job_id = %job.id,
            story_id = %job.story_id,
            chapter = job.chapter_index,
            attempt = job.attempt_count,
            "Downloading chapter"
        );

        match self.run(job).await {
            Ok(content_path) => {
                tracing::info!(job_id = %job.id, path = %content_path, "Chapter downloaded");
                ExecutionResult {
                    job_id: job.id.clone(),
                    status: JobStatus::Completed,
                    content_path: Some(content_path),
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, kind = ?e.kind(), error = %e, "Chapter download failed");
                ExecutionResult {
                    job_id: job.id.clone(),
                    status: JobStatus::Failed,
                    content_path: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run(&self, job: &Job) -> Result<String> {
        let story = self
            .stories
            .get_story(&job.story_id)
            .await?
            .ok_or_else(|| DownloadError::StoryNotFound(job.story_id.clone()))?;

        let provider = self
            .providers
            .resolve(&story.source_url)
            .ok_or_else(|| DownloadError::NoProvider(story.source_url.clone()))?;

        let raw = provider.fetch_chapter_content(&job.chapter.url).await?;
        let content = clean_content(&raw);
        let chars = content.chars().count();
        if chars < self.min_content_chars {
            return Err(DownloadError::Parse(format!(
                "chapter content too short ({} chars, need {})",
                chars, self.min_content_chars
            )));
        }

        let title = if job.chapter.title.is_empty() {
            format!("Chapter {}", job.chapter_index + 1)
        } else {
            job.chapter.title.clone()
        };
        let content_path = self
            .storage
            .save_chapter(&job.story_id, job.chapter_index, &title, &content)
            .await?;

        self.locks
            .with_lock(&job.story_id, || self.merge(job, &content_path))
            .await?;

        Ok(content_path)
    }

    async fn merge(&self, job: &Job, content_path: &str) -> Result<()> {
        let mut story = self
            .stories
            .get_story(&job.story_id)
            .await?
            .ok_or_else(|| DownloadError::StoryNotFound(job.story_id.clone()))?;
        story.mark_downloaded(job.chapter_index, content_path)?;
        self.stories.update_story(&story).await?;
        tracing::debug!(
            story_id = %story.id,
            downloaded = story.downloaded_chapters,
            total = story.total_chapters,
            status = %story.status,
            "Story record updated"
        );
        Ok(())
    }
}
