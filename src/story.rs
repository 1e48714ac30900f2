use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DownloadError, Result};
use crate::scheduler::job::{ChapterRef, Job};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoryStatus {
    #[default]
    Partial,
    Completed,
}

impl std::fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoryStatus::Partial => write!(f, "partial"),
            StoryStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One slot in a story's canonical chapter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSlot {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub downloaded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_path: Option<String>,
}

impl ChapterSlot {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            downloaded: false,
            content_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRecord {
    pub id: String,
    pub title: String,
    pub source_url: String,
    pub chapters: Vec<ChapterSlot>,
    #[serde(default)]
    pub downloaded_chapters: usize,
    #[serde(default)]
    pub total_chapters: usize,
    #[serde(default)]
    pub status: StoryStatus,
}

impl StoryRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        source_url: impl Into<String>,
        chapters: Vec<ChapterSlot>,
    ) -> Self {
        let mut record = Self {
            id: id.into(),
            title: title.into(),
            source_url: source_url.into(),
            chapters,
            downloaded_chapters: 0,
            total_chapters: 0,
            status: StoryStatus::Partial,
        };
        record.recompute();
        record
    }

    /// Mark one chapter downloaded and refresh the derived counters.
    pub fn mark_downloaded(&mut self, index: usize, content_path: impl Into<String>) -> Result<()> {
        let total = self.chapters.len();
        let slot = self.chapters.get_mut(index).ok_or_else(|| {
            DownloadError::Storage(format!(
                "chapter index {} out of range for story {} ({} chapters)",
                index, self.id, total
            ))
        })?;
        slot.downloaded = true;
        slot.content_path = Some(content_path.into());
        self.recompute();
        Ok(())
    }

    /// Derive counters and aggregate status from the chapter list. The
    /// counters are never adjusted incrementally.
    pub fn recompute(&mut self) {
        self.total_chapters = self.chapters.len();
        self.downloaded_chapters = self.chapters.iter().filter(|c| c.downloaded).count();
        self.status = if self.downloaded_chapters == self.total_chapters {
            StoryStatus::Completed
        } else {
            StoryStatus::Partial
        };
    }

    pub fn missing_chapters(&self) -> Vec<usize> {
        self.chapters
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.downloaded)
            .map(|(i, _)| i)
            .collect()
    }

    /// Jobs for every chapter not yet downloaded.
    pub fn pending_jobs(&self) -> Vec<Job> {
        self.missing_chapters()
            .into_iter()
            .map(|index| {
                let slot = &self.chapters[index];
                Job::new(
                    self.id.clone(),
                    index,
                    ChapterRef {
                        url: slot.url.clone(),
                        title: slot.title.clone(),
                    },
                )
            })
            .collect()
    }
}

/// Story metadata store. Owns story records; the download subsystem only
/// reads and rewrites them.
#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn get_story(&self, story_id: &str) -> Result<Option<StoryRecord>>;

    async fn update_story(&self, record: &StoryRecord) -> Result<()>;
}

/// Story records as one JSON file each under a directory.
#[derive(Debug, Clone)]
pub struct JsonStoryStore {
    dir: PathBuf,
}

impl JsonStoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, story_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(story_id)))
    }

    pub async fn list_stories(&self) -> Result<Vec<StoryRecord>> {
        let mut stories = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(stories),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let data = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<StoryRecord>(&data) {
                Ok(record) => stories.push(record),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable story record")
                }
            }
        }
        stories.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(stories)
    }
}

#[async_trait]
impl StoryStore for JsonStoryStore {
    async fn get_story(&self, story_id: &str) -> Result<Option<StoryRecord>> {
        match tokio::fs::read_to_string(self.path_for(story_id)).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_story(&self, record: &StoryRecord) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let data = serde_json::to_string_pretty(record)?;
        let path = self.path_for(&record.id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Map a story id onto a safe file name component.
pub(crate) fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
