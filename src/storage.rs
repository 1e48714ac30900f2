use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::{DownloadError, Result};
use crate::story::sanitize_id;

/// Durable chapter storage. Returns a handle (a path for the file backend)
/// recorded on the story's chapter slot.
#[async_trait]
pub trait ChapterStorage: Send + Sync {
    async fn save_chapter(
        &self,
        story_id: &str,
        chapter_index: usize,
        title: &str,
        content: &str,
    ) -> Result<String>;
}

/// Writes each chapter to `<root>/<story>/<index>.txt`.
#[derive(Debug, Clone)]
pub struct FileChapterStorage {
    root: PathBuf,
}

impl FileChapterStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn chapter_path(&self, story_id: &str, chapter_index: usize) -> PathBuf {
        self.root
            .join(sanitize_id(story_id))
            .join(format!("{:05}.txt", chapter_index))
    }
}

#[async_trait]
impl ChapterStorage for FileChapterStorage {
    async fn save_chapter(
        &self,
        story_id: &str,
        chapter_index: usize,
        title: &str,
        content: &str,
    ) -> Result<String> {
        let path = self.chapter_path(story_id, chapter_index);
        let write = async {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, format!("{}\n\n{}\n", title, content)).await
        };
        write.await.map_err(|e| {
            DownloadError::Storage(format!("failed to write {}: {}", path.display(), e))
        })?;
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Normalize fetched chapter text: trim every line and collapse runs of
/// blank lines into a single paragraph break.
pub fn clean_content(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = false;
    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            blank_run = !out.is_empty();
            continue;
        }
        if blank_run {
            out.push_str("\n\n");
        } else if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(line);
        blank_run = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_content_trims_and_collapses_blank_lines() {
        let raw = "\n\n   First line  \nSecond\n\n\n\n  Third\n   \n";
        assert_eq!(clean_content(raw), "First line\nSecond\n\nThird");
    }

    #[test]
    fn clean_content_of_whitespace_is_empty() {
        assert_eq!(clean_content(" \n\t\n "), "");
    }

    #[tokio::test]
    async fn file_storage_writes_title_and_content() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileChapterStorage::new(dir.path());

        let handle = storage
            .save_chapter("story/1", 7, "Chapter 8", "Body text")
            .await
            .unwrap();

        assert!(handle.ends_with("00007.txt"));
        assert!(handle.contains("story_1"));
        let written = std::fs::read_to_string(&handle).unwrap();
        assert_eq!(written, "Chapter 8\n\nBody text\n");
    }

    #[tokio::test]
    async fn file_storage_failure_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the story directory should go.
        std::fs::write(dir.path().join("blocked"), "x").unwrap();
        let storage = FileChapterStorage::new(dir.path().join("blocked"));

        let err = storage.save_chapter("s", 0, "t", "c").await.unwrap_err();
        assert!(matches!(err, DownloadError::Storage(_)));
    }
}
