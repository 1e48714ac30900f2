use std::sync::Arc;

use crate::error::DownloadError;
use crate::scheduler::job::{Job, JobStats, JobStatus};
use crate::scheduler::persistence::JobPersistence;

/// Result of enqueuing a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The id was unknown and the job was appended.
    Inserted,
    /// A finished job with this id was reset to pending.
    Requeued,
    /// The id is already pending or active; nothing changed.
    Unchanged,
}

impl AddOutcome {
    pub fn is_enqueued(self) -> bool {
        !matches!(self, AddOutcome::Unchanged)
    }
}

/// Durable, ordered collection of download jobs.
///
/// Jobs are kept in insertion order, which is also the claim order. Every
/// mutation rewrites the full list through the [`JobPersistence`] backend;
/// write failures are logged and the in-memory list stays authoritative.
pub struct JobStore {
    jobs: Vec<Job>,
    persistence: Arc<dyn JobPersistence>,
}

impl std::fmt::Debug for JobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobStore")
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

impl JobStore {
    /// Open the store and load whatever the backend holds.
    pub fn open(persistence: Arc<dyn JobPersistence>) -> Self {
        let mut store = Self {
            jobs: Vec::new(),
            persistence,
        };
        store.init();
        store
    }

    /// Reload the persisted job list.
    ///
    /// Jobs left `active` by an interrupted process are put back to
    /// `pending` and the reset is saved immediately. Unreadable or corrupt
    /// data yields an empty store.
    pub fn init(&mut self) {
        self.jobs = match self.persistence.load() {
            Ok(Some(data)) => match serde_json::from_str::<Vec<Job>>(&data) {
                Ok(jobs) => jobs,
                Err(e) => {
                    let err = DownloadError::StoreCorruption(e.to_string());
                    tracing::warn!(error = %err, kind = ?err.kind(), "Starting with an empty queue");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read job list, starting with an empty queue");
                Vec::new()
            }
        };

        let mut recovered = 0;
        for job in self.jobs.iter_mut().filter(|j| j.status == JobStatus::Active) {
            job.status = JobStatus::Pending;
            recovered += 1;
        }
        if recovered > 0 {
            tracing::info!(recovered, "Reset interrupted jobs to pending");
            self.persist();
        }

        tracing::debug!(jobs = self.jobs.len(), "Job store loaded");
    }

    /// Enqueue a job.
    ///
    /// Unknown ids are appended. A known id that is completed or failed is
    /// replaced by a fresh pending copy; a known id that is pending or
    /// active is left alone.
    pub fn add_job(&mut self, job: Job) -> AddOutcome {
        let outcome = self.insert(job);
        if outcome.is_enqueued() {
            self.persist();
        }
        outcome
    }

    /// Enqueue many jobs with a single write. Returns how many were enqueued.
    pub fn add_jobs(&mut self, jobs: impl IntoIterator<Item = Job>) -> usize {
        let added = jobs
            .into_iter()
            .map(|job| self.insert(job))
            .filter(|outcome| outcome.is_enqueued())
            .count();
        if added > 0 {
            self.persist();
        }
        added
    }

    fn insert(&mut self, job: Job) -> AddOutcome {
        match self.jobs.iter().position(|j| j.id == job.id) {
            None => {
                self.jobs.push(job.requeued());
                AddOutcome::Inserted
            }
            Some(pos) if self.jobs[pos].status.is_terminal() => {
                // Re-queued jobs move to the back so claim order follows enqueue time.
                self.jobs.remove(pos);
                self.jobs.push(job.requeued());
                AddOutcome::Requeued
            }
            Some(_) => AddOutcome::Unchanged,
        }
    }

    pub fn get_job(&self, id: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.id == id)
    }

    /// Earliest-enqueued pending job.
    pub fn next_pending(&self) -> Option<&Job> {
        self.jobs.iter().find(|j| j.status == JobStatus::Pending)
    }

    /// Atomically take the next pending job: mark it active, count the
    /// attempt and persist. Returns the claimed job.
    pub fn claim_next_pending(&mut self) -> Option<Job> {
        let job = self
            .jobs
            .iter_mut()
            .find(|j| j.status == JobStatus::Pending)?;
        job.status = JobStatus::Active;
        job.attempt_count += 1;
        job.last_error = None;
        let claimed = job.clone();
        self.persist();
        Some(claimed)
    }

    /// Move a job forward along `pending -> active -> completed | failed`.
    ///
    /// Returns false if the job is unknown or the transition would go
    /// backwards. `error` is recorded only for `failed`.
    pub fn set_status(&mut self, id: &str, status: JobStatus, error: Option<String>) -> bool {
        let Some(job) = self.jobs.iter_mut().find(|j| j.id == id) else {
            return false;
        };
        if !allowed_transition(job.status, status) {
            tracing::debug!(job_id = %id, from = %job.status, to = %status, "Rejected status transition");
            return false;
        }
        job.status = status;
        job.last_error = if status == JobStatus::Failed {
            error
        } else {
            None
        };
        self.persist();
        true
    }

    /// Overwrite a job in place. Returns false if the id is unknown.
    pub fn replace_job(&mut self, job: Job) -> bool {
        let Some(slot) = self.jobs.iter_mut().find(|j| j.id == job.id) else {
            return false;
        };
        *slot = job;
        self.persist();
        true
    }

    pub fn stats(&self) -> JobStats {
        let mut stats = JobStats {
            total: self.jobs.len(),
            ..Default::default()
        };
        for job in &self.jobs {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn jobs_for_story(&self, story_id: &str) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|j| j.story_id == story_id)
            .cloned()
            .collect()
    }

    /// All jobs in enqueue order.
    pub fn all_jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Failed jobs, optionally restricted to one story.
    pub fn failed_jobs(&self, story_id: Option<&str>) -> Vec<Job> {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .filter(|j| story_id.is_none_or(|id| j.story_id == id))
            .cloned()
            .collect()
    }

    /// Remove completed and failed jobs, optionally for one story only.
    /// Returns the number of jobs removed.
    pub fn clear_completed(&mut self, story_id: Option<&str>) -> usize {
        let before = self.jobs.len();
        self.jobs.retain(|job| {
            let in_scope = story_id.is_none_or(|id| job.story_id == id);
            !(in_scope && job.status.is_terminal())
        });
        let removed = before - self.jobs.len();
        if removed > 0 {
            self.persist();
        }
        removed
    }

    pub fn clear_all(&mut self) -> usize {
        let removed = self.jobs.len();
        self.jobs.clear();
        self.persist();
        removed
    }

    /// Fail every pending job with `reason`. Active jobs are untouched.
    /// Returns the jobs that were cancelled.
    pub fn cancel_pending(&mut self, reason: &str) -> Vec<Job> {
        let mut cancelled = Vec::new();
        for job in self
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending)
        {
            job.status = JobStatus::Failed;
            job.last_error = Some(reason.to_string());
            cancelled.push(job.clone());
        }
        if !cancelled.is_empty() {
            self.persist();
        }
        cancelled
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    fn persist(&self) {
        let data = match serde_json::to_string(&self.jobs) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize job list");
                return;
            }
        };
        if let Err(e) = self.persistence.save(&data) {
            tracing::warn!(error = %e, "Failed to persist job list");
        }
    }
}

fn allowed_transition(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (JobStatus::Pending, JobStatus::Active)
            | (JobStatus::Pending, JobStatus::Failed)
            | (JobStatus::Active, JobStatus::Completed)
            | (JobStatus::Active, JobStatus::Failed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::ChapterRef;
    use crate::scheduler::persistence::MemoryPersistence;

    fn job(story: &str, index: usize) -> Job {
        Job::new(
            story,
            index,
            ChapterRef {
                url: format!("https://example.org/{}/{}", story, index),
                title: format!("Chapter {}", index + 1),
            },
        )
    }

    fn store() -> (JobStore, Arc<MemoryPersistence>) {
        let persistence = Arc::new(MemoryPersistence::new());
        (JobStore::open(persistence.clone()), persistence)
    }

    #[test]
    fn corrupt_list_is_replaced_on_next_write() {
        let persistence = Arc::new(MemoryPersistence::with_contents("[{\"id\": 3"));
        let mut store = JobStore::open(persistence.clone());
        assert!(store.is_empty());
        // Opening alone leaves the corrupt data in place.
        assert_eq!(persistence.contents().as_deref(), Some("[{\"id\": 3"));

        store.add_job(job("s", 0));
        let saved: Vec<Job> = serde_json::from_str(&persistence.contents().unwrap()).unwrap();
        assert_eq!(saved.len(), 1);
    }

    #[test]
    fn transitions_only_move_forward() {
        assert!(allowed_transition(JobStatus::Pending, JobStatus::Active));
        assert!(allowed_transition(JobStatus::Active, JobStatus::Completed));
        assert!(!allowed_transition(JobStatus::Completed, JobStatus::Active));
        assert!(!allowed_transition(JobStatus::Failed, JobStatus::Pending));
        assert!(!allowed_transition(JobStatus::Active, JobStatus::Pending));
    }

    #[test]
    fn claim_marks_active_and_counts_attempt() {
        let (mut store, persistence) = store();
        store.add_job(job("s", 0));

        let claimed = store.claim_next_pending().unwrap();
        assert_eq!(claimed.status, JobStatus::Active);
        assert_eq!(claimed.attempt_count, 1);
        assert!(store.claim_next_pending().is_none());
        assert!(persistence.contents().unwrap().contains("\"active\""));
    }

    #[test]
    fn set_status_records_error_only_on_failure() {
        let (mut store, _) = store();
        store.add_job(job("s", 0));
        store.claim_next_pending();

        assert!(store.set_status("s:0", JobStatus::Failed, Some("boom".into())));
        assert_eq!(store.get_job("s:0").unwrap().last_error.as_deref(), Some("boom"));
        assert!(!store.set_status("s:0", JobStatus::Completed, None));
        assert!(!store.set_status("missing", JobStatus::Failed, None));
    }

    #[test]
    fn requeue_moves_job_behind_pending_ones() {
        let (mut store, _) = store();
        store.add_job(job("s", 0));
        store.add_job(job("s", 1));
        store.claim_next_pending();
        store.set_status("s:0", JobStatus::Completed, None);

        assert_eq!(store.add_job(job("s", 0)), AddOutcome::Requeued);
        assert_eq!(store.next_pending().unwrap().id, "s:1");
    }

    #[test]
    fn replace_job_overwrites_in_place() {
        let (mut store, _) = store();
        store.add_job(job("s", 0));
        let mut updated = store.get_job("s:0").unwrap().clone();
        updated.chapter.title = "Renamed".to_string();

        assert!(store.replace_job(updated));
        assert_eq!(store.get_job("s:0").unwrap().chapter.title, "Renamed");
        assert!(!store.replace_job(job("other", 9)));
    }
}
