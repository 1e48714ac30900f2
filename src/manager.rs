use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, Notify, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::DownloaderConfig;
use crate::error::{DownloadError, Result};
use crate::progress::ProgressSink;
use crate::scheduler::{AddOutcome, EventBus, Job, JobStats, JobStatus, JobStore, QueueEvent};
use crate::worker::{ChapterDownloader, ExecutionResult};

/// What the scheduling loop does next.
enum Step {
    Launch(Job, OwnedSemaphorePermit),
    Wait,
    Drained,
}

/// Drives queued chapter downloads to completion.
///
/// Owns the job store, the lifecycle event bus and the chapter pipeline,
/// and runs a single scheduling loop that:
///
/// 1. Waits for a free execution slot (at most `concurrency` jobs run at once)
/// 2. Claims the earliest pending job and marks it active
/// 3. Spawns its execution and goes straight back to step 1
/// 4. Stops with `all-complete` once nothing is pending or running
///
/// The loop is started explicitly with [`start`](Self::start), which is a
/// no-op while a loop is already running.
pub struct DownloadManager {
    config: DownloaderConfig,
    store: Arc<RwLock<JobStore>>,
    downloader: ChapterDownloader,
    events: EventBus,
    progress: Arc<dyn ProgressSink>,
    slots: Arc<Semaphore>,
    active: AtomicUsize,
    running: AtomicBool,
    wake: Notify,
    shutdown: Mutex<CancellationToken>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadManager {
    pub fn new(
        config: DownloaderConfig,
        store: JobStore,
        downloader: ChapterDownloader,
        progress: Arc<dyn ProgressSink>,
    ) -> Arc<Self> {
        let limit = config.effective_concurrency();
        Arc::new(Self {
            events: EventBus::new(config.event_capacity),
            config,
            store: Arc::new(RwLock::new(store)),
            downloader,
            progress,
            slots: Arc::new(Semaphore::new(limit)),
            active: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            wake: Notify::new(),
            shutdown: Mutex::new(CancellationToken::new()),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of job executions currently in flight.
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Reload the job list from persistence, recovering interrupted jobs.
    /// Ignored while the scheduling loop is running or any job is still
    /// executing, since those jobs are genuinely in flight.
    pub async fn init(&self) -> JobStats {
        let mut store = self.store.write().await;
        if self.is_running() || self.active_count() > 0 {
            tracing::warn!(
                active = self.active_count(),
                "Ignoring init while downloads are in progress"
            );
        } else {
            store.init();
        }
        store.stats()
    }

    // =========================================================================
    // Enqueue
    // =========================================================================

    pub async fn add_job(&self, job: Job) -> AddOutcome {
        let job_id = job.id.clone();
        let outcome = self.store.write().await.add_job(job);
        tracing::debug!(job_id = %job_id, outcome = ?outcome, "Job enqueued");
        if outcome.is_enqueued() {
            self.queue_changed();
        }
        outcome
    }

    /// Enqueue several jobs. Returns how many were newly queued or re-queued.
    pub async fn add_jobs(&self, jobs: Vec<Job>) -> usize {
        let added = self.store.write().await.add_jobs(jobs);
        if added > 0 {
            tracing::info!(added, "Jobs enqueued");
            self.queue_changed();
        }
        added
    }

    /// Enqueue every chapter of a stored story that is not downloaded yet.
    pub async fn enqueue_story(&self, story_id: &str) -> Result<usize> {
        let story = self
            .downloader
            .stories()
            .get_story(story_id)
            .await?
            .ok_or_else(|| DownloadError::StoryNotFound(story_id.to_string()))?;
        Ok(self.add_jobs(story.pending_jobs()).await)
    }

    /// Re-queue failed jobs, optionally for one story only.
    pub async fn retry_failed(&self, story_id: Option<&str>) -> usize {
        let failed = self.store.read().await.failed_jobs(story_id);
        self.add_jobs(failed).await
    }

    // =========================================================================
    // Cancellation and cleanup
    // =========================================================================

    /// Fail every pending job with `reason`. Jobs already executing run to
    /// completion. Safe to call repeatedly and concurrently.
    pub async fn cancel_all(&self, reason: &str) -> usize {
        let cancelled = self.store.write().await.cancel_pending(reason).len();
        if cancelled > 0 {
            tracing::info!(cancelled, reason, "Cancelled pending jobs");
            self.queue_changed();
        }
        cancelled
    }

    pub async fn clear_completed(&self, story_id: Option<&str>) -> usize {
        let removed = self.store.write().await.clear_completed(story_id);
        if removed > 0 {
            self.queue_changed();
        }
        removed
    }

    pub async fn clear_all(&self) -> usize {
        let removed = self.store.write().await.clear_all();
        self.queue_changed();
        removed
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub async fn stats(&self) -> JobStats {
        self.store.read().await.stats()
    }

    pub async fn jobs_for_story(&self, story_id: &str) -> Vec<Job> {
        self.store.read().await.jobs_for_story(story_id)
    }

    pub async fn all_jobs(&self) -> Vec<Job> {
        self.store.read().await.all_jobs().to_vec()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the scheduling loop. Returns false if it is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Scheduler already running");
            return false;
        }

        let token = CancellationToken::new();
        *lock(&self.shutdown) = token.clone();

        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            manager.scheduler_loop(token).await;
        });
        *lock(&self.loop_handle) = Some(handle);

        tracing::info!(
            concurrency = self.config.effective_concurrency(),
            "Scheduler started"
        );
        true
    }

    /// Stop claiming new jobs and wait for the loop to exit. Jobs already
    /// executing keep running to completion.
    pub async fn stop(&self) {
        lock(&self.shutdown).cancel();
        let handle = lock(&self.loop_handle).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler loop panicked");
            }
        }
    }

    /// Resolve once the scheduler has drained: nothing pending, nothing
    /// executing and the loop stopped.
    pub async fn wait_until_idle(&self) {
        let mut rx = self.events.subscribe();
        loop {
            if !self.is_running() && self.active_count() == 0 {
                return;
            }
            tokio::select! {
                event = rx.recv() => match event {
                    Ok(QueueEvent::AllComplete) | Err(broadcast::error::RecvError::Closed) => return,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                },
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    async fn scheduler_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let poll_interval = self.config.poll_interval();

        loop {
            // Backpressure: never more than `concurrency` executions in flight.
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.next_step(permit).await {
                Step::Launch(job, permit) => self.launch(job, permit).await,
                Step::Drained => {
                    tracing::info!("All downloads complete");
                    return;
                }
                Step::Wait => {
                    // Woken early when a worker finishes or jobs are enqueued.
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = self.wake.notified() => {}
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Scheduler stopped");
    }

    /// Claim the next job, or decide the queue has drained. Runs under the
    /// store lock so an enqueue can never slip between "nothing pending"
    /// and the loop shutting down.
    async fn next_step(&self, permit: OwnedSemaphorePermit) -> Step {
        let mut store = self.store.write().await;
        if let Some(job) = store.claim_next_pending() {
            self.active.fetch_add(1, Ordering::SeqCst);
            return Step::Launch(job, permit);
        }
        drop(permit);

        if self.active.load(Ordering::SeqCst) > 0 {
            return Step::Wait;
        }

        self.running.store(false, Ordering::SeqCst);
        self.events.publish(QueueEvent::AllComplete);
        self.progress.on_idle();
        Step::Drained
    }

    async fn launch(self: &Arc<Self>, job: Job, permit: OwnedSemaphorePermit) {
        tracing::debug!(job_id = %job.id, attempt = job.attempt_count, "Job claimed");
        self.events.publish(QueueEvent::JobStarted(job.clone()));
        self.report_progress().await;

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.process_job(job).await;
            {
                // Under the store lock so `all-complete` is always published last.
                let store = manager.store.write().await;
                let active = manager.active.fetch_sub(1, Ordering::SeqCst) - 1;
                manager.events.publish(QueueEvent::QueueUpdated);
                manager
                    .progress
                    .on_active_count_changed(active, store.stats().pending);
            }
            drop(permit);
            manager.wake.notify_one();
        });
    }

    /// Execute one claimed job and record exactly one terminal outcome.
    async fn process_job(&self, job: Job) {
        // The job may have been cleared between claim and launch.
        let still_claimed = self
            .store
            .read()
            .await
            .get_job(&job.id)
            .is_some_and(|current| {
                current.status == JobStatus::Active && current.attempt_count == job.attempt_count
            });
        if !still_claimed {
            tracing::warn!(job_id = %job.id, "Job no longer claimed, skipping execution");
            self.events.publish(QueueEvent::JobFailed {
                job,
                error: "job was removed before execution".to_string(),
            });
            return;
        }

        // Run on its own task so a panic inside a collaborator still ends in `failed`.
        let downloader = self.downloader.clone();
        let claimed = job.clone();
        let result = match tokio::spawn(async move { downloader.execute(&claimed).await }).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Job execution panicked");
                ExecutionResult {
                    job_id: job.id.clone(),
                    status: JobStatus::Failed,
                    content_path: None,
                    error: Some(format!("job execution panicked: {}", e)),
                }
            }
        };

        let (recorded, current) = {
            let mut store = self.store.write().await;
            let recorded = store.set_status(&result.job_id, result.status, result.error.clone());
            (recorded, store.get_job(&result.job_id).cloned())
        };

        // The store row is authoritative; events never claim an outcome it lacks.
        if !recorded {
            tracing::warn!(
                job_id = %job.id,
                outcome = %result.status,
                current = ?current.as_ref().map(|j| j.status),
                "Job changed while executing, outcome not recorded"
            );
            self.events.publish(QueueEvent::JobFailed {
                job: current.unwrap_or(job),
                error: "job changed while executing; outcome not recorded".to_string(),
            });
            return;
        }

        let finished = current.unwrap_or(job);
        match finished.status {
            JobStatus::Completed => {
                self.events.publish(QueueEvent::JobCompleted(finished));
            }
            _ => {
                let error = finished
                    .last_error
                    .clone()
                    .or(result.error)
                    .unwrap_or_else(|| "unknown error".to_string());
                self.events.publish(QueueEvent::JobFailed {
                    job: finished,
                    error,
                });
            }
        }
    }

    fn queue_changed(&self) {
        self.events.publish(QueueEvent::QueueUpdated);
        self.wake.notify_one();
    }

    async fn report_progress(&self) {
        let pending = self.store.read().await.stats().pending;
        self.progress.on_active_count_changed(self.active_count(), pending);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
