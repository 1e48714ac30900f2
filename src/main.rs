use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use chapter_vault::config::DownloaderConfig;
use chapter_vault::dashboard::{run_dashboard, DashboardState};
use chapter_vault::manager::DownloadManager;
use chapter_vault::progress::LogProgressSink;
use chapter_vault::provider::{HttpProvider, ProviderRegistry};
use chapter_vault::scheduler::{
    FilePersistence, Job, JobStats, JobStatus, JobStore, QueueEvent, StoryLocks,
};
use chapter_vault::shutdown::install_shutdown_handler;
use chapter_vault::storage::FileChapterStorage;
use chapter_vault::story::{JsonStoryStore, StoryRecord, StoryStore};
use chapter_vault::worker::ChapterDownloader;

#[derive(Parser, Debug)]
#[command(name = "chapter-vault")]
#[command(version)]
#[command(about = "Archive web-novel chapters locally")]
#[command(propagate_version = true)]
struct Args {
    /// Library directory holding the queue, story records and chapters
    #[arg(long, global = true, default_value = "./library")]
    data_dir: PathBuf,

    /// Maximum number of chapters downloading at once
    #[arg(long, global = true, default_value = "3")]
    concurrency: usize,

    /// Reject chapters shorter than this many characters
    #[arg(long, global = true, default_value = "50")]
    min_content_chars: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Resume queued downloads and serve the JSON dashboard until interrupted
    Serve {
        /// Port for the dashboard (disabled if omitted)
        #[arg(long)]
        dashboard_port: Option<u16>,
    },

    /// Download every missing chapter of a story
    Download {
        /// Story id as stored in the library
        story_id: String,
    },

    /// Add or replace a story record from a JSON file
    Import {
        /// Path to a story record in JSON
        path: PathBuf,
    },

    /// Show queued jobs
    Status {
        /// Only show jobs for this story
        #[arg(long)]
        story: Option<String>,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },

    /// Re-queue failed jobs
    ///
    /// Edits queue.json directly, so run it against an idle library. While
    /// `serve` is running its next save overwrites the change; use
    /// `POST /api/retry` on the dashboard instead.
    Retry {
        #[arg(long)]
        story: Option<String>,
    },

    /// Fail every pending job
    ///
    /// For an idle library only. While `serve` is running use
    /// `POST /api/cancel` on the dashboard.
    Cancel {
        #[arg(long, default_value = "cancelled by user")]
        reason: String,
    },

    /// Remove finished jobs from the queue
    ///
    /// For an idle library only. While `serve` is running use
    /// `POST /api/clear` on the dashboard.
    Clear {
        #[arg(long)]
        story: Option<String>,

        /// Remove every job, including pending ones
        #[arg(long)]
        all: bool,
    },
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct StatusOutput {
    stats: JobStats,
    jobs: Vec<Job>,
    stories: Vec<StoryRecord>,
}

// =============================================================================
// Composition
// =============================================================================

fn build_config(args: &Args) -> DownloaderConfig {
    DownloaderConfig::new(args.data_dir.clone())
        .with_concurrency(args.concurrency)
        .with_min_content_chars(args.min_content_chars)
}

fn build_manager(
    config: DownloaderConfig,
) -> Result<Arc<DownloadManager>, Box<dyn std::error::Error>> {
    let store = JobStore::open(Arc::new(FilePersistence::new(config.queue_path())));
    let stories = Arc::new(JsonStoryStore::new(config.stories_dir()));
    let storage = Arc::new(FileChapterStorage::new(config.chapters_dir()));
    let providers =
        ProviderRegistry::new().with_fallback(Arc::new(HttpProvider::new("generic")?));
    let downloader = ChapterDownloader::new(
        stories,
        Arc::new(providers),
        storage,
        StoryLocks::new(),
        config.min_content_chars,
    );
    let progress = Arc::new(LogProgressSink::new(Duration::from_millis(
        config.progress_throttle_ms,
    )));

    Ok(DownloadManager::new(config, store, downloader, progress))
}

// =============================================================================
// Commands
// =============================================================================

async fn run_serve(manager: Arc<DownloadManager>) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = install_shutdown_handler();

    let stats = manager.stats().await;
    tracing::info!(pending = stats.pending, total = stats.total, "Resuming queue");
    manager.start();

    if let Some(addr) = manager.config().dashboard_addr {
        let state = DashboardState {
            manager: manager.clone(),
        };
        let token = shutdown.clone();
        tokio::spawn(async move {
            run_dashboard(addr, state, token).await;
        });
    }

    shutdown.cancelled().await;
    manager.stop().await;
    Ok(())
}

async fn run_download(
    manager: Arc<DownloadManager>,
    story_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let shutdown = install_shutdown_handler();
    let enqueued = manager.enqueue_story(&story_id).await?;
    println!("Queued {} chapter(s) for {}", enqueued, story_id);

    let mut events = manager.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                QueueEvent::JobCompleted(job) => {
                    println!("  [+] {} {}", job.chapter_index + 1, job.chapter.title)
                }
                QueueEvent::JobFailed { job, error } => {
                    println!("  [-] {} {}: {}", job.chapter_index + 1, job.chapter.title, error)
                }
                QueueEvent::AllComplete => break,
                _ => {}
            }
        }
    });

    manager.start();
    tokio::select! {
        _ = manager.wait_until_idle() => {}
        _ = shutdown.cancelled() => {
            manager.stop().await;
            println!("Interrupted; unfinished chapters resume on the next run");
        }
    }

    let jobs = manager.jobs_for_story(&story_id).await;
    let failed = jobs
        .iter()
        .filter(|j| j.status == JobStatus::Failed)
        .count();
    let stories = JsonStoryStore::new(manager.config().stories_dir());
    if let Some(story) = stories.get_story(&story_id).await? {
        println!(
            "{}: {}/{} chapters downloaded ({}), {} failed",
            story.title, story.downloaded_chapters, story.total_chapters, story.status, failed
        );
    }
    Ok(())
}

async fn run_import(
    config: &DownloaderConfig,
    path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = tokio::fs::read_to_string(&path).await?;
    let mut record: StoryRecord = serde_json::from_str(&data)?;
    record.recompute();
    JsonStoryStore::new(config.stories_dir())
        .update_story(&record)
        .await?;
    println!(
        "Imported {} ({} chapters, {} downloaded)",
        record.id, record.total_chapters, record.downloaded_chapters
    );
    Ok(())
}

async fn run_status(
    manager: Arc<DownloadManager>,
    story: Option<String>,
    output: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let stats = manager.stats().await;
    let mut stories = JsonStoryStore::new(manager.config().stories_dir())
        .list_stories()
        .await?;
    let jobs = match &story {
        Some(story_id) => {
            stories.retain(|s| &s.id == story_id);
            manager.jobs_for_story(story_id).await
        }
        None => manager.all_jobs().await,
    };

    match output {
        OutputFormat::Json => {
            let output = StatusOutput {
                stats,
                jobs,
                stories,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!(
                "Pending: {}  Active: {}  Completed: {}  Failed: {}  Total: {}",
                stats.pending, stats.active, stats.completed, stats.failed, stats.total
            );
            println!();
            println!("{:<28} {:<10} {:<8} TITLE / ERROR", "JOB ID", "STATUS", "TRIES");
            println!("{}", "-".repeat(78));
            for job in &jobs {
                let detail = job.last_error.as_deref().unwrap_or(&job.chapter.title);
                println!(
                    "{:<28} {:<10} {:<8} {}",
                    job.id, job.status, job.attempt_count, detail
                );
            }
            if !stories.is_empty() {
                println!();
                for s in &stories {
                    println!(
                        "{:<28} {:>5}/{:<5} {}",
                        s.id, s.downloaded_chapters, s.total_chapters, s.status
                    );
                }
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = build_config(&args);
    tracing::debug!(data_dir = %config.data_dir().display(), "Using library");

    match args.command {
        Commands::Import { path } => run_import(&config, path).await?,
        Commands::Serve { dashboard_port } => {
            let config = match dashboard_port {
                Some(port) => config.with_dashboard(SocketAddr::from(([0, 0, 0, 0], port))),
                None => config,
            };
            run_serve(build_manager(config)?).await?
        }
        Commands::Download { story_id } => run_download(build_manager(config)?, story_id).await?,
        Commands::Status { story, output } => {
            run_status(build_manager(config)?, story, output).await?
        }
        Commands::Retry { story } => {
            let requeued = build_manager(config)?.retry_failed(story.as_deref()).await;
            println!("Re-queued {} job(s)", requeued);
        }
        Commands::Cancel { reason } => {
            let cancelled = build_manager(config)?.cancel_all(&reason).await;
            println!("Cancelled {} pending job(s)", cancelled);
        }
        Commands::Clear { story, all } => {
            let manager = build_manager(config)?;
            let removed = if all {
                manager.clear_all().await
            } else {
                manager.clear_completed(story.as_deref()).await
            };
            println!("Removed {} job(s)", removed);
        }
    }

    Ok(())
}
