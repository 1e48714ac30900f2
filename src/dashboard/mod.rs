use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::error::DownloadError;
use crate::manager::DownloadManager;
use crate::scheduler::JobStats;

const DEFAULT_CANCEL_REASON: &str = "cancelled by user";

#[derive(Clone)]
pub struct DashboardState {
    pub manager: Arc<DownloadManager>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(flatten)]
    stats: JobStats,
    running: bool,
    active_workers: usize,
    concurrency: usize,
}

#[derive(Serialize)]
struct EnqueueResponse {
    success: bool,
    enqueued: usize,
    error: Option<String>,
}

#[derive(Deserialize)]
struct CancelRequest {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Serialize)]
struct CancelResponse {
    cancelled: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RetryRequest {
    #[serde(default)]
    story_id: Option<String>,
}

#[derive(Serialize)]
struct RetryResponse {
    requeued: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClearRequest {
    #[serde(default)]
    story_id: Option<String>,
    #[serde(default)]
    all: bool,
}

#[derive(Serialize)]
struct ClearResponse {
    removed: usize,
}

pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/stats", get(stats_handler))
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/stories/{id}/jobs", get(story_jobs_handler))
        .route("/api/stories/{id}/download", post(download_story_handler))
        .route("/api/retry", post(retry_handler))
        .route("/api/cancel", post(cancel_handler))
        .route("/api/clear", post(clear_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    let app = router(state);

    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    if let Err(e) = served {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn stats_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let manager = &state.manager;
    Json(StatsResponse {
        stats: manager.stats().await,
        running: manager.is_running(),
        active_workers: manager.active_count(),
        concurrency: manager.config().effective_concurrency(),
    })
}

async fn list_jobs_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    Json(state.manager.all_jobs().await)
}

async fn story_jobs_handler(
    State(state): State<DashboardState>,
    Path(story_id): Path<String>,
) -> impl IntoResponse {
    Json(state.manager.jobs_for_story(&story_id).await)
}

async fn download_story_handler(
    State(state): State<DashboardState>,
    Path(story_id): Path<String>,
) -> impl IntoResponse {
    match state.manager.enqueue_story(&story_id).await {
        Ok(enqueued) => {
            state.manager.start();
            (
                StatusCode::OK,
                Json(EnqueueResponse {
                    success: true,
                    enqueued,
                    error: None,
                }),
            )
        }
        Err(e) => {
            let status = match e {
                DownloadError::StoryNotFound(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (
                status,
                Json(EnqueueResponse {
                    success: false,
                    enqueued: 0,
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

async fn retry_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<RetryRequest>,
) -> impl IntoResponse {
    let requeued = state
        .manager
        .retry_failed(payload.story_id.as_deref())
        .await;
    if requeued > 0 {
        state.manager.start();
    }
    Json(RetryResponse { requeued })
}

async fn cancel_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<CancelRequest>,
) -> impl IntoResponse {
    let reason = payload
        .reason
        .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
    let cancelled = state.manager.cancel_all(&reason).await;
    Json(CancelResponse { cancelled })
}

async fn clear_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<ClearRequest>,
) -> impl IntoResponse {
    let removed = if payload.all {
        state.manager.clear_all().await
    } else {
        state
            .manager
            .clear_completed(payload.story_id.as_deref())
            .await
    };
    Json(ClearResponse { removed })
}
