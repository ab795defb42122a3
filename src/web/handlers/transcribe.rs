use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::error;

use super::ApiResponse;
use crate::media;
use crate::task::types::{TaskKind, TaskStatus, TimeRange, TranscribeOptions};
use crate::AppContext;

const MAX_UPLOAD_BYTES: usize = 500 * 1024 * 1024;

pub fn routes(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .route("/transcribe", post(transcribe))
        .with_state(ctx)
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    filename: String,
    path: String,
}

async fn upload(
    State(ctx): State<Arc<AppContext>>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read upload: {}", e);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::<UploadResponse>::error(e.to_string())),
                );
            }
        };
        if field.name() != Some("file") {
            continue;
        }

        let Some(filename) = field.file_name().map(str::to_string) else {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error("upload is missing a filename".to_string())),
            );
        };
        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to read upload body: {}", e);
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(e.to_string())),
                );
            }
        };

        return match ctx.files.save(&filename, &data).await {
            Ok(path) => {
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                (
                    StatusCode::OK,
                    Json(ApiResponse::success(UploadResponse {
                        filename,
                        path: path.display().to_string(),
                    })),
                )
            }
            Err(e) => {
                error!("Failed to store upload: {}", e);
                (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())))
            }
        };
    }

    (
        StatusCode::BAD_REQUEST,
        Json(ApiResponse::error("no file field in upload".to_string())),
    )
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TranscribeRequest {
    pub file_path: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_beam_size")]
    pub beam_size: u32,
    #[serde(default)]
    pub task: TaskKind,
    /// Optional `HH:MM:SS` trim bounds.
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub whisper_path: Option<PathBuf>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

fn default_model() -> String {
    "base".to_string()
}

fn default_language() -> String {
    "auto".to_string()
}

fn default_beam_size() -> u32 {
    5
}

#[derive(Debug, Serialize)]
struct TranscribeResponse {
    task_id: String,
}

// Create the task and start it in one call; progress is then observed via
// the task endpoints or the per-task event socket.
async fn transcribe(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<TranscribeRequest>,
) -> impl IntoResponse {
    let start = req.start_time.as_deref().and_then(media::parse_clock);
    let end = req.end_time.as_deref().and_then(media::parse_clock);
    let range = match (start, end) {
        (None, None) => None,
        (start, end) => Some(TimeRange { start: start.unwrap_or(0.0), end }),
    };

    let options = TranscribeOptions {
        model: req.model,
        language: req.language,
        beam_size: req.beam_size,
        kind: req.task,
        range,
        executable: req.whisper_path,
        callback_url: req.callback_url,
    };

    let view = match ctx
        .registry
        .create_task(PathBuf::from(&req.file_path), options, None)
        .await
    {
        Ok(view) => view,
        Err(e) => {
            error!("Failed to create task: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<TranscribeResponse>::error(e.to_string())),
            );
        }
    };

    if view.status == TaskStatus::Failed {
        let error = view.error.unwrap_or_else(|| "task creation failed".to_string());
        return (StatusCode::BAD_REQUEST, Json(ApiResponse::error(error)));
    }

    if !ctx.registry.clone().start_task(&view.id).await {
        error!("Failed to start task {}", view.id);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error("task could not be started".to_string())),
        );
    }

    (
        StatusCode::OK,
        Json(ApiResponse::success(TranscribeResponse { task_id: view.id })),
    )
}
