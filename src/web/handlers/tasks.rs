use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use super::ApiResponse;
use crate::subtitle;
use crate::supervisor::parser;
use crate::task::types::{Segment, TaskStatus, TaskView};
use crate::AppContext;

pub fn routes(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/tasks/stats", get(get_stats))
        .route("/tasks/:task_id", get(get_task))
        .route("/tasks/:task_id/result", get(get_result))
        .route("/tasks/:task_id/srt", get(get_srt))
        .route("/tasks/:task_id/cancel", post(cancel_task))
        .with_state(ctx)
}

async fn get_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    match ctx.registry.get_task(&task_id).await {
        Some(view) => (StatusCode::OK, Json(ApiResponse::success(view))),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<TaskView>::error("Task not found".to_string())),
        ),
    }
}

#[derive(Debug, Serialize)]
struct TaskResultResponse {
    /// Raw whisper output, timestamps included.
    text: String,
    /// Segment texts joined without timestamps.
    plain_text: String,
    segments: Vec<Segment>,
}

async fn get_result(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    let Some(view) = ctx.registry.get_task(&task_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<TaskResultResponse>::error("Task not found".to_string())),
        );
    };

    match (view.status, view.result) {
        (TaskStatus::Completed, Some(result)) => {
            let plain_text = parser::full_text(&result.segments);
            (
                StatusCode::OK,
                Json(ApiResponse::success(TaskResultResponse {
                    text: result.text,
                    plain_text,
                    segments: result.segments,
                })),
            )
        }
        (TaskStatus::Failed, _) => {
            let error = view.error.unwrap_or_else(|| "task failed".to_string());
            (StatusCode::OK, Json(ApiResponse::error(error)))
        }
        (status, _) => (
            StatusCode::CONFLICT,
            Json(ApiResponse::error(format!(
                "transcription not finished: {} ({}%)",
                status, view.progress
            ))),
        ),
    }
}

async fn get_srt(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> Response {
    let Some(view) = ctx.registry.get_task(&task_id).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("Task not found".to_string())),
        )
            .into_response();
    };

    match (view.status, view.result) {
        (TaskStatus::Completed, Some(result)) => {
            let srt = if result.segments.is_empty() {
                subtitle::whisper_output_to_srt(&result.text, 0.0)
            } else {
                subtitle::segments_to_srt(&result.segments)
            };
            ([(header::CONTENT_TYPE, "application/x-subrip")], srt).into_response()
        }
        _ => (
            StatusCode::CONFLICT,
            Json(ApiResponse::<()>::error("transcription not finished".to_string())),
        )
            .into_response(),
    }
}

async fn cancel_task(
    State(ctx): State<Arc<AppContext>>,
    Path(task_id): Path<String>,
) -> impl IntoResponse {
    if ctx.registry.get_task(&task_id).await.is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error("Task not found".to_string())),
        );
    }

    if ctx.registry.cancel_task(&task_id).await {
        (StatusCode::OK, Json(ApiResponse::success(())))
    } else {
        (
            StatusCode::CONFLICT,
            Json(ApiResponse::error("task is not running".to_string())),
        )
    }
}

async fn get_stats(State(ctx): State<Arc<AppContext>>) -> impl IntoResponse {
    let stats = ctx.registry.stats().await;
    (StatusCode::OK, Json(ApiResponse::success(stats)))
}
