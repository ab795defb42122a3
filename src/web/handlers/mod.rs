use axum::Router;
use serde::Serialize;
use std::sync::Arc;

use crate::AppContext;

pub mod events;
pub mod tasks;
pub mod transcribe;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new().nest(
        "/api",
        transcribe::routes(ctx.clone())
            .merge(tasks::routes(ctx.clone()))
            .merge(events::routes(ctx)),
    )
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}
