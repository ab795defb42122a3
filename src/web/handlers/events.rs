use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::task::events::TaskEvent;
use crate::task::types::TaskView;
use crate::AppContext;

pub fn routes(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/tasks/:task_id/events", get(task_events))
        .with_state(ctx)
}

// Event-driven replacement for a polling watcher: the socket receives the
// current snapshot, then every event the supervisor emits, until terminal.
async fn task_events(
    ws: WebSocketUpgrade,
    Path(task_id): Path<String>,
    State(ctx): State<Arc<AppContext>>,
) -> impl IntoResponse {
    match ctx.registry.subscribe(&task_id).await {
        Some((view, rx)) => ws
            .on_upgrade(move |socket| stream_events(socket, view, rx))
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn stream_events(
    socket: WebSocket,
    view: TaskView,
    mut rx: broadcast::Receiver<TaskEvent>,
) {
    let (mut sender, mut receiver) = socket.split();

    // Snapshot first, so a late subscriber to a finished task still gets the
    // terminal state.
    let Ok(snapshot) = serde_json::to_string(&view) else { return };
    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }
    if view.status.is_terminal() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        let Ok(payload) = serde_json::to_string(&event) else { continue };
                        if sender.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                        if terminal {
                            break;
                        }
                    }
                    // The queue is bounded; a slow reader drops the oldest
                    // events instead of stalling the writer.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("subscriber for {} lagged, skipped {} events", view.id, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        debug!("subscriber for {} disconnected", view.id);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}
