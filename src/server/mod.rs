//! HTTP endpoints: `/stream`, `/frame` and `/status`

pub mod mjpeg;
pub mod status;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{self, HeaderName};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::Context;
pub use status::ServiceStatus;

/// Shared handler state; cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<Context>,
    /// Cancelled on process shutdown; ends open streams
    pub shutdown: CancellationToken,
    next_client: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(ctx: Arc<Context>, shutdown: CancellationToken) -> Self {
        Self {
            ctx,
            shutdown,
            next_client: Arc::new(AtomicU64::new(1)),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/frame", get(frame))
        .route("/status", get(status))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the state's shutdown token is cancelled.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP server listening on {}", addr);
        info!("MJPEG stream: http://{}/stream", addr);
        info!("Status: http://{}/status", addr);
    }
    let shutdown = state.shutdown.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

async fn stream(State(state): State<AppState>) -> Response {
    let client_id = state.next_client.fetch_add(1, Ordering::Relaxed);
    mjpeg::stream_response(state.ctx, state.shutdown, client_id)
}

async fn frame(State(state): State<AppState>) -> Response {
    let Some(frame) = state.ctx.buffer.snapshot() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "No frame available").into_response();
    };

    (
        [
            (header::CONTENT_TYPE, frame.format.mime_type().to_string()),
            (header::CACHE_CONTROL, "no-cache".to_string()),
            (
                HeaderName::from_static("x-frame-sequence"),
                frame.sequence.to_string(),
            ),
        ],
        frame.data.clone(),
    )
        .into_response()
}

async fn status(State(state): State<AppState>) -> Json<ServiceStatus> {
    let running = !state.shutdown.is_cancelled();
    Json(ServiceStatus::collect(&state.ctx, running).await)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not found")
}
