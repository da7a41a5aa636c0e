//! HTTP endpoint behaviour against an in-memory router

use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use camstream::capture::{Frame, ImageFormat};
use camstream::pipeline::Context;
use camstream::server::{create_router, AppState};
use camstream::Config;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn context(dir: &std::path::Path) -> Arc<Context> {
    let mut config = Config::default();
    config.output.frame_dir = dir.to_path_buf();
    config.http.stream_poll_ms = 5;
    Context::new(config)
}

fn publish(ctx: &Context, payload: &'static [u8]) -> u64 {
    ctx.buffer
        .publish(Frame::new(Bytes::from_static(payload), ImageFormat::Jpeg, 2, 2))
}

async fn get(state: AppState, path: &str) -> axum::response::Response {
    create_router(state)
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

#[tokio::test]
async fn frame_is_unavailable_before_first_capture() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(context(dir.path()), CancellationToken::new());

    let response = get(state, "/frame").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(&body_bytes(response).await[..], b"No frame available");
}

#[tokio::test]
async fn frame_returns_latest_bytes_with_content_type() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    publish(&ctx, b"first");
    publish(&ctx, b"second");
    let state = AppState::new(Arc::clone(&ctx), CancellationToken::new());

    let response = get(state, "/frame").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    assert_eq!(response.headers()["x-frame-sequence"], "2");
    assert_eq!(&body_bytes(response).await[..], b"second");
}

#[tokio::test]
async fn webp_frames_are_labelled_webp() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    ctx.buffer
        .publish(Frame::new(Bytes::from_static(b"RIFF"), ImageFormat::Webp, 1, 1));
    let state = AppState::new(ctx, CancellationToken::new());

    let response = get(state, "/frame").await;
    assert_eq!(response.headers()["content-type"], "image/webp");
}

#[tokio::test]
async fn status_reports_counters_and_config() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("img_000001.jpg"), b"x").unwrap();
    std::fs::write(dir.path().join("img_000002.jpg"), b"x").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();

    let ctx = context(dir.path());
    publish(&ctx, b"frame");
    let state = AppState::new(ctx, CancellationToken::new());

    let response = get(state, "/status").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");

    let status: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(status["running"], true);
    assert_eq!(status["sequence"], 1);
    assert_eq!(status["files_on_disk"], 2);
    assert_eq!(status["frame_dir"], dir.path().display().to_string());
    assert_eq!(status["config"]["http"]["port"], 8086);
    assert_eq!(status["config"]["capture"]["width"], 1280);
    assert!(status["last_frame_at"].is_string());
}

#[tokio::test]
async fn status_reports_not_running_once_shut_down() {
    let dir = tempfile::tempdir().unwrap();
    let shutdown = CancellationToken::new();
    let state = AppState::new(context(dir.path()), shutdown.clone());
    shutdown.cancel();

    let status: serde_json::Value =
        serde_json::from_slice(&body_bytes(get(state, "/status").await).await).unwrap();
    assert_eq!(status["running"], false);
    assert_eq!(status["frame_count"], 0);
    assert!(status["last_frame_at"].is_null());
}

#[tokio::test]
async fn unknown_paths_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(context(dir.path()), CancellationToken::new());

    for path in ["/", "/frames", "/stream/extra", "/favicon.ico"] {
        let response = get(state.clone(), path).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[tokio::test]
async fn stream_sends_multipart_parts_for_new_frames_only() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    publish(&ctx, b"one");
    let state = AppState::new(Arc::clone(&ctx), CancellationToken::new());

    let response = get(state, "/stream").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let mut body = response.into_body();
    let first = next_part(&mut body).await.unwrap();
    assert!(first.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 3\r\n"));
    assert!(first.ends_with(b"\r\n\r\none\r\n"));

    // No new frame: nothing arrives within several poll intervals
    assert!(tokio::time::timeout(Duration::from_millis(60), body.frame())
        .await
        .is_err());

    publish(&ctx, b"two");
    let second = next_part(&mut body).await.unwrap();
    assert!(second.ends_with(b"\r\n\r\ntwo\r\n"));
}

#[tokio::test]
async fn stream_ends_on_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let shutdown = CancellationToken::new();
    let state = AppState::new(context(dir.path()), shutdown.clone());

    let mut body = get(state, "/stream").await.into_body();
    shutdown.cancel();

    let end = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("stream did not end");
    assert!(end.is_none());
}

async fn next_part(body: &mut Body) -> Option<Bytes> {
    let frame = tokio::time::timeout(Duration::from_secs(2), body.frame())
        .await
        .expect("timed out waiting for part")?
        .unwrap();
    frame.into_data().ok()
}
