//! `multipart/x-mixed-replace` streaming of the latest frame
//!
//! Every client runs its own poll loop over the latest-frame buffer and
//! only emits a part when the sequence number moved, so a slow client
//! skips frames instead of holding anyone else back. The loop ends when
//! the client goes away (hyper drops the body) or on shutdown.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::capture::Frame;
use crate::pipeline::Context;

pub const BOUNDARY: &str = "frame";
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Per-part header carrying the frame's sequence number
pub const SEQUENCE_HEADER: &str = "X-Frame-Sequence";

/// Boundary, part headers, image bytes and trailing CRLF for one frame
pub fn encode_part(frame: &Frame) -> Bytes {
    let head = format!(
        "--{BOUNDARY}\r\n\
         Content-Type: {mime}\r\n\
         Content-Length: {len}\r\n\
         {SEQUENCE_HEADER}: {seq}\r\n\
         \r\n",
        mime = frame.format.mime_type(),
        len = frame.data.len(),
        seq = frame.sequence,
    );

    let mut part = Vec::with_capacity(head.len() + frame.data.len() + 2);
    part.extend_from_slice(head.as_bytes());
    part.extend_from_slice(&frame.data);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Decrements the client gauge when the stream body is dropped
struct ClientGuard {
    id: u64,
}

impl ClientGuard {
    fn new(id: u64) -> Self {
        metrics::gauge!("camstream_stream_clients").increment(1.0);
        debug!(client = id, "Stream client connected");
        Self { id }
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        metrics::gauge!("camstream_stream_clients").decrement(1.0);
        debug!(client = self.id, "Stream client disconnected");
    }
}

pub fn stream_response(ctx: Arc<Context>, shutdown: CancellationToken, client_id: u64) -> Response {
    let poll = Duration::from_millis(ctx.config.http.stream_poll_ms);

    let parts = async_stream::stream! {
        let _guard = ClientGuard::new(client_id);
        let mut last_sent = 0u64;
        loop {
            if let Some(frame) = ctx.buffer.snapshot() {
                if frame.sequence != last_sent {
                    last_sent = frame.sequence;
                    yield Ok::<_, Infallible>(encode_part(&frame));
                }
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(poll) => {}
            }
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            (header::PRAGMA, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ImageFormat;

    #[test]
    fn part_layout() {
        let mut frame = Frame::new(Bytes::from_static(b"JPEGDATA"), ImageFormat::Jpeg, 1, 1);
        frame.sequence = 12;

        let part = encode_part(&frame);
        let expected = b"--frame\r\n\
            Content-Type: image/jpeg\r\n\
            Content-Length: 8\r\n\
            X-Frame-Sequence: 12\r\n\
            \r\n\
            JPEGDATA\r\n";
        assert_eq!(&part[..], &expected[..]);
    }

    #[test]
    fn webp_parts_carry_webp_type() {
        let frame = Frame::new(Bytes::from_static(b"RIFF"), ImageFormat::Webp, 1, 1);
        let part = encode_part(&frame);
        assert!(String::from_utf8_lossy(&part).contains("Content-Type: image/webp\r\n"));
    }
}
