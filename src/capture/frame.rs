use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Encoded frame as held by the latest-frame buffer.
///
/// Frames are immutable once published and shared behind an `Arc`, so a
/// reader's snapshot stays valid while the capture loop overwrites the slot.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Encoded image bytes (JPEG or WebP)
    pub data: Bytes,

    /// Strictly increasing, assigned on publish
    pub sequence: u64,

    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,

    /// Wall-clock capture time, reported in `/status`
    pub captured_at: DateTime<Utc>,

    /// Monotonic capture timestamp for latency tracking
    pub timestamp: Instant,
}

impl Frame {
    /// Build an unpublished frame; the buffer assigns the sequence number.
    pub fn new(data: Bytes, format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            data,
            sequence: 0,
            format,
            width,
            height,
            captured_at: Utc::now(),
            timestamp: Instant::now(),
        }
    }
}

/// Raw image as produced by a frame source
#[derive(Debug, Clone)]
pub struct RawImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
}

/// Output encoding for served and persisted frames
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Webp,
}

impl ImageFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Webp => "image/webp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }
}
