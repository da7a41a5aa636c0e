//! Error types shared across the capture pipeline and the relay orchestrator

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::capture::frame::PixelFormat;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Failures reported by a frame source
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open camera {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("camera is not open")]
    NotOpen,
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("device I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("invalid frame data: {0}")]
    InvalidFrame(String),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("corrupt MJPEG frame: {0}")]
    CorruptJpeg(String),
    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    ShortBuffer { expected: usize, actual: usize },
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("failed to read placeholder {path}: {source}")]
    Placeholder {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Failures of the external-process orchestrator
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("required binary `{0}` not found in search path")]
    BinaryNotFound(String),
    #[error("failed to start {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("camera auto-detection failed: {0}")]
    Detect(String),
    #[error("{addr} not accepting connections after {attempts} attempts")]
    ReadinessTimeout { addr: String, attempts: u32 },
    #[error("{name} exited before becoming ready ({status})")]
    ExitedEarly { name: String, status: String },
    #[error("{name} exited unexpectedly ({status})")]
    Exited { name: String, status: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}
