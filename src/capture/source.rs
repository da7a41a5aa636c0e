//! Frame sources: anything that can hand the capture loop a raw image

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tracing::info;

use super::file::FileSource;
use super::frame::{PixelFormat, RawImage};
use crate::error::CaptureError;
use crate::CaptureConfig;

/// Camera-like producer of raw images.
///
/// `capture` must return within roughly `timeout`; the capture loop runs it
/// on a blocking thread and never holds the frame buffer while it does.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CaptureError>;

    fn capture(&mut self, timeout: Duration) -> Result<RawImage, CaptureError>;

    fn close(&mut self);

    /// Human-readable identifier for logs
    fn describe(&self) -> String;
}

impl FrameSource for Box<dyn FrameSource> {
    fn open(&mut self) -> Result<(), CaptureError> {
        (**self).open()
    }

    fn capture(&mut self, timeout: Duration) -> Result<RawImage, CaptureError> {
        (**self).capture(timeout)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Resolved form of the `capture.camera` setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraId {
    TestPattern,
    Auto,
    Device(String),
    /// Video file replayed in a loop
    File(PathBuf),
}

impl CameraId {
    pub fn parse(camera: &str) -> Self {
        match camera.trim() {
            "testsrc" => CameraId::TestPattern,
            "auto" | "" => CameraId::Auto,
            index if index.chars().all(|c| c.is_ascii_digit()) => {
                CameraId::Device(format!("/dev/video{index}"))
            }
            path if path.starts_with("/dev/") => CameraId::Device(path.to_string()),
            path => CameraId::File(PathBuf::from(path)),
        }
    }
}

/// Build the frame source named by the configuration.
///
/// The returned source is not yet opened.
pub async fn open_source(config: &CaptureConfig) -> color_eyre::Result<Box<dyn FrameSource>> {
    match CameraId::parse(&config.camera) {
        CameraId::TestPattern => {
            info!("Using synthetic test pattern {}x{}", config.width, config.height);
            Ok(Box::new(TestPattern::new(config.width, config.height)))
        }
        CameraId::File(path) => Ok(Box::new(FileSource::new(path))),
        #[cfg(feature = "v4l2")]
        CameraId::Auto => {
            let device = crate::utils::auto_detect_device().await?;
            let mut config = config.clone();
            config.pixel_format = device.format;
            Ok(Box::new(super::v4l2::V4l2Source::new(device.path, config)))
        }
        #[cfg(feature = "v4l2")]
        CameraId::Device(path) => {
            Ok(Box::new(super::v4l2::V4l2Source::new(path, config.clone())))
        }
        #[cfg(not(feature = "v4l2"))]
        other => Err(color_eyre::eyre::eyre!("camera {other:?} requires the `v4l2` feature")),
    }
}

/// Moving diagonal gradient, for running without camera hardware
pub struct TestPattern {
    width: u32,
    height: u32,
    tick: u32,
    open: bool,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
            open: false,
        }
    }
}

impl FrameSource for TestPattern {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.open = true;
        Ok(())
    }

    fn capture(&mut self, _timeout: Duration) -> Result<RawImage, CaptureError> {
        if !self.open {
            return Err(CaptureError::NotOpen);
        }
        self.tick = self.tick.wrapping_add(4);

        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let v = (x + y + self.tick) as u8;
                data.extend_from_slice(&[v, v.wrapping_add(85), v.wrapping_add(170)]);
            }
        }

        Ok(RawImage {
            data: Bytes::from(data),
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgb24,
        })
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn describe(&self) -> String {
        format!("testsrc {}x{}", self.width, self.height)
    }
}
