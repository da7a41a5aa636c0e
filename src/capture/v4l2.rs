//! V4L2 camera source with memory-mapped streaming

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::frame::{PixelFormat, RawImage};
use super::source::FrameSource;
use crate::error::CaptureError;
use crate::CaptureConfig;

pub struct V4l2Source {
    path: String,
    config: CaptureConfig,
    device: Option<Box<Device>>,
    stream: Option<MmapStream<'static>>,
    width: u32,
    height: u32,
}

impl V4l2Source {
    pub fn new(path: String, config: CaptureConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            path,
            config,
            device: None,
            stream: None,
        }
    }

    fn open_err(&self, reason: impl ToString) -> CaptureError {
        CaptureError::Open {
            device: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}

pub fn fourcc(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
        PixelFormat::Bgr24 => FourCC::new(b"BGR3"),
        PixelFormat::Nv12 => FourCC::new(b"NV12"),
    }
}

impl FrameSource for V4l2Source {
    #[instrument(skip(self), fields(device = %self.path))]
    fn open(&mut self) -> Result<(), CaptureError> {
        let device = Device::with_path(&self.path).map_err(|e| self.open_err(e))?;

        let caps = device.query_caps().map_err(|e| self.open_err(e))?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(self.open_err("device doesn't support video capture"));
        }

        let mut fmt = device.format().map_err(|e| self.open_err(e))?;
        fmt.width = self.config.width;
        fmt.height = self.config.height;
        fmt.fourcc = fourcc(self.config.pixel_format);
        let fmt = device.set_format(&fmt).map_err(|e| self.open_err(e))?;

        if fmt.fourcc != fourcc(self.config.pixel_format) {
            return Err(CaptureError::UnsupportedFormat(self.config.pixel_format));
        }
        if (fmt.width, fmt.height) != (self.config.width, self.config.height) {
            warn!(
                "Requested {}x{}, device negotiated {}x{}",
                self.config.width, self.config.height, fmt.width, fmt.height
            );
        }
        self.width = fmt.width;
        self.height = fmt.height;

        if let Err(e) = device.set_params(&Parameters::with_fps(self.config.fps)) {
            warn!("Could not set frame rate to {}: {}", self.config.fps, e);
        }

        let mut stream =
            MmapStream::with_buffers(&device, Type::VideoCapture, self.config.buffer_count)
                .map_err(|e| self.open_err(e))?;
        stream.set_timeout(Duration::from_millis(self.config.timeout_ms));

        info!(
            "Capture stream started: {}x{}@{}fps with {} buffers",
            self.width, self.height, self.config.fps, self.config.buffer_count
        );

        self.device = Some(Box::new(device));
        self.stream = Some(stream);
        Ok(())
    }

    fn capture(&mut self, timeout: Duration) -> Result<RawImage, CaptureError> {
        let stream = self.stream.as_mut().ok_or(CaptureError::NotOpen)?;

        let (buf, meta) = stream.next().map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => CaptureError::Timeout(timeout),
            _ => CaptureError::Io(e),
        })?;

        let used = match meta.bytesused as usize {
            0 => buf.len(),
            n => n.min(buf.len()),
        };
        if used == 0 {
            return Err(CaptureError::InvalidFrame("empty buffer".into()));
        }

        Ok(RawImage {
            data: Bytes::copy_from_slice(&buf[..used]),
            width: self.width,
            height: self.height,
            format: self.config.pixel_format,
        })
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed capture stream on {}", self.path);
        }
        self.device = None;
    }

    fn describe(&self) -> String {
        format!("{} ({:?})", self.path, self.config.pixel_format)
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.close();
    }
}
