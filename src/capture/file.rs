//! Looping video-file input
//!
//! A file is either a concatenated MJPEG stream or a single still image.
//! Frames are split out once on open and replayed in order; after the last
//! one the source starts again from the first.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};
use zune_jpeg::JpegDecoder;

use super::frame::{PixelFormat, RawImage};
use super::source::FrameSource;
use crate::error::CaptureError;

const SOI: [u8; 3] = [0xFF, 0xD8, 0xFF];
const EOI: [u8; 2] = [0xFF, 0xD9];

pub struct FileSource {
    path: PathBuf,
    frames: Vec<RawImage>,
    next: usize,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frames: Vec::new(),
            next: 0,
        }
    }

    fn open_error(&self, reason: impl ToString) -> CaptureError {
        CaptureError::Open {
            device: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    fn load(&self, data: Bytes) -> Result<Vec<RawImage>, CaptureError> {
        let jpegs = split_mjpeg(&data);
        if jpegs.is_empty() {
            let rgb = image::load_from_memory(&data)
                .map_err(|e| self.open_error(format!("not MJPEG or a still image: {e}")))?
                .to_rgb8();
            let (width, height) = rgb.dimensions();
            return Ok(vec![RawImage {
                data: Bytes::from(rgb.into_raw()),
                width,
                height,
                format: PixelFormat::Rgb24,
            }]);
        }

        jpegs
            .into_iter()
            .enumerate()
            .map(|(i, jpeg)| {
                let mut decoder = JpegDecoder::new(&jpeg[..]);
                decoder
                    .decode_headers()
                    .map_err(|e| self.open_error(format!("frame {i}: {e:?}")))?;
                let (width, height) = decoder
                    .dimensions()
                    .ok_or_else(|| self.open_error(format!("frame {i}: no dimensions")))?;
                Ok(RawImage {
                    data: jpeg,
                    width: width as u32,
                    height: height as u32,
                    format: PixelFormat::Mjpeg,
                })
            })
            .collect()
    }
}

impl FrameSource for FileSource {
    fn open(&mut self) -> Result<(), CaptureError> {
        let data = std::fs::read(&self.path).map_err(|e| self.open_error(e))?;
        self.frames = self.load(Bytes::from(data))?;
        self.next = 0;
        info!("Replaying {} ({} frames)", self.path.display(), self.frames.len());
        Ok(())
    }

    fn capture(&mut self, _timeout: Duration) -> Result<RawImage, CaptureError> {
        let frame = self.frames.get(self.next).cloned().ok_or(CaptureError::NotOpen)?;
        self.next += 1;
        if self.next == self.frames.len() {
            debug!("End of {}, restarting", self.path.display());
            self.next = 0;
        }
        Ok(frame)
    }

    fn close(&mut self) {
        self.frames.clear();
        self.next = 0;
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}

fn find(data: &[u8], pattern: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(pattern.len())
        .position(|w| w == pattern)
        .map(|i| i + from)
}

/// Split concatenated JPEGs. An end-of-image marker only closes a frame
/// when the next frame or the end of the file follows it, so EOI markers of
/// embedded thumbnails are skipped.
fn split_mjpeg(data: &Bytes) -> Vec<Bytes> {
    let mut frames = Vec::new();
    let Some(mut start) = find(data, &SOI, 0) else {
        return frames;
    };
    let mut search = start + SOI.len();

    while let Some(eoi) = find(data, &EOI, search) {
        let end = eoi + EOI.len();
        let rest = &data[end..];
        if rest.starts_with(&SOI) || rest.iter().all(|&b| b == 0) {
            frames.push(data.slice(start..end));
            match find(data, &SOI, end) {
                Some(next) => {
                    start = next;
                    search = next + SOI.len();
                }
                None => break,
            }
        } else {
            search = end;
        }
    }
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::encode::encode_rgb;
    use crate::capture::ImageFormat;

    fn jpeg(width: u32, height: u32) -> Bytes {
        let rgb = vec![128u8; (width * height * 3) as usize];
        encode_rgb(&rgb, width, height, ImageFormat::Jpeg, 80).unwrap()
    }

    #[test]
    fn mjpeg_file_loops_back_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mjpeg");
        let mut clip = jpeg(8, 8).to_vec();
        clip.extend_from_slice(&jpeg(16, 8));
        std::fs::write(&path, &clip).unwrap();

        let mut source = FileSource::new(&path);
        source.open().unwrap();
        let sizes: Vec<_> = (0..5)
            .map(|_| {
                let raw = source.capture(Duration::ZERO).unwrap();
                assert_eq!(raw.format, PixelFormat::Mjpeg);
                (raw.width, raw.height)
            })
            .collect();
        assert_eq!(sizes, [(8, 8), (16, 8), (8, 8), (16, 8), (8, 8)]);
    }

    #[test]
    fn still_image_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("still.png");
        image::RgbImage::from_pixel(3, 2, image::Rgb([1, 2, 3]))
            .save(&path)
            .unwrap();

        let mut source = FileSource::new(&path);
        source.open().unwrap();
        for _ in 0..3 {
            let raw = source.capture(Duration::ZERO).unwrap();
            assert_eq!((raw.width, raw.height, raw.format), (3, 2, PixelFormat::Rgb24));
            assert_eq!(&raw.data[..3], &[1, 2, 3]);
        }
    }

    #[test]
    fn missing_or_garbage_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let mut missing = FileSource::new(dir.path().join("nope.mjpeg"));
        assert!(matches!(missing.open(), Err(CaptureError::Open { .. })));

        let garbage = dir.path().join("garbage.bin");
        std::fs::write(&garbage, b"not a video").unwrap();
        let mut source = FileSource::new(&garbage);
        assert!(matches!(source.open(), Err(CaptureError::Open { .. })));
        assert!(matches!(
            source.capture(Duration::ZERO),
            Err(CaptureError::NotOpen)
        ));
    }

    #[test]
    fn trailing_padding_still_closes_last_frame() {
        let mut data = jpeg(4, 4).to_vec();
        data.extend_from_slice(&[0, 0, 0]);
        assert_eq!(split_mjpeg(&Bytes::from(data)).len(), 1);
    }
}
