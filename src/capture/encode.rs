//! Raw-to-encoded conversion for published frames

use std::path::Path;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::webp::WebPEncoder;
use image::ExtendedColorType;
use zune_jpeg::JpegDecoder;

use super::frame::{ImageFormat, PixelFormat, RawImage};
use crate::error::EncodeError;

/// Encode a raw image into the configured output format.
///
/// MJPEG input headed for JPEG output is validated and passed through
/// untouched; everything else is converted to RGB and re-encoded.
pub fn encode(raw: &RawImage, format: ImageFormat, quality: u8) -> Result<Bytes, EncodeError> {
    if raw.format == PixelFormat::Mjpeg {
        validate_jpeg(&raw.data)?;
        if format == ImageFormat::Jpeg {
            return Ok(raw.data.clone());
        }
        let rgb = image::load_from_memory_with_format(&raw.data, image::ImageFormat::Jpeg)
            .map_err(|e| EncodeError::CorruptJpeg(e.to_string()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        return encode_rgb(rgb.as_raw(), width, height, format, quality);
    }

    let rgb = to_rgb(raw)?;
    encode_rgb(&rgb, raw.width, raw.height, format, quality)
}

/// Encode an image file used as the degraded-state placeholder.
pub fn load_placeholder(
    path: &Path,
    format: ImageFormat,
    quality: u8,
) -> Result<(Bytes, u32, u32), EncodeError> {
    let rgb = image::open(path)
        .map_err(|source| EncodeError::Placeholder {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    let data = encode_rgb(rgb.as_raw(), width, height, format, quality)?;
    Ok((data, width, height))
}

pub fn encode_rgb(
    rgb: &[u8],
    width: u32,
    height: u32,
    format: ImageFormat,
    quality: u8,
) -> Result<Bytes, EncodeError> {
    let mut out = Vec::with_capacity(rgb.len() / 8);
    match format {
        ImageFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
                rgb,
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
        ImageFormat::Webp => {
            // The pure-Rust WebP encoder is lossless only; quality does not apply
            WebPEncoder::new_lossless(&mut out).encode(
                rgb,
                width,
                height,
                ExtendedColorType::Rgb8,
            )?;
        }
    }
    Ok(Bytes::from(out))
}

/// Reject truncated or garbled MJPEG frames before they reach the buffer.
fn validate_jpeg(data: &[u8]) -> Result<(), EncodeError> {
    let mut decoder = JpegDecoder::new(data);
    decoder
        .decode_headers()
        .map_err(|e| EncodeError::CorruptJpeg(format!("{e:?}")))?;

    // Some UVC cameras pad the payload with zeros after EOI
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    if end < 2 || data[end - 2..end] != [0xFF, 0xD9] {
        return Err(EncodeError::CorruptJpeg("missing end-of-image marker".into()));
    }
    Ok(())
}

fn to_rgb(raw: &RawImage) -> Result<Vec<u8>, EncodeError> {
    let pixels = (raw.width * raw.height) as usize;
    let expected = match raw.format {
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels * 3,
        PixelFormat::Yuyv4 => pixels * 2,
        PixelFormat::Nv12 => pixels * 3 / 2,
        PixelFormat::Mjpeg => unreachable!("MJPEG is handled before conversion"),
    };
    if raw.data.len() < expected {
        return Err(EncodeError::ShortBuffer {
            expected,
            actual: raw.data.len(),
        });
    }
    let data = &raw.data[..expected];

    let rgb = match raw.format {
        PixelFormat::Rgb24 => data.to_vec(),
        PixelFormat::Bgr24 => data.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]).collect(),
        PixelFormat::Yuyv4 => {
            let mut rgb = Vec::with_capacity(pixels * 3);
            for chunk in data.chunks_exact(4) {
                let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
                rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
                rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
            }
            rgb
        }
        PixelFormat::Nv12 => {
            let (width, height) = (raw.width as usize, raw.height as usize);
            let (luma, chroma) = data.split_at(pixels);
            let mut rgb = Vec::with_capacity(pixels * 3);
            for row in 0..height {
                for col in 0..width {
                    let uv = (row / 2) * width + (col & !1);
                    let y = luma[row * width + col];
                    rgb.extend_from_slice(&yuv_to_rgb(y, chroma[uv], chroma[uv + 1]));
                }
            }
            rgb
        }
        PixelFormat::Mjpeg => unreachable!(),
    };
    Ok(rgb)
}

/// BT.601 limited-range conversion
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = i32::from(y) - 16;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e),
        clamp(298 * c - 100 * d - 208 * e),
        clamp(298 * c + 516 * d),
    ]
}
