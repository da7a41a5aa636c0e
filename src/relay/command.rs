//! ffmpeg invocation for the split live-stream / still-image pipeline

use crate::capture::{CameraId, ImageFormat, PixelFormat};
use crate::pipeline::retention::frame_file_name;
use crate::utils::FoundDevice;
use crate::{CaptureConfig, Config, RelayConfig};

pub fn rtsp_url(relay: &RelayConfig) -> String {
    format!("rtsp://127.0.0.1:{}/{}", relay.rtsp_port, relay.rtsp_path)
}

/// Address probed for streaming-server readiness
pub fn rtsp_addr(relay: &RelayConfig) -> String {
    format!("127.0.0.1:{}", relay.rtsp_port)
}

/// Map 0-100 quality onto ffmpeg's MJPEG qscale, 31 (worst) to 2 (best)
pub fn jpeg_qscale(quality: u8) -> u8 {
    let quality = u32::from(quality.min(100));
    (2 + (100 - quality) * 29 / 100) as u8
}

/// Pin an auto-detected device and its pixel format into the capture settings
pub fn with_detected(capture: &CaptureConfig, device: FoundDevice) -> CaptureConfig {
    CaptureConfig {
        camera: device.path,
        pixel_format: device.format,
        ..capture.clone()
    }
}

/// Input options for the configured camera on this platform
pub fn input_args(capture: &CaptureConfig) -> Vec<String> {
    let size = format!("{}x{}", capture.width, capture.height);
    let fps = capture.fps.to_string();

    let device = match CameraId::parse(&capture.camera) {
        CameraId::TestPattern => {
            return vec![
                "-re".into(),
                "-f".into(),
                "lavfi".into(),
                "-i".into(),
                format!("testsrc=size={size}:rate={fps}"),
            ];
        }
        CameraId::File(path) => {
            return vec![
                "-re".into(),
                "-stream_loop".into(),
                "-1".into(),
                "-i".into(),
                path.display().to_string(),
            ];
        }
        // Only reached without detection support; see `Relay::run`
        CameraId::Auto => "/dev/video0".to_string(),
        CameraId::Device(path) => path,
    };

    if cfg!(target_os = "macos") {
        // avfoundation addresses cameras by index; no audio
        let index = device.trim_start_matches("/dev/video");
        return vec![
            "-f".into(),
            "avfoundation".into(),
            "-framerate".into(),
            fps,
            "-video_size".into(),
            size,
            "-i".into(),
            format!("{index}:none"),
        ];
    }

    let mut args = vec!["-f".into(), "v4l2".into()];
    match capture.pixel_format {
        PixelFormat::Mjpeg => args.extend(["-input_format".into(), "mjpeg".into()]),
        PixelFormat::Yuyv4 => args.extend(["-input_format".into(), "yuyv422".into()]),
        _ => {}
    }
    args.extend([
        "-framerate".into(),
        fps,
        "-video_size".into(),
        size,
        "-i".into(),
        device,
    ]);
    args
}

/// Full encoder argument list.
///
/// One input is split in two: `[live]` goes to the streaming server as
/// low-latency H.264 over RTSP, `[stills]` is resampled to `frame_fps` and
/// written as `img_%06d.<ext>` into the frame directory.
pub fn encoder_args(config: &Config) -> Vec<String> {
    let relay = &config.relay;
    let output = &config.output;

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "warning".into(),
        "-nostdin".into(),
    ];
    args.extend(relay.encoder.args.iter().cloned());
    args.extend(input_args(&config.capture));

    args.extend([
        "-filter_complex".into(),
        format!("[0:v]split=2[live][still];[still]fps={}[stills]", output.frame_fps),
    ]);

    args.extend([
        "-map".into(),
        "[live]".into(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "ultrafast".into(),
        "-tune".into(),
        "zerolatency".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-g".into(),
        (config.capture.fps * 2).to_string(),
        "-f".into(),
        "rtsp".into(),
        "-rtsp_transport".into(),
        "tcp".into(),
        rtsp_url(relay),
    ]);

    args.extend(["-map".into(), "[stills]".into()]);
    match output.format {
        ImageFormat::Jpeg => args.extend(["-q:v".into(), jpeg_qscale(output.quality).to_string()]),
        ImageFormat::Webp => args.extend([
            "-c:v".into(),
            "libwebp".into(),
            "-quality".into(),
            output.quality.to_string(),
        ]),
    }
    let pattern = frame_file_name(0, output.format.extension()).replace("000000", "%06d");
    args.push(output.frame_dir.join(pattern).display().to_string());
    args
}
