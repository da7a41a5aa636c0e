pub mod app;
pub mod capture;
pub mod error;
pub mod pipeline;
pub mod relay;
pub mod server;
pub mod utils;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::frame::{Frame, ImageFormat, PixelFormat};
pub use error::ConfigError;
pub use pipeline::Context;

/// Prefix for environment overrides, e.g. `CAMSTREAM_HTTP__PORT=9000`
pub const ENV_PREFIX: &str = "CAMSTREAM";

/// Service configuration, loaded once at startup and read-only afterwards
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub output: OutputConfig,
    pub retention: RetentionConfig,
    pub http: HttpConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Device index, `/dev/videoN` path, `auto` or `testsrc`
    pub camera: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub pixel_format: PixelFormat,
    pub buffer_count: u32,
    /// Bounded wait for a single capture
    pub timeout_ms: u64,
    /// Consecutive failures before the device is closed and reopened
    pub reopen_after: u32,
    /// Failed reopen attempts before entering the degraded state
    pub max_reopen_attempts: u32,
    /// Image served once the loop is degraded
    pub placeholder: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub format: ImageFormat,
    /// Encode quality, 0-100
    pub quality: u8,
    pub frame_dir: PathBuf,
    /// Rate at which frames are persisted to `frame_dir`
    pub frame_fps: u32,
    pub write_frames: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub max_files: usize,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
    /// How often each `/stream` client re-checks the buffer
    pub stream_poll_ms: u64,
}

/// External binary, located by name unless `path` is given
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryConfig {
    pub name: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub media_server: BinaryConfig,
    pub encoder: BinaryConfig,
    pub search_dirs: Vec<PathBuf>,
    pub rtsp_port: u16,
    pub rtsp_path: String,
    pub readiness_interval_ms: u64,
    pub readiness_attempts: u32,
    pub shutdown_grace_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            camera: "0".into(),
            width: 1280,
            height: 720,
            fps: 10,
            pixel_format: PixelFormat::Mjpeg,
            buffer_count: 4,
            timeout_ms: 2000,
            reopen_after: 5,
            max_reopen_attempts: 3,
            placeholder: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: 90,
            frame_dir: PathBuf::from("/tmp/webcam"),
            frame_fps: 5,
            write_frames: true,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_files: 10_000,
            interval_secs: 60,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8086,
            stream_poll_ms: 33, // ~30fps for viewers
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            media_server: BinaryConfig {
                name: "mediamtx".into(),
                path: None,
                args: Vec::new(),
            },
            encoder: BinaryConfig {
                name: "ffmpeg".into(),
                path: None,
                args: Vec::new(),
            },
            search_dirs: vec![
                PathBuf::from("/opt/homebrew/bin"),
                PathBuf::from("/usr/local/bin"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("./bin"),
            ],
            rtsp_port: 8554,
            rtsp_path: "cam".into(),
            readiness_interval_ms: 500,
            readiness_attempts: 30,
            shutdown_grace_secs: 5,
        }
    }
}

impl Config {
    /// Layer defaults, an optional config file (JSON, YAML or TOML by
    /// extension) and `CAMSTREAM_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.capture.width == 0 || self.capture.height == 0 {
            return invalid("capture.width and capture.height must be non-zero");
        }
        if self.capture.fps == 0 {
            return invalid("capture.fps must be greater than zero");
        }
        if self.output.frame_fps == 0 {
            return invalid("output.frame_fps must be greater than zero");
        }
        if self.output.frame_fps > self.capture.fps {
            return invalid("output.frame_fps must not exceed capture.fps");
        }
        if self.output.quality > 100 {
            return invalid("output.quality must be within 0-100");
        }
        if self.retention.max_files == 0 {
            return invalid("retention.max_files must be at least 1");
        }
        if self.http.stream_poll_ms == 0 {
            return invalid("http.stream_poll_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.capture.fps))
    }

    pub fn write_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.output.frame_fps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_tool() {
        let config = Config::default();
        assert_eq!(config.capture.camera, "0");
        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.capture.height, 720);
        assert_eq!(config.capture.fps, 10);
        assert_eq!(config.output.frame_fps, 5);
        assert_eq!(config.output.quality, 90);
        assert_eq!(config.http.port, 8086);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_merges_partial_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camstream.json");
        std::fs::write(
            &path,
            r#"{ "capture": { "camera": "testsrc", "fps": 20 }, "http": { "port": 9100 } }"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.capture.camera, "testsrc");
        assert_eq!(config.capture.fps, 20);
        assert_eq!(config.capture.width, 1280);
        assert_eq!(config.http.port, 9100);
        assert_eq!(config.output.frame_dir, PathBuf::from("/tmp/webcam"));
    }

    #[test]
    fn load_reads_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camstream.yaml");
        std::fs::write(
            &path,
            "output:\n  format: webp\n  quality: 70\nretention:\n  enabled: true\n  max_files: 5\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.output.format, ImageFormat::Webp);
        assert_eq!(config.output.quality, 70);
        assert!(config.retention.enabled);
        assert_eq!(config.retention.max_files, 5);
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = Config::default();
        config.output.quality = 101;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.frame_fps = 30;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.retention.max_files = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn intervals_follow_rates() {
        let config = Config::default();
        assert_eq!(config.capture_interval(), Duration::from_millis(100));
        assert_eq!(config.write_interval(), Duration::from_millis(200));
    }
}
