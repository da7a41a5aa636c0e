//! External-process mode: a streaming server plus an encoder doing the
//! capture, with this process only orchestrating them.

pub mod binaries;
pub mod command;
pub mod readiness;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::capture::CameraId;
use crate::pipeline::RetentionSweep;
use crate::{CaptureConfig, Config};

enum Readiness {
    Ready,
    Failed(RelayError),
    Cancelled,
}

pub struct Relay {
    config: Arc<Config>,
    media_server: PathBuf,
    encoder: PathBuf,
}

impl Relay {
    /// Resolve both binaries up front; a missing one is fatal.
    pub fn new(config: Config) -> Result<Self, RelayError> {
        let relay = &config.relay;
        let media_server = binaries::locate(&relay.media_server, &relay.search_dirs)?;
        let encoder = binaries::locate(&relay.encoder, &relay.search_dirs)?;
        info!("Streaming server: {}", media_server.display());
        info!("Encoder: {}", encoder.display());

        Ok(Self {
            config: Arc::new(config),
            media_server,
            encoder,
        })
    }

    pub fn encoder_args(&self) -> Vec<String> {
        command::encoder_args(&self.config)
    }

    /// Start both processes and supervise them until `cancel` fires or
    /// one of them exits. The encoder is only started once the streaming
    /// server accepts connections.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), RelayError> {
        let capture = resolve_camera(&self.config.capture).await?;
        Arc::make_mut(&mut self.config).capture = capture;

        let relay = &self.config.relay;
        tokio::fs::create_dir_all(&self.config.output.frame_dir).await?;

        let mut media = spawn("media server", &self.media_server, &relay.media_server.args)?;

        let addr = command::rtsp_addr(relay);
        let interval = Duration::from_millis(relay.readiness_interval_ms);
        info!("Waiting for streaming server on {}", addr);
        let ready = tokio::select! {
            res = readiness::wait_for_port(&addr, interval, relay.readiness_attempts) => match res {
                Ok(_) => Readiness::Ready,
                Err(e) => Readiness::Failed(e),
            },
            status = media.wait() => Readiness::Failed(RelayError::ExitedEarly {
                name: "media server".into(),
                status: describe(status),
            }),
            _ = cancel.cancelled() => Readiness::Cancelled,
        };
        match ready {
            Readiness::Ready => {}
            Readiness::Failed(e) => {
                terminate("media server", &mut media, self.grace()).await;
                return Err(e);
            }
            Readiness::Cancelled => {
                terminate("media server", &mut media, self.grace()).await;
                return Ok(());
            }
        }

        let args = self.encoder_args();
        debug!("encoder args: {:?}", args);
        let mut encoder = match spawn("encoder", &self.encoder, &args) {
            Ok(child) => child,
            Err(e) => {
                terminate("media server", &mut media, self.grace()).await;
                return Err(e);
            }
        };
        info!("Live stream: {}", command::rtsp_url(relay));
        info!("Frame output: {}/", self.config.output.frame_dir.display());

        let sweep_cancel = cancel.child_token();
        let sweep = self.config.retention.enabled.then(|| {
            tokio::spawn(
                RetentionSweep::new(
                    self.config.output.frame_dir.clone(),
                    self.config.output.format.extension(),
                    self.config.retention.max_files,
                    Duration::from_secs(self.config.retention.interval_secs),
                )
                .run(sweep_cancel.clone()),
            )
        });

        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Shutting down relay...");
                Ok(())
            }
            status = media.wait() => Err(RelayError::Exited {
                name: "media server".into(),
                status: describe(status),
            }),
            status = encoder.wait() => Err(RelayError::Exited {
                name: "encoder".into(),
                status: describe(status),
            }),
        };

        terminate("encoder", &mut encoder, self.grace()).await;
        terminate("media server", &mut media, self.grace()).await;
        sweep_cancel.cancel();
        if let Some(handle) = sweep {
            let _ = handle.await;
        }
        outcome
    }

    fn grace(&self) -> Duration {
        Duration::from_secs(self.config.relay.shutdown_grace_secs)
    }
}

/// Replace `auto` with the detected device so ffmpeg gets a concrete path
/// and a matching input format.
async fn resolve_camera(capture: &CaptureConfig) -> Result<CaptureConfig, RelayError> {
    if CameraId::parse(&capture.camera) != CameraId::Auto {
        return Ok(capture.clone());
    }

    #[cfg(feature = "v4l2")]
    {
        let device = crate::utils::auto_detect_device()
            .await
            .map_err(|e| RelayError::Detect(e.to_string()))?;
        info!("Relay camera: {} ({:?})", device.path, device.format);
        Ok(command::with_detected(capture, device))
    }
    #[cfg(not(feature = "v4l2"))]
    {
        warn!("Built without V4L2 support; using /dev/video0 for `auto`");
        Ok(capture.clone())
    }
}

fn spawn(name: &str, program: &Path, args: &[String]) -> Result<Child, RelayError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RelayError::Spawn {
            name: name.to_string(),
            source,
        })?;
    info!("Started {} (pid {:?})", name, child.id());

    if let Some(stderr) = child.stderr.take() {
        let name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !line.is_empty() {
                    info!(target: "camstream::relay::child", "{}: {}", name, line);
                }
            }
        });
    }
    Ok(child)
}

/// SIGTERM, wait up to `grace`, then SIGKILL.
async fn terminate(name: &str, child: &mut Child, grace: Duration) {
    if let Ok(Some(status)) = child.try_wait() {
        debug!("{} already exited ({})", name, status);
        return;
    }

    if let Some(pid) = child.id() {
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            debug!("SIGTERM to {} failed: {}", name, e);
        }
    }

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => info!("Stopped {} ({})", name, describe(status)),
        Err(_) => {
            warn!("{} ignored SIGTERM for {:?}, killing", name, grace);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill {}: {}", name, e);
            }
        }
    }
}

fn describe(status: std::io::Result<ExitStatus>) -> String {
    match status {
        Ok(status) => status.to_string(),
        Err(e) => format!("wait failed: {e}"),
    }
}
