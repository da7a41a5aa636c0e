//! Background capture loop: source -> encoder -> latest-frame buffer

use std::any::Any;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::stats::CaptureState;
use super::Context;
use crate::capture::encode::{encode, load_placeholder};
use crate::capture::{Frame, FrameSource};
use crate::error::CaptureError;

/// Pulls frames from a source at the configured rate and publishes them.
///
/// Failed captures leave the previous frame in place. After
/// `reopen_after` consecutive failures the source is closed and reopened;
/// after `max_reopen_attempts` reopens without a good frame the loop goes
/// degraded and stops touching the buffer (apart from an optional
/// placeholder) until shutdown.
pub struct CaptureLoop<S: FrameSource + 'static> {
    source: Option<S>,
    ctx: Arc<Context>,
    consecutive_failures: u32,
    reopen_attempts: u32,
}

enum Outcome {
    Continue,
    Degraded,
}

impl<S: FrameSource + 'static> CaptureLoop<S> {
    /// `source` must already be open.
    pub fn new(source: S, ctx: Arc<Context>) -> Self {
        Self {
            source: Some(source),
            ctx,
            consecutive_failures: 0,
            reopen_attempts: 0,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(self.ctx.config.capture_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Capture loop started at {} fps ({})",
            self.ctx.config.capture.fps,
            self.source.as_ref().map(|s| s.describe()).unwrap_or_default()
        );
        self.ctx.stats.set_state(CaptureState::Running);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Outcome::Degraded = self.step().await {
                self.degrade().await;
                cancel.cancelled().await;
                break;
            }
        }

        if let Some(mut source) = self.source.take() {
            source.close();
        }
        info!("Camera capture stopped");
    }

    async fn step(&mut self) -> Outcome {
        match self.capture_one().await {
            Ok(frame) => {
                let sequence = self.ctx.buffer.publish(frame);
                self.ctx.stats.record_frame();
                if sequence == 1 {
                    info!("First frame captured");
                }
                if self.consecutive_failures > 0 || self.reopen_attempts > 0 {
                    info!("Capture recovered after {} failures", self.consecutive_failures);
                }
                self.consecutive_failures = 0;
                self.reopen_attempts = 0;
                self.ctx.stats.set_state(CaptureState::Running);
                Outcome::Continue
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.ctx.stats.record_error();
                if self.consecutive_failures == 1 {
                    warn!("Failed to read frame from camera: {}", e);
                } else {
                    debug!("Capture failure #{}: {}", self.consecutive_failures, e);
                }

                if self.consecutive_failures < self.ctx.config.capture.reopen_after {
                    return Outcome::Continue;
                }
                if self.reopen_attempts >= self.ctx.config.capture.max_reopen_attempts {
                    return Outcome::Degraded;
                }
                self.reopen().await;
                Outcome::Continue
            }
        }
    }

    /// Capture and encode on a blocking thread; the buffer is not touched here.
    ///
    /// A panic inside the source or encoder counts as a failed capture and
    /// the source is handed back, so it can still be reopened.
    async fn capture_one(&mut self) -> Result<Frame, CaptureError> {
        let mut source = self.source.take().ok_or(CaptureError::NotOpen)?;
        let timeout = Duration::from_millis(self.ctx.config.capture.timeout_ms);
        let format = self.ctx.config.output.format;
        let quality = self.ctx.config.output.quality;

        let (source, result) = tokio::task::spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(|| -> Result<Frame, CaptureError> {
                let raw = source.capture(timeout)?;
                let data = encode(&raw, format, quality)?;
                Ok(Frame::new(data, format, raw.width, raw.height))
            }))
            .unwrap_or_else(|panic| Err(panicked("capture", panic)));
            (source, result)
        })
        .await
        .map_err(|e| CaptureError::Io(io::Error::other(e)))?;

        self.source = Some(source);
        result
    }

    async fn reopen(&mut self) {
        self.reopen_attempts += 1;
        self.consecutive_failures = 0;
        self.ctx.stats.set_state(CaptureState::Reconnecting);
        self.ctx.stats.record_reconnect();

        let Some(mut source) = self.source.take() else {
            error!("Capture source lost, cannot reopen");
            return;
        };
        warn!(
            "Reopening {} (attempt {}/{})",
            source.describe(),
            self.reopen_attempts,
            self.ctx.config.capture.max_reopen_attempts
        );

        let joined = tokio::task::spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(|| {
                source.close();
                source.open()
            }))
            .unwrap_or_else(|panic| Err(panicked("reopen", panic)));
            (source, result)
        })
        .await;

        match joined {
            Ok((source, result)) => {
                self.source = Some(source);
                match result {
                    Ok(()) => info!("Camera reopened"),
                    Err(e) => warn!("Reopen failed: {}", e),
                }
            }
            Err(e) => error!("Reopen task failed: {}", e),
        }
    }

    async fn degrade(&mut self) {
        self.ctx.stats.set_state(CaptureState::Degraded);
        error!(
            "Camera unavailable after {} reopen attempts; serving last known frame",
            self.reopen_attempts
        );
        if let Some(mut source) = self.source.take() {
            source.close();
        }

        let Some(path) = self.ctx.config.capture.placeholder.clone() else {
            return;
        };
        let format = self.ctx.config.output.format;
        let quality = self.ctx.config.output.quality;
        match tokio::task::spawn_blocking(move || load_placeholder(&path, format, quality)).await {
            Ok(Ok((data, width, height))) => {
                self.ctx.buffer.publish(Frame::new(data, format, width, height));
                info!("Serving placeholder image");
            }
            Ok(Err(e)) => warn!("Placeholder unavailable: {}", e),
            Err(e) => warn!("Placeholder task failed: {}", e),
        }
    }
}

fn panicked(what: &str, panic: Box<dyn Any + Send>) -> CaptureError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into());
    CaptureError::Io(io::Error::other(format!("{what} panicked: {message}")))
}
