use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::retention::count_frames;
use crate::pipeline::{CaptureState, Context};
use crate::Config;

/// Point-in-time view served by `/status`, derived from the shared counters
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub healthy: bool,
    pub state: CaptureState,
    /// Frames successfully captured since start
    pub frame_count: u64,
    /// Sequence number of the frame currently served
    pub sequence: u64,
    pub capture_errors: u64,
    pub reconnects: u64,
    pub frames_written: u64,
    pub write_errors: u64,
    pub files_on_disk: usize,
    pub last_frame_at: Option<DateTime<Utc>>,
    pub frame_dir: PathBuf,
    pub config: Config,
}

impl ServiceStatus {
    pub async fn collect(ctx: &Context, running: bool) -> Self {
        let config = ctx.config.as_ref().clone();
        let frame_dir = config.output.frame_dir.clone();
        let ext = config.output.format.extension();

        let dir = frame_dir.clone();
        let files_on_disk = tokio::task::spawn_blocking(move || count_frames(&dir, ext))
            .await
            .unwrap_or(0);

        let state = ctx.stats.state();
        let current = ctx.buffer.snapshot();

        Self {
            running,
            healthy: state == CaptureState::Running,
            state,
            frame_count: ctx.stats.frames_captured(),
            sequence: current.as_ref().map_or(0, |f| f.sequence),
            capture_errors: ctx.stats.capture_errors(),
            reconnects: ctx.stats.reconnects(),
            frames_written: ctx.writer.frames_written(),
            write_errors: ctx.writer.write_errors(),
            files_on_disk,
            last_frame_at: current.map(|f| f.captured_at),
            frame_dir,
            config,
        }
    }
}

