//! Persists the latest frame to numbered files for downstream consumers

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::retention::{count_frames, frame_file_name, list_frames};
use super::Context;

/// Writes `img_%06d.<ext>` files at the configured output rate.
///
/// Each tick snapshots the buffer; a frame already written is skipped.
/// Files are written to a hidden temporary name and renamed into place.
pub struct FrameWriter {
    ctx: Arc<Context>,
    dir: PathBuf,
    ext: &'static str,
    next_index: u64,
    last_sequence: u64,
}

impl FrameWriter {
    /// Create the output directory and continue numbering after any
    /// frames already in it.
    pub async fn new(ctx: Arc<Context>) -> io::Result<Self> {
        let dir = ctx.config.output.frame_dir.clone();
        let ext = ctx.config.output.format.extension();
        tokio::fs::create_dir_all(&dir).await?;

        let scan_dir = dir.clone();
        let last = tokio::task::spawn_blocking(move || list_frames(&scan_dir, ext))
            .await
            .map_err(io::Error::other)??
            .last()
            .map_or(0, |(index, _)| *index);
        if last > 0 {
            info!("Resuming frame numbering after {}", frame_file_name(last, ext));
        }

        Ok(Self {
            ctx,
            dir,
            ext,
            next_index: last + 1,
            last_sequence: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the current frame if it has not been written yet.
    pub async fn write_latest(&mut self) -> io::Result<Option<PathBuf>> {
        let Some(frame) = self.ctx.buffer.snapshot() else {
            return Ok(None);
        };
        if frame.sequence == self.last_sequence {
            return Ok(None);
        }

        let name = frame_file_name(self.next_index, self.ext);
        let path = self.dir.join(&name);
        let tmp = self.dir.join(format!(".{name}.tmp"));

        if let Err(e) = write_then_rename(&tmp, &path, &frame.data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        self.next_index += 1;
        self.last_sequence = frame.sequence;
        Ok(Some(path))
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = interval(self.ctx.config.write_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Frame writer started: {} fps into {}",
            self.ctx.config.output.frame_fps,
            self.dir.display()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.write_latest().await {
                Ok(Some(path)) => {
                    self.ctx.writer.record_write();
                    let written = self.ctx.writer.frames_written();
                    if written == 1 {
                        info!("First frame saved: {}", path.display());
                    } else if written % 50 == 0 {
                        let (dir, ext) = (self.dir.clone(), self.ext);
                        let on_disk = tokio::task::spawn_blocking(move || count_frames(&dir, ext))
                            .await
                            .unwrap_or(0);
                        info!("Frame {} saved. Total files on disk: {}", written, on_disk);
                    } else {
                        debug!("Saved {}", path.display());
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    self.ctx.writer.record_error();
                    warn!("Failed to save frame {}: {}", self.next_index, e);
                }
            }
        }
        info!("Frame writer stopped after {} frames", self.ctx.writer.frames_written());
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    tokio::fs::write(tmp, data).await?;
    tokio::fs::rename(tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, ImageFormat};
    use crate::Config;
    use bytes::Bytes;

    fn ctx_in(dir: &Path) -> Arc<Context> {
        let mut config = Config::default();
        config.output.frame_dir = dir.to_path_buf();
        Context::new(config)
    }

    fn publish(ctx: &Context, byte: u8) {
        ctx.buffer
            .publish(Frame::new(Bytes::from(vec![byte; 8]), ImageFormat::Jpeg, 1, 1));
    }

    #[tokio::test]
    async fn nothing_to_write_before_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FrameWriter::new(ctx_in(dir.path())).await.unwrap();
        assert!(writer.write_latest().await.unwrap().is_none());
        assert_eq!(count_frames(dir.path(), "jpg"), 0);
    }

    #[tokio::test]
    async fn writes_sequential_files_and_skips_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let mut writer = FrameWriter::new(Arc::clone(&ctx)).await.unwrap();

        publish(&ctx, 1);
        let first = writer.write_latest().await.unwrap().unwrap();
        assert_eq!(first, dir.path().join("img_000001.jpg"));
        assert!(writer.write_latest().await.unwrap().is_none());

        publish(&ctx, 2);
        let second = writer.write_latest().await.unwrap().unwrap();
        assert_eq!(second, dir.path().join("img_000002.jpg"));
        assert_eq!(std::fs::read(&second).unwrap(), vec![2; 8]);
        assert_eq!(count_frames(dir.path(), "jpg"), 2);
    }

    #[tokio::test]
    async fn numbering_resumes_after_existing_frames() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("img_000041.jpg"), b"old").unwrap();
        let ctx = ctx_in(dir.path());
        let mut writer = FrameWriter::new(Arc::clone(&ctx)).await.unwrap();

        publish(&ctx, 9);
        let path = writer.write_latest().await.unwrap().unwrap();
        assert_eq!(path, dir.path().join("img_000042.jpg"));
    }

    #[tokio::test]
    async fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b");
        let writer = FrameWriter::new(ctx_in(&nested)).await.unwrap();
        assert!(writer.dir().is_dir());
    }

    #[tokio::test]
    async fn failed_write_keeps_index() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path());
        let mut writer = FrameWriter::new(Arc::clone(&ctx)).await.unwrap();

        // A directory squatting on the target name makes the rename fail
        std::fs::create_dir(dir.path().join("img_000001.jpg")).unwrap();
        std::fs::write(dir.path().join("img_000001.jpg/blocker"), b"x").unwrap();
        publish(&ctx, 1);
        assert!(writer.write_latest().await.is_err());
        assert!(!dir.path().join(".img_000001.jpg.tmp").exists());

        std::fs::remove_dir_all(dir.path().join("img_000001.jpg")).unwrap();
        let path = writer.write_latest().await.unwrap().unwrap();
        assert_eq!(path, dir.path().join("img_000001.jpg"));
    }
}
