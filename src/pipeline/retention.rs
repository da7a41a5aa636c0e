//! On-disk frame naming, counting and the retention sweep

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PREFIX: &str = "img_";

/// `img_000042.jpg`
pub fn frame_file_name(index: u64, ext: &str) -> String {
    format!("{PREFIX}{index:06}.{ext}")
}

/// Index of a frame file name, `None` for anything else (temporaries included)
pub fn parse_index(name: &str, ext: &str) -> Option<u64> {
    let digits = name.strip_prefix(PREFIX)?.strip_suffix(ext)?.strip_suffix('.')?;
    if digits.len() < 6 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Frame files in `dir`, oldest (lowest index) first
pub fn list_frames(dir: &Path, ext: &str) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(|n| parse_index(n, ext)) {
            frames.push((index, entry.path()));
        }
    }
    frames.sort_unstable_by_key(|(index, _)| *index);
    Ok(frames)
}

pub fn count_frames(dir: &Path, ext: &str) -> usize {
    list_frames(dir, ext).map(|f| f.len()).unwrap_or(0)
}

/// Delete the oldest frame files beyond `max_files`.
///
/// Only completed `img_NNNNNN.<ext>` files are considered; writers land
/// frames by rename, so nothing is removed mid-write. Returns the number of
/// files deleted.
pub fn sweep(dir: &Path, ext: &str, max_files: usize) -> io::Result<usize> {
    let frames = list_frames(dir, ext)?;
    let excess = frames.len().saturating_sub(max_files);

    let mut deleted = 0;
    for (_, path) in frames.into_iter().take(excess) {
        match fs::remove_file(&path) {
            Ok(()) => deleted += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to delete {}: {}", path.display(), e),
        }
    }
    Ok(deleted)
}

/// Periodic maintenance pass keeping at most `max_files` frames on disk
pub struct RetentionSweep {
    dir: PathBuf,
    ext: String,
    max_files: usize,
    every: Duration,
}

impl RetentionSweep {
    pub fn new(dir: PathBuf, ext: impl Into<String>, max_files: usize, every: Duration) -> Self {
        Self {
            dir,
            ext: ext.into(),
            max_files,
            every,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "Retention sweep: keeping {} newest frames in {} every {:?}",
            self.max_files,
            self.dir.display(),
            self.every
        );
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let (dir, ext, max) = (self.dir.clone(), self.ext.clone(), self.max_files);
            match tokio::task::spawn_blocking(move || sweep(&dir, &ext, max)).await {
                Ok(Ok(0)) => {}
                Ok(Ok(n)) => {
                    debug!("Retention sweep removed {} frames", n);
                    metrics::counter!("camstream_files_swept_total").increment(n as u64);
                }
                Ok(Err(e)) => warn!("Retention sweep failed: {}", e),
                Err(e) => warn!("Retention sweep task failed: {}", e),
            }
        }
        debug!("Retention sweep stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        assert_eq!(frame_file_name(7, "jpg"), "img_000007.jpg");
        assert_eq!(frame_file_name(1_234_567, "webp"), "img_1234567.webp");
        assert_eq!(parse_index("img_000007.jpg", "jpg"), Some(7));
        assert_eq!(parse_index("img_1234567.webp", "webp"), Some(1_234_567));
    }

    #[test]
    fn foreign_names_are_ignored() {
        assert_eq!(parse_index("img_000007.jpg", "webp"), None);
        assert_eq!(parse_index(".img_000007.jpg.tmp", "jpg"), None);
        assert_eq!(parse_index("img_7.jpg", "jpg"), None);
        assert_eq!(parse_index("img_00000a.jpg", "jpg"), None);
        assert_eq!(parse_index("snapshot.jpg", "jpg"), None);
    }

    #[test]
    fn sweep_under_limit_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        for i in 1..=3 {
            fs::write(dir.path().join(frame_file_name(i, "jpg")), b"x").unwrap();
        }
        assert_eq!(sweep(dir.path(), "jpg", 5).unwrap(), 0);
        assert_eq!(count_frames(dir.path(), "jpg"), 3);
    }

    #[test]
    fn sweep_orders_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for i in [999_999u64, 1_000_000, 1_000_001] {
            fs::write(dir.path().join(frame_file_name(i, "jpg")), b"x").unwrap();
        }
        assert_eq!(sweep(dir.path(), "jpg", 2).unwrap(), 1);

        let left: Vec<u64> = list_frames(dir.path(), "jpg")
            .unwrap()
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(left, vec![1_000_000, 1_000_001]);
    }
}
