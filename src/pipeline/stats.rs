//! Status counters, updated by the pipeline tasks and read by `/status`

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crossbeam::utils::CachePadded;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Starting,
    Running,
    Reconnecting,
    /// Capture gave up; the last good frame (or placeholder) keeps being served
    Degraded,
}

impl CaptureState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => CaptureState::Running,
            2 => CaptureState::Reconnecting,
            3 => CaptureState::Degraded,
            _ => CaptureState::Starting,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            CaptureState::Starting => 0,
            CaptureState::Running => 1,
            CaptureState::Reconnecting => 2,
            CaptureState::Degraded => 3,
        }
    }
}

#[derive(Default)]
pub struct CaptureStats {
    inner: CachePadded<CaptureCounters>,
}

#[derive(Default)]
struct CaptureCounters {
    frames_captured: AtomicU64,
    capture_errors: AtomicU64,
    reconnects: AtomicU64,
    state: AtomicU8,
}

impl CaptureStats {
    pub fn record_frame(&self) {
        self.inner.frames_captured.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camstream_frames_captured_total").increment(1);
    }

    pub fn record_error(&self) {
        self.inner.capture_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camstream_capture_errors_total").increment(1);
    }

    pub fn record_reconnect(&self) {
        self.inner.reconnects.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camstream_reconnects_total").increment(1);
    }

    pub fn set_state(&self, state: CaptureState) {
        self.inner.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn state(&self) -> CaptureState {
        CaptureState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn frames_captured(&self) -> u64 {
        self.inner.frames_captured.load(Ordering::Relaxed)
    }

    pub fn capture_errors(&self) -> u64 {
        self.inner.capture_errors.load(Ordering::Relaxed)
    }

    pub fn reconnects(&self) -> u64 {
        self.inner.reconnects.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct WriterStats {
    inner: CachePadded<WriterCounters>,
}

#[derive(Default)]
struct WriterCounters {
    frames_written: AtomicU64,
    write_errors: AtomicU64,
}

impl WriterStats {
    pub fn record_write(&self) {
        self.inner.frames_written.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camstream_frames_written_total").increment(1);
    }

    pub fn record_error(&self) {
        self.inner.write_errors.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("camstream_write_errors_total").increment(1);
    }

    pub fn frames_written(&self) -> u64 {
        self.inner.frames_written.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self) -> u64 {
        self.inner.write_errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_atomic() {
        let stats = CaptureStats::default();
        assert_eq!(stats.state(), CaptureState::Starting);
        for state in [
            CaptureState::Running,
            CaptureState::Reconnecting,
            CaptureState::Degraded,
        ] {
            stats.set_state(state);
            assert_eq!(stats.state(), state);
        }
    }

    #[test]
    fn counters_accumulate() {
        let stats = CaptureStats::default();
        stats.record_frame();
        stats.record_frame();
        stats.record_error();
        assert_eq!(stats.frames_captured(), 2);
        assert_eq!(stats.capture_errors(), 1);
        assert_eq!(stats.reconnects(), 0);
    }
}
