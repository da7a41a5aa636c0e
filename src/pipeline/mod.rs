pub mod buffer;
pub mod capture;
pub mod retention;
pub mod stats;
pub mod writer;

use std::sync::Arc;

pub use buffer::LatestFrame;
pub use capture::CaptureLoop;
pub use retention::RetentionSweep;
pub use stats::{CaptureState, CaptureStats, WriterStats};
pub use writer::FrameWriter;

use crate::Config;

/// Everything the pipeline components share, handed to each at construction
pub struct Context {
    pub config: Arc<Config>,
    pub buffer: LatestFrame,
    pub stats: CaptureStats,
    pub writer: WriterStats,
}

impl Context {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            buffer: LatestFrame::new(),
            stats: CaptureStats::default(),
            writer: WriterStats::default(),
        })
    }
}
