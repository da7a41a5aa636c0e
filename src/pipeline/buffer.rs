//! Single-slot latest-frame buffer shared by the capture loop and its readers

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::capture::Frame;

/// Holds at most one frame, overwritten on every publish.
///
/// The slot stores an `Arc<Frame>` swapped atomically, so readers always
/// observe a complete frame and keep their snapshot alive after the slot
/// moves on. Neither operation does I/O or encoding.
#[derive(Default)]
pub struct LatestFrame {
    slot: ArcSwapOption<Frame>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame, assigning it the next sequence number.
    ///
    /// Returns the sequence number the frame was published under.
    pub fn publish(&self, frame: Frame) -> u64 {
        let previous = self.slot.rcu(|current| {
            let sequence = current.as_ref().map_or(0, |f| f.sequence) + 1;
            Some(Arc::new(Frame {
                sequence,
                ..frame.clone()
            }))
        });
        previous.as_ref().map_or(0, |f| f.sequence) + 1
    }

    /// Current frame, or `None` if nothing has been published yet
    pub fn snapshot(&self) -> Option<Arc<Frame>> {
        self.slot.load_full()
    }

    /// Sequence number of the current frame, 0 when empty
    pub fn sequence(&self) -> u64 {
        Option::as_ref(&self.slot.load()).map_or(0, |f| f.sequence)
    }
}
