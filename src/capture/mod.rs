pub mod encode;
pub mod file;
pub mod frame;
pub mod source;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use file::FileSource;
pub use frame::{Frame, ImageFormat, PixelFormat, RawImage};
pub use source::{open_source, CameraId, FrameSource, TestPattern};
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Source;
