//! facetrack-core — Face-tracking overlay and compositing engine.
//!
//! Pure frame-level logic: annotation types, a pluggable detection source,
//! the transparent overlay renderer and the video/overlay compositor.
//! No device or encoder I/O lives here.

pub mod compositor;
pub mod detector;
pub mod format;
pub mod frame;
pub mod overlay;
pub mod types;

pub use compositor::{resolve_dimensions, Compositor, DEFAULT_HEIGHT, DEFAULT_WIDTH};
pub use detector::{DetectionError, DetectionSource, FixedRegionDetector};
pub use format::EncodingFormat;
pub use frame::VideoFrame;
pub use overlay::OverlaySurface;
pub use types::{FaceRegion, Landmarks};
