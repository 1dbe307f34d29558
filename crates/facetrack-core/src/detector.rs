//! Detection source abstraction.
//!
//! The pipeline only consumes geometric annotations; where they come from is
//! an implementation detail behind [`DetectionSource`]. The bundled
//! [`FixedRegionDetector`] is a stand-in that reports one centered region —
//! a real detector slots in without touching the overlay or compositor.

use crate::frame::VideoFrame;
use crate::types::FaceRegion;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detector failed: {0}")]
    Failed(String),
}

/// Produces face annotations for a frame. Called once per detection tick.
pub trait DetectionSource: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceRegion>, DetectionError>;
}

/// Default stand-in detector: a single region at 30%/20% of the frame,
/// sized 40% x 50%. Mirrors nothing about the scene; it exists so the
/// overlay and recording path can be exercised without a model.
#[derive(Debug, Default)]
pub struct FixedRegionDetector;

impl DetectionSource for FixedRegionDetector {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceRegion>, DetectionError> {
        let Some((width, height)) = frame.dimensions() else {
            return Ok(Vec::new());
        };
        let (w, h) = (width as f32, height as f32);
        Ok(vec![FaceRegion {
            x: w * 0.3,
            y: h * 0.2,
            width: w * 0.4,
            height: h * 0.5,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> VideoFrame {
        VideoFrame {
            data: vec![0; (width * height * 4) as usize],
            width,
            height,
            timestamp: std::time::Instant::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_fixed_region_proportions() {
        let regions = FixedRegionDetector.detect(&frame(640, 480)).unwrap();
        assert_eq!(regions.len(), 1);
        let r = regions[0];
        assert_eq!(r.x, 192.0);
        assert_eq!(r.y, 96.0);
        assert_eq!(r.width, 256.0);
        assert_eq!(r.height, 240.0);
    }

    #[test]
    fn test_zero_dimension_frame_yields_nothing() {
        let regions = FixedRegionDetector.detect(&frame(0, 0)).unwrap();
        assert!(regions.is_empty());
    }
}
