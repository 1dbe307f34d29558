//! Transparent overlay surface for face-tracking markers.
//!
//! The surface always matches the video frame dimensions. Each render tick
//! clears it fully and redraws every annotation, so stale markers never
//! accumulate. Drawing primitives are plain pixel loops — no GPU, no
//! external rasterizer.

use crate::types::FaceRegion;
use image::{Rgba, RgbaImage};

const MARKER: Rgba<u8> = Rgba([0, 255, 0, 255]);
/// 10% alpha fill inside the bounding box.
const REGION_FILL: Rgba<u8> = Rgba([0, 255, 0, 26]);
const BOX_STROKE: u32 = 3;
const EYE_RADIUS: f32 = 5.0;
const NOSE_RADIUS: f32 = 3.0;
const MOUTH_RADIUS: f32 = 8.0;

/// A transparent drawing surface sized to the video frame.
pub struct OverlaySurface {
    pixels: RgbaImage,
}

impl OverlaySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    /// Raw RGBA bytes, row-major.
    pub fn as_raw(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgba<u8> {
        *self.pixels.get_pixel(x, y)
    }

    /// Resize the surface to match the frame, discarding its contents.
    /// No-op when dimensions already match.
    pub fn resize_to(&mut self, width: u32, height: u32) {
        if self.pixels.width() != width || self.pixels.height() != height {
            tracing::debug!(width, height, "overlay surface resized");
            self.pixels = RgbaImage::new(width, height);
        }
    }

    /// Reset every pixel to fully transparent.
    pub fn clear(&mut self) {
        for px in self.pixels.pixels_mut() {
            *px = Rgba([0, 0, 0, 0]);
        }
    }

    /// Render one detection tick: size to the frame, clear, draw markers.
    /// A zero-dimension frame makes this a no-op for the tick.
    pub fn render(&mut self, frame_width: u32, frame_height: u32, regions: &[FaceRegion]) {
        if frame_width == 0 || frame_height == 0 {
            return;
        }
        self.resize_to(frame_width, frame_height);
        self.clear();
        for region in regions {
            self.draw_region(region);
        }
    }

    fn draw_region(&mut self, region: &FaceRegion) {
        self.fill_rect(region.x, region.y, region.width, region.height, REGION_FILL);
        self.stroke_rect(region.x, region.y, region.width, region.height);

        let lm = region.landmarks();
        self.fill_circle(lm.left_eye.0, lm.left_eye.1, EYE_RADIUS, MARKER);
        self.fill_circle(lm.right_eye.0, lm.right_eye.1, EYE_RADIUS, MARKER);
        self.fill_circle(lm.nose.0, lm.nose.1, NOSE_RADIUS, MARKER);
        self.stroke_lower_arc(lm.mouth.0, lm.mouth.1, MOUTH_RADIUS, BOX_STROKE as f32, MARKER);
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Rgba<u8>) {
        let (x0, y0, x1, y1) = self.clip(x, y, w, h);
        for py in y0..y1 {
            for px in x0..x1 {
                blend_pixel(&mut self.pixels, px, py, color);
            }
        }
    }

    fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32) {
        let t = BOX_STROKE as f32;
        self.fill_rect(x, y, w, t, MARKER);
        self.fill_rect(x, y + h - t, w, t, MARKER);
        self.fill_rect(x, y, t, h, MARKER);
        self.fill_rect(x + w - t, y, t, h, MARKER);
    }

    fn fill_circle(&mut self, cx: f32, cy: f32, r: f32, color: Rgba<u8>) {
        let (x0, y0, x1, y1) = self.clip(cx - r, cy - r, r * 2.0 + 1.0, r * 2.0 + 1.0);
        for py in y0..y1 {
            for px in x0..x1 {
                let dx = px as f32 - cx;
                let dy = py as f32 - cy;
                if dx * dx + dy * dy <= r * r {
                    blend_pixel(&mut self.pixels, px, py, color);
                }
            }
        }
    }

    /// Stroke the lower half of a circle (the schematic mouth).
    fn stroke_lower_arc(&mut self, cx: f32, cy: f32, r: f32, thickness: f32, color: Rgba<u8>) {
        let outer = r + thickness / 2.0;
        let inner = r - thickness / 2.0;
        let (x0, y0, x1, y1) = self.clip(cx - outer, cy, outer * 2.0 + 1.0, outer + 1.0);
        for py in y0..y1 {
            for px in x0..x1 {
                let dx = px as f32 - cx;
                let dy = py as f32 - cy;
                if dy < 0.0 {
                    continue;
                }
                let dist = (dx * dx + dy * dy).sqrt();
                if dist >= inner && dist <= outer {
                    blend_pixel(&mut self.pixels, px, py, color);
                }
            }
        }
    }

    /// Clip a float rect to pixel bounds.
    fn clip(&self, x: f32, y: f32, w: f32, h: f32) -> (u32, u32, u32, u32) {
        let x0 = x.max(0.0).round() as u32;
        let y0 = y.max(0.0).round() as u32;
        let x1 = ((x + w).max(0.0).round() as u32).min(self.pixels.width());
        let y1 = ((y + h).max(0.0).round() as u32).min(self.pixels.height());
        (x0.min(x1), y0.min(y1), x1, y1)
    }
}

/// Source-over blend of `color` onto the pixel at (x, y).
fn blend_pixel(img: &mut RgbaImage, x: u32, y: u32, color: Rgba<u8>) {
    let dst = img.get_pixel_mut(x, y);
    let sa = color.0[3] as u32;
    if sa == 255 {
        *dst = color;
        return;
    }
    let da = dst.0[3] as u32;
    let out_a = sa + da * (255 - sa) / 255;
    if out_a == 0 {
        *dst = Rgba([0, 0, 0, 0]);
        return;
    }
    let mut out = [0u8; 4];
    for i in 0..3 {
        let sc = color.0[i] as u32;
        let dc = dst.0[i] as u32;
        out[i] = ((sc * sa + dc * da * (255 - sa) / 255) / out_a) as u8;
    }
    out[3] = out_a as u8;
    *dst = Rgba(out);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region() -> FaceRegion {
        FaceRegion {
            x: 20.0,
            y: 20.0,
            width: 60.0,
            height: 60.0,
        }
    }

    #[test]
    fn test_render_sizes_surface_to_frame() {
        let mut surface = OverlaySurface::new(0, 0);
        surface.render(320, 240, &[]);
        assert_eq!((surface.width(), surface.height()), (320, 240));
    }

    #[test]
    fn test_zero_dimension_render_is_noop() {
        let mut surface = OverlaySurface::new(0, 0);
        surface.render(0, 240, &[region()]);
        assert_eq!((surface.width(), surface.height()), (0, 0));
    }

    #[test]
    fn test_bounding_box_edge_is_marker_green() {
        let mut surface = OverlaySurface::new(120, 120);
        surface.render(120, 120, &[region()]);
        // Top-left corner of the stroke
        assert_eq!(surface.pixel(20, 20), Rgba([0, 255, 0, 255]));
        // Interior carries the translucent fill, not the stroke
        let inner = surface.pixel(50, 40);
        assert_eq!(inner.0[1], 255);
        assert!(inner.0[3] < 255 && inner.0[3] > 0);
    }

    #[test]
    fn test_outside_region_stays_transparent() {
        let mut surface = OverlaySurface::new(120, 120);
        surface.render(120, 120, &[region()]);
        assert_eq!(surface.pixel(5, 5).0[3], 0);
        assert_eq!(surface.pixel(110, 110).0[3], 0);
    }

    #[test]
    fn test_rerender_clears_stale_markers() {
        let mut surface = OverlaySurface::new(120, 120);
        surface.render(120, 120, &[region()]);
        assert_ne!(surface.pixel(20, 20).0[3], 0);
        surface.render(120, 120, &[]);
        assert_eq!(surface.pixel(20, 20).0[3], 0);
    }

    #[test]
    fn test_eye_landmarks_are_drawn() {
        let mut surface = OverlaySurface::new(120, 120);
        surface.render(120, 120, &[region()]);
        let lm = region().landmarks();
        let eye = surface.pixel(lm.left_eye.0 as u32, lm.left_eye.1 as u32);
        assert_eq!(eye, Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_region_partly_off_surface_is_clipped() {
        let mut surface = OverlaySurface::new(50, 50);
        let r = FaceRegion {
            x: 30.0,
            y: 30.0,
            width: 60.0,
            height: 60.0,
        };
        // Must not panic; everything past the edge is dropped
        surface.render(50, 50, &[r]);
        assert_ne!(surface.pixel(31, 31).0[3], 0);
    }
}
