//! Frame compositor — merges the live video frame and the overlay surface
//! into one flattened RGBA buffer per tick. The composited buffer is the
//! sole source for the encoder, and the overlay always lands on top so
//! markers are never occluded by video.

use crate::frame::VideoFrame;
use crate::overlay::OverlaySurface;

pub const DEFAULT_WIDTH: u32 = 640;
pub const DEFAULT_HEIGHT: u32 = 480;

/// Resolve recording dimensions: live frame dimensions first, then the
/// track's negotiated settings, then the 640x480 default. First nonzero
/// pair wins.
pub fn resolve_dimensions(
    frame_dims: Option<(u32, u32)>,
    track_settings: Option<(u32, u32)>,
) -> (u32, u32) {
    let nonzero = |d: Option<(u32, u32)>| d.filter(|&(w, h)| w > 0 && h > 0);
    nonzero(frame_dims)
        .or_else(|| nonzero(track_settings))
        .unwrap_or((DEFAULT_WIDTH, DEFAULT_HEIGHT))
}

/// Off-screen buffer the recording is drawn into.
pub struct Compositor {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
}

impl Compositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            buffer: vec![0; (width * height * 4) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The flattened RGBA output of the last [`composite`](Self::composite).
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Draw the video frame, then the overlay on top. Either input may
    /// differ from the buffer dimensions; both are nearest-scaled to cover
    /// the full buffer so the overlay is never occluded or clipped.
    pub fn composite(&mut self, frame: &VideoFrame, overlay: &OverlaySurface) {
        self.draw_opaque(&frame.data, frame.width, frame.height);
        self.draw_over(overlay.as_raw(), overlay.width(), overlay.height());
    }

    /// Copy a source image over the whole buffer, ignoring source alpha.
    fn draw_opaque(&mut self, src: &[u8], src_w: u32, src_h: u32) {
        if src_w == 0 || src_h == 0 {
            self.buffer.fill(0);
            return;
        }
        if src.len() < src_w as usize * src_h as usize * 4 {
            tracing::warn!(
                len = src.len(),
                src_w,
                src_h,
                "frame buffer shorter than its dimensions; dropping draw"
            );
            self.buffer.fill(0);
            return;
        }
        for y in 0..self.height {
            let sy = (y as u64 * src_h as u64 / self.height as u64) as u32;
            for x in 0..self.width {
                let sx = (x as u64 * src_w as u64 / self.width as u64) as u32;
                let si = ((sy * src_w + sx) * 4) as usize;
                let di = ((y * self.width + x) * 4) as usize;
                self.buffer[di..di + 3].copy_from_slice(&src[si..si + 3]);
                self.buffer[di + 3] = 255;
            }
        }
    }

    /// Alpha-over a source image onto the buffer.
    fn draw_over(&mut self, src: &[u8], src_w: u32, src_h: u32) {
        if src_w == 0 || src_h == 0 {
            return;
        }
        if src.len() < src_w as usize * src_h as usize * 4 {
            tracing::warn!(
                len = src.len(),
                src_w,
                src_h,
                "overlay buffer shorter than its dimensions; dropping draw"
            );
            return;
        }
        for y in 0..self.height {
            let sy = (y as u64 * src_h as u64 / self.height as u64) as u32;
            for x in 0..self.width {
                let sx = (x as u64 * src_w as u64 / self.width as u64) as u32;
                let si = ((sy * src_w + sx) * 4) as usize;
                let sa = src[si + 3] as u32;
                if sa == 0 {
                    continue;
                }
                let di = ((y * self.width + x) * 4) as usize;
                for c in 0..3 {
                    let sc = src[si + c] as u32;
                    let dc = self.buffer[di + c] as u32;
                    self.buffer[di + c] = ((sc * sa + dc * (255 - sa)) / 255) as u8;
                }
                self.buffer[di + 3] = 255;
            }
        }
    }
}
