//! Frame type and pixel conversion — YUYV to RGBA.

/// A captured RGBA camera frame.
#[derive(Clone)]
pub struct VideoFrame {
    /// RGBA pixel data (width * height * 4 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
}

impl VideoFrame {
    /// Dimensions as a pair, or `None` while either side is zero.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        if self.width == 0 || self.height == 0 {
            None
        } else {
            Some((self.width, self.height))
        }
    }
}

/// Convert packed YUYV (4:2:2) to RGBA using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]. Both pixels share
/// the U/V pair.
pub fn yuyv_to_rgba(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgba = Vec::with_capacity(pixels * 4);
    for quad in yuyv[..expected].chunks_exact(4) {
        let u = quad[1] as i32 - 128;
        let v = quad[3] as i32 - 128;
        for &y in &[quad[0], quad[2]] {
            let c = y as i32 - 16;
            let r = (298 * c + 409 * v + 128) >> 8;
            let g = (298 * c - 100 * u - 208 * v + 128) >> 8;
            let b = (298 * c + 516 * u + 128) >> 8;
            rgba.push(r.clamp(0, 255) as u8);
            rgba.push(g.clamp(0, 255) as u8);
            rgba.push(b.clamp(0, 255) as u8);
            rgba.push(255);
        }
    }
    Ok(rgba)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
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
    fn test_yuyv_black_and_white() {
        // 2x1 image: Y0=16 (black), Y1=235 (white), neutral chroma
        let yuyv = vec![16, 128, 235, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 1).unwrap();
        assert_eq!(&rgba[..4], &[0, 0, 0, 255]);
        assert_eq!(&rgba[4..], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_yuyv_mid_gray() {
        let yuyv = vec![128, 128, 128, 128];
        let rgba = yuyv_to_rgba(&yuyv, 2, 1).unwrap();
        // BT.601: (298 * 112 + 128) >> 8 = 130
        assert_eq!(&rgba[..4], &[130, 130, 130, 255]);
    }

    #[test]
    fn test_yuyv_output_length() {
        let yuyv = vec![128u8; 4 * 2 * 2]; // 4x2 image
        let rgba = yuyv_to_rgba(&yuyv, 4, 2).unwrap();
        assert_eq!(rgba.len(), 4 * 2 * 4);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![128, 128]; // too short for 2x1
        assert!(yuyv_to_rgba(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_dimensions_zero_is_none() {
        assert!(frame(0, 480).dimensions().is_none());
        assert!(frame(640, 0).dimensions().is_none());
        assert_eq!(frame(640, 480).dimensions(), Some((640, 480)));
    }
}
