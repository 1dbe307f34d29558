use serde::{Deserialize, Serialize};

/// Bounding region for a detected face, in video pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Schematic facial landmarks derived proportionally from a region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmarks {
    pub left_eye: (f32, f32),
    pub right_eye: (f32, f32),
    pub nose: (f32, f32),
    pub mouth: (f32, f32),
}

impl FaceRegion {
    /// Derive eye/nose/mouth positions from the region: eyes at 30%/70% of
    /// the width and 30% of the height, nose centered at half height, mouth
    /// centered at 70% of the height.
    pub fn landmarks(&self) -> Landmarks {
        let eye_y = self.y + self.height * 0.3;
        Landmarks {
            left_eye: (self.x + self.width * 0.3, eye_y),
            right_eye: (self.x + self.width * 0.7, eye_y),
            nose: (self.x + self.width * 0.5, self.y + self.height * 0.5),
            mouth: (self.x + self.width * 0.5, self.y + self.height * 0.7),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_proportions() {
        let region = FaceRegion {
            x: 100.0,
            y: 50.0,
            width: 200.0,
            height: 100.0,
        };
        let lm = region.landmarks();
        assert_eq!(lm.left_eye, (160.0, 80.0));
        assert_eq!(lm.right_eye, (240.0, 80.0));
        assert_eq!(lm.nose, (200.0, 100.0));
        assert_eq!(lm.mouth, (200.0, 120.0));
    }

    #[test]
    fn test_landmarks_track_origin() {
        let a = FaceRegion { x: 0.0, y: 0.0, width: 10.0, height: 10.0 };
        let b = FaceRegion { x: 5.0, y: 7.0, width: 10.0, height: 10.0 };
        let (la, lb) = (a.landmarks(), b.landmarks());
        assert_eq!(lb.nose.0 - la.nose.0, 5.0);
        assert_eq!(lb.nose.1 - la.nose.1, 7.0);
    }
}
