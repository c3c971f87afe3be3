use serde::{Deserialize, Serialize};

/// Number of keypoints produced per detected hand.
pub const NUM_LANDMARKS: usize = 21;

/// Hand landmark indices in the standard 21-point hand topology.
pub mod landmark {
    pub const WRIST: usize = 0;
    pub const THUMB_CMC: usize = 1;
    pub const THUMB_MCP: usize = 2;
    pub const THUMB_IP: usize = 3;
    pub const THUMB_TIP: usize = 4;
    pub const INDEX_FINGER_MCP: usize = 5;
    pub const INDEX_FINGER_PIP: usize = 6;
    pub const INDEX_FINGER_DIP: usize = 7;
    pub const INDEX_FINGER_TIP: usize = 8;
    pub const MIDDLE_FINGER_MCP: usize = 9;
    pub const MIDDLE_FINGER_PIP: usize = 10;
    pub const MIDDLE_FINGER_DIP: usize = 11;
    pub const MIDDLE_FINGER_TIP: usize = 12;
    pub const RING_FINGER_MCP: usize = 13;
    pub const RING_FINGER_PIP: usize = 14;
    pub const RING_FINGER_DIP: usize = 15;
    pub const RING_FINGER_TIP: usize = 16;
    pub const PINKY_MCP: usize = 17;
    pub const PINKY_PIP: usize = 18;
    pub const PINKY_DIP: usize = 19;
    pub const PINKY_TIP: usize = 20;
}

/// Bones of the hand skeleton, as pairs of landmark indices.
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    // palm
    (0, 1),
    (0, 5),
    (9, 13),
    (13, 17),
    (5, 9),
    (0, 17),
    // thumb
    (1, 2),
    (2, 3),
    (3, 4),
    // index
    (5, 6),
    (6, 7),
    (7, 8),
    // middle
    (9, 10),
    (10, 11),
    (11, 12),
    // ring
    (13, 14),
    (14, 15),
    (15, 16),
    // pinky
    (17, 18),
    (18, 19),
    (19, 20),
];

/// A single hand landmark in normalized image coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Horizontal position, 0.0 = left edge, 1.0 = right edge.
    pub x: f32,
    /// Vertical position, 0.0 = top edge, 1.0 = bottom edge.
    pub y: f32,
    /// Relative depth (wrist-relative, same scale as `x`).
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Scale to pixel coordinates, truncating toward zero.
    pub fn to_keypoint(&self, width: u32, height: u32) -> Keypoint {
        Keypoint {
            x: (self.x * width as f32) as i32,
            y: (self.y * height as f32) as i32,
        }
    }
}

/// Which hand the detector believes it saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Handedness {
    Left,
    Right,
}

impl std::fmt::Display for Handedness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handedness::Left => f.write_str("Left"),
            Handedness::Right => f.write_str("Right"),
        }
    }
}

/// One detected hand: all 21 landmarks plus detector metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandLandmarks {
    pub landmarks: [Landmark; NUM_LANDMARKS],
    /// Hand presence confidence (0.0–1.0).
    pub confidence: f32,
    pub handedness: Handedness,
}

impl HandLandmarks {
    pub fn thumb_tip(&self) -> Landmark {
        self.landmarks[landmark::THUMB_TIP]
    }

    pub fn index_tip(&self) -> Landmark {
        self.landmarks[landmark::INDEX_FINGER_TIP]
    }

    /// All landmarks as pixel keypoints, in landmark index order.
    pub fn keypoints(&self, width: u32, height: u32) -> Vec<Keypoint> {
        self.landmarks
            .iter()
            .map(|lm| lm.to_keypoint(width, height))
            .collect()
    }

    /// Normalized bounding box `(min_x, min_y, max_x, max_y)` of all landmarks.
    pub fn bounds(&self) -> (f32, f32, f32, f32) {
        self.landmarks.iter().fold(
            (f32::MAX, f32::MAX, f32::MIN, f32::MIN),
            |(x0, y0, x1, y1), lm| (x0.min(lm.x), y0.min(lm.y), x1.max(lm.x), y1.max(lm.y)),
        )
    }
}

/// A 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: i32,
    pub y: i32,
}

impl Keypoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Integer midpoint (floor division), as used for the pinch marker.
    pub fn midpoint(&self, other: &Keypoint) -> Keypoint {
        // The floored mean of two i32 values always fits back in i32.
        let mid = |a: i32, b: i32| (a as i64 + b as i64).div_euclid(2) as i32;
        Keypoint {
            x: mid(self.x, other.x),
            y: mid(self.y, other.y),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_keypoint_truncates() {
        let lm = Landmark::new(0.5, 0.25);
        assert_eq!(lm.to_keypoint(640, 480), Keypoint::new(320, 120));

        // 0.999 * 640 = 639.36 → 639
        let lm = Landmark::new(0.999, 0.999);
        assert_eq!(lm.to_keypoint(640, 480), Keypoint::new(639, 479));
    }

    #[test]
    fn test_midpoint_floors() {
        let a = Keypoint::new(10, 10);
        let b = Keypoint::new(13, 21);
        assert_eq!(a.midpoint(&b), Keypoint::new(11, 15));
    }

    #[test]
    fn test_midpoint_extremes() {
        let max = Keypoint::new(i32::MAX, i32::MAX);
        let min = Keypoint::new(i32::MIN, i32::MIN);
        assert_eq!(max.midpoint(&max), max);
        assert_eq!(min.midpoint(&min), min);
        assert_eq!(max.midpoint(&min), Keypoint::new(-1, -1));
        assert_eq!(Keypoint::new(-3, 0).midpoint(&Keypoint::new(0, 0)), Keypoint::new(-2, 0));
    }

    #[test]
    fn test_hand_connections_in_range() {
        for (a, b) in HAND_CONNECTIONS {
            assert!(a < NUM_LANDMARKS && b < NUM_LANDMARKS);
        }
    }

    #[test]
    fn test_bounds() {
        let mut landmarks = [Landmark::new(0.5, 0.5); NUM_LANDMARKS];
        landmarks[landmark::WRIST] = Landmark::new(0.2, 0.9);
        landmarks[landmark::MIDDLE_FINGER_TIP] = Landmark::new(0.6, 0.1);
        let hand = HandLandmarks {
            landmarks,
            confidence: 1.0,
            handedness: Handedness::Right,
        };
        assert_eq!(hand.bounds(), (0.2, 0.1, 0.6, 0.9));
    }
}
