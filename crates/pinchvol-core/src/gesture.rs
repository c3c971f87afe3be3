//! Pinch gesture to volume mapping.
//!
//! Thumb tip and index tip are projected to pixel keypoints, their Euclidean
//! distance is taken, and the distance is range-mapped onto a linear volume
//! scalar in [0, 1].

use crate::types::{HandLandmarks, Keypoint};

/// Fingertip distance (pixels) that maps to 0% volume.
pub const DEFAULT_DISTANCE_MIN: f64 = 30.0;
/// Fingertip distance (pixels) that maps to 100% volume.
pub const DEFAULT_DISTANCE_MAX: f64 = 250.0;
/// Below this fingertip distance (pixels) the hand counts as pinched.
pub const DEFAULT_PINCH_THRESHOLD: f64 = 50.0;

/// Euclidean distance between two pixel keypoints. Total over all `i32` inputs.
pub fn distance(p1: Keypoint, p2: Keypoint) -> f64 {
    let dx = p2.x as f64 - p1.x as f64;
    let dy = p2.y as f64 - p1.y as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Clamped linear interpolation of `value` from `from` onto `to`.
///
/// Values at or below `from.0` map to `to.0`, values at or above `from.1`
/// map to `to.1`. `to` may be descending. NaN maps to `to.0`.
///
/// Evaluated as `slope * (value - from.0) + to.0` with the slope computed
/// first, so whole-pixel distances truncate to the same percent as the
/// usual `numpy.interp` formulation (129 px is 44%, not 45%).
pub fn interp(value: f64, from: (f64, f64), to: (f64, f64)) -> f64 {
    let (a, b) = from;
    let (c, d) = to;
    if !(value > a) {
        return c;
    }
    if value >= b {
        return d;
    }
    let slope = (d - c) / (b - a);
    slope * (value - a) + c
}

/// Map a fingertip distance to a volume scalar using the default range.
pub fn volume_scalar(distance: f64) -> f64 {
    interp(
        distance,
        (DEFAULT_DISTANCE_MIN, DEFAULT_DISTANCE_MAX),
        (0.0, 1.0),
    )
}

/// Whole-number percent for display, truncated toward zero.
pub fn volume_percent(scalar: f64) -> u8 {
    (scalar.clamp(0.0, 1.0) * 100.0) as u8
}

/// Everything derived from one hand on one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureReading {
    pub thumb: Keypoint,
    pub index: Keypoint,
    pub midpoint: Keypoint,
    /// Thumb-to-index distance in pixels.
    pub distance: f64,
    /// Linear volume in [0, 1].
    pub scalar: f64,
    pub percent: u8,
    pub pinched: bool,
}

/// Stateless pinch-to-volume mapper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureMapper {
    pub distance_min: f64,
    pub distance_max: f64,
    pub pinch_threshold: f64,
}

impl Default for GestureMapper {
    fn default() -> Self {
        Self {
            distance_min: DEFAULT_DISTANCE_MIN,
            distance_max: DEFAULT_DISTANCE_MAX,
            pinch_threshold: DEFAULT_PINCH_THRESHOLD,
        }
    }
}

impl GestureMapper {
    /// Map a pixel distance to a volume scalar in [0, 1].
    pub fn scalar_for(&self, distance: f64) -> f64 {
        interp(distance, (self.distance_min, self.distance_max), (0.0, 1.0))
    }

    /// Compute the reading for two fingertip keypoints.
    pub fn map_points(&self, thumb: Keypoint, index: Keypoint) -> GestureReading {
        let distance = distance(thumb, index);
        let scalar = self.scalar_for(distance);
        GestureReading {
            thumb,
            index,
            midpoint: thumb.midpoint(&index),
            distance,
            scalar,
            percent: volume_percent(scalar),
            pinched: distance < self.pinch_threshold,
        }
    }

    /// Compute the reading for a detected hand in a `width`×`height` image.
    pub fn read(&self, hand: &HandLandmarks, width: u32, height: u32) -> GestureReading {
        let thumb = hand.thumb_tip().to_keypoint(width, height);
        let index = hand.index_tip().to_keypoint(width, height);
        self.map_points(thumb, index)
    }
}
