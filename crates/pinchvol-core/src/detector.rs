//! Two-stage hand detector via ONNX Runtime.
//!
//! A palm detector (see [`crate::palm`]) finds a hand in the whole frame and
//! yields a rotated square crop around it. A 21-point hand landmark model
//! (224×224 RGB input, NHWC) then runs on that crop. While a hand is being
//! tracked, the next crop is derived from the previous frame's landmarks and
//! palm detection is skipped.

use crate::palm::PalmDetector;
use crate::types::{landmark, HandLandmarks, Handedness, Landmark, NUM_LANDMARKS};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::f32::consts::{FRAC_PI_2, PI, TAU};
use std::path::Path;
use thiserror::Error;

const LANDMARK_INPUT_SIZE: usize = 224;
/// Landmarks that outline the palm and finger bases; fingertips are left out
/// so a curled or spread finger does not swing the tracking crop.
const TRACKING_LANDMARKS: [usize; 12] = [
    landmark::WRIST,
    landmark::THUMB_CMC,
    landmark::THUMB_MCP,
    landmark::THUMB_IP,
    landmark::INDEX_FINGER_MCP,
    landmark::INDEX_FINGER_PIP,
    landmark::MIDDLE_FINGER_MCP,
    landmark::MIDDLE_FINGER_PIP,
    landmark::RING_FINGER_MCP,
    landmark::RING_FINGER_PIP,
    landmark::PINKY_MCP,
    landmark::PINKY_PIP,
];
/// Tracking crop side = longer side of the palm box × this factor.
const TRACKING_ROI_SCALE: f32 = 2.0;
/// Tracking crop shift toward the fingers, as a fraction of the palm box height.
const TRACKING_ROI_SHIFT_Y: f32 = -0.1;
/// Smallest tracking crop side, in source pixels.
const ROI_MIN_SIZE: f32 = 64.0;
/// Handedness scores above this are reported as a right hand.
const HANDEDNESS_RIGHT_THRESHOLD: f32 = 0.5;

pub const DEFAULT_MIN_DETECTION_CONFIDENCE: f32 = 0.7;
pub const DEFAULT_MIN_TRACKING_CONFIDENCE: f32 = 0.7;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (place the ONNX model there or set its path in the config)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Capability: find at most one hand in an RGB frame.
pub trait HandDetector {
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<HandLandmarks>, DetectorError>;
}

/// First stage: locate a hand anywhere in the frame.
pub trait PalmStage {
    /// Crop around the best palm scoring at least `min_score`, if any.
    fn locate(&mut self, frame: &RgbImage, min_score: f32) -> Result<Option<Roi>, DetectorError>;
}

/// Second stage: regress the 21 landmarks inside a crop.
pub trait LandmarkStage {
    /// Landmarks in normalized frame coordinates plus the presence score.
    /// No threshold is applied here.
    fn landmarks(&mut self, frame: &RgbImage, roi: &Roi) -> Result<HandLandmarks, DetectorError>;
}

/// Acceptance thresholds for the two stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Minimum palm detector score when searching the whole frame.
    pub min_detection_confidence: f32,
    /// Minimum landmark presence score for a hand to be reported and tracked.
    pub min_tracking_confidence: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_tracking_confidence: DEFAULT_MIN_TRACKING_CONFIDENCE,
        }
    }
}

/// Square crop of the source frame, rotated about its center.
///
/// Pixel units; the crop may extend past the frame edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub center_x: f32,
    pub center_y: f32,
    pub size: f32,
    /// Clockwise rotation in radians (image y grows downward). At 0 the
    /// crop's up direction is the frame's up direction.
    pub rotation: f32,
}

impl Roi {
    /// Smallest upright square covering the whole frame, centered on it.
    pub fn full_frame(width: u32, height: u32) -> Self {
        Self {
            center_x: width as f32 / 2.0,
            center_y: height as f32 / 2.0,
            size: width.max(height) as f32,
            rotation: 0.0,
        }
    }

    /// Square crop from a rotated box: shifted along the box's own y axis by
    /// `shift_y` box heights, side = longer box side × `scale`.
    pub(crate) fn from_box(
        center: (f32, f32),
        width: f32,
        height: f32,
        rotation: f32,
        scale: f32,
        shift_y: f32,
    ) -> Self {
        let (sin, cos) = rotation.sin_cos();
        Self {
            center_x: center.0 - height * shift_y * sin,
            center_y: center.1 + height * shift_y * cos,
            size: width.max(height) * scale,
            rotation,
        }
    }

    /// Crop for the next frame, derived from this frame's landmarks.
    ///
    /// Oriented wrist → middle finger base, sized from the palm landmarks'
    /// extent in the hand's own axes.
    pub fn around_hand(hand: &HandLandmarks, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let px = |i: usize| (hand.landmarks[i].x * w, hand.landmarks[i].y * h);
        let rotation = rotation_between(px(landmark::WRIST), px(landmark::MIDDLE_FINGER_MCP));
        let (sin, cos) = rotation.sin_cos();

        let (mut min_u, mut min_v) = (f32::MAX, f32::MAX);
        let (mut max_u, mut max_v) = (f32::MIN, f32::MIN);
        for &i in &TRACKING_LANDMARKS {
            let (x, y) = px(i);
            let u = x * cos + y * sin;
            let v = -x * sin + y * cos;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let (cu, cv) = ((min_u + max_u) / 2.0, (min_v + max_v) / 2.0);
        let center = (cu * cos - cv * sin, cu * sin + cv * cos);
        let roi = Self::from_box(
            center,
            max_u - min_u,
            max_v - min_v,
            rotation,
            TRACKING_ROI_SCALE,
            TRACKING_ROI_SHIFT_Y,
        );
        Self {
            size: roi.size.max(ROI_MIN_SIZE),
            ..roi
        }
    }

    /// Map crop-local coordinates (0..1 across the crop) to frame pixels.
    pub fn to_frame(&self, u: f32, v: f32) -> (f32, f32) {
        let du = (u - 0.5) * self.size;
        let dv = (v - 0.5) * self.size;
        let (sin, cos) = self.rotation.sin_cos();
        (
            self.center_x + du * cos - dv * sin,
            self.center_y + du * sin + dv * cos,
        )
    }
}

/// Crop rotation that makes the direction `from` → `to` point up.
pub(crate) fn rotation_between(from: (f32, f32), to: (f32, f32)) -> f32 {
    normalize_radians(FRAC_PI_2 - (-(to.1 - from.1)).atan2(to.0 - from.0))
}

/// Wrap an angle into [-π, π).
fn normalize_radians(angle: f32) -> f32 {
    angle - TAU * ((angle + PI) / TAU).floor()
}

/// Output tensor positions, discovered at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OutputIndices {
    landmarks: usize,
    presence: usize,
    handedness: usize,
}

/// ONNX hand landmark model (second stage).
pub struct LandmarkModel {
    session: Session,
    outputs: OutputIndices,
}

impl LandmarkModel {
    /// Load the hand landmark ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let output_names: Vec<String> = session
            .outputs()
            .iter()
            .map(|o| o.name().to_string())
            .collect();

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?output_names,
            "loaded hand landmark model"
        );

        if output_names.len() < 3 {
            return Err(DetectorError::InferenceFailed(format!(
                "hand landmark model requires 3 outputs (landmarks, presence, handedness), got {}",
                output_names.len()
            )));
        }

        let outputs = discover_output_indices(&output_names);
        tracing::debug!(?outputs, "hand landmark output tensor mapping");

        Ok(Self { session, outputs })
    }
}

impl LandmarkStage for LandmarkModel {
    fn landmarks(&mut self, frame: &RgbImage, roi: &Roi) -> Result<HandLandmarks, DetectorError> {
        let input = preprocess(frame, roi, LANDMARK_INPUT_SIZE);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_landmarks) = outputs[self.outputs.landmarks]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("landmarks: {e}")))?;
        let (_, presence) = outputs[self.outputs.presence]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("presence: {e}")))?;
        let (_, handedness) = outputs[self.outputs.handedness]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("handedness: {e}")))?;

        let (width, height) = frame.dimensions();
        let landmarks = decode_landmarks(raw_landmarks, roi, width, height).ok_or_else(|| {
            DetectorError::InferenceFailed(format!(
                "expected {} landmark values, got {}",
                NUM_LANDMARKS * 3,
                raw_landmarks.len()
            ))
        })?;

        let handedness = match handedness.first() {
            Some(&score) if score > HANDEDNESS_RIGHT_THRESHOLD => Handedness::Right,
            _ => Handedness::Left,
        };

        Ok(HandLandmarks {
            landmarks,
            confidence: presence.first().copied().unwrap_or(0.0),
            handedness,
        })
    }
}

/// Single-hand tracker over a palm stage and a landmark stage.
pub struct HandTracker<P, L> {
    palm: P,
    landmarks: L,
    config: DetectorConfig,
    /// Crop to search first on the next frame.
    tracked: Option<Roi>,
}

/// The production detector: ONNX palm detector plus ONNX landmark model.
pub type HandLandmarker = HandTracker<PalmDetector, LandmarkModel>;

impl HandTracker<PalmDetector, LandmarkModel> {
    /// Load both ONNX models.
    pub fn load(
        palm_model: &Path,
        landmark_model: &Path,
        config: DetectorConfig,
    ) -> Result<Self, DetectorError> {
        Ok(Self::new(
            PalmDetector::load(palm_model)?,
            LandmarkModel::load(landmark_model)?,
            config,
        ))
    }
}

impl<P: PalmStage, L: LandmarkStage> HandTracker<P, L> {
    pub fn new(palm: P, landmarks: L, config: DetectorConfig) -> Self {
        Self {
            palm,
            landmarks,
            config,
            tracked: None,
        }
    }

    /// Run the landmark stage on `roi`; keep the hand and track it if present.
    fn landmarks_in(
        &mut self,
        frame: &RgbImage,
        roi: &Roi,
    ) -> Result<Option<HandLandmarks>, DetectorError> {
        let hand = self.landmarks.landmarks(frame, roi)?;
        let threshold = self.config.min_tracking_confidence;
        if hand.confidence < threshold {
            tracing::trace!(confidence = hand.confidence, threshold, "hand below presence threshold");
            return Ok(None);
        }
        let (width, height) = frame.dimensions();
        self.tracked = Some(Roi::around_hand(&hand, width, height));
        Ok(Some(hand))
    }
}

impl<P: PalmStage, L: LandmarkStage> HandDetector for HandTracker<P, L> {
    fn detect(&mut self, frame: &RgbImage) -> Result<Option<HandLandmarks>, DetectorError> {
        if let Some(roi) = self.tracked.take() {
            if let Some(hand) = self.landmarks_in(frame, &roi)? {
                return Ok(Some(hand));
            }
            tracing::debug!("hand lost; running palm detection");
        }

        let Some(roi) = self
            .palm
            .locate(frame, self.config.min_detection_confidence)?
        else {
            return Ok(None);
        };
        self.landmarks_in(frame, &roi)
    }
}

/// Discover output tensor ordering by name.
///
/// Converted MediaPipe models name their outputs `Identity` (landmarks),
/// `Identity_1` (hand presence) and `Identity_2` (handedness). Exports that
/// use descriptive names are matched by keyword. Anything else falls back to
/// positional ordering [0]=landmarks, [1]=presence, [2]=handedness.
fn discover_output_indices(names: &[String]) -> OutputIndices {
    let exact = |target: &str| names.iter().position(|n| n == target);
    if let (Some(landmarks), Some(presence), Some(handedness)) =
        (exact("Identity"), exact("Identity_1"), exact("Identity_2"))
    {
        return OutputIndices {
            landmarks,
            presence,
            handedness,
        };
    }

    let containing = |keyword: &str| {
        names
            .iter()
            .position(|n| n.to_ascii_lowercase().contains(keyword))
    };
    let landmarks = names.iter().position(|n| {
        let n = n.to_ascii_lowercase();
        n.contains("landmark") && !n.contains("world")
    });
    let presence = containing("flag")
        .or_else(|| containing("presence"))
        .or_else(|| containing("score"));
    if let (Some(landmarks), Some(presence), Some(handedness)) =
        (landmarks, presence, containing("handed"))
    {
        return OutputIndices {
            landmarks,
            presence,
            handedness,
        };
    }

    tracing::info!(
        ?names,
        "output names not recognized, using positional mapping [0]=landmarks, [1]=presence, [2]=handedness"
    );
    OutputIndices {
        landmarks: 0,
        presence: 1,
        handedness: 2,
    }
}

/// Sample `roi` into a 1×`size`×`size`×3 float tensor in [0, 1].
///
/// Bilinear sampling along the crop's rotated axes; pixels outside the frame
/// are black.
pub(crate) fn preprocess(frame: &RgbImage, roi: &Roi, size: usize) -> Array4<f32> {
    let (width, height) = frame.dimensions();
    let (w, h) = (width as usize, height as usize);
    let raw = frame.as_raw();

    let mut tensor = Array4::<f32>::zeros((1, size, size, 3));
    if w == 0 || h == 0 {
        return tensor;
    }

    let sample = |x: i64, y: i64, c: usize| -> f32 {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            0.0
        } else {
            raw[(y as usize * w + x as usize) * 3 + c] as f32
        }
    };

    for oy in 0..size {
        let v = (oy as f32 + 0.5) / size as f32;
        for ox in 0..size {
            let u = (ox as f32 + 0.5) / size as f32;
            let (src_x, src_y) = roi.to_frame(u, v);
            let (src_x, src_y) = (src_x - 0.5, src_y - 0.5);
            let (x0, y0) = (src_x.floor() as i64, src_y.floor() as i64);
            let fx = src_x - src_x.floor();
            let fy = src_y - src_y.floor();

            for c in 0..3 {
                let tl = sample(x0, y0, c);
                let tr = sample(x0 + 1, y0, c);
                let bl = sample(x0, y0 + 1, c);
                let br = sample(x0 + 1, y0 + 1, c);

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                tensor[[0, oy, ox, c]] = val / 255.0;
            }
        }
    }

    tensor
}

/// Map model-space landmarks (input pixels) back to normalized frame coordinates.
fn decode_landmarks(
    raw: &[f32],
    roi: &Roi,
    width: u32,
    height: u32,
) -> Option<[Landmark; NUM_LANDMARKS]> {
    if raw.len() < NUM_LANDMARKS * 3 || width == 0 || height == 0 {
        return None;
    }

    let input = LANDMARK_INPUT_SIZE as f32;
    let (w, h) = (width as f32, height as f32);
    let mut landmarks = [Landmark::default(); NUM_LANDMARKS];
    for (i, lm) in landmarks.iter_mut().enumerate() {
        let (x, y) = roi.to_frame(raw[i * 3] / input, raw[i * 3 + 1] / input);
        *lm = Landmark {
            x: x / w,
            y: y / h,
            z: raw[i * 3 + 2] / input * roi.size / w,
        };
    }
    Some(landmarks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::collections::VecDeque;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {expected}, got {actual}"
        );
    }

    /// Upright hand in a 640×480 frame: wrist (320, 360), palm base row at y=240.
    fn upright_hand(confidence: f32) -> HandLandmarks {
        let mut landmarks = [Landmark::new(0.5, 0.5); NUM_LANDMARKS];
        landmarks[landmark::WRIST] = Landmark::new(0.5, 0.75);
        landmarks[landmark::INDEX_FINGER_MCP] = Landmark::new(0.4, 0.5);
        landmarks[landmark::PINKY_MCP] = Landmark::new(0.6, 0.5);
        HandLandmarks {
            landmarks,
            confidence,
            handedness: Handedness::Right,
        }
    }

    #[test]
    fn test_full_frame_roi_centered() {
        let roi = Roi::full_frame(640, 480);
        assert_eq!(roi.size, 640.0);
        assert_eq!((roi.center_x, roi.center_y), (320.0, 240.0));
        assert_eq!(roi.rotation, 0.0);
        assert_eq!(roi.to_frame(0.0, 0.0), (0.0, -80.0));
    }

    #[test]
    fn test_rotation_between() {
        // Pointing up needs no rotation; pointing right needs a quarter turn.
        assert_close(rotation_between((10.0, 20.0), (10.0, 5.0)), 0.0);
        assert_close(rotation_between((0.0, 0.0), (5.0, 0.0)), FRAC_PI_2);
        assert_close(rotation_between((0.0, 0.0), (-5.0, 0.0)), -FRAC_PI_2);
        assert_close(normalize_radians(3.0 * PI / 2.0), -FRAC_PI_2);
    }

    #[test]
    fn test_roi_around_upright_hand() {
        // Palm landmarks span x 256..384, y 240..360 → box 128×120 centered
        // at (320, 300), shifted up 12 px, side 2 × 128.
        let roi = Roi::around_hand(&upright_hand(0.9), 640, 480);
        assert_close(roi.rotation, 0.0);
        assert_close(roi.center_x, 320.0);
        assert_close(roi.center_y, 288.0);
        assert_close(roi.size, 256.0);
    }

    #[test]
    fn test_roi_around_sideways_hand() {
        // Fingers pointing right: wrist (160, 240), everything else at (320, 240).
        let mut landmarks = [Landmark::new(0.5, 0.5); NUM_LANDMARKS];
        landmarks[landmark::WRIST] = Landmark::new(0.25, 0.5);
        let hand = HandLandmarks {
            landmarks,
            confidence: 0.9,
            handedness: Handedness::Left,
        };

        let roi = Roi::around_hand(&hand, 640, 480);
        assert_close(roi.rotation, FRAC_PI_2);
        // Box is 160 px long along the hand; the shift moves toward the fingers (+x).
        assert_close(roi.center_x, 256.0);
        assert_close(roi.center_y, 240.0);
        assert_close(roi.size, 320.0);
    }

    #[test]
    fn test_roi_has_minimum_size() {
        let hand = HandLandmarks {
            landmarks: [Landmark::new(0.5, 0.5); NUM_LANDMARKS],
            confidence: 0.9,
            handedness: Handedness::Left,
        };
        let roi = Roi::around_hand(&hand, 640, 480);
        assert_eq!(roi.size, ROI_MIN_SIZE);
    }

    #[test]
    fn test_decode_landmarks_maps_through_roi() {
        let roi = Roi::full_frame(640, 480);
        let mut raw = vec![0.0f32; NUM_LANDMARKS * 3];
        // Model-space center of the input square
        raw[landmark::THUMB_TIP * 3] = 112.0;
        raw[landmark::THUMB_TIP * 3 + 1] = 112.0;

        let lms = decode_landmarks(&raw, &roi, 640, 480).unwrap();
        let thumb = lms[landmark::THUMB_TIP];
        assert!((thumb.x - 0.5).abs() < 1e-6, "x={}", thumb.x);
        assert!((thumb.y - 0.5).abs() < 1e-6, "y={}", thumb.y);

        // Origin of model space is the ROI corner, which sits above the frame
        let wrist = lms[landmark::WRIST];
        assert!(wrist.x.abs() < 1e-6);
        assert!((wrist.y - (-80.0 / 480.0)).abs() < 1e-6);
    }

    #[test]
    fn test_decode_landmarks_rotated_roi() {
        // Quarter turn: the top edge of the model input lies to the right of the center.
        let roi = Roi {
            center_x: 100.0,
            center_y: 100.0,
            size: 50.0,
            rotation: FRAC_PI_2,
        };
        let mut raw = vec![0.0f32; NUM_LANDMARKS * 3];
        raw[landmark::INDEX_FINGER_TIP * 3] = 112.0;

        let lms = decode_landmarks(&raw, &roi, 200, 200).unwrap();
        let tip = lms[landmark::INDEX_FINGER_TIP];
        assert!((tip.x - 0.625).abs() < 1e-4, "x={}", tip.x);
        assert!((tip.y - 0.5).abs() < 1e-4, "y={}", tip.y);
    }

    #[test]
    fn test_decode_landmarks_short_output() {
        let roi = Roi::full_frame(640, 480);
        assert!(decode_landmarks(&[0.0; 10], &roi, 640, 480).is_none());
    }

    #[test]
    fn test_preprocess_shape_and_range() {
        let frame = RgbImage::from_pixel(64, 48, Rgb([255, 128, 0]));
        let tensor = preprocess(&frame, &Roi::full_frame(64, 48), LANDMARK_INPUT_SIZE);
        assert_eq!(tensor.shape(), &[1, LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE, 3]);
        assert!(tensor.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_preprocess_pads_outside_frame_black() {
        // 64x48 frame in a 64x64 square: top 8 rows of the square are outside.
        let frame = RgbImage::from_pixel(64, 48, Rgb([200, 200, 200]));
        let tensor = preprocess(&frame, &Roi::full_frame(64, 48), LANDMARK_INPUT_SIZE);

        assert_eq!(tensor[[0, 0, 112, 0]], 0.0);
        let center = tensor[[0, 112, 112, 1]];
        assert!((center - 200.0 / 255.0).abs() < 1e-4, "center={center}");
    }

    #[test]
    fn test_preprocess_uniform_interior() {
        let frame = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        let roi = Roi {
            center_x: 50.0,
            center_y: 50.0,
            size: 50.0,
            rotation: 0.7,
        };
        let tensor = preprocess(&frame, &roi, LANDMARK_INPUT_SIZE);
        let expected = 128.0 / 255.0;
        assert!(tensor.iter().all(|&v| (v - expected).abs() < 1e-4));
    }

    #[test]
    fn test_preprocess_follows_rotation() {
        // Left half black, right half white; a quarter-turn crop puts the
        // right half at the top of the model input.
        let frame = RgbImage::from_fn(100, 100, |x, _| {
            if x >= 50 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let roi = Roi {
            center_x: 50.0,
            center_y: 50.0,
            size: 40.0,
            rotation: FRAC_PI_2,
        };
        let tensor = preprocess(&frame, &roi, LANDMARK_INPUT_SIZE);
        assert!((tensor[[0, 2, 112, 0]] - 1.0).abs() < 1e-4);
        assert_eq!(tensor[[0, 221, 112, 0]], 0.0);
    }

    #[test]
    fn test_discover_output_indices_identity_names() {
        let idx = discover_output_indices(&names(&["Identity_2", "Identity", "Identity_1"]));
        assert_eq!(
            idx,
            OutputIndices {
                landmarks: 1,
                presence: 2,
                handedness: 0
            }
        );
    }

    #[test]
    fn test_discover_output_indices_descriptive_names() {
        let idx = discover_output_indices(&names(&[
            "world_landmarks",
            "handedness",
            "hand_flag",
            "landmarks",
        ]));
        assert_eq!(
            idx,
            OutputIndices {
                landmarks: 3,
                presence: 2,
                handedness: 1
            }
        );
    }

    #[test]
    fn test_discover_output_indices_positional_fallback() {
        let idx = discover_output_indices(&names(&["412", "413", "414"]));
        assert_eq!(
            idx,
            OutputIndices {
                landmarks: 0,
                presence: 1,
                handedness: 2
            }
        );
    }

    // ── Tracking state machine ──────────────────────────────────────────────

    const PALM_ROI: Roi = Roi {
        center_x: 300.0,
        center_y: 200.0,
        size: 180.0,
        rotation: 0.0,
    };

    /// Palm stage that replays scripted results and records each `min_score`.
    #[derive(Default)]
    struct ScriptedPalm {
        results: VecDeque<Option<Roi>>,
        min_scores: Vec<f32>,
    }

    impl PalmStage for ScriptedPalm {
        fn locate(&mut self, _frame: &RgbImage, min_score: f32) -> Result<Option<Roi>, DetectorError> {
            self.min_scores.push(min_score);
            Ok(self.results.pop_front().flatten())
        }
    }

    /// Landmark stage that replays scripted presence scores and records each crop.
    #[derive(Default)]
    struct ScriptedLandmarks {
        presence: VecDeque<f32>,
        rois: Vec<Roi>,
        fail: bool,
    }

    impl LandmarkStage for ScriptedLandmarks {
        fn landmarks(&mut self, _frame: &RgbImage, roi: &Roi) -> Result<HandLandmarks, DetectorError> {
            self.rois.push(*roi);
            if self.fail {
                return Err(DetectorError::InferenceFailed("bad tensor".into()));
            }
            Ok(upright_hand(self.presence.pop_front().unwrap_or(0.0)))
        }
    }

    fn tracker(
        palm: &[Option<Roi>],
        presence: &[f32],
    ) -> HandTracker<ScriptedPalm, ScriptedLandmarks> {
        HandTracker::new(
            ScriptedPalm {
                results: palm.iter().copied().collect(),
                ..Default::default()
            },
            ScriptedLandmarks {
                presence: presence.iter().copied().collect(),
                ..Default::default()
            },
            DetectorConfig {
                min_detection_confidence: 0.6,
                min_tracking_confidence: 0.8,
            },
        )
    }

    fn frame() -> RgbImage {
        RgbImage::new(640, 480)
    }

    fn tracked_roi() -> Roi {
        Roi::around_hand(&upright_hand(0.9), 640, 480)
    }

    #[test]
    fn test_palm_hit_starts_tracking() {
        let mut t = tracker(&[Some(PALM_ROI)], &[0.9]);

        let hand = t.detect(&frame()).unwrap().unwrap();
        assert_eq!(hand.confidence, 0.9);
        assert_eq!(t.palm.min_scores, vec![0.6]);
        assert_eq!(t.landmarks.rois, vec![PALM_ROI]);
        assert_eq!(t.tracked, Some(tracked_roi()));
    }

    #[test]
    fn test_tracked_hit_skips_palm_and_keeps_tracking() {
        let mut t = tracker(&[Some(PALM_ROI)], &[0.9, 0.85]);

        t.detect(&frame()).unwrap().unwrap();
        let hand = t.detect(&frame()).unwrap().unwrap();

        assert_eq!(hand.confidence, 0.85);
        assert_eq!(t.palm.min_scores.len(), 1);
        assert_eq!(t.landmarks.rois, vec![PALM_ROI, tracked_roi()]);
        assert!(t.tracked.is_some());
    }

    #[test]
    fn test_tracked_miss_falls_back_to_palm_detection() {
        let mut t = tracker(&[Some(PALM_ROI), Some(PALM_ROI)], &[0.9, 0.5, 0.95]);

        t.detect(&frame()).unwrap().unwrap();
        let hand = t.detect(&frame()).unwrap().unwrap();

        assert_eq!(hand.confidence, 0.95);
        assert_eq!(t.palm.min_scores, vec![0.6, 0.6]);
        assert_eq!(t.landmarks.rois, vec![PALM_ROI, tracked_roi(), PALM_ROI]);
    }

    #[test]
    fn test_palm_miss_clears_tracking() {
        let mut t = tracker(&[Some(PALM_ROI), None], &[0.9, 0.1]);

        t.detect(&frame()).unwrap().unwrap();
        assert!(t.detect(&frame()).unwrap().is_none());
        assert_eq!(t.tracked, None);

        // Next frame starts from palm detection; the landmark stage is not run.
        assert!(t.detect(&frame()).unwrap().is_none());
        assert_eq!(t.palm.min_scores.len(), 3);
        assert_eq!(t.landmarks.rois.len(), 2);
    }

    #[test]
    fn test_low_presence_after_palm_is_rejected() {
        // Above the detection threshold but below the tracking threshold.
        let mut t = tracker(&[Some(PALM_ROI)], &[0.7]);
        assert!(t.detect(&frame()).unwrap().is_none());
        assert_eq!(t.tracked, None);
    }

    #[test]
    fn test_landmark_error_propagates_and_drops_tracking() {
        let mut t = tracker(&[Some(PALM_ROI)], &[0.9]);
        t.detect(&frame()).unwrap().unwrap();

        t.landmarks.fail = true;
        assert!(t.detect(&frame()).is_err());
        assert_eq!(t.tracked, None);
    }
}
