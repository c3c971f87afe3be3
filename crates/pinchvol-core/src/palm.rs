//! Palm detector via ONNX Runtime: the first stage of hand tracking.
//!
//! SSD-style model over a 192×192 RGB input (NHWC, [0, 1]) with 2016 fixed
//! anchors. Each anchor regresses a palm box and seven palm keypoints;
//! overlapping detections are merged with weighted NMS and the best one is
//! turned into a rotated crop for the landmark model.

use crate::detector::{preprocess, rotation_between, DetectorError, PalmStage, Roi};
use image::RgbImage;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

// --- Named constants (no magic numbers) ---
const PALM_INPUT_SIZE: usize = 192;
const PALM_NUM_ANCHORS: usize = 2016;
/// Box (cx, cy, w, h) plus 7 keypoints (x, y).
const PALM_VALUES_PER_ANCHOR: usize = 18;
const PALM_NUM_KEYPOINTS: usize = 7;
/// (stride, anchors per grid cell). The three stride-16 layers share one grid.
const PALM_ANCHOR_LAYERS: [(usize, usize); 2] = [(8, 2), (16, 6)];
/// Raw logits are clipped to ±this before the sigmoid.
const PALM_SCORE_CLIP: f32 = 100.0;
const PALM_NMS_THRESHOLD: f32 = 0.3;
/// Keypoints that give the hand's up direction: wrist center → middle finger base.
const PALM_KP_WRIST: usize = 0;
const PALM_KP_MIDDLE_MCP: usize = 2;
/// Crop side = longer palm box side × this factor, to take in the fingers.
const PALM_ROI_SCALE: f32 = 2.6;
/// Crop shift toward the fingers, as a fraction of the palm box height.
const PALM_ROI_SHIFT_Y: f32 = -0.5;

/// One palm in normalized input-square coordinates.
#[derive(Debug, Clone, PartialEq)]
struct PalmDetection {
    cx: f32,
    cy: f32,
    width: f32,
    height: f32,
    score: f32,
    keypoints: [(f32, f32); PALM_NUM_KEYPOINTS],
}

/// Output tensor positions: (boxes, scores).
type PalmOutputIndices = (usize, usize);

/// ONNX palm detection model.
pub struct PalmDetector {
    session: Session,
    anchors: Vec<(f32, f32)>,
    outputs: PalmOutputIndices,
}

impl PalmDetector {
    /// Load the palm detection ONNX model from the given path.
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
            "loaded palm detection model"
        );

        if output_names.len() < 2 {
            return Err(DetectorError::InferenceFailed(format!(
                "palm detection model requires 2 outputs (boxes, scores), got {}",
                output_names.len()
            )));
        }

        let outputs = discover_output_indices(&output_names);
        tracing::debug!(?outputs, "palm detection output tensor mapping");

        Ok(Self {
            session,
            anchors: generate_anchors(),
            outputs,
        })
    }
}

impl PalmStage for PalmDetector {
    fn locate(&mut self, frame: &RgbImage, min_score: f32) -> Result<Option<Roi>, DetectorError> {
        let (width, height) = frame.dimensions();
        let square = Roi::full_frame(width, height);
        let input = preprocess(frame, &square, PALM_INPUT_SIZE);

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (boxes_idx, scores_idx) = self.outputs;
        let (_, boxes) = outputs[boxes_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("palm boxes: {e}")))?;
        let (_, scores) = outputs[scores_idx]
            .try_extract_tensor::<f32>()
            .map_err(|e| DetectorError::InferenceFailed(format!("palm scores: {e}")))?;

        if boxes.len() < PALM_NUM_ANCHORS * PALM_VALUES_PER_ANCHOR
            || scores.len() < PALM_NUM_ANCHORS
        {
            return Err(DetectorError::InferenceFailed(format!(
                "expected {PALM_NUM_ANCHORS} anchors, got {} box values and {} scores",
                boxes.len(),
                scores.len()
            )));
        }

        let detections = decode_palms(boxes, scores, &self.anchors, min_score);
        let Some(best) = weighted_nms(detections, PALM_NMS_THRESHOLD).into_iter().next() else {
            return Ok(None);
        };

        tracing::trace!(score = best.score, "palm detected");
        Ok(Some(palm_roi(&best, &square)))
    }
}

/// Discover output tensor ordering by name.
///
/// Converted MediaPipe models name their outputs `regressors` (boxes) and
/// `classificators` (scores), or `Identity` / `Identity_1`. Anything else
/// falls back to positional ordering [0]=boxes, [1]=scores.
fn discover_output_indices(names: &[String]) -> PalmOutputIndices {
    let exact = |target: &str| names.iter().position(|n| n == target);
    if let (Some(boxes), Some(scores)) = (exact("Identity"), exact("Identity_1")) {
        return (boxes, scores);
    }

    let containing = |keywords: &[&str]| {
        names.iter().position(|n| {
            let n = n.to_ascii_lowercase();
            keywords.iter().any(|k| n.contains(k))
        })
    };
    if let (Some(boxes), Some(scores)) = (
        containing(&["regress", "box"]),
        containing(&["classif", "score"]),
    ) {
        return (boxes, scores);
    }

    tracing::info!(
        ?names,
        "output names not recognized, using positional mapping [0]=boxes, [1]=scores"
    );
    (0, 1)
}

/// Anchor centers in normalized input coordinates, in model output order.
fn generate_anchors() -> Vec<(f32, f32)> {
    let mut anchors = Vec::with_capacity(PALM_NUM_ANCHORS);
    for (stride, per_cell) in PALM_ANCHOR_LAYERS {
        let grid = PALM_INPUT_SIZE.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let center = (
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                );
                anchors.extend(std::iter::repeat(center).take(per_cell));
            }
        }
    }
    anchors
}

fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit.clamp(-PALM_SCORE_CLIP, PALM_SCORE_CLIP)).exp())
}

/// Decode every anchor scoring at least `min_score`.
fn decode_palms(
    boxes: &[f32],
    scores: &[f32],
    anchors: &[(f32, f32)],
    min_score: f32,
) -> Vec<PalmDetection> {
    let input = PALM_INPUT_SIZE as f32;
    let mut detections = Vec::new();

    for (idx, &(ax, ay)) in anchors.iter().enumerate() {
        let score = sigmoid(scores.get(idx).copied().unwrap_or(f32::MIN));
        if score < min_score {
            continue;
        }
        let Some(raw) = boxes.get(idx * PALM_VALUES_PER_ANCHOR..(idx + 1) * PALM_VALUES_PER_ANCHOR)
        else {
            continue;
        };

        let mut keypoints = [(0.0f32, 0.0f32); PALM_NUM_KEYPOINTS];
        for (k, kp) in keypoints.iter_mut().enumerate() {
            *kp = (raw[4 + k * 2] / input + ax, raw[5 + k * 2] / input + ay);
        }

        detections.push(PalmDetection {
            cx: raw[0] / input + ax,
            cy: raw[1] / input + ay,
            width: raw[2] / input,
            height: raw[3] / input,
            score,
            keypoints,
        });
    }

    detections
}

/// Weighted Non-Maximum Suppression.
///
/// Each surviving detection is the score-weighted average of the cluster of
/// detections overlapping it, keeping the cluster's best score.
fn weighted_nms(mut detections: Vec<PalmDetection>, iou_threshold: f32) -> Vec<PalmDetection> {
    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; detections.len()];

    for i in 0..detections.len() {
        if suppressed[i] {
            continue;
        }

        let mut merged = detections[i].clone();
        let mut total = detections[i].score;
        let (mut cx, mut cy) = (merged.cx * total, merged.cy * total);
        let (mut w, mut h) = (merged.width * total, merged.height * total);
        let mut keypoints = merged.keypoints.map(|(x, y)| (x * total, y * total));

        for j in (i + 1)..detections.len() {
            if suppressed[j] || iou(&detections[i], &detections[j]) <= iou_threshold {
                continue;
            }
            suppressed[j] = true;
            let other = &detections[j];
            let s = other.score;
            total += s;
            cx += other.cx * s;
            cy += other.cy * s;
            w += other.width * s;
            h += other.height * s;
            for (acc, &(x, y)) in keypoints.iter_mut().zip(&other.keypoints) {
                acc.0 += x * s;
                acc.1 += y * s;
            }
        }

        if total > 0.0 {
            merged.cx = cx / total;
            merged.cy = cy / total;
            merged.width = w / total;
            merged.height = h / total;
            merged.keypoints = keypoints.map(|(x, y)| (x / total, y / total));
        }
        keep.push(merged);
    }

    keep
}

/// Compute Intersection-over-Union between two center-size boxes.
fn iou(a: &PalmDetection, b: &PalmDetection) -> f32 {
    let x1 = (a.cx - a.width / 2.0).max(b.cx - b.width / 2.0);
    let y1 = (a.cy - a.height / 2.0).max(b.cy - b.height / 2.0);
    let x2 = (a.cx + a.width / 2.0).min(b.cx + b.width / 2.0);
    let y2 = (a.cy + a.height / 2.0).min(b.cy + b.height / 2.0);

    let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    let union_area = a.width * a.height + b.width * b.height - inter_area;

    if union_area > 0.0 {
        inter_area / union_area
    } else {
        0.0
    }
}

/// Crop around a palm, mapped from the input square back to frame pixels.
fn palm_roi(palm: &PalmDetection, square: &Roi) -> Roi {
    let keypoint = |k: usize| square.to_frame(palm.keypoints[k].0, palm.keypoints[k].1);
    let rotation = rotation_between(keypoint(PALM_KP_WRIST), keypoint(PALM_KP_MIDDLE_MCP));
    Roi::from_box(
        square.to_frame(palm.cx, palm.cy),
        palm.width * square.size,
        palm.height * square.size,
        rotation,
        PALM_ROI_SCALE,
        PALM_ROI_SHIFT_Y,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn palm(cx: f32, cy: f32, size: f32, score: f32) -> PalmDetection {
        PalmDetection {
            cx,
            cy,
            width: size,
            height: size,
            score,
            keypoints: [(cx, cy); PALM_NUM_KEYPOINTS],
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_anchor_layout() {
        let anchors = generate_anchors();
        assert_eq!(anchors.len(), PALM_NUM_ANCHORS);

        // 24×24 grid with 2 anchors per cell, then 12×12 with 6 per cell
        let first = (0.5 / 24.0, 0.5 / 24.0);
        assert_eq!(anchors[0], first);
        assert_eq!(anchors[1], first);
        assert_eq!(anchors[2], (1.5 / 24.0, 0.5 / 24.0));
        assert_eq!(anchors[1152], (0.5 / 12.0, 0.5 / 12.0));
        assert_eq!(anchors[1157], (0.5 / 12.0, 0.5 / 12.0));
        assert_eq!(anchors[PALM_NUM_ANCHORS - 1], (11.5 / 12.0, 11.5 / 12.0));
    }

    #[test]
    fn test_sigmoid_clipped() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert_eq!(sigmoid(1.0e6), sigmoid(PALM_SCORE_CLIP));
        assert!(sigmoid(f32::MIN) < 1e-30);
    }

    #[test]
    fn test_decode_palms_offsets_from_anchor() {
        let anchors = generate_anchors();
        let mut boxes = vec![0.0f32; PALM_NUM_ANCHORS * PALM_VALUES_PER_ANCHOR];
        let mut scores = vec![-10.0f32; PALM_NUM_ANCHORS];

        let idx = 1152;
        scores[idx] = 3.0;
        let raw = &mut boxes[idx * PALM_VALUES_PER_ANCHOR..(idx + 1) * PALM_VALUES_PER_ANCHOR];
        raw[..4].copy_from_slice(&[19.2, -9.6, 38.4, 48.0]);
        raw[4] = 9.6; // wrist keypoint x
        raw[7] = -19.2; // thumb keypoint y

        let dets = decode_palms(&boxes, &scores, &anchors, 0.5);
        assert_eq!(dets.len(), 1);
        let d = &dets[0];
        let (ax, ay) = anchors[idx];
        assert!((d.cx - (ax + 0.1)).abs() < 1e-6);
        assert!((d.cy - (ay - 0.05)).abs() < 1e-6);
        assert!((d.width - 0.2).abs() < 1e-6);
        assert!((d.height - 0.25).abs() < 1e-6);
        assert!((d.keypoints[0].0 - (ax + 0.05)).abs() < 1e-6);
        assert!((d.keypoints[1].1 - (ay - 0.1)).abs() < 1e-6);
        assert!((d.score - sigmoid(3.0)).abs() < 1e-6);
    }

    #[test]
    fn test_decode_palms_respects_min_score() {
        let anchors = generate_anchors();
        let boxes = vec![0.0f32; PALM_NUM_ANCHORS * PALM_VALUES_PER_ANCHOR];
        let mut scores = vec![-10.0f32; PALM_NUM_ANCHORS];
        scores[7] = 0.0; // sigmoid → 0.5

        assert_eq!(decode_palms(&boxes, &scores, &anchors, 0.5).len(), 1);
        assert!(decode_palms(&boxes, &scores, &anchors, 0.7).is_empty());
    }

    #[test]
    fn test_iou() {
        let a = palm(0.5, 0.5, 0.2, 1.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
        assert!(iou(&a, &palm(0.9, 0.9, 0.2, 1.0)).abs() < 1e-6);
        // Half-width shift: overlap 0.1×0.2, union 0.04 + 0.04 − 0.02
        let b = palm(0.6, 0.5, 0.2, 1.0);
        assert!((iou(&a, &b) - 0.02 / 0.06).abs() < 1e-5);
    }

    #[test]
    fn test_weighted_nms_merges_overlapping() {
        let dets = vec![
            palm(0.52, 0.5, 0.2, 0.6),
            palm(0.9, 0.1, 0.1, 0.7),
            palm(0.5, 0.5, 0.2, 0.9),
        ];
        let result = weighted_nms(dets, PALM_NMS_THRESHOLD);
        assert_eq!(result.len(), 2);

        let best = &result[0];
        assert_eq!(best.score, 0.9);
        let expected_cx = (0.5 * 0.9 + 0.52 * 0.6) / 1.5;
        assert!((best.cx - expected_cx).abs() < 1e-5, "cx={}", best.cx);
        assert!((best.keypoints[3].0 - expected_cx).abs() < 1e-5);
        assert!((result[1].cx - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_nms_empty() {
        assert!(weighted_nms(vec![], PALM_NMS_THRESHOLD).is_empty());
    }

    #[test]
    fn test_palm_roi_upright() {
        // 640×480 frame letterboxed into a 640 px square.
        let square = Roi::full_frame(640, 480);
        let mut det = palm(0.5, 0.5, 0.1, 0.9);
        det.keypoints[PALM_KP_WRIST] = (0.5, 0.55);
        det.keypoints[PALM_KP_MIDDLE_MCP] = (0.5, 0.45);

        let roi = palm_roi(&det, &square);
        // 64 px palm box, shifted up half its height, side 2.6×.
        assert!(roi.rotation.abs() < 1e-5);
        assert!((roi.center_x - 320.0).abs() < 1e-3);
        assert!((roi.center_y - 208.0).abs() < 1e-3);
        assert!((roi.size - 166.4).abs() < 1e-3);
    }

    #[test]
    fn test_palm_roi_follows_hand_direction() {
        let square = Roi::full_frame(640, 480);
        let mut det = palm(0.5, 0.5, 0.1, 0.9);
        det.keypoints[PALM_KP_WRIST] = (0.45, 0.5);
        det.keypoints[PALM_KP_MIDDLE_MCP] = (0.55, 0.5);

        let roi = palm_roi(&det, &square);
        assert!((roi.rotation - FRAC_PI_2).abs() < 1e-5);
        // Shift goes toward the fingers, which point right.
        assert!((roi.center_x - 352.0).abs() < 1e-3);
        assert!((roi.center_y - 240.0).abs() < 1e-3);
    }

    #[test]
    fn test_discover_output_indices() {
        assert_eq!(
            discover_output_indices(&names(&["classificators", "regressors"])),
            (1, 0)
        );
        assert_eq!(
            discover_output_indices(&names(&["Identity_1", "Identity"])),
            (1, 0)
        );
        assert_eq!(discover_output_indices(&names(&["511", "512"])), (0, 1));
    }
}
