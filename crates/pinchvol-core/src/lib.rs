//! pinchvol-core — Hand landmark detection and pinch-to-volume mapping.
//!
//! Detection runs a palm detector and a 21-point hand landmark model via ONNX
//! Runtime; the gesture mapper turns thumb/index fingertip distance into a
//! volume scalar.

pub mod detector;
pub mod gesture;
pub mod palm;
pub mod types;

pub use detector::{DetectorConfig, DetectorError, HandDetector, HandLandmarker};
pub use gesture::{GestureMapper, GestureReading};
pub use types::{HandLandmarks, Handedness, Keypoint, Landmark};

/// Directory holding the ONNX models: `$XDG_DATA_HOME/pinchvol/models`.
pub fn default_model_dir() -> std::path::PathBuf {
    let data_dir = std::env::var("XDG_DATA_HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            std::path::PathBuf::from(home).join(".local/share")
        });
    data_dir.join("pinchvol").join("models")
}

/// Default hand landmark model location.
pub fn default_model_path() -> std::path::PathBuf {
    default_model_dir().join("hand_landmark.onnx")
}

/// Default palm detection model location.
pub fn default_palm_model_path() -> std::path::PathBuf {
    default_model_dir().join("palm_detection.onnx")
}
