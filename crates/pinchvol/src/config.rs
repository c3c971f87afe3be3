use anyhow::{bail, Context, Result};
use pinchvol_core::detector::{
    DetectorConfig, DEFAULT_MIN_DETECTION_CONFIDENCE, DEFAULT_MIN_TRACKING_CONFIDENCE,
};
use pinchvol_core::gesture::{
    GestureMapper, DEFAULT_DISTANCE_MAX, DEFAULT_DISTANCE_MIN, DEFAULT_PINCH_THRESHOLD,
};
use pinchvol_hw::VolumeBackend;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime configuration.
///
/// Layered: built-in defaults, then an optional TOML file, then `PINCHVOL_*`
/// environment variables, then command-line flags (applied in `main`).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Requested capture width; the driver may negotiate another.
    pub width: u32,
    /// Requested capture height.
    pub height: u32,
    /// Hand landmark ONNX model.
    pub model_path: PathBuf,
    /// Palm detection ONNX model.
    pub palm_model_path: PathBuf,
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,
    pub volume_backend: VolumeBackend,
    /// Flip frames horizontally before detection and display.
    pub mirror: bool,
    /// Fingertip distance (px) mapped to 0% volume.
    pub distance_min: f64,
    /// Fingertip distance (px) mapped to 100% volume.
    pub distance_max: f64,
    /// Fingertip distance (px) below which the pinch marker turns red.
    pub pinch_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            model_path: pinchvol_core::default_model_path(),
            palm_model_path: pinchvol_core::default_palm_model_path(),
            min_detection_confidence: DEFAULT_MIN_DETECTION_CONFIDENCE,
            min_tracking_confidence: DEFAULT_MIN_TRACKING_CONFIDENCE,
            volume_backend: VolumeBackend::Auto,
            mirror: true,
            distance_min: DEFAULT_DISTANCE_MIN,
            distance_max: DEFAULT_DISTANCE_MAX,
            pinch_threshold: DEFAULT_PINCH_THRESHOLD,
        }
    }
}

/// On-disk form: every key optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    camera_device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    model_path: Option<PathBuf>,
    palm_model_path: Option<PathBuf>,
    min_detection_confidence: Option<f32>,
    min_tracking_confidence: Option<f32>,
    volume_backend: Option<VolumeBackend>,
    mirror: Option<bool>,
    distance_min: Option<f64>,
    distance_max: Option<f64>,
    pinch_threshold: Option<f64>,
}

impl Config {
    /// Load defaults, then `file` (if any), then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = file {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            config
                .apply_toml(&text)
                .with_context(|| format!("invalid config file {}", path.display()))?;
        }
        config.apply_env_with(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(text)?;

        if let Some(v) = file.camera_device {
            self.camera_device = v;
        }
        if let Some(v) = file.width {
            self.width = v;
        }
        if let Some(v) = file.height {
            self.height = v;
        }
        if let Some(v) = file.model_path {
            self.model_path = v;
        }
        if let Some(v) = file.palm_model_path {
            self.palm_model_path = v;
        }
        if let Some(v) = file.min_detection_confidence {
            self.min_detection_confidence = v;
        }
        if let Some(v) = file.min_tracking_confidence {
            self.min_tracking_confidence = v;
        }
        if let Some(v) = file.volume_backend {
            self.volume_backend = v;
        }
        if let Some(v) = file.mirror {
            self.mirror = v;
        }
        if let Some(v) = file.distance_min {
            self.distance_min = v;
        }
        if let Some(v) = file.distance_max {
            self.distance_max = v;
        }
        if let Some(v) = file.pinch_threshold {
            self.pinch_threshold = v;
        }
        Ok(())
    }

    /// Apply `PINCHVOL_*` overrides. Unparseable values are ignored with a warning.
    fn apply_env_with(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("PINCHVOL_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = get("PINCHVOL_MODEL_PATH") {
            self.model_path = PathBuf::from(v);
        }
        if let Some(v) = get("PINCHVOL_PALM_MODEL_PATH") {
            self.palm_model_path = PathBuf::from(v);
        }
        env_parse(&get, "PINCHVOL_WIDTH", &mut self.width);
        env_parse(&get, "PINCHVOL_HEIGHT", &mut self.height);
        env_parse(
            &get,
            "PINCHVOL_MIN_DETECTION_CONFIDENCE",
            &mut self.min_detection_confidence,
        );
        env_parse(
            &get,
            "PINCHVOL_MIN_TRACKING_CONFIDENCE",
            &mut self.min_tracking_confidence,
        );
        env_parse(&get, "PINCHVOL_VOLUME_BACKEND", &mut self.volume_backend);
        env_parse(&get, "PINCHVOL_DISTANCE_MIN", &mut self.distance_min);
        env_parse(&get, "PINCHVOL_DISTANCE_MAX", &mut self.distance_max);
        env_parse(&get, "PINCHVOL_PINCH_THRESHOLD", &mut self.pinch_threshold);
        if let Some(v) = get("PINCHVOL_MIRROR") {
            self.mirror = v != "0";
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.distance_max > self.distance_min) {
            bail!(
                "distance_max ({}) must be greater than distance_min ({})",
                self.distance_max,
                self.distance_min
            );
        }
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }
        if self.width == 0 || self.height == 0 {
            bail!("capture size must be non-zero, got {}x{}", self.width, self.height);
        }
        Ok(())
    }

    pub fn mapper(&self) -> GestureMapper {
        GestureMapper {
            distance_min: self.distance_min,
            distance_max: self.distance_max,
            pinch_threshold: self.pinch_threshold,
        }
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            min_detection_confidence: self.min_detection_confidence,
            min_tracking_confidence: self.min_tracking_confidence,
        }
    }
}

fn env_parse<T: std::str::FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut T) {
    let Some(raw) = get(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable environment override"),
    }
}
