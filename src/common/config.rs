use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::common::error::{FaceUnlockError, Result};
use crate::core::matcher::DistanceMetric;

/// Static, install-time configuration.
///
/// Settings that the user toggles at runtime (guard on/off, delays,
/// threshold, timeout) live in [`crate::common::runtime::RuntimeConfig`]
/// instead and are re-read on every guardian cycle.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub recognizer: RecognizerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub guardian: GuardianConfig,
    #[serde(default)]
    pub enrollment: EnrollmentConfig,
    #[serde(default)]
    pub feedback: FeedbackConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub device_index: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Frames discarded by a presence poll before the one that is analysed.
    #[serde(default = "default_warmup_frames")]
    pub warmup_frames: u32,
    #[serde(default = "default_buffer_count")]
    pub buffer_count: u32,
}

fn default_width() -> u32 { 640 }
fn default_height() -> u32 { 480 }
fn default_warmup_frames() -> u32 { 3 }
fn default_buffer_count() -> u32 { 4 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            width: default_width(),
            height: default_height(),
            warmup_frames: default_warmup_frames(),
            buffer_count: default_buffer_count(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    pub detector_path: PathBuf,
    pub recognizer_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            detector_path: PathBuf::from("detector.onnx"),
            recognizer_path: PathBuf::from("recognizer.onnx"),
        }
    }
}

impl ModelConfig {
    /// Resolve relative model paths against the models directory.
    pub fn resolved(&self, models_base: &Path) -> (PathBuf, PathBuf) {
        let resolve = |p: &PathBuf| {
            if p.is_relative() {
                models_base.join(p)
            } else {
                p.clone()
            }
        };
        (resolve(&self.detector_path), resolve(&self.recognizer_path))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub detection_confidence: f32,
    /// Lower bar used by the presence fallback checks.
    pub presence_confidence: f32,
    pub nms_iou: f32,
    pub max_faces: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            detection_confidence: 0.5,
            presence_confidence: 0.25,
            nms_iou: 0.45,
            max_faces: 5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RecognizerConfig {
    pub input_size: u32,
    pub normalization_value: f32,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            input_size: 112,
            normalization_value: 127.5,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AuthConfig {
    /// Only every Nth frame is analysed.
    #[serde(default = "default_process_every")]
    pub process_every_nth: u32,
    #[serde(default = "default_warmup_ticks")]
    pub warmup_ticks: u32,
    #[serde(default = "default_frame_retry_delay")]
    pub frame_retry_delay_ms: u64,
    /// Extra time the parent grants the isolated attempt before killing it.
    #[serde(default = "default_grace")]
    pub grace_seconds: u64,
    #[serde(default)]
    pub metric: DistanceMetric,
}

fn default_process_every() -> u32 { 2 }
fn default_warmup_ticks() -> u32 { 5 }
fn default_frame_retry_delay() -> u64 { 100 }
fn default_grace() -> u64 { 2 }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            process_every_nth: default_process_every(),
            warmup_ticks: default_warmup_ticks(),
            frame_retry_delay_ms: default_frame_retry_delay(),
            grace_seconds: default_grace(),
            metric: DistanceMetric::default(),
        }
    }
}

impl AuthConfig {
    pub fn frame_retry_delay(&self) -> Duration {
        Duration::from_millis(self.frame_retry_delay_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_seconds)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GuardianConfig {
    pub poll_interval_ms: u64,
    /// Sleep while guarding is disabled or the screen is already locked.
    pub idle_sleep_ms: u64,
    /// Sleep while nothing is enrolled for the user.
    pub paused_sleep_ms: u64,
}

impl Default for GuardianConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2000,
            idle_sleep_ms: 5000,
            paused_sleep_ms: 10_000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct EnrollmentConfig {
    pub samples: usize,
    pub min_interval_ms: u64,
    pub warmup_ticks: u32,
    pub deadline_seconds: u64,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            samples: 10,
            min_interval_ms: 500,
            warmup_ticks: 5,
            deadline_seconds: 60,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FeedbackConfig {
    /// Overrides the UI program location chosen by [`crate::common::Paths`].
    pub ui_program: Option<PathBuf>,
    pub disabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceConfig {
    pub optimization_level: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { optimization_level: 3 }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        tracing::debug!("Loading config from: {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| FaceUnlockError::Config(format!("{}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.width > 4096 {
            return Err(FaceUnlockError::Config(format!(
                "Camera width must be between 1 and 4096, got {}", self.camera.width
            )));
        }
        if self.camera.height == 0 || self.camera.height > 4096 {
            return Err(FaceUnlockError::Config(format!(
                "Camera height must be between 1 and 4096, got {}", self.camera.height
            )));
        }
        if self.camera.buffer_count == 0 {
            return Err(FaceUnlockError::Config("Camera buffer_count must be at least 1".into()));
        }

        for (name, value) in [
            ("detection_confidence", self.detector.detection_confidence),
            ("presence_confidence", self.detector.presence_confidence),
            ("nms_iou", self.detector.nms_iou),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FaceUnlockError::Config(format!(
                    "Detector {} must be between 0.0 and 1.0, got {}", name, value
                )));
            }
        }
        if self.detector.input_width == 0 || self.detector.input_width > 4096
            || self.detector.input_height == 0 || self.detector.input_height > 4096
        {
            return Err(FaceUnlockError::Config(format!(
                "Detector input size must be within 1..=4096, got {}x{}",
                self.detector.input_width, self.detector.input_height
            )));
        }
        if self.recognizer.input_size == 0 || self.recognizer.input_size > 1024 {
            return Err(FaceUnlockError::Config(format!(
                "Recognizer input size must be between 1 and 1024, got {}",
                self.recognizer.input_size
            )));
        }

        if self.auth.process_every_nth == 0 {
            return Err(FaceUnlockError::Config("auth.process_every_nth must be at least 1".into()));
        }
        if self.guardian.poll_interval_ms == 0 {
            return Err(FaceUnlockError::Config("guardian.poll_interval_ms must be positive".into()));
        }
        if self.enrollment.samples == 0 {
            return Err(FaceUnlockError::Config("enrollment.samples must be at least 1".into()));
        }

        Ok(())
    }
}
