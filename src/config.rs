use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::capture::{CaptureConstraints, Facing};
use crate::detect::{DetectOptions, DEFAULT_INPUT_SIZE, DEFAULT_MIN_SCORE};
use crate::detection_loop::{DEFAULT_REFRESH_HZ, DEFAULT_SLOW_DETECT_WARNING};
use crate::feedback::{FeedbackPoolTable, DEFAULT_FEEDBACK_INTERVAL};
use crate::lifecycle::LoopSettings;

const DEFAULT_MODEL_SOURCE: &str = "stub://models";
const DEFAULT_CAMERA: &str = "stub://front_camera";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const MAX_REFRESH_HZ: u32 = 1000;
const MAX_CAMERA_DIMENSION: u32 = 8192;

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    backend: Option<String>,
    model_source: Option<String>,
    refresh_hz: Option<u32>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    feedback: Option<FeedbackConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    facing: Option<Facing>,
    audio: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    input_size: Option<u32>,
    min_score: Option<f32>,
    slow_warning_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct FeedbackConfigFile {
    interval_ms: Option<u64>,
    pools: Option<PathBuf>,
    seed: Option<u64>,
}

/// Which inference gateway serves `detect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    /// ONNX expression classifier (feature: backend-tract).
    Tract,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(BackendKind::Stub),
            "tract" => Ok(BackendKind::Tract),
            other => Err(anyhow!("unknown inference backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// `stub://<name>` or a V4L2 device path.
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub facing: Facing,
    pub audio: bool,
}

#[derive(Debug, Clone)]
pub struct FeedbackSettings {
    pub interval: Duration,
    /// JSON or TOML pool table. Built-in pools when `None`.
    pub pools_path: Option<PathBuf>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub model_source: String,
    pub refresh_hz: u32,
    pub camera: CameraSettings,
    pub detector: DetectOptions,
    pub slow_detect_warning: Duration,
    pub feedback: FeedbackSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EXPRESSION_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load with an explicit config file instead of `EXPRESSION_CONFIG`.
    /// Environment overrides still apply.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let backend = match file.backend.as_deref() {
            Some(backend) => backend.parse()?,
            None => BackendKind::Stub,
        };
        let camera_file = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            device: camera_file
                .device
                .unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
            width: camera_file.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera_file.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            facing: camera_file.facing.unwrap_or_default(),
            audio: camera_file.audio.unwrap_or(false),
        };
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectOptions {
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            min_score: detector_file.min_score.unwrap_or(DEFAULT_MIN_SCORE),
        };
        let slow_detect_warning = detector_file
            .slow_warning_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_SLOW_DETECT_WARNING);
        let feedback_file = file.feedback.unwrap_or_default();
        let feedback = FeedbackSettings {
            interval: feedback_file
                .interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_FEEDBACK_INTERVAL),
            pools_path: feedback_file.pools,
            seed: feedback_file.seed,
        };
        Ok(Self {
            backend,
            model_source: file
                .model_source
                .unwrap_or_else(|| DEFAULT_MODEL_SOURCE.to_string()),
            refresh_hz: file.refresh_hz.unwrap_or(DEFAULT_REFRESH_HZ),
            camera,
            detector,
            slow_detect_warning,
            feedback,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(backend) = env_value("EXPRESSION_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(source) = env_value("EXPRESSION_MODEL_SOURCE") {
            self.model_source = source;
        }
        if let Some(device) = env_value("EXPRESSION_CAMERA") {
            self.camera.device = device;
        }
        if let Some(facing) = env_value("EXPRESSION_FACING") {
            self.camera.facing = facing.parse()?;
        }
        if let Some(hz) = env_value("EXPRESSION_REFRESH_HZ") {
            self.refresh_hz = hz
                .parse()
                .map_err(|_| anyhow!("EXPRESSION_REFRESH_HZ must be an integer"))?;
        }
        if let Some(ms) = env_value("EXPRESSION_FEEDBACK_INTERVAL_MS") {
            let ms: u64 = ms.parse().map_err(|_| {
                anyhow!("EXPRESSION_FEEDBACK_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.feedback.interval = Duration::from_millis(ms);
        }
        if let Some(path) = env_value("EXPRESSION_FEEDBACK_POOLS") {
            self.feedback.pools_path = Some(PathBuf::from(path));
        }
        if let Some(seed) = env_value("EXPRESSION_FEEDBACK_SEED") {
            let seed: u64 = seed
                .parse()
                .map_err(|_| anyhow!("EXPRESSION_FEEDBACK_SEED must be an unsigned integer"))?;
            self.feedback.seed = Some(seed);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.model_source.trim().is_empty() {
            return Err(anyhow!("model source must not be empty"));
        }
        if self.camera.device.trim().is_empty() {
            return Err(anyhow!("camera device must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.camera.width > MAX_CAMERA_DIMENSION || self.camera.height > MAX_CAMERA_DIMENSION {
            return Err(anyhow!(
                "camera width and height must be at most {} px",
                MAX_CAMERA_DIMENSION
            ));
        }
        if self.refresh_hz == 0 || self.refresh_hz > MAX_REFRESH_HZ {
            return Err(anyhow!(
                "refresh rate must be between 1 and {} Hz",
                MAX_REFRESH_HZ
            ));
        }
        if self.feedback.interval.is_zero() {
            return Err(anyhow!("feedback interval must be greater than zero"));
        }
        self.detector.validate()
    }

    pub fn constraints(&self) -> CaptureConstraints {
        CaptureConstraints {
            facing: self.camera.facing,
            audio: self.camera.audio,
            width: self.camera.width,
            height: self.camera.height,
        }
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            model_source: self.model_source.clone(),
            constraints: self.constraints(),
            detect: self.detector,
            refresh_hz: self.refresh_hz,
            feedback_interval: self.feedback.interval,
            feedback_seed: self.feedback.seed,
            slow_detect_warning: self.slow_detect_warning,
        }
    }

    pub fn load_pools(&self) -> Result<Arc<FeedbackPoolTable>> {
        let table = match &self.feedback.pools_path {
            Some(path) => FeedbackPoolTable::load(path)?,
            None => FeedbackPoolTable::default(),
        };
        Ok(Arc::new(table))
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
