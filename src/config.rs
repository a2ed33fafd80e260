//! Configuration management for the smart mirror rig

use crate::constants::*;
use crate::zoom::ZoomRatios;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hardware sensor crop
    pub crop: CropConfig,

    /// Display-time software crop
    pub display_crop: DisplayCropConfig,

    /// Face observation filtering
    pub face: FaceConfig,

    /// Distance-driven focus
    pub focus: FocusConfig,

    /// Background task scheduler
    pub scheduler: SchedulerConfig,

    /// Control loop rates
    pub loops: LoopConfig,

    /// Sensor geometry
    pub sensor: SensorConfig,

    /// Simulated rig used by the binary
    pub simulation: SimulationConfig,
}

/// Hardware crop controller parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Fraction of the remaining distance covered per tick (0.0-1.0]
    pub smoothing_factor: f64,

    /// Dead zone radius as a fraction of the current crop size
    pub movement_threshold_ratio: f64,

    /// How long a face target stays valid without a new detection
    pub face_validity_ms: u64,

    /// Crop size relative to the face, per zoom level
    pub zoom_ratios: ZoomRatios,
}

/// Software crop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayCropConfig {
    /// Fraction of the remaining distance covered per tick (0.0-1.0]
    pub smoothing_factor: f64,

    /// Dead zone radius as a fraction of the current crop size
    pub movement_threshold_ratio: f64,

    /// Crop size relative to the face, per zoom level
    pub zoom_ratios: ZoomRatios,
}

/// Face observation parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceConfig {
    /// Weight of the newest detection (0.0-1.0]
    pub smoothing_alpha: f64,

    /// Detections below this confidence are ignored
    pub min_confidence: f64,
}

/// Focus controller parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    /// Calibration curve file (JSON)
    pub calibration: PathBuf,

    /// Smallest lens position
    pub min_focus: f64,

    /// Largest lens position
    pub max_focus: f64,

    /// Lens position used when the calibration has fewer than two points
    pub fallback_focus: f64,

    /// Closest valid range reading in centimeters
    pub min_distance_cm: f64,

    /// Farthest valid range reading in centimeters
    pub max_distance_cm: f64,

    /// Smoothing filter name (weighted, exponential, none)
    pub filter: String,

    /// History weights for the weighted filter, oldest first
    pub history_weights: Vec<f64>,

    /// Alpha for the exponential filter
    pub exponential_alpha: f64,

    /// Contrast sweep run on a focus command
    pub sweep: SweepConfig,
}

/// Contrast-based focus search parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Run a contrast sweep when focus is triggered
    pub enabled: bool,

    /// Coarse search step
    pub coarse_step: f64,

    /// Fine search step
    pub fine_step: f64,

    /// How far below the coarse peak the fine search reaches
    pub fine_range: f64,

    /// Coarse search starts this far below the distance-mapped position
    pub search_span: f64,

    /// Lens settle time after a coarse step
    pub coarse_settle_ms: u64,

    /// Lens settle time after a fine step
    pub fine_settle_ms: u64,

    /// Consecutive score drops that end the coarse search
    pub max_drops: usize,
}

/// Task scheduler sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker threads
    pub workers: usize,

    /// Queued tasks beyond this are dropped
    pub queue_capacity: usize,

    /// Results of tasks running longer than this are discarded
    pub task_timeout_ms: u64,

    /// Uncollected results kept at most
    pub result_capacity: usize,

    /// Uncollected results expire after this
    pub result_ttl_ms: u64,

    /// Priority of voice command tasks (higher runs later)
    pub command_priority: i32,
}

/// Control loop rates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Frame ingestion rate
    pub capture_hz: f64,

    /// Face detection rate
    pub detection_hz: f64,

    /// Crop control rate
    pub crop_hz: f64,

    /// Distance sampling rate
    pub ranging_hz: f64,

    /// Focus control rate
    pub focus_hz: f64,

    /// Speech recognizer poll timeout
    pub voice_poll_ms: u64,

    /// How long stop waits for each loop
    pub join_timeout_ms: u64,
}

/// Sensor geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Full sensor width in pixels
    pub width: u32,

    /// Full sensor height in pixels
    pub height: u32,
}

/// Simulated rig settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Synthetic frame edge in pixels
    pub frame_size: u32,

    /// Every n-th range reading fails (0 disables)
    pub range_failure_every: u32,

    /// Detector position jitter (normalized)
    pub detector_jitter: f64,

    /// Probability that a detection misses the face
    pub detection_miss_rate: f64,

    /// Range finder noise in centimeters
    pub range_noise_cm: f64,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: DEFAULT_CROP_SMOOTHING,
            movement_threshold_ratio: DEFAULT_MOVEMENT_THRESHOLD_RATIO,
            face_validity_ms: DEFAULT_FACE_VALIDITY_MS,
            zoom_ratios: ZoomRatios::HARDWARE,
        }
    }
}

impl Default for DisplayCropConfig {
    fn default() -> Self {
        Self {
            smoothing_factor: DEFAULT_DISPLAY_SMOOTHING,
            movement_threshold_ratio: DEFAULT_DISPLAY_THRESHOLD_RATIO,
            zoom_ratios: ZoomRatios::DISPLAY,
        }
    }
}

impl Default for FaceConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: DEFAULT_FACE_ALPHA,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            calibration: PathBuf::from("focus_calibration.json"),
            min_focus: DEFAULT_MIN_FOCUS,
            max_focus: DEFAULT_MAX_FOCUS,
            fallback_focus: DEFAULT_FALLBACK_FOCUS,
            min_distance_cm: DEFAULT_MIN_DISTANCE_CM,
            max_distance_cm: DEFAULT_MAX_DISTANCE_CM,
            filter: "weighted".to_string(),
            history_weights: DEFAULT_FOCUS_WEIGHTS.to_vec(),
            exponential_alpha: 0.5,
            sweep: SweepConfig::default(),
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            coarse_step: DEFAULT_SWEEP_COARSE_STEP,
            fine_step: DEFAULT_SWEEP_FINE_STEP,
            fine_range: DEFAULT_SWEEP_FINE_RANGE,
            search_span: DEFAULT_SWEEP_SEARCH_SPAN,
            coarse_settle_ms: DEFAULT_SWEEP_COARSE_SETTLE_MS,
            fine_settle_ms: DEFAULT_SWEEP_FINE_SETTLE_MS,
            max_drops: DEFAULT_SWEEP_MAX_DROPS,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            task_timeout_ms: DEFAULT_TASK_TIMEOUT_MS,
            result_capacity: DEFAULT_RESULT_CAPACITY,
            result_ttl_ms: DEFAULT_RESULT_TTL_MS,
            command_priority: DEFAULT_COMMAND_PRIORITY,
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            capture_hz: DEFAULT_CAPTURE_HZ,
            detection_hz: DEFAULT_DETECTION_HZ,
            crop_hz: DEFAULT_CROP_HZ,
            ranging_hz: DEFAULT_RANGING_HZ,
            focus_hz: DEFAULT_FOCUS_HZ,
            voice_poll_ms: DEFAULT_VOICE_POLL_MS,
            join_timeout_ms: DEFAULT_JOIN_TIMEOUT_MS,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_SENSOR_WIDTH,
            height: DEFAULT_SENSOR_HEIGHT,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frame_size: 192,
            range_failure_every: 17,
            detector_jitter: 0.004,
            detection_miss_rate: 0.02,
            range_noise_cm: 1.5,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        check_fraction("crop.smoothing_factor", self.crop.smoothing_factor)?;
        check_ratio("crop.movement_threshold_ratio", self.crop.movement_threshold_ratio)?;
        if !self.crop.zoom_ratios.is_valid() {
            return Err(Error::ConfigError("crop.zoom_ratios must all be positive".to_string()));
        }

        check_fraction("display_crop.smoothing_factor", self.display_crop.smoothing_factor)?;
        check_ratio(
            "display_crop.movement_threshold_ratio",
            self.display_crop.movement_threshold_ratio,
        )?;
        if !self.display_crop.zoom_ratios.is_valid() {
            return Err(Error::ConfigError("display_crop.zoom_ratios must all be positive".to_string()));
        }

        check_fraction("face.smoothing_alpha", self.face.smoothing_alpha)?;
        if !(0.0..=1.0).contains(&self.face.min_confidence) {
            return Err(Error::ConfigError(
                "face.min_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }

        // Focus ranges
        if !(self.focus.min_focus.is_finite() && self.focus.max_focus.is_finite())
            || self.focus.min_focus >= self.focus.max_focus
        {
            return Err(Error::ConfigError(
                "focus.min_focus must be smaller than focus.max_focus".to_string(),
            ));
        }
        if !(self.focus.min_focus..=self.focus.max_focus).contains(&self.focus.fallback_focus) {
            return Err(Error::ConfigError(
                "focus.fallback_focus must lie within the focus range".to_string(),
            ));
        }
        if !(self.focus.min_distance_cm > 0.0 && self.focus.min_distance_cm < self.focus.max_distance_cm) {
            return Err(Error::ConfigError(
                "focus distance range must be positive and ordered".to_string(),
            ));
        }
        if self.focus.history_weights.is_empty()
            || self.focus.history_weights.iter().any(|w| !w.is_finite() || *w <= 0.0)
        {
            return Err(Error::ConfigError(
                "focus.history_weights must be non-empty and positive".to_string(),
            ));
        }
        check_fraction("focus.exponential_alpha", self.focus.exponential_alpha)?;

        let sweep = &self.focus.sweep;
        if sweep.coarse_step <= 0.0 || sweep.fine_step <= 0.0 || sweep.fine_range < 0.0 || sweep.search_span < 0.0 {
            return Err(Error::ConfigError(
                "focus.sweep steps must be positive and ranges non-negative".to_string(),
            ));
        }
        if sweep.max_drops == 0 {
            return Err(Error::ConfigError("focus.sweep.max_drops must be at least 1".to_string()));
        }

        // Scheduler
        if self.scheduler.workers == 0 {
            return Err(Error::ConfigError("scheduler.workers must be greater than 0".to_string()));
        }
        if self.scheduler.queue_capacity == 0 || self.scheduler.result_capacity == 0 {
            return Err(Error::ConfigError(
                "scheduler capacities must be greater than 0".to_string(),
            ));
        }

        // Loop rates
        for (name, hz) in [
            ("loops.capture_hz", self.loops.capture_hz),
            ("loops.detection_hz", self.loops.detection_hz),
            ("loops.crop_hz", self.loops.crop_hz),
            ("loops.ranging_hz", self.loops.ranging_hz),
            ("loops.focus_hz", self.loops.focus_hz),
        ] {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(Error::ConfigError(format!("{name} must be greater than 0")));
            }
        }

        if self.sensor.width == 0 || self.sensor.height == 0 {
            return Err(Error::ConfigError("sensor dimensions must be non-zero".to_string()));
        }
        if self.simulation.frame_size < 16 {
            return Err(Error::ConfigError("simulation.frame_size must be at least 16".to_string()));
        }
        if !(0.0..=1.0).contains(&self.simulation.detection_miss_rate)
            || self.simulation.detector_jitter < 0.0
            || self.simulation.range_noise_cm < 0.0
        {
            return Err(Error::ConfigError(
                "simulation noise settings must be non-negative and the miss rate a probability".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(Error::ConfigError(format!("{name} must be in (0, 1], got {value}")))
    }
}

fn check_ratio(name: &str, value: f64) -> Result<()> {
    if (0.0..1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::ConfigError(format!("{name} must be in [0, 1), got {value}")))
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Smart Mirror Configuration

# Hardware sensor crop
crop:
  smoothing_factor: 0.15
  movement_threshold_ratio: 0.1
  face_validity_ms: 500
  zoom_ratios:
    wide: 2.0
    face: 1.2
    eyes: 1.5
    lips: 1.5

# Software crop applied to captured frames
display_crop:
  smoothing_factor: 0.08
  movement_threshold_ratio: 0.05
  zoom_ratios:
    wide: 1.6
    face: 1.0
    eyes: 0.4
    lips: 0.6

# Face detection filtering
face:
  smoothing_alpha: 0.4
  min_confidence: 0.3

# Distance-driven focus
focus:
  calibration: "focus_calibration.json"
  min_focus: 8.0
  max_focus: 12.5
  fallback_focus: 10.0
  min_distance_cm: 30.0
  max_distance_cm: 90.0
  filter: "weighted"
  history_weights: [0.1, 0.15, 0.2, 0.25, 0.3]
  exponential_alpha: 0.5
  sweep:
    enabled: false
    coarse_step: 0.1
    fine_step: 0.05
    fine_range: 0.3
    search_span: 0.5
    coarse_settle_ms: 200
    fine_settle_ms: 300
    max_drops: 2

# Background tasks
scheduler:
  workers: 2
  queue_capacity: 64
  task_timeout_ms: 1000
  result_capacity: 128
  result_ttl_ms: 30000
  command_priority: 10

# Loop rates
loops:
  capture_hz: 30.0
  detection_hz: 5.0
  crop_hz: 30.0
  ranging_hz: 5.0
  focus_hz: 10.0
  voice_poll_ms: 100
  join_timeout_ms: 1000

# Sensor geometry
sensor:
  width: 9152
  height: 6944

# Simulated rig
simulation:
  frame_size: 192
  range_failure_every: 17
  detector_jitter: 0.004
  detection_miss_rate: 0.02
  range_noise_cm: 1.5
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_example_matches_defaults() {
        let parsed = Config::from_yaml(EXAMPLE_CONFIG).unwrap();
        parsed.validate().unwrap();
        let defaults = Config::default();

        assert_eq!(parsed.crop.zoom_ratios, defaults.crop.zoom_ratios);
        assert_eq!(parsed.display_crop.zoom_ratios, defaults.display_crop.zoom_ratios);
        assert_eq!(parsed.focus.history_weights, defaults.focus.history_weights);
        assert_eq!(parsed.scheduler.queue_capacity, defaults.scheduler.queue_capacity);
        assert_eq!(parsed.sensor.width, defaults.sensor.width);
        assert_eq!(parsed.focus.calibration, defaults.focus.calibration);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = Config::from_yaml("crop:\n  smoothing_factor: 0.3\n").unwrap();
        assert_eq!(config.crop.smoothing_factor, 0.3);
        assert_eq!(config.crop.movement_threshold_ratio, DEFAULT_MOVEMENT_THRESHOLD_RATIO);
        assert_eq!(config.loops.crop_hz, DEFAULT_CROP_HZ);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.crop.smoothing_factor = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.focus.min_focus = 13.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.loops.focus_hz = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.focus.history_weights.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            Config::from_yaml("crop: [1, 2"),
            Err(Error::ConfigError(_))
        ));
    }
}
