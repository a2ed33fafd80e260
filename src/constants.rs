//! Constants used throughout the application

/// Number of face landmarks delivered by the detector (left eye, right eye, nose, mouth)
pub const NUM_FACE_LANDMARKS: usize = 4;

/// Landmark indices
pub const LANDMARK_LEFT_EYE: usize = 0;
pub const LANDMARK_RIGHT_EYE: usize = 1;
pub const LANDMARK_NOSE: usize = 2;
pub const LANDMARK_MOUTH: usize = 3;

/// Default face smoothing weight of the newest detection
pub const DEFAULT_FACE_ALPHA: f64 = 0.4;

/// Detections below this confidence are ignored
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.3;

/// Hardware crop smoothing and dead zone
pub const DEFAULT_CROP_SMOOTHING: f64 = 0.15;
pub const DEFAULT_MOVEMENT_THRESHOLD_RATIO: f64 = 0.10;

/// Display crop smoothing and dead zone
pub const DEFAULT_DISPLAY_SMOOTHING: f64 = 0.08;
pub const DEFAULT_DISPLAY_THRESHOLD_RATIO: f64 = 0.05;

/// How long a face target stays valid without a fresh detection
pub const DEFAULT_FACE_VALIDITY_MS: u64 = 500;

/// Smallest normalized crop edge
pub const MIN_CROP_SIZE: f64 = 0.02;

/// Full sensor extents (Arducam 64MP Hawkeye)
pub const DEFAULT_SENSOR_WIDTH: u32 = 9152;
pub const DEFAULT_SENSOR_HEIGHT: u32 = 6944;

/// Lens position range usable at mirror distances
pub const DEFAULT_MIN_FOCUS: f64 = 8.0;
pub const DEFAULT_MAX_FOCUS: f64 = 12.5;

/// Lens position used without a usable calibration curve
pub const DEFAULT_FALLBACK_FOCUS: f64 = 10.0;

/// Ultrasonic operating range in centimeters
pub const DEFAULT_MIN_DISTANCE_CM: f64 = 30.0;
pub const DEFAULT_MAX_DISTANCE_CM: f64 = 90.0;

/// Focus history weights, oldest first
pub const DEFAULT_FOCUS_WEIGHTS: [f64; 5] = [0.1, 0.15, 0.2, 0.25, 0.3];

/// Contrast sweep parameters
pub const DEFAULT_SWEEP_COARSE_STEP: f64 = 0.1;
pub const DEFAULT_SWEEP_FINE_STEP: f64 = 0.05;
pub const DEFAULT_SWEEP_FINE_RANGE: f64 = 0.3;
pub const DEFAULT_SWEEP_SEARCH_SPAN: f64 = 0.5;
pub const DEFAULT_SWEEP_COARSE_SETTLE_MS: u64 = 200;
pub const DEFAULT_SWEEP_FINE_SETTLE_MS: u64 = 300;
pub const DEFAULT_SWEEP_MAX_DROPS: usize = 2;

/// Scheduler sizing
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_TASK_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_RESULT_CAPACITY: usize = 128;
pub const DEFAULT_RESULT_TTL_MS: u64 = 30_000;

/// Voice commands never preempt control work
pub const DEFAULT_COMMAND_PRIORITY: i32 = 10;

/// Loop rates in Hz
pub const DEFAULT_CAPTURE_HZ: f64 = 30.0;
pub const DEFAULT_DETECTION_HZ: f64 = 5.0;
pub const DEFAULT_CROP_HZ: f64 = 30.0;
pub const DEFAULT_RANGING_HZ: f64 = 5.0;
pub const DEFAULT_FOCUS_HZ: f64 = 10.0;

/// Recognizer poll interval
pub const DEFAULT_VOICE_POLL_MS: u64 = 100;

/// Join timeout when stopping a loop
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 1000;
