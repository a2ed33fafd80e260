//! Software stand-in for the mirror hardware.
//!
//! A subject drifts slowly in front of the camera and moves closer and
//! farther away. The camera renders what the current sensor crop sees and
//! blurs it according to how far the lens is from the subject's true focus
//! position, so both control loops close over a believable plant.

use crate::config::Config;
use crate::crop::PixelCrop;
use crate::face::{BoundingBox, FaceData, Point};
use crate::focus::FocusCalibration;
use crate::frame::Frame;
use crate::hardware::{CameraControl, DistanceSensor, FaceDetector, FrameSource, Rig, SpeechRecognizer};
use crate::{Error, Result};
use image::{GrayImage, Luma};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Subject pose at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subject {
    /// Face center, sensor-normalized
    pub center: Point,
    /// Face edge length, sensor-normalized
    pub face_side: f64,
    /// Distance from the camera in centimeters
    pub distance_cm: f64,
}

impl Subject {
    /// Detector view of the subject
    #[must_use]
    pub fn face_data(&self) -> FaceData {
        let (c, s) = (self.center, self.face_side);
        FaceData::new(
            BoundingBox::new(c.x - s / 2.0, c.y - s / 2.0, s, s),
            [
                Point::new(c.x - s * 0.2, c.y - s * 0.12),
                Point::new(c.x + s * 0.2, c.y - s * 0.12),
                Point::new(c.x, c.y + s * 0.05),
                Point::new(c.x, c.y + s * 0.25),
            ],
            0.95,
        )
    }
}

/// Deterministic subject motion
#[derive(Debug, Clone)]
pub struct Scene {
    origin: Instant,
}

impl Scene {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time since the scene started
    pub fn elapsed_at(&self, at: Instant) -> Duration {
        at.saturating_duration_since(self.origin)
    }

    /// Subject `t` after the scene started
    #[must_use]
    pub fn subject_at(&self, t: Duration) -> Subject {
        let t = t.as_secs_f64();
        let distance_cm = 55.0 + 20.0 * (t * 0.15).sin();
        Subject {
            center: Point::new(0.5 + 0.15 * (t * 0.4).sin(), 0.45 + 0.08 * (t * 0.23).sin()),
            face_side: 0.2 * 55.0 / distance_cm,
            distance_cm,
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

struct CameraState {
    crop: PixelCrop,
    lens: f64,
    sequence: u64,
}

/// Simulated camera: frame source and control surface in one
pub struct SimCamera {
    scene: Arc<Scene>,
    calibration: FocusCalibration,
    fallback_focus: f64,
    sensor_width: u32,
    sensor_height: u32,
    frame_size: u32,
    state: Mutex<CameraState>,
}

impl SimCamera {
    #[must_use]
    pub fn new(scene: Arc<Scene>, calibration: FocusCalibration, config: &Config) -> Self {
        let (width, height) = (config.sensor.width, config.sensor.height);
        Self {
            scene,
            calibration,
            fallback_focus: config.focus.fallback_focus,
            sensor_width: width,
            sensor_height: height,
            frame_size: config.simulation.frame_size,
            state: Mutex::new(CameraState {
                crop: PixelCrop::new(0, 0, width.min(height)),
                lens: config.focus.fallback_focus,
                sequence: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CameraState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current sensor crop
    pub fn crop(&self) -> PixelCrop {
        self.state().crop
    }

    /// Current lens position
    pub fn lens_position(&self) -> f64 {
        self.state().lens
    }

    /// Lens position that would bring `subject` into focus
    #[must_use]
    pub fn true_focus(&self, subject: &Subject) -> f64 {
        self.calibration
            .map_distance(subject.distance_cm)
            .unwrap_or(self.fallback_focus)
    }

    /// Render what the sensor sees through `crop` with the lens at `lens`
    #[must_use]
    pub fn render(&self, subject: &Subject, crop: PixelCrop, lens: f64) -> GrayImage {
        let fs = f64::from(self.frame_size);
        let (w, h) = (f64::from(self.sensor_width), f64::from(self.sensor_height));
        let face = subject.face_data();

        let image = GrayImage::from_fn(self.frame_size, self.frame_size, |px, py| {
            let sx = (f64::from(crop.x) + (f64::from(px) + 0.5) / fs * f64::from(crop.size)) / w;
            let sy = (f64::from(crop.y) + (f64::from(py) + 0.5) / fs * f64::from(crop.size)) / h;
            Luma([shade(Point::new(sx, sy), subject, &face)])
        });

        let sigma = ((lens - self.true_focus(subject)).abs() * 3.0).min(5.0);
        if sigma > 0.05 {
            #[allow(clippy::cast_possible_truncation)] // Bounded above by 5.0
            image::imageops::blur(&image, sigma as f32)
        } else {
            image
        }
    }
}

#[allow(clippy::cast_possible_truncation)] // Stripe indices are small
fn shade(p: Point, subject: &Subject, face: &FaceData) -> u8 {
    let s = subject.face_side;
    let marks = face.landmarks();
    if p.distance(marks[0]) < s * 0.06 || p.distance(marks[1]) < s * 0.06 {
        return 30;
    }
    if (p.x - marks[3].x).abs() < s * 0.15 && (p.y - marks[3].y).abs() < s * 0.03 {
        return 50;
    }
    if p.distance(subject.center) < s / 2.0 {
        return 200;
    }
    if ((p.x * 40.0).floor() as i64 + (p.y * 30.0).floor() as i64) % 2 == 0 {
        110
    } else {
        70
    }
}

impl FrameSource for SimCamera {
    fn latest_frame(&self) -> Result<Option<Frame>> {
        let (crop, lens, sequence) = {
            let mut state = self.state();
            state.sequence += 1;
            (state.crop, state.lens, state.sequence)
        };
        let subject = self.scene.subject_at(self.scene.elapsed_at(Instant::now()));
        Ok(Some(Frame::from_luma(self.render(&subject, crop, lens), sequence)))
    }
}

impl CameraControl for SimCamera {
    fn set_sensor_crop(&self, crop: &PixelCrop) -> Result<()> {
        if !crop.fits(self.sensor_width, self.sensor_height) {
            return Err(Error::HardwareError(format!("Sensor crop {crop:?} out of range")));
        }
        trace!("Sim sensor crop {:?}", crop);
        self.state().crop = *crop;
        Ok(())
    }

    fn set_lens_position(&self, position: f64) -> Result<()> {
        if !position.is_finite() {
            return Err(Error::HardwareError(format!("Invalid lens position {position}")));
        }
        self.state().lens = position;
        Ok(())
    }

    fn sensor_size(&self) -> (u32, u32) {
        (self.sensor_width, self.sensor_height)
    }
}

/// Detector reporting the scene's face with jitter and occasional misses
pub struct SimDetector {
    scene: Arc<Scene>,
    rng: StdRng,
    jitter: f64,
    miss_rate: f64,
}

impl SimDetector {
    #[must_use]
    pub fn new(scene: Arc<Scene>, jitter: f64, miss_rate: f64, seed: u64) -> Self {
        Self {
            scene,
            rng: StdRng::seed_from_u64(seed),
            jitter: jitter.max(0.0),
            miss_rate: miss_rate.clamp(0.0, 1.0),
        }
    }

    fn noise(&mut self) -> f64 {
        if self.jitter > 0.0 {
            self.rng.gen_range(-self.jitter..=self.jitter)
        } else {
            0.0
        }
    }
}

impl FaceDetector for SimDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceData>> {
        if self.rng.gen_bool(self.miss_rate) {
            debug!("Sim detector missed frame {}", frame.sequence());
            return Ok(None);
        }
        let mut subject = self.scene.subject_at(self.scene.elapsed_at(frame.captured_at()));
        subject.center = Point::new(subject.center.x + self.noise(), subject.center.y + self.noise());
        Ok(Some(subject.face_data()))
    }
}

/// Range finder with noise and periodic failed echoes
pub struct SimRangeFinder {
    scene: Arc<Scene>,
    rng: StdRng,
    noise_cm: f64,
    failure_every: u32,
    reads: u32,
}

impl SimRangeFinder {
    #[must_use]
    pub fn new(scene: Arc<Scene>, noise_cm: f64, failure_every: u32, seed: u64) -> Self {
        Self {
            scene,
            rng: StdRng::seed_from_u64(seed),
            noise_cm: noise_cm.max(0.0),
            failure_every,
            reads: 0,
        }
    }
}

impl DistanceSensor for SimRangeFinder {
    fn read_cm(&mut self) -> Result<f64> {
        self.reads = self.reads.wrapping_add(1);
        if self.failure_every > 0 && self.reads % self.failure_every == 0 {
            return Err(Error::SensorError("No echo received".to_string()));
        }
        let subject = self.scene.subject_at(self.scene.elapsed_at(Instant::now()));
        let noise = if self.noise_cm > 0.0 {
            self.rng.gen_range(-self.noise_cm..=self.noise_cm)
        } else {
            0.0
        };
        Ok(subject.distance_cm + noise)
    }
}

/// Assemble a fully simulated rig around `speech`
#[must_use]
pub fn simulated_rig(
    config: &Config,
    calibration: FocusCalibration,
    speech: Result<Box<dyn SpeechRecognizer>>,
) -> (Rig, Arc<SimCamera>) {
    let scene = Arc::new(Scene::new());
    let camera = Arc::new(SimCamera::new(Arc::clone(&scene), calibration, config));
    let sim = &config.simulation;

    let rig = Rig {
        frames: camera.clone(),
        camera: camera.clone(),
        detector: Ok(Box::new(SimDetector::new(
            Arc::clone(&scene),
            sim.detector_jitter,
            sim.detection_miss_rate,
            7,
        ))),
        range: Ok(Box::new(SimRangeFinder::new(
            scene,
            sim.range_noise_cm,
            sim.range_failure_every,
            11,
        ))),
        speech,
    };
    (rig, camera)
}
