//! Face-tracking crop control.
//!
//! The controller turns the latest [`FaceData`] into two square crops:
//!
//! - a **hardware** crop in full-sensor normalized coordinates, converted
//!   to sensor pixels and written to the camera's scaler;
//! - a tighter **display** crop, relative to the hardware crop (i.e. to the
//!   captured frame), applied in software at display time.
//!
//! Both follow their targets through a dead-zone-gated exponential
//! smoother. Target movement smaller than the dead zone is ignored, which
//! keeps detector jitter from turning into visible micro-oscillation.
//! A zoom change drops the smoothed state so the next tick snaps straight
//! to the new framing.

use crate::config::{CropConfig, DisplayCropConfig, SensorConfig};
use crate::constants::MIN_CROP_SIZE;
use crate::face::{FaceData, Point};
use crate::utils::fit_unit_square;
use crate::utils::safe_cast::f64_to_u32_clamp;
use crate::zoom::{ZoomLevel, ZoomRatios};
use log::{debug, info, trace};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Square region in normalized coordinates.
///
/// `x` is measured against the image width and `y` against its height.
/// `size` is measured against the shorter side, so on a non-square image
/// the square covers `size * short / width` of the width. Hardware targets
/// are not fitted here; [`to_pixels`](Self::to_pixels) clamps them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Edge length
    pub size: f64,
}

impl CropRegion {
    /// Create a region without clamping
    #[must_use]
    pub const fn new(x: f64, y: f64, size: f64) -> Self {
        Self { x, y, size }
    }

    /// Full frame
    pub const FULL: Self = Self::new(0.0, 0.0, 1.0);

    /// Square of `size` centered on `center`; only the size is clamped
    #[must_use]
    pub fn centered(center: Point, size: f64) -> Self {
        let size = if size.is_finite() { size.clamp(MIN_CROP_SIZE, 1.0) } else { 1.0 };
        Self::new(center.x - size / 2.0, center.y - size / 2.0, size)
    }

    /// Center of the region
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.x + self.size / 2.0, self.y + self.size / 2.0)
    }

    /// Whether the region lies inside the unit square
    #[must_use]
    pub fn is_within_unit(&self) -> bool {
        const TOLERANCE: f64 = 1e-9;
        self.size > 0.0
            && self.x >= -TOLERANCE
            && self.y >= -TOLERANCE
            && self.x + self.size <= 1.0 + TOLERANCE
            && self.y + self.size <= 1.0 + TOLERANCE
    }

    /// Express `self`, normalized to a `width` x `height` image, relative
    /// to the pixel crop `outer` of that image, fitted inside it
    #[must_use]
    pub fn within(&self, outer: &PixelCrop, width: u32, height: u32) -> Self {
        let short_side = f64::from(width.min(height).max(1));
        let scale = f64::from(outer.size.max(1));
        let center = self.center();
        let size = self.size * short_side;
        let (x, y, size) = fit_unit_square(
            (center.x * f64::from(width) - size / 2.0 - f64::from(outer.x)) / scale,
            (center.y * f64::from(height) - size / 2.0 - f64::from(outer.y)) / scale,
            size / scale,
            MIN_CROP_SIZE,
        );
        Self::new(x, y, size)
    }

    /// Convert to pixels of a `width` x `height` image.
    ///
    /// The square edge is measured against the smaller image dimension and
    /// the result is clamped so it never leaves the image.
    #[must_use]
    pub fn to_pixels(&self, width: u32, height: u32) -> PixelCrop {
        let short_side = width.min(height).max(1);
        let size = f64_to_u32_clamp(self.size * f64::from(short_side), 1, short_side);
        let center = self.center();
        let half = f64::from(size) / 2.0;
        let x = f64_to_u32_clamp(center.x * f64::from(width) - half, 0, width.saturating_sub(size));
        let y = f64_to_u32_clamp(center.y * f64::from(height) - half, 0, height.saturating_sub(size));
        PixelCrop { x, y, size }
    }
}

/// Square region in absolute pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelCrop {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Edge length
    pub size: u32,
}

impl PixelCrop {
    /// Create a pixel crop
    #[must_use]
    pub const fn new(x: u32, y: u32, size: u32) -> Self {
        Self { x, y, size }
    }

    /// One past the right edge
    #[must_use]
    pub const fn right(&self) -> u32 {
        self.x.saturating_add(self.size)
    }

    /// One past the bottom edge
    #[must_use]
    pub const fn bottom(&self) -> u32 {
        self.y.saturating_add(self.size)
    }

    /// Whether the crop lies inside a `width` x `height` image
    #[must_use]
    pub const fn fits(&self, width: u32, height: u32) -> bool {
        self.size > 0 && self.right() <= width && self.bottom() <= height
    }
}

/// Output of one crop tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropCommand {
    /// Smoothed hardware crop, sensor-normalized
    pub region: CropRegion,
    /// Hardware crop in sensor pixels
    pub sensor: PixelCrop,
    /// Software crop relative to the captured frame
    pub display: CropRegion,
}

/// Dead-zone-gated exponential smoother for a square crop
#[derive(Debug, Clone)]
pub struct CropSmoother {
    smoothing_factor: f64,
    threshold_ratio: f64,
    current: Option<CropRegion>,
}

impl CropSmoother {
    /// Create a smoother.
    ///
    /// `smoothing_factor` is the fraction of the remaining distance covered
    /// per step; `threshold_ratio` is the dead-zone radius as a fraction of
    /// the current crop size.
    #[must_use]
    pub fn new(smoothing_factor: f64, threshold_ratio: f64) -> Self {
        assert!(
            smoothing_factor > 0.0 && smoothing_factor <= 1.0,
            "Smoothing factor must be in (0, 1]"
        );
        Self {
            smoothing_factor,
            threshold_ratio: threshold_ratio.max(0.0),
            current: None,
        }
    }

    /// Current smoothed crop
    pub const fn current(&self) -> Option<CropRegion> {
        self.current
    }

    /// Drop the smoothed crop so the next step snaps to its target
    pub fn reset(&mut self) {
        self.current = None;
    }

    /// Whether `target` lies inside the dead zone around the current crop
    #[must_use]
    pub fn in_dead_zone(&self, target: &CropRegion) -> bool {
        self.current.is_some_and(|current| {
            current.center().distance(target.center()) <= self.threshold_ratio * current.size
        })
    }

    /// Advance one step toward `target` and return the new crop
    pub fn step(&mut self, target: &CropRegion) -> CropRegion {
        let next = match self.current {
            None => *target,
            Some(current) if self.in_dead_zone(target) => current,
            Some(current) => {
                let k = self.smoothing_factor;
                CropRegion::new(
                    current.x + (target.x - current.x) * k,
                    current.y + (target.y - current.y) * k,
                    current.size + (target.size - current.size) * k,
                )
            }
        };
        self.current = Some(next);
        next
    }
}

struct CropState {
    zoom: ZoomLevel,
    face: Option<FaceData>,
    target: Option<CropRegion>,
    display_target: Option<CropRegion>,
    hardware: CropSmoother,
    display: CropSmoother,
    last_update: Option<Instant>,
    tracking_lost: bool,
}

/// Computes and smooths the hardware and display crops
pub struct CropController {
    hardware_ratios: ZoomRatios,
    display_ratios: ZoomRatios,
    validity: Duration,
    sensor_width: u32,
    sensor_height: u32,
    state: Mutex<CropState>,
}

impl CropController {
    /// Create a controller for a sensor of the given size
    #[must_use]
    pub fn new(crop: &CropConfig, display: &DisplayCropConfig, sensor: &SensorConfig) -> Self {
        Self {
            hardware_ratios: crop.zoom_ratios,
            display_ratios: display.zoom_ratios,
            validity: Duration::from_millis(crop.face_validity_ms),
            sensor_width: sensor.width.max(1),
            sensor_height: sensor.height.max(1),
            state: Mutex::new(CropState {
                zoom: ZoomLevel::default(),
                face: None,
                target: None,
                display_target: None,
                hardware: CropSmoother::new(crop.smoothing_factor, crop.movement_threshold_ratio),
                display: CropSmoother::new(display.smoothing_factor, display.movement_threshold_ratio),
                last_update: None,
                tracking_lost: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CropState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current zoom level
    pub fn zoom_level(&self) -> ZoomLevel {
        self.state().zoom
    }

    /// Switch zoom level; the next tick snaps to the new framing
    pub fn set_zoom(&self, level: ZoomLevel) {
        let mut state = self.state();
        if state.zoom != level {
            info!("Zoom level changed: {} -> {}", state.zoom, level);
        }
        state.zoom = level;
        state.hardware.reset();
        state.display.reset();
        if let Some(face) = state.face.clone() {
            self.retarget(&mut state, &face);
        }
    }

    /// Recompute the crop targets from a new face observation
    pub fn update_target(&self, face: &FaceData) {
        self.update_target_at(face, Instant::now());
    }

    /// [`update_target`](Self::update_target) with an explicit clock
    pub fn update_target_at(&self, face: &FaceData, now: Instant) {
        let mut state = self.state();
        self.retarget(&mut state, face);
        state.face = Some(face.clone());
        state.last_update = Some(now);
    }

    fn retarget(&self, state: &mut CropState, face: &FaceData) {
        let anchor = state.zoom.anchor(face);
        let face_size = face.bbox().max_side();

        let target = CropRegion::centered(anchor, face_size * self.hardware_ratios.ratio(state.zoom));
        // Display target stays in sensor space until the hardware crop is known
        let display_size = face_size * self.display_ratios.ratio(state.zoom);
        let display_target = CropRegion::new(
            anchor.x - display_size / 2.0,
            anchor.y - display_size / 2.0,
            display_size,
        );

        trace!("Crop target {:?} (zoom {})", target, state.zoom);
        state.target = Some(target);
        state.display_target = Some(display_target);
    }

    /// Advance the smoothed crops one step
    pub fn tick(&self) -> Option<CropCommand> {
        self.tick_at(Instant::now())
    }

    /// [`tick`](Self::tick) with an explicit clock.
    ///
    /// Returns `None` until a first target exists. When no target arrived
    /// within the validity window the last crop is held unchanged.
    pub fn tick_at(&self, now: Instant) -> Option<CropCommand> {
        let mut state = self.state();
        let target = state.target?;

        let stale = state
            .last_update
            .map_or(true, |at| now.saturating_duration_since(at) > self.validity);

        if stale && !state.tracking_lost {
            info!("Tracking lost, holding last crop");
            state.tracking_lost = true;
        } else if !stale && state.tracking_lost {
            info!("Tracking regained");
            state.tracking_lost = false;
        }

        let region = match (stale, state.hardware.current()) {
            (true, Some(current)) => current,
            _ => state.hardware.step(&target),
        };

        let sensor = region.to_pixels(self.sensor_width, self.sensor_height);

        // The captured frame is the clamped sensor crop
        let display_target = state.display_target.map_or(CropRegion::FULL, |display| {
            display.within(&sensor, self.sensor_width, self.sensor_height)
        });
        let display = match (stale, state.display.current()) {
            (true, Some(current)) => current,
            _ => state.display.step(&display_target),
        };

        debug!("Crop tick: sensor {:?}, display {:?}", sensor, display);

        Some(CropCommand {
            region,
            sensor,
            display,
        })
    }

    /// Current smoothed hardware crop
    pub fn current_crop(&self) -> Option<CropRegion> {
        self.state().hardware.current()
    }

    /// Latest hardware target
    pub fn target_crop(&self) -> Option<CropRegion> {
        self.state().target
    }

    /// Current smoothed display crop
    pub fn display_crop(&self) -> Option<CropRegion> {
        self.state().display.current()
    }

    /// Whether the last tick saw a fresh face
    pub fn is_tracking(&self) -> bool {
        let state = self.state();
        state.target.is_some() && !state.tracking_lost
    }

    /// Sensor size in pixels
    pub const fn sensor_size(&self) -> (u32, u32) {
        (self.sensor_width, self.sensor_height)
    }
}
