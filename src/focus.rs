//! Distance-driven focus control.
//!
//! A range reading is mapped to a lens position through a piecewise-linear
//! calibration curve, smoothed over the last few readings, and offset by a
//! trim found by the optional contrast sweep.

use crate::config::{FocusConfig, SweepConfig};
use crate::filters::{create_filter, ScalarFilter};
use crate::slot::LatestValueSlot;
use crate::{Error, Result};
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// One measured `(distance, lens position)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Subject distance in centimeters
    #[serde(alias = "distance")]
    pub distance_cm: f64,
    /// Lens position in focus at that distance
    #[serde(alias = "focus")]
    pub focus_value: f64,
}

impl CalibrationPoint {
    #[must_use]
    pub const fn new(distance_cm: f64, focus_value: f64) -> Self {
        Self {
            distance_cm,
            focus_value,
        }
    }
}

/// Calibration curve, sorted by distance with unique distances
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocusCalibration {
    points: Vec<CalibrationPoint>,
}

impl FocusCalibration {
    /// Build a curve; points are sorted and a repeated distance keeps the
    /// last point given for it
    ///
    /// # Errors
    ///
    /// Returns an error if any value is not finite
    pub fn new(mut points: Vec<CalibrationPoint>) -> Result<Self> {
        if let Some(bad) = points
            .iter()
            .find(|p| !p.distance_cm.is_finite() || !p.focus_value.is_finite())
        {
            return Err(Error::CalibrationError(format!("Non-finite calibration point {bad:?}")));
        }

        // Stable sort keeps input order among equal distances
        points.sort_by(|a, b| a.distance_cm.total_cmp(&b.distance_cm));
        let mut unique: Vec<CalibrationPoint> = Vec::with_capacity(points.len());
        for point in points {
            match unique.last_mut() {
                Some(last) if last.distance_cm == point.distance_cm => *last = point,
                _ => unique.push(point),
            }
        }

        Ok(Self { points: unique })
    }

    /// Parse a JSON array of points
    pub fn from_json(content: &str) -> Result<Self> {
        let points: Vec<CalibrationPoint> = serde_json::from_str(content)
            .map_err(|e| Error::CalibrationError(format!("Failed to parse calibration: {e}")))?;
        Self::new(points)
    }

    /// Load a calibration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::CalibrationError(format!("Failed to read {}: {e}", path.display())))?;
        let calibration = Self::from_json(&content)?;
        info!("Loaded {} focus calibration points from {}", calibration.len(), path.display());
        Ok(calibration)
    }

    /// Write the calibration file in canonical form
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.points)
            .map_err(|e| Error::CalibrationError(format!("Failed to serialize calibration: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether the curve has enough points to interpolate
    pub fn can_interpolate(&self) -> bool {
        self.points.len() >= 2
    }

    /// Lens position for `distance_cm`.
    ///
    /// Distances outside the curve take the nearest endpoint's value. With
    /// a single point its value is returned. An empty curve or a NaN
    /// distance gives `None`.
    #[must_use]
    pub fn map_distance(&self, distance_cm: f64) -> Option<f64> {
        if distance_cm.is_nan() {
            return None;
        }
        let first = self.points.first()?;
        let last = self.points.last()?;
        if distance_cm <= first.distance_cm {
            return Some(first.focus_value);
        }
        if distance_cm >= last.distance_cm {
            return Some(last.focus_value);
        }

        // first.distance < d < last.distance, so 1 <= upper < len
        let upper = self.points.partition_point(|p| p.distance_cm <= distance_cm);
        let (lo, hi) = (self.points[upper - 1], self.points[upper]);
        let t = (distance_cm - lo.distance_cm) / (hi.distance_cm - lo.distance_cm);
        Some(lo.focus_value + (hi.focus_value - lo.focus_value) * t)
    }
}

/// Range reading clamped to the operating range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceSample {
    centimeters: f64,
}

impl DistanceSample {
    /// Clamp a raw reading into `[min_cm, max_cm]`; `None` for non-finite input
    #[must_use]
    pub fn clamped(raw_cm: f64, min_cm: f64, max_cm: f64) -> Option<Self> {
        raw_cm.is_finite().then(|| Self {
            centimeters: raw_cm.clamp(min_cm, max_cm),
        })
    }

    pub const fn centimeters(&self) -> f64 {
        self.centimeters
    }
}

/// Lens command produced by one focus tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusCommand {
    /// Smoothed, trimmed and clamped lens position
    pub position: f64,
    /// Raw calibration output for the latest distance
    pub mapped: f64,
    /// Set on the first tick after [`FocusController::trigger`]
    pub refocus: bool,
}

struct FocusState {
    filter: Box<dyn ScalarFilter>,
    last_sample: Option<Arc<DistanceSample>>,
    smoothed: Option<f64>,
    trim: f64,
}

/// Maps the latest distance sample to a smoothed lens position
pub struct FocusController {
    calibration: FocusCalibration,
    min_focus: f64,
    max_focus: f64,
    fallback_focus: f64,
    distance: Arc<LatestValueSlot<DistanceSample>>,
    refocus: AtomicBool,
    state: Mutex<FocusState>,
}

impl FocusController {
    /// Create a controller reading from `distance`
    ///
    /// # Errors
    ///
    /// Returns an error if the configured filter cannot be built
    pub fn new(
        calibration: FocusCalibration,
        config: &FocusConfig,
        distance: Arc<LatestValueSlot<DistanceSample>>,
    ) -> Result<Self> {
        if !calibration.can_interpolate() {
            warn!(
                "Focus calibration has {} point(s), using constant focus",
                calibration.len()
            );
        }
        let filter = create_filter(&config.filter, config)?;
        debug!("Focus smoothing with {}", filter.name());

        Ok(Self {
            calibration,
            min_focus: config.min_focus,
            max_focus: config.max_focus,
            fallback_focus: config.fallback_focus,
            distance,
            refocus: AtomicBool::new(false),
            state: Mutex::new(FocusState {
                filter,
                last_sample: None,
                smoothed: None,
                trim: 0.0,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, FocusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub const fn calibration(&self) -> &FocusCalibration {
        &self.calibration
    }

    /// Unsmoothed lens position for `distance_cm`
    #[must_use]
    pub fn map_distance(&self, distance_cm: f64) -> f64 {
        self.calibration
            .map_distance(distance_cm)
            .unwrap_or(self.fallback_focus)
    }

    /// Clamp into the lens range
    #[must_use]
    pub fn clamp_focus(&self, position: f64) -> f64 {
        position.clamp(self.min_focus, self.max_focus)
    }

    /// Request a refocus on the next tick
    pub fn trigger(&self) {
        info!("Refocus requested");
        self.refocus.store(true, Ordering::Release);
    }

    /// Whether a refocus is waiting for the next tick
    pub fn is_refocus_pending(&self) -> bool {
        self.refocus.load(Ordering::Acquire)
    }

    /// Offset added to every output until the next refocus
    pub fn trim(&self) -> f64 {
        self.state().trim
    }

    /// Set the output offset, usually from a contrast sweep
    pub fn set_trim(&self, trim: f64) {
        let trim = if trim.is_finite() { trim } else { 0.0 };
        debug!("Focus trim set to {:+.3}", trim);
        self.state().trim = trim;
    }

    /// Compute the lens command for the latest distance sample.
    ///
    /// `None` until a first sample has arrived. A pending refocus clears
    /// the smoothing history and the trim before the sample is applied.
    pub fn tick(&self) -> Option<FocusCommand> {
        let sample = self.distance.read()?;
        let refocus = self.refocus.swap(false, Ordering::AcqRel);

        let mut state = self.state();
        if refocus {
            state.filter.reset();
            state.trim = 0.0;
            state.smoothed = None;
            state.last_sample = None;
        }

        let mapped = self.map_distance(sample.centimeters());
        let is_new = !state
            .last_sample
            .as_ref()
            .is_some_and(|last| Arc::ptr_eq(last, &sample));
        if is_new {
            let filtered = state.filter.apply(mapped);
            state.smoothed = Some(filtered);
        }
        let smoothed = state.smoothed.unwrap_or(mapped);
        let position = self.clamp_focus(smoothed + state.trim);

        trace!(
            "Focus tick: {:.1} cm -> mapped {:.3}, lens {:.3}",
            sample.centimeters(),
            mapped,
            position
        );
        state.last_sample = Some(sample);
        Some(FocusCommand {
            position,
            mapped,
            refocus,
        })
    }
}

/// Contrast-maximising lens search
pub struct FocusSweep {
    config: SweepConfig,
    min_focus: f64,
    max_focus: f64,
}

impl FocusSweep {
    #[must_use]
    pub fn new(config: &SweepConfig, min_focus: f64, max_focus: f64) -> Self {
        Self {
            config: config.clone(),
            min_focus,
            max_focus,
        }
    }

    /// Search for the sharpest lens position, starting at `start`.
    ///
    /// Coarse steps move forward until the score drops `max_drops` times
    /// in a row, then fine steps walk back over `fine_range` below the
    /// best coarse position. `set_lens` moves the lens, `wait` lets it
    /// settle and returns `false` to abort, `score` rates the current
    /// image (higher is sharper).
    ///
    /// Returns `Ok(None)` if aborted. The lens is left at the best position.
    pub fn run<L, W, S>(&self, start: f64, mut set_lens: L, mut wait: W, mut score: S) -> Result<Option<f64>>
    where
        L: FnMut(f64) -> Result<()>,
        W: FnMut(Duration) -> bool,
        S: FnMut() -> f64,
    {
        let coarse_wait = Duration::from_millis(self.config.coarse_settle_ms);
        let fine_wait = Duration::from_millis(self.config.fine_settle_ms);

        let mut measure = |position: f64, settle: Duration| -> Result<Option<f64>> {
            set_lens(position)?;
            if !wait(settle) {
                return Ok(None);
            }
            Ok(Some(score()))
        };

        let start = start.clamp(self.min_focus, self.max_focus);
        let Some(mut best_score) = measure(start, coarse_wait)? else {
            return Ok(None);
        };
        let mut best = start;
        debug!("Sweep start {:.2}: score {:.1}", start, best_score);

        // Coarse, forward
        let mut drops = 0;
        for position in steps(start, self.max_focus, self.config.coarse_step).skip(1) {
            let Some(value) = measure(position, coarse_wait)? else {
                return Ok(None);
            };
            trace!("Sweep coarse {:.2}: score {:.1}", position, value);
            if value > best_score {
                best_score = value;
                best = position;
                drops = 0;
            } else {
                drops += 1;
                if drops >= self.config.max_drops {
                    break;
                }
            }
        }

        // Fine, backward
        let fine_max = (best + self.config.coarse_step).min(self.max_focus);
        let fine_min = (best - self.config.fine_range).max(self.min_focus);
        for position in steps_down(fine_max, fine_min, self.config.fine_step) {
            let Some(value) = measure(position, fine_wait)? else {
                return Ok(None);
            };
            trace!("Sweep fine {:.2}: score {:.1}", position, value);
            if value > best_score {
                best_score = value;
                best = position;
            }
        }

        info!("Best focus {:.2} (score {:.1})", best, best_score);
        set_lens(best)?;
        Ok(Some(best))
    }
}

// Positions from `from` up to `to` inclusive, computed by index to avoid drift
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn steps(from: f64, to: f64, step: f64) -> impl Iterator<Item = f64> {
    let count = if step > 0.0 && to >= from {
        ((to - from) / step + 1e-9).floor() as usize + 1
    } else {
        1
    };
    (0..count).map(move |i| from + step * i as f64)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn steps_down(from: f64, to: f64, step: f64) -> impl Iterator<Item = f64> {
    let count = if step > 0.0 && from >= to {
        ((from - to) / step + 1e-9).floor() as usize + 1
    } else {
        1
    };
    (0..count).map(move |i| from - step * i as f64)
}
