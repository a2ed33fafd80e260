//! Face observations in normalized frame coordinates and their smoothing.

use crate::constants::NUM_FACE_LANDMARKS;
use log::trace;

/// Point in normalized [0, 1] frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

impl Point {
    /// Create a point
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Point halfway between `self` and `other`
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    /// Euclidean distance to `other`
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    fn clamped(self) -> Self {
        Self::new(clamp_unit(self.x), clamp_unit(self.y))
    }
}

/// Face bounding box `(xmin, ymin, width, height)`, normalized
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingBox {
    /// Left edge
    pub xmin: f64,
    /// Top edge
    pub ymin: f64,
    /// Box width
    pub width: f64,
    /// Box height
    pub height: f64,
}

impl BoundingBox {
    /// Create a bounding box
    #[must_use]
    pub const fn new(xmin: f64, ymin: f64, width: f64, height: f64) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
        }
    }

    /// Center of the box
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(self.xmin + self.width / 2.0, self.ymin + self.height / 2.0)
    }

    /// Larger of width and height
    #[must_use]
    pub fn max_side(&self) -> f64 {
        self.width.max(self.height)
    }

    fn clamped(self) -> Self {
        Self::new(
            clamp_unit(self.xmin),
            clamp_unit(self.ymin),
            clamp_unit(self.width),
            clamp_unit(self.height),
        )
    }
}

/// Landmarks in detector order: left eye, right eye, nose, mouth
pub type Landmarks = [Point; NUM_FACE_LANDMARKS];

/// One face observation
#[derive(Debug, Clone, PartialEq)]
pub struct FaceData {
    bbox: BoundingBox,
    landmarks: Landmarks,
    confidence: f64,
}

impl FaceData {
    /// Create a face observation; every coordinate and the confidence are clamped to [0, 1]
    #[must_use]
    pub fn new(bbox: BoundingBox, landmarks: Landmarks, confidence: f64) -> Self {
        Self {
            bbox: bbox.clamped(),
            landmarks: landmarks.map(Point::clamped),
            confidence: clamp_unit(confidence),
        }
    }

    /// Build from a landmark slice, which must hold exactly four points
    pub fn from_slice(bbox: BoundingBox, landmarks: &[Point], confidence: f64) -> crate::Result<Self> {
        let landmarks: Landmarks = landmarks.try_into().map_err(|_| {
            crate::Error::InvalidInput(format!(
                "Expected {NUM_FACE_LANDMARKS} landmarks, got {}",
                landmarks.len()
            ))
        })?;
        Ok(Self::new(bbox, landmarks, confidence))
    }

    /// Bounding box
    pub const fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }

    /// Landmarks
    pub const fn landmarks(&self) -> &Landmarks {
        &self.landmarks
    }

    /// Detector confidence
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// Exponential smoother applied to detections before they are published
pub struct FaceSmoother {
    alpha: f64,
    current: Option<FaceData>,
}

impl FaceSmoother {
    /// Create a smoother; `alpha` is the weight of the newest detection
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        assert!(alpha > 0.0 && alpha <= 1.0, "Alpha must be in (0, 1]");
        Self { alpha, current: None }
    }

    /// Blend `new` into the running estimate and return the result
    pub fn apply(&mut self, new: &FaceData) -> FaceData {
        let blended = match &self.current {
            None => new.clone(),
            Some(current) => {
                let a = self.alpha;
                let mix = |n: f64, c: f64| a * n + (1.0 - a) * c;
                let bbox = BoundingBox::new(
                    mix(new.bbox.xmin, current.bbox.xmin),
                    mix(new.bbox.ymin, current.bbox.ymin),
                    mix(new.bbox.width, current.bbox.width),
                    mix(new.bbox.height, current.bbox.height),
                );
                let mut landmarks = current.landmarks;
                for (smoothed, fresh) in landmarks.iter_mut().zip(new.landmarks.iter()) {
                    *smoothed = Point::new(mix(fresh.x, smoothed.x), mix(fresh.y, smoothed.y));
                }
                FaceData::new(bbox, landmarks, new.confidence)
            }
        };

        trace!("Smoothed face center {:?}", blended.bbox.center());
        self.current = Some(blended.clone());
        blended
    }

    /// Current estimate
    pub const fn current(&self) -> Option<&FaceData> {
        self.current.as_ref()
    }

    /// Forget the running estimate
    pub fn reset(&mut self) {
        self.current = None;
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
