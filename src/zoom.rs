//! Zoom levels selectable by voice and their crop-size ratios.

use crate::constants::{LANDMARK_LEFT_EYE, LANDMARK_MOUTH, LANDMARK_NOSE, LANDMARK_RIGHT_EYE};
use crate::face::{FaceData, Point};
use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Region of the face the crop is framed around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomLevel {
    /// Face plus surroundings
    Wide,
    /// Whole face
    Face,
    /// Eye region
    Eyes,
    /// Mouth region
    Lips,
}

impl ZoomLevel {
    /// Every zoom level
    pub const ALL: [Self; 4] = [Self::Wide, Self::Face, Self::Eyes, Self::Lips];

    /// Lower-case name
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wide => "wide",
            Self::Face => "face",
            Self::Eyes => "eyes",
            Self::Lips => "lips",
        }
    }

    /// Point the crop is centered on for this level
    pub fn anchor(self, face: &FaceData) -> Point {
        let marks = face.landmarks();
        match self {
            Self::Eyes => marks[LANDMARK_LEFT_EYE].midpoint(marks[LANDMARK_RIGHT_EYE]),
            Self::Lips => marks[LANDMARK_MOUTH],
            Self::Face | Self::Wide => marks[LANDMARK_NOSE],
        }
    }
}

impl Default for ZoomLevel {
    fn default() -> Self {
        Self::Face
    }
}

impl fmt::Display for ZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoomLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wide" | "zoom_out" | "out" => Ok(Self::Wide),
            "face" => Ok(Self::Face),
            "eyes" | "eye" => Ok(Self::Eyes),
            "lips" | "mouth" => Ok(Self::Lips),
            other => Err(Error::InvalidInput(format!("Unknown zoom level: {other}"))),
        }
    }
}

/// Crop edge as a multiple of the face size, per zoom level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRatios {
    /// Ratio for [`ZoomLevel::Wide`]
    pub wide: f64,
    /// Ratio for [`ZoomLevel::Face`]
    pub face: f64,
    /// Ratio for [`ZoomLevel::Eyes`]
    pub eyes: f64,
    /// Ratio for [`ZoomLevel::Lips`]
    pub lips: f64,
}

impl ZoomRatios {
    /// Ratios for the hardware sensor crop
    pub const HARDWARE: Self = Self {
        wide: 2.0,
        face: 1.2,
        eyes: 1.5,
        lips: 1.5,
    };

    /// Tighter ratios for the display crop inside the hardware crop
    pub const DISPLAY: Self = Self {
        wide: 1.6,
        face: 1.0,
        eyes: 0.4,
        lips: 0.6,
    };

    /// Ratio for `level`
    pub const fn ratio(&self, level: ZoomLevel) -> f64 {
        match level {
            ZoomLevel::Wide => self.wide,
            ZoomLevel::Face => self.face,
            ZoomLevel::Eyes => self.eyes,
            ZoomLevel::Lips => self.lips,
        }
    }

    /// Whether every ratio is finite and positive
    pub fn is_valid(&self) -> bool {
        ZoomLevel::ALL
            .iter()
            .map(|&level| self.ratio(level))
            .all(|r| r.is_finite() && r > 0.0)
    }
}

impl Default for ZoomRatios {
    fn default() -> Self {
        Self::HARDWARE
    }
}
