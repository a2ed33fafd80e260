//! Smart mirror camera control library.
//!
//! Keeps a moving subject's face centered and zoomed in a live video feed
//! and keeps the lens focused from a range finder, while voice commands
//! switch the framing:
//! - [`crop::CropController`] turns face detections into a smoothed hardware
//!   sensor crop plus a tighter software display crop
//! - [`focus::FocusController`] maps range readings to lens positions through
//!   a calibration curve and a weighted history filter
//! - [`commands::CommandRouter`] turns recognised speech into zoom and focus
//!   commands executed on the [`scheduler::TaskScheduler`]
//!
//! Independently clocked loops ([`control_loop::ControlLoop`]) exchange data
//! only through [`slot::LatestValueSlot`]s, so a slow consumer never stalls
//! a fast producer.
//!
//! # Examples
//!
//! ## Crop control
//!
//! ```
//! use smart_mirror::config::Config;
//! use smart_mirror::crop::CropController;
//! use smart_mirror::face::{BoundingBox, FaceData, Point};
//!
//! let config = Config::default();
//! let crop = CropController::new(&config.crop, &config.display_crop, &config.sensor);
//!
//! let face = FaceData::new(
//!     BoundingBox::new(0.4, 0.4, 0.2, 0.2),
//!     [
//!         Point::new(0.45, 0.45),
//!         Point::new(0.55, 0.45),
//!         Point::new(0.5, 0.5),
//!         Point::new(0.5, 0.55),
//!     ],
//!     0.9,
//! );
//! crop.update_target(&face);
//!
//! let command = crop.tick().expect("target set");
//! assert!(command.sensor.fits(config.sensor.width, config.sensor.height));
//! ```
//!
//! ## Focus mapping
//!
//! ```
//! use smart_mirror::config::FocusConfig;
//! use smart_mirror::focus::{CalibrationPoint, DistanceSample, FocusCalibration, FocusController};
//! use smart_mirror::slot::LatestValueSlot;
//! use std::sync::Arc;
//!
//! # fn main() -> smart_mirror::Result<()> {
//! let calibration = FocusCalibration::new(vec![
//!     CalibrationPoint::new(30.0, 11.0),
//!     CalibrationPoint::new(90.0, 9.5),
//! ])?;
//! let distance = Arc::new(LatestValueSlot::new());
//! let focus = FocusController::new(calibration, &FocusConfig::default(), Arc::clone(&distance))?;
//!
//! assert!(focus.tick().is_none());
//! distance.publish(DistanceSample::clamped(60.0, 30.0, 90.0).expect("finite"));
//! let lens = focus.tick().expect("sample published").position;
//! assert!((lens - 10.25).abs() < 1e-9);
//! # Ok(())
//! # }
//! ```
//!
//! ## Voice commands
//!
//! ```
//! use smart_mirror::commands::{parse, VoiceCommand};
//! use smart_mirror::zoom::ZoomLevel;
//!
//! assert_eq!(parse("Show my eyes"), Some(VoiceCommand::Zoom(ZoomLevel::Eyes)));
//! assert_eq!(parse("good morning"), None);
//! ```

/// Single-value hand-off cell shared between loops
pub mod slot;

/// Priority task scheduler with a fixed worker pool
pub mod scheduler;

/// Fixed-rate loop threads with start/stop lifecycle
pub mod control_loop;

/// Face observations and their smoothing
pub mod face;

/// Zoom levels and crop ratios
pub mod zoom;

/// Face-tracking hardware and display crop control
pub mod crop;

/// Distance-driven focus control and contrast sweep
pub mod focus;

/// Scalar smoothing filters for lens commands
pub mod filters;

/// Voice command parsing and routing
pub mod commands;

/// Captured frames
pub mod frame;

/// Hardware collaborator interfaces
pub mod hardware;

/// Simulated camera, detector, range finder
pub mod simulation;

/// Utility functions for crop geometry
pub mod utils;

/// Error types and result handling
pub mod error;

/// Main application module
pub mod app;

/// Constants used throughout the application
pub mod constants;

/// Configuration management
pub mod config;

pub use error::{Error, Result};
