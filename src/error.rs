//! Error types for the smart mirror control library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image processing operation failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unknown filter name or invalid filter parameters
    #[error("Filter error: {0}")]
    FilterError(String),

    /// Focus calibration file missing, unreadable or malformed
    #[error("Calibration error: {0}")]
    CalibrationError(String),

    /// Camera control write (sensor crop, lens position) failed
    #[error("Hardware error: {0}")]
    HardwareError(String),

    /// Distance sensor read failed
    #[error("Sensor error: {0}")]
    SensorError(String),

    /// Face detector failed on a frame
    #[error("Detection error: {0}")]
    DetectionError(String),

    /// Task scheduler rejected or failed a task
    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    /// Control loop could not be started or stopped
    #[error("Control loop error: {0}")]
    LoopError(String),

    /// A subsystem could not start (missing model, device, ...)
    #[error("Subsystem unavailable: {0}")]
    SubsystemUnavailable(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
