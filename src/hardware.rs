//! Interfaces to the camera, detector, range finder and speech recogniser.
//!
//! The control core only talks to hardware through these traits. Real
//! backends live outside this crate; [`crate::simulation`] provides a
//! software rig implementing all of them.

use crate::crop::PixelCrop;
use crate::face::FaceData;
use crate::frame::Frame;
use crate::{Error, Result};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

/// Source of captured frames
pub trait FrameSource: Send + Sync {
    /// Newest frame, without blocking. `Ok(None)` when nothing new is ready.
    fn latest_frame(&self) -> Result<Option<Frame>>;
}

/// Camera controls written by the crop and focus loops
pub trait CameraControl: Send + Sync {
    /// Restrict the sensor readout to a square region
    fn set_sensor_crop(&self, crop: &PixelCrop) -> Result<()>;

    /// Move the lens; callers clamp to the configured focus range
    fn set_lens_position(&self, position: f64) -> Result<()>;

    /// Full sensor size in pixels
    fn sensor_size(&self) -> (u32, u32);
}

/// Face detection model
pub trait FaceDetector: Send {
    /// Detect the most prominent face, in full-sensor normalized coordinates
    fn detect(&mut self, frame: &Frame) -> Result<Option<FaceData>>;
}

/// Range finder pointed at the subject
pub trait DistanceSensor: Send {
    /// One reading in centimeters; errors are transient
    fn read_cm(&mut self) -> Result<f64>;
}

/// Speech recogniser yielding final utterances
pub trait SpeechRecognizer: Send {
    /// Wait up to `timeout` for the next utterance
    fn next_utterance(&mut self, timeout: Duration) -> Result<Option<String>>;
}

/// Recogniser fed through a channel, e.g. by a stdin reader or a test
pub struct ChannelRecognizer {
    rx: Receiver<String>,
}

impl ChannelRecognizer {
    /// Create a recogniser and the sender feeding it
    #[must_use]
    pub fn channel() -> (Sender<String>, Self) {
        let (tx, rx) = unbounded();
        (tx, Self { rx })
    }
}

impl SpeechRecognizer for ChannelRecognizer {
    fn next_utterance(&mut self, timeout: Duration) -> Result<Option<String>> {
        match self.rx.recv_timeout(timeout) {
            Ok(text) => Ok(Some(text)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::SubsystemUnavailable("Speech input closed".to_string()))
            }
        }
    }
}

/// Collaborators handed to [`crate::app::MirrorApp`].
///
/// Optional subsystems carry their startup error; the application logs it
/// and runs without that subsystem.
pub struct Rig {
    pub frames: Arc<dyn FrameSource>,
    pub camera: Arc<dyn CameraControl>,
    pub detector: Result<Box<dyn FaceDetector>>,
    pub range: Result<Box<dyn DistanceSensor>>,
    pub speech: Result<Box<dyn SpeechRecognizer>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_recognizer() {
        let (tx, mut recognizer) = ChannelRecognizer::channel();
        tx.send("zoom out".to_string()).unwrap();
        assert_eq!(
            recognizer.next_utterance(Duration::from_millis(10)).unwrap().as_deref(),
            Some("zoom out")
        );
        assert_eq!(recognizer.next_utterance(Duration::from_millis(10)).unwrap(), None);

        drop(tx);
        assert!(recognizer.next_utterance(Duration::from_millis(10)).is_err());
    }
}
