//! Main application module wiring the rig to the control core.
//!
//! Six loops run side by side and only ever talk through
//! [`LatestValueSlot`]s:
//!
//! ```text
//! capture ──► frames ──► detection ──► faces ──► crop ──► sensor crop
//!                                                  └────► display crop
//! ranging ──► distance ──► focus ──► lens position
//! voice ──► router ──► scheduler ──► crop.set_zoom / focus.trigger
//! ```

use crate::commands::{CommandRouter, Controllers, VoiceCommand};
use crate::config::Config;
use crate::control_loop::{period_from_hz, ControlLoop, LoopContext};
use crate::crop::{CropController, CropRegion, PixelCrop};
use crate::face::{FaceData, FaceSmoother};
use crate::focus::{DistanceSample, FocusCalibration, FocusController, FocusSweep};
use crate::frame::Frame;
use crate::hardware::{CameraControl, DistanceSensor, FaceDetector, FrameSource, Rig, SpeechRecognizer};
use crate::scheduler::{TaskId, TaskScheduler};
use crate::slot::LatestValueSlot;
use crate::{Error, Result};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Smallest lens move worth writing to the camera
const LENS_EPSILON: f64 = 1e-4;

/// Pause between speech polls
const VOICE_PERIOD: Duration = Duration::from_millis(10);

/// Main application struct
pub struct MirrorApp {
    config: Config,
    frames: Arc<LatestValueSlot<Frame>>,
    faces: Arc<LatestValueSlot<FaceData>>,
    distance: Arc<LatestValueSlot<DistanceSample>>,
    display: Arc<LatestValueSlot<CropRegion>>,
    crop: Arc<CropController>,
    focus: Arc<FocusController>,
    scheduler: Arc<TaskScheduler>,
    router: Arc<CommandRouter>,
    frame_source: Arc<dyn FrameSource>,
    camera: Arc<dyn CameraControl>,
    detector: Option<Result<Box<dyn FaceDetector>>>,
    range: Option<Result<Box<dyn DistanceSensor>>>,
    speech: Option<Result<Box<dyn SpeechRecognizer>>>,
    // Shutdown order
    voice_loop: Option<ControlLoop>,
    detection_loop: Option<ControlLoop>,
    capture_loop: Option<ControlLoop>,
    crop_loop: Option<ControlLoop>,
    ranging_loop: Option<ControlLoop>,
    focus_loop: Option<ControlLoop>,
}

impl MirrorApp {
    /// Build the application around `rig`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn new(config: Config, calibration: FocusCalibration, rig: Rig) -> Result<Self> {
        config.validate()?;
        info!("Initializing smart mirror");

        let (sensor_width, sensor_height) = rig.camera.sensor_size();
        if (sensor_width, sensor_height) != (config.sensor.width, config.sensor.height) {
            warn!(
                "Camera reports a {}x{} sensor, configuration says {}x{}; using the camera's",
                sensor_width, sensor_height, config.sensor.width, config.sensor.height
            );
        }
        let mut sensor = config.sensor.clone();
        sensor.width = sensor_width;
        sensor.height = sensor_height;

        let distance = Arc::new(LatestValueSlot::new());
        let crop = Arc::new(CropController::new(&config.crop, &config.display_crop, &sensor));
        let focus = Arc::new(FocusController::new(calibration, &config.focus, Arc::clone(&distance))?);
        let scheduler = Arc::new(TaskScheduler::new(config.scheduler.clone()));
        let router = Arc::new(CommandRouter::new(
            Arc::clone(&scheduler),
            Arc::new(Controllers {
                crop: Arc::clone(&crop),
                focus: Arc::clone(&focus),
            }),
            config.scheduler.command_priority,
        ));

        Ok(Self {
            config,
            frames: Arc::new(LatestValueSlot::new()),
            faces: Arc::new(LatestValueSlot::new()),
            distance,
            display: Arc::new(LatestValueSlot::new()),
            crop,
            focus,
            scheduler,
            router,
            frame_source: rig.frames,
            camera: rig.camera,
            detector: Some(rig.detector),
            range: Some(rig.range),
            speech: Some(rig.speech),
            voice_loop: None,
            detection_loop: None,
            capture_loop: None,
            crop_loop: None,
            ranging_loop: None,
            focus_loop: None,
        })
    }

    /// Start the scheduler and every available subsystem.
    ///
    /// A subsystem whose collaborator failed to open is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler or a core loop cannot start
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::LoopError("Application already started".to_string()));
        }
        info!("Starting smart mirror");
        self.scheduler.start()?;

        self.capture_loop = Some(self.start_capture()?);
        self.crop_loop = Some(self.start_crop()?);
        self.focus_loop = Some(self.start_focus()?);

        match self.detector.take() {
            Some(Ok(detector)) => self.detection_loop = Some(self.start_detection(detector)?),
            Some(Err(e)) => warn!("Face detection unavailable, crop will not track: {}", e),
            None => {}
        }
        match self.range.take() {
            Some(Ok(range)) => self.ranging_loop = Some(self.start_ranging(range)?),
            Some(Err(e)) => warn!("Distance sensor unavailable, focus stays put: {}", e),
            None => {}
        }
        match self.speech.take() {
            Some(Ok(speech)) => self.voice_loop = Some(self.start_voice(speech)?),
            Some(Err(e)) => warn!("Voice control unavailable: {}", e),
            None => {}
        }

        info!("Smart mirror running");
        Ok(())
    }

    fn start_capture(&self) -> Result<ControlLoop> {
        let source = Arc::clone(&self.frame_source);
        let frames = Arc::clone(&self.frames);

        let mut control = ControlLoop::new("capture", period_from_hz(self.config.loops.capture_hz)?);
        control.start(move |_| {
            if let Some(frame) = source.latest_frame()? {
                frames.publish(frame);
            }
            Ok(())
        })?;
        Ok(control)
    }

    fn start_detection(&self, mut detector: Box<dyn FaceDetector>) -> Result<ControlLoop> {
        let frames = Arc::clone(&self.frames);
        let faces = Arc::clone(&self.faces);
        let min_confidence = self.config.face.min_confidence;
        let mut smoother = FaceSmoother::new(self.config.face.smoothing_alpha);
        let mut last_frame = 0;

        let mut control = ControlLoop::new("detection", period_from_hz(self.config.loops.detection_hz)?);
        control.start(move |_| {
            let sequence = frames.sequence();
            if sequence == last_frame {
                return Ok(());
            }
            last_frame = sequence;
            let Some(frame) = frames.read() else {
                return Ok(());
            };

            match detector.detect(&frame)? {
                Some(face) if face.confidence() >= min_confidence => {
                    faces.publish(smoother.apply(&face));
                }
                Some(face) => debug!("Ignoring face with confidence {:.2}", face.confidence()),
                None => debug!("No face in frame {}", frame.sequence()),
            }
            Ok(())
        })?;
        Ok(control)
    }

    fn start_crop(&self) -> Result<ControlLoop> {
        let faces = Arc::clone(&self.faces);
        let display = Arc::clone(&self.display);
        let crop = Arc::clone(&self.crop);
        let camera = Arc::clone(&self.camera);
        let mut last_face = 0;
        let mut applied: Option<PixelCrop> = None;

        let mut control = ControlLoop::new("crop", period_from_hz(self.config.loops.crop_hz)?);
        control.start(move |_| {
            let sequence = faces.sequence();
            if sequence != last_face {
                last_face = sequence;
                if let Some((face, published_at)) = faces.read_with_age() {
                    crop.update_target_at(&face, published_at);
                }
            }

            let Some(command) = crop.tick() else {
                return Ok(());
            };
            display.publish(command.display);

            // Hardware write happens outside every controller lock
            if applied != Some(command.sensor) {
                camera.set_sensor_crop(&command.sensor)?;
                applied = Some(command.sensor);
            }
            Ok(())
        })?;
        Ok(control)
    }

    fn start_ranging(&self, mut sensor: Box<dyn DistanceSensor>) -> Result<ControlLoop> {
        let distance = Arc::clone(&self.distance);
        let (min_cm, max_cm) = (self.config.focus.min_distance_cm, self.config.focus.max_distance_cm);

        let mut control = ControlLoop::new("ranging", period_from_hz(self.config.loops.ranging_hz)?);
        control.start(move |_| {
            // A failed read leaves the last good sample in place
            let raw = sensor.read_cm()?;
            let sample = DistanceSample::clamped(raw, min_cm, max_cm)
                .ok_or_else(|| Error::SensorError(format!("Invalid range reading {raw}")))?;
            distance.publish(sample);
            Ok(())
        })?;
        Ok(control)
    }

    fn start_focus(&self) -> Result<ControlLoop> {
        let focus = Arc::clone(&self.focus);
        let camera = Arc::clone(&self.camera);
        let frames = Arc::clone(&self.frames);
        let sweep_config = self.config.focus.sweep.clone();
        let sweep = FocusSweep::new(&sweep_config, self.config.focus.min_focus, self.config.focus.max_focus);
        let mut applied: Option<f64> = None;

        let mut control = ControlLoop::new("focus", period_from_hz(self.config.loops.focus_hz)?);
        control.start(move |ctx: &LoopContext| {
            let Some(command) = focus.tick() else {
                return Ok(());
            };

            if command.refocus && sweep_config.enabled {
                let start = command.mapped - sweep_config.search_span;
                let found = sweep.run(
                    start,
                    |position| camera.set_lens_position(position),
                    |settle| ctx.sleep(settle),
                    || frames.read().map_or(0.0, |frame| frame.sharpness()),
                )?;
                if let Some(best) = found {
                    focus.set_trim(best - command.mapped);
                    applied = Some(best);
                }
                return Ok(());
            }

            if applied.map_or(true, |last| (last - command.position).abs() > LENS_EPSILON) {
                camera.set_lens_position(command.position)?;
                debug!("Lens position {:.3}", command.position);
                applied = Some(command.position);
            }
            Ok(())
        })?;
        Ok(control)
    }

    fn start_voice(&self, mut speech: Box<dyn SpeechRecognizer>) -> Result<ControlLoop> {
        let router = Arc::clone(&self.router);
        let poll = Duration::from_millis(self.config.loops.voice_poll_ms.max(1));
        let mut closed = false;

        let mut control = ControlLoop::new("voice", VOICE_PERIOD);
        control.start(move |ctx| {
            if closed {
                ctx.sleep(poll);
                return Ok(());
            }
            match speech.next_utterance(poll) {
                Ok(Some(text)) => {
                    debug!("Heard: {}", text);
                    router.handle(&text);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(Error::SubsystemUnavailable(reason)) => {
                    warn!("Voice control stopped: {}", reason);
                    closed = true;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        })?;
        Ok(control)
    }

    /// Stop every loop, then the scheduler
    pub fn stop(&mut self) {
        let timeout = Duration::from_millis(self.config.loops.join_timeout_ms);
        let loops = [
            &mut self.voice_loop,
            &mut self.detection_loop,
            &mut self.capture_loop,
            &mut self.crop_loop,
            &mut self.ranging_loop,
            &mut self.focus_loop,
        ];
        let mut stopped_any = false;
        for slot in loops {
            if let Some(mut control) = slot.take() {
                stopped_any = true;
                if !control.stop(timeout) {
                    warn!("Loop '{}' left running after shutdown", control.name());
                }
            }
        }
        self.scheduler.stop();
        if stopped_any {
            info!("Smart mirror stopped");
        }
    }

    /// Whether any loop is running
    pub fn is_running(&self) -> bool {
        self.loops().any(ControlLoop::is_running)
    }

    fn loops(&self) -> impl Iterator<Item = &ControlLoop> {
        [
            &self.voice_loop,
            &self.detection_loop,
            &self.capture_loop,
            &self.crop_loop,
            &self.ranging_loop,
            &self.focus_loop,
        ]
        .into_iter()
        .flatten()
    }

    /// Tick counts per running loop
    pub fn loop_ticks(&self) -> Vec<(String, u64)> {
        self.loops().map(|l| (l.name().to_string(), l.ticks())).collect()
    }

    /// Route an utterance as if it had been spoken
    pub fn handle_utterance(&self, text: &str) -> Option<(VoiceCommand, TaskId)> {
        self.router.handle(text)
    }

    /// Latest frame cut down to the display crop; `None` before the first frame
    ///
    /// # Errors
    ///
    /// Returns an error if the crop cannot be applied to the frame
    pub fn display_frame(&self) -> Result<Option<Frame>> {
        let Some(frame) = self.frames.read() else {
            return Ok(None);
        };
        let region = self.display.read().map_or(CropRegion::FULL, |region| *region);
        let pixels = region.to_pixels(frame.width(), frame.height());
        frame.crop(&pixels).map(Some)
    }

    pub fn crop_controller(&self) -> &Arc<CropController> {
        &self.crop
    }

    pub fn focus_controller(&self) -> &Arc<FocusController> {
        &self.focus
    }

    pub fn scheduler(&self) -> &Arc<TaskScheduler> {
        &self.scheduler
    }

    pub fn frames(&self) -> &Arc<LatestValueSlot<Frame>> {
        &self.frames
    }

    pub fn faces(&self) -> &Arc<LatestValueSlot<FaceData>> {
        &self.faces
    }

    pub fn distance(&self) -> &Arc<LatestValueSlot<DistanceSample>> {
        &self.distance
    }

    pub const fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for MirrorApp {
    fn drop(&mut self) {
        self.stop();
    }
}
