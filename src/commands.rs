//! Voice command parsing and dispatch.

use crate::crop::CropController;
use crate::focus::FocusController;
use crate::scheduler::{TaskId, TaskScheduler};
use crate::zoom::ZoomLevel;
use log::{debug, info};
use std::fmt;
use std::sync::Arc;

/// Action requested by voice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    /// Switch the framing
    Zoom(ZoomLevel),
    /// Re-run focus
    Focus,
}

impl fmt::Display for VoiceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zoom(level) => write!(f, "zoom {level}"),
            Self::Focus => f.write_str("focus"),
        }
    }
}

/// Keyword bindings, checked in order; the first keyword found wins
pub const KEYWORD_BINDINGS: [(&str, VoiceCommand); 5] = [
    ("eye", VoiceCommand::Zoom(ZoomLevel::Eyes)),
    ("lips", VoiceCommand::Zoom(ZoomLevel::Lips)),
    ("face", VoiceCommand::Zoom(ZoomLevel::Face)),
    ("zoom out", VoiceCommand::Zoom(ZoomLevel::Wide)),
    ("focus", VoiceCommand::Focus),
];

/// Find the command in a recognised utterance
#[must_use]
pub fn parse(text: &str) -> Option<VoiceCommand> {
    let text = text.to_lowercase();
    KEYWORD_BINDINGS
        .iter()
        .find(|(keyword, _)| text.contains(keyword))
        .map(|&(_, command)| command)
}

/// Something that carries out voice commands
pub trait CommandHandler: Send + Sync {
    fn execute(&self, command: VoiceCommand);
}

/// Applies commands to the crop and focus controllers
pub struct Controllers {
    pub crop: Arc<CropController>,
    pub focus: Arc<FocusController>,
}

impl CommandHandler for Controllers {
    fn execute(&self, command: VoiceCommand) {
        match command {
            VoiceCommand::Zoom(level) => self.crop.set_zoom(level),
            VoiceCommand::Focus => self.focus.trigger(),
        }
    }
}

/// Routes recognised text to a [`CommandHandler`] through the scheduler
pub struct CommandRouter {
    scheduler: Arc<TaskScheduler>,
    handler: Arc<dyn CommandHandler>,
    priority: i32,
}

impl CommandRouter {
    /// Create a router submitting at `priority`, which should be less urgent
    /// than any real-time work sharing the scheduler
    pub fn new(scheduler: Arc<TaskScheduler>, handler: Arc<dyn CommandHandler>, priority: i32) -> Self {
        Self {
            scheduler,
            handler,
            priority,
        }
    }

    /// Handle one utterance. Unmatched text is ignored.
    ///
    /// Returns the matched command and the id of the scheduled task.
    pub fn handle(&self, text: &str) -> Option<(VoiceCommand, TaskId)> {
        let Some(command) = parse(text) else {
            debug!("No command in '{}'", text);
            return None;
        };

        info!("Voice command: {}", command);
        let handler = Arc::clone(&self.handler);
        let id = self
            .scheduler
            .schedule(self.priority, None, move || handler.execute(command));
        Some((command, id))
    }
}
