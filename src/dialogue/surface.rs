//! Dialogue surfaces
//!
//! A surface is the presentational end of a session: a text box, a speech
//! bubble, a log line. It only renders what the session pushes into it; the
//! session owns the line source, the cursor and the auto-advance timer.

use std::time::Duration;

/// A line ready for display
#[derive(Debug, Clone, PartialEq)]
pub struct DialogueLine {
    pub speaker_id: String,
    pub speaker_name: String,
    pub text: String,
    /// Auto-advance delay; `None` waits for an explicit advance
    pub duration: Option<Duration>,
}

impl DialogueLine {
    pub fn new(speaker_id: impl Into<String>, text: impl Into<String>) -> Self {
        let speaker_id = speaker_id.into();
        Self {
            speaker_name: speaker_id.clone(),
            speaker_id,
            text: text.into(),
            duration: None,
        }
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

/// Speaker shown when a surface first opens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeakerDefaults {
    pub speaker_id: String,
    pub display_name: String,
}

impl SpeakerDefaults {
    pub fn new(speaker_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            speaker_id: speaker_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Something that can present a dialogue session
pub trait DialogueSurface {
    /// Whether the surface is currently showing anything.
    ///
    /// May turn false on its own (the player dismissed the box, the speaker
    /// despawned); the session watchdog notices that.
    fn is_open(&self) -> bool;

    fn open(&mut self, speaker: &SpeakerDefaults);

    fn show_line(&mut self, line: &DialogueLine);

    fn close(&mut self);
}
