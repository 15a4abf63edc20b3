//! Dialogue Session
//!
//! One playback of a line source on one surface. The session pushes lines,
//! runs the per-line auto-advance timer and fires its completion callback
//! exactly once, whichever of the close paths gets there first.

use std::time::Duration;

use tracing::debug;
use uuid::Uuid;

use super::surface::{DialogueLine, DialogueSurface, SpeakerDefaults};
use crate::error::SessionError;

/// Where a session's lines come from
pub enum LineSource {
    /// Fixed list, known up front
    Materialized(Vec<DialogueLine>),
    /// Pulled one line at a time until the iterator runs dry
    Streaming(Box<dyn Iterator<Item = DialogueLine>>),
}

impl LineSource {
    pub fn streaming<I>(lines: I) -> Self
    where
        I: Iterator<Item = DialogueLine> + 'static,
    {
        LineSource::Streaming(Box::new(lines))
    }

    pub fn from_fn<F>(next: F) -> Self
    where
        F: FnMut() -> Option<DialogueLine> + 'static,
    {
        LineSource::Streaming(Box::new(std::iter::from_fn(next)))
    }
}

impl From<Vec<DialogueLine>> for LineSource {
    fn from(lines: Vec<DialogueLine>) -> Self {
        LineSource::Materialized(lines)
    }
}

enum LineCursor {
    Materialized { lines: Vec<DialogueLine>, index: usize },
    Streaming(Box<dyn Iterator<Item = DialogueLine>>),
    Spent,
}

impl LineCursor {
    fn from_source(source: LineSource) -> Self {
        match source {
            LineSource::Materialized(lines) => LineCursor::Materialized { lines, index: 0 },
            LineSource::Streaming(iter) => LineCursor::Streaming(iter),
        }
    }

    /// Next line, or the reason playback ran out
    fn pull(&mut self) -> Result<DialogueLine, CloseReason> {
        match self {
            LineCursor::Materialized { lines, index } => match lines.get(*index) {
                Some(line) => {
                    *index += 1;
                    Ok(line.clone())
                }
                None => Err(CloseReason::Exhausted),
            },
            LineCursor::Streaming(iter) => iter.next().ok_or(CloseReason::StreamEnded),
            LineCursor::Spent => Err(CloseReason::Forced),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Advanced past the last line of a materialized source
    Exhausted,
    /// A streaming source returned no more lines
    StreamEnded,
    /// Closed by the host
    Forced,
    /// The surface closed without going through the session
    Watchdog,
    /// The session never opened
    Rejected(SessionError),
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Exhausted => "exhausted",
            CloseReason::StreamEnded => "stream_ended",
            CloseReason::Forced => "forced",
            CloseReason::Watchdog => "watchdog",
            CloseReason::Rejected(_) => "rejected",
        }
    }
}

/// What the completion callback receives
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub surface: String,
    pub session_id: Uuid,
    /// True only when a materialized source was advanced past its end
    pub finished: bool,
    pub reason: CloseReason,
    pub lines_shown: usize,
}

impl SessionOutcome {
    /// Whether playback reached the end of its lines, for either source kind
    pub fn reached_end(&self) -> bool {
        matches!(self.reason, CloseReason::Exhausted | CloseReason::StreamEnded)
    }
}

pub type CompletionCallback = Box<dyn FnOnce(&SessionOutcome)>;

/// A single playback on a single surface
pub struct DialogueSession {
    id: Uuid,
    surface_id: String,
    cursor: LineCursor,
    /// Time left before the current line auto-advances
    timer: Option<Duration>,
    on_complete: Option<CompletionCallback>,
    /// Opened the surface and has not yet closed
    awaiting_close: bool,
    /// Completion latch; set once, never cleared
    closed_handled: bool,
    /// The surface has been seen open since `awaiting_close` was set
    observed_open_once: bool,
    lines_shown: usize,
}

impl DialogueSession {
    pub fn new(surface_id: impl Into<String>, source: LineSource, on_complete: CompletionCallback) -> Self {
        Self {
            id: Uuid::new_v4(),
            surface_id: surface_id.into(),
            cursor: LineCursor::from_source(source),
            timer: None,
            on_complete: Some(on_complete),
            awaiting_close: false,
            closed_handled: false,
            observed_open_once: false,
            lines_shown: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn surface_id(&self) -> &str {
        &self.surface_id
    }

    pub fn lines_shown(&self) -> usize {
        self.lines_shown
    }

    pub fn timer_remaining(&self) -> Option<Duration> {
        self.timer
    }

    /// Open the surface and show the first line
    pub fn start(
        &mut self,
        surface: &mut dyn DialogueSurface,
        speaker: &SpeakerDefaults,
    ) -> Result<(), SessionError> {
        if surface.is_open() {
            return Err(SessionError::SurfaceNotClosed(self.surface_id.clone()));
        }
        let first = self
            .cursor
            .pull()
            .map_err(|_| SessionError::EmptyLineSource(self.surface_id.clone()))?;

        surface.open(speaker);
        self.awaiting_close = true;
        self.observed_open_once = surface.is_open();
        self.show(surface, first);
        Ok(())
    }

    fn show(&mut self, surface: &mut dyn DialogueSurface, line: DialogueLine) {
        self.timer = line.duration;
        self.lines_shown += 1;
        surface.show_line(&line);
    }

    /// Move to the next line, closing when the source runs out
    pub fn advance(&mut self, surface: &mut dyn DialogueSurface) -> Option<SessionOutcome> {
        if self.closed_handled {
            return None;
        }
        match self.cursor.pull() {
            Ok(line) => {
                self.show(surface, line);
                None
            }
            Err(reason) => self.finish(surface, reason),
        }
    }

    /// Run the auto-advance timer
    pub fn tick(&mut self, surface: &mut dyn DialogueSurface, dt: Duration) -> Option<SessionOutcome> {
        if self.closed_handled {
            return None;
        }
        let remaining = self.timer?;
        if dt >= remaining {
            self.timer = None;
            self.advance(surface)
        } else {
            self.timer = Some(remaining - dt);
            None
        }
    }

    /// Detect a surface that closed behind the session's back
    pub fn watchdog(&mut self, surface: &mut dyn DialogueSurface) -> Option<SessionOutcome> {
        if !self.awaiting_close || self.closed_handled {
            return None;
        }
        if surface.is_open() {
            self.observed_open_once = true;
            return None;
        }
        if self.observed_open_once {
            return self.finish(surface, CloseReason::Watchdog);
        }
        None
    }

    pub fn force_close(&mut self, surface: &mut dyn DialogueSurface) -> Option<SessionOutcome> {
        self.finish(surface, CloseReason::Forced)
    }

    /// Close the session. Only the first call does anything.
    pub fn finish(&mut self, surface: &mut dyn DialogueSurface, reason: CloseReason) -> Option<SessionOutcome> {
        if self.closed_handled {
            return None;
        }
        self.closed_handled = true;
        self.timer = None;

        if self.awaiting_close && surface.is_open() {
            surface.close();
        }
        self.awaiting_close = false;
        self.observed_open_once = false;
        self.cursor = LineCursor::Spent;

        let outcome = SessionOutcome {
            surface: self.surface_id.clone(),
            session_id: self.id,
            finished: reason == CloseReason::Exhausted,
            reason,
            lines_shown: self.lines_shown,
        };
        debug!(
            "Session {} on '{}' closed ({}, {} lines)",
            self.id,
            self.surface_id,
            outcome.reason.as_str(),
            self.lines_shown
        );

        if let Some(callback) = self.on_complete.take() {
            callback(&outcome);
        }
        Some(outcome)
    }
}
