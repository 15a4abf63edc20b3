//! Session Multiplexer
//!
//! Runs at most one session per registered surface. Sessions on different
//! surfaces never share a cursor, a timer or a completion latch.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::session::{CloseReason, CompletionCallback, DialogueSession, LineSource, SessionOutcome};
use super::surface::{DialogueSurface, SpeakerDefaults};
use crate::error::SessionError;

struct SurfaceSlot {
    surface: Box<dyn DialogueSurface>,
    session: Option<DialogueSession>,
}

pub struct SessionMultiplexer {
    slots: BTreeMap<String, SurfaceSlot>,
    watchdog: bool,
}

impl SessionMultiplexer {
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            watchdog: true,
        }
    }

    /// Enable or disable the closed-surface watchdog scan in [`tick`](Self::tick)
    pub fn with_watchdog(mut self, enabled: bool) -> Self {
        self.watchdog = enabled;
        self
    }

    /// Register a surface, replacing (and force-closing) any previous one
    pub fn register_surface(&mut self, surface_id: impl Into<String>, surface: Box<dyn DialogueSurface>) {
        let surface_id = surface_id.into();
        let slot = SurfaceSlot {
            surface,
            session: None,
        };
        if let Some(mut old) = self.slots.insert(surface_id.clone(), slot) {
            warn!("Surface '{}' registered twice, replacing", surface_id);
            if let Some(mut session) = old.session.take() {
                session.force_close(old.surface.as_mut());
            }
        }
        debug!("Registered dialogue surface '{}'", surface_id);
    }

    pub fn surface_ids(&self) -> impl Iterator<Item = &String> {
        self.slots.keys()
    }

    /// Start a session on a surface.
    ///
    /// If the session cannot start, `on_complete` is invoked before this
    /// returns, with `finished == false` and a [`CloseReason::Rejected`].
    pub fn open(
        &mut self,
        surface_id: &str,
        speaker: &SpeakerDefaults,
        source: LineSource,
        on_complete: CompletionCallback,
    ) -> Result<Uuid, SessionError> {
        let Some(slot) = self.slots.get_mut(surface_id) else {
            return Err(reject(surface_id, SessionError::UnknownSurface(surface_id.to_string()), on_complete));
        };
        if slot.session.is_some() {
            return Err(reject(surface_id, SessionError::SurfaceBusy(surface_id.to_string()), on_complete));
        }

        let mut session = DialogueSession::new(surface_id, source, on_complete);
        if let Err(e) = session.start(slot.surface.as_mut(), speaker) {
            warn!("Dialogue on '{}' rejected: {}", surface_id, e);
            session.finish(slot.surface.as_mut(), CloseReason::Rejected(e.clone()));
            return Err(e);
        }

        let id = session.id();
        info!("Dialogue session {} opened on '{}' ({})", id, surface_id, speaker.speaker_id);
        slot.session = Some(session);
        Ok(id)
    }

    /// Advance the session on a surface. Returns false when none is open.
    pub fn advance(&mut self, surface_id: &str) -> bool {
        let Some(slot) = self.slots.get_mut(surface_id) else {
            return false;
        };
        let Some(session) = slot.session.as_mut() else {
            return false;
        };
        if let Some(outcome) = session.advance(slot.surface.as_mut()) {
            slot.session = None;
            log_outcome(&outcome);
        }
        true
    }

    /// Close the session on a surface. Returns false when none is open.
    pub fn force_close(&mut self, surface_id: &str) -> bool {
        let Some(slot) = self.slots.get_mut(surface_id) else {
            return false;
        };
        let Some(mut session) = slot.session.take() else {
            return false;
        };
        if let Some(outcome) = session.force_close(slot.surface.as_mut()) {
            log_outcome(&outcome);
        }
        true
    }

    /// Close every open session
    pub fn force_close_all(&mut self) -> usize {
        let ids: Vec<String> = self.slots.keys().cloned().collect();
        ids.iter().filter(|id| self.force_close(id)).count()
    }

    /// Whether a session is in flight on the surface
    pub fn is_open(&self, surface_id: &str) -> bool {
        self.slots
            .get(surface_id)
            .is_some_and(|slot| slot.session.is_some())
    }

    pub fn is_any_open(&self) -> bool {
        self.slots.values().any(|slot| slot.session.is_some())
    }

    pub fn session_id(&self, surface_id: &str) -> Option<Uuid> {
        self.slots
            .get(surface_id)
            .and_then(|slot| slot.session.as_ref())
            .map(|s| s.id())
    }

    /// Run timers, then the watchdog, on every surface
    pub fn tick(&mut self, dt: Duration) {
        for slot in self.slots.values_mut() {
            let Some(session) = slot.session.as_mut() else {
                continue;
            };
            let mut outcome = session.tick(slot.surface.as_mut(), dt);
            if outcome.is_none() && self.watchdog {
                outcome = session.watchdog(slot.surface.as_mut());
            }
            if let Some(outcome) = outcome {
                slot.session = None;
                log_outcome(&outcome);
            }
        }
    }
}

impl Default for SessionMultiplexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Report a session that never existed
fn reject(surface_id: &str, error: SessionError, on_complete: CompletionCallback) -> SessionError {
    warn!("Dialogue on '{}' rejected: {}", surface_id, error);
    let outcome = SessionOutcome {
        surface: surface_id.to_string(),
        session_id: Uuid::nil(),
        finished: false,
        reason: CloseReason::Rejected(error.clone()),
        lines_shown: 0,
    };
    on_complete(&outcome);
    error
}

fn log_outcome(outcome: &SessionOutcome) {
    match outcome.reason {
        CloseReason::Watchdog => warn!(
            "Surface '{}' closed outside session {}, completing",
            outcome.surface, outcome.session_id
        ),
        _ => info!(
            "Dialogue session {} on '{}' ended: {} (finished: {})",
            outcome.session_id,
            outcome.surface,
            outcome.reason.as_str(),
            outcome.finished
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::session::tests::{TestSurface, lines, recorder};
    use crate::dialogue::surface::DialogueLine;

    fn mux_with(ids: &[&str]) -> (SessionMultiplexer, Vec<TestSurface>) {
        let mut mux = SessionMultiplexer::new();
        let surfaces: Vec<TestSurface> = ids.iter().map(|_| TestSurface::default()).collect();
        for (id, surface) in ids.iter().zip(&surfaces) {
            mux.register_surface(*id, Box::new(surface.clone()));
        }
        (mux, surfaces)
    }

    #[test]
    fn test_each_close_path_fires_once() {
        let (mut mux, surfaces) = mux_with(&["main"]);
        let speaker = SpeakerDefaults::new("elder", "Elder");

        // Normal completion
        let (outcomes, callback) = recorder();
        mux.open("main", &speaker, lines(&["a"]).into(), callback).unwrap();
        assert!(mux.advance("main"));
        assert!(!mux.advance("main"));
        assert_eq!(outcomes.borrow().len(), 1);
        assert!(outcomes.borrow()[0].finished);

        // Forced
        let (outcomes, callback) = recorder();
        mux.open("main", &speaker, lines(&["a"]).into(), callback).unwrap();
        assert!(mux.force_close("main"));
        assert!(!mux.force_close("main"));
        mux.tick(Duration::from_secs(1));
        assert_eq!(outcomes.borrow().len(), 1);
        assert_eq!(outcomes.borrow()[0].reason, CloseReason::Forced);

        // Watchdog
        let (outcomes, callback) = recorder();
        mux.open("main", &speaker, lines(&["a", "b"]).into(), callback).unwrap();
        mux.tick(Duration::from_millis(10));
        surfaces[0].open.set(false);
        mux.tick(Duration::from_millis(10));
        mux.tick(Duration::from_millis(10));
        assert!(!mux.is_open("main"));
        assert_eq!(outcomes.borrow().len(), 1);
        assert_eq!(outcomes.borrow()[0].reason, CloseReason::Watchdog);
        assert!(!outcomes.borrow()[0].finished);
    }

    #[test]
    fn test_rejections_invoke_callback_synchronously() {
        let (mut mux, surfaces) = mux_with(&["main"]);
        let speaker = SpeakerDefaults::default();

        let (outcomes, callback) = recorder();
        let err = mux.open("nowhere", &speaker, lines(&["a"]).into(), callback).unwrap_err();
        assert_eq!(err, SessionError::UnknownSurface("nowhere".to_string()));
        assert_eq!(outcomes.borrow().len(), 1);
        assert!(!outcomes.borrow()[0].finished);

        let (first, callback) = recorder();
        mux.open("main", &speaker, lines(&["a"]).into(), callback).unwrap();
        let (outcomes, callback) = recorder();
        let err = mux.open("main", &speaker, lines(&["b"]).into(), callback).unwrap_err();
        assert_eq!(err, SessionError::SurfaceBusy("main".to_string()));
        assert_eq!(outcomes.borrow().len(), 1);
        // The running session is untouched
        assert!(first.borrow().is_empty());
        assert_eq!(*surfaces[0].shown.borrow(), vec!["a"]);

        mux.force_close("main");
        let (outcomes, callback) = recorder();
        let err = mux
            .open("main", &speaker, LineSource::from_fn(|| None), callback)
            .unwrap_err();
        assert_eq!(err, SessionError::EmptyLineSource("main".to_string()));
        assert_eq!(
            outcomes.borrow()[0].reason,
            CloseReason::Rejected(SessionError::EmptyLineSource("main".to_string()))
        );
        assert!(!mux.is_open("main"));
    }

    #[test]
    fn test_surfaces_are_independent() {
        let (mut mux, surfaces) = mux_with(&["bubble", "main"]);
        let speaker = SpeakerDefaults::default();
        let (main_done, main_cb) = recorder();
        let (bubble_done, bubble_cb) = recorder();

        let timed = vec![DialogueLine::new("guard", "halt").with_duration(Duration::from_millis(200))];
        mux.open("main", &speaker, lines(&["m0", "m1"]).into(), main_cb).unwrap();
        mux.open("bubble", &speaker, LineSource::streaming(timed.into_iter()), bubble_cb)
            .unwrap();
        assert!(mux.is_any_open());

        mux.advance("main");
        assert_eq!(*surfaces[1].shown.borrow(), vec!["m0", "m1"]);
        assert_eq!(*surfaces[0].shown.borrow(), vec!["halt"]);

        mux.tick(Duration::from_millis(250));
        assert_eq!(bubble_done.borrow().len(), 1);
        assert_eq!(bubble_done.borrow()[0].reason, CloseReason::StreamEnded);
        assert!(main_done.borrow().is_empty());
        assert!(mux.is_open("main"));
        assert!(!mux.is_open("bubble"));
    }

    #[test]
    fn test_watchdog_disabled() {
        let mut mux = SessionMultiplexer::new().with_watchdog(false);
        let surface = TestSurface::default();
        mux.register_surface("main", Box::new(surface.clone()));
        let (outcomes, callback) = recorder();
        mux.open("main", &SpeakerDefaults::default(), lines(&["a"]).into(), callback)
            .unwrap();

        surface.open.set(false);
        mux.tick(Duration::from_millis(10));
        assert!(mux.is_open("main"));
        assert!(outcomes.borrow().is_empty());
    }

    #[test]
    fn test_sessions_get_fresh_ids() {
        let (mut mux, _surfaces) = mux_with(&["main"]);
        let speaker = SpeakerDefaults::default();
        let (_, callback) = recorder();
        let first = mux.open("main", &speaker, lines(&["a"]).into(), callback).unwrap();
        assert_eq!(mux.session_id("main"), Some(first));
        mux.force_close("main");

        let (_, callback) = recorder();
        let second = mux.open("main", &speaker, lines(&["a"]).into(), callback).unwrap();
        assert_ne!(first, second);
        assert_eq!(mux.force_close_all(), 1);
    }
}
