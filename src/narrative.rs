//! Narrative Orchestrator
//!
//! Glues quest progression to dialogue playback. Step changes open the
//! step's dialogue node on a surface; sessions that close report back to
//! the dispatcher, which may turn them into `dialogue_completed` events.
//! Everything runs on the tick thread.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::NarrativeConfig;
use crate::dialogue::{
    BranchLines, CloseReason, CompletionCallback, DialogueLine, DialogueNode, DialogueSurface, LineSource,
    NodeSource, PackRegistry, PlayedFlags, SessionMultiplexer, SessionOutcome, SpeakerDefaults,
};
use crate::error::RegistryError;
use crate::quest::events::reward_context;
use crate::quest::{DomainEvent, QuestDispatcher, QuestNotification, QuestRegistry, RewardBundle, RewardHook};
use crate::speaker::{SpeakerCache, StaticSpeakerDirectory};

/// Rounds of notification/completion draining per call before giving up
const MAX_PUMP_ROUNDS: usize = 32;

/// Applies reward bundles. The narrative core never applies them itself.
pub trait RewardSink {
    fn grant(&mut self, context: &str, bundle: &RewardBundle);
}

/// A session completion waiting to be handed back to the dispatcher
struct DialogueCompletion {
    quest_id: String,
    node_key: String,
    play_once: bool,
    outcome: SessionOutcome,
}

pub struct Narrative {
    quests: QuestDispatcher,
    sessions: SessionMultiplexer,
    nodes: Box<dyn NodeSource>,
    played: PlayedFlags,
    speakers: Rc<RefCell<SpeakerCache>>,
    rewards: Option<Box<dyn RewardSink>>,
    /// Filled by session completion callbacks, drained on the next pump
    completions: Rc<RefCell<Vec<DialogueCompletion>>>,
    default_surface: String,
    default_line_duration: Option<Duration>,
}

impl Narrative {
    pub fn new(
        quests: QuestDispatcher,
        sessions: SessionMultiplexer,
        nodes: Box<dyn NodeSource>,
        speakers: SpeakerCache,
    ) -> Self {
        Self {
            quests,
            sessions,
            nodes,
            played: PlayedFlags::new(),
            speakers: Rc::new(RefCell::new(speakers)),
            rewards: None,
            completions: Rc::new(RefCell::new(Vec::new())),
            default_surface: "main".to_string(),
            default_line_duration: None,
        }
    }

    /// Load every registry from the configured data directory
    pub fn from_config(config: &NarrativeConfig) -> Result<Self, RegistryError> {
        let mut quests = QuestRegistry::new();
        quests.load_from_directory(&config.data_dir)?;

        let mut packs = PackRegistry::new();
        packs.load_from_directory(&config.data_dir)?;

        let speakers = StaticSpeakerDirectory::load_from_directory(&config.data_dir)?;

        Ok(Self::new(
            QuestDispatcher::new(quests),
            SessionMultiplexer::new().with_watchdog(config.watchdog),
            Box::new(packs),
            SpeakerCache::new(Box::new(speakers)),
        )
        .with_default_surface(config.default_surface.clone())
        .with_default_line_duration(config.default_line_duration()))
    }

    pub fn with_rewards(mut self, sink: Box<dyn RewardSink>) -> Self {
        self.rewards = Some(sink);
        self
    }

    pub fn with_default_surface(mut self, surface: impl Into<String>) -> Self {
        self.default_surface = surface.into();
        self
    }

    pub fn with_default_line_duration(mut self, duration: Option<Duration>) -> Self {
        self.default_line_duration = duration;
        self
    }

    pub fn register_surface(&mut self, surface_id: impl Into<String>, surface: Box<dyn DialogueSurface>) {
        self.sessions.register_surface(surface_id, surface);
    }

    pub fn quests(&self) -> &QuestDispatcher {
        &self.quests
    }

    pub fn sessions(&self) -> &SessionMultiplexer {
        &self.sessions
    }

    pub fn played(&self) -> &PlayedFlags {
        &self.played
    }

    /// Replace the played flags, e.g. from a save
    pub fn restore_played(&mut self, played: PlayedFlags) {
        self.played = played;
    }

    // ------------------------------------------------------------------
    // External surface
    // ------------------------------------------------------------------

    pub fn push_event(&mut self, event: DomainEvent) {
        self.quests.push_event(event);
        self.pump();
    }

    pub fn try_start_quest(&mut self, quest_id: &str, reset_steps: bool) -> bool {
        let started = self.quests.try_start_quest(quest_id, reset_steps);
        self.pump();
        started
    }

    pub fn stop_quest(&mut self, quest_id: &str) {
        self.quests.stop_quest(quest_id);
        self.pump();
    }

    pub fn get_step_index(&self, quest_id: &str, step_key: &str) -> Option<usize> {
        self.quests.get_step_index(quest_id, step_key)
    }

    pub fn get_step_key(&self, quest_id: &str, index: usize) -> Option<String> {
        self.quests.get_step_key(quest_id, index)
    }

    pub fn advance(&mut self, surface_id: &str) -> bool {
        let advanced = self.sessions.advance(surface_id);
        self.pump();
        advanced
    }

    pub fn force_close(&mut self, surface_id: &str) -> bool {
        let closed = self.sessions.force_close(surface_id);
        self.pump();
        closed
    }

    pub fn is_open(&self, surface_id: &str) -> bool {
        self.sessions.is_open(surface_id)
    }

    pub fn is_any_open(&self) -> bool {
        self.sessions.is_any_open()
    }

    /// One frame: react to pending notifications, run session timers and the
    /// watchdog, then feed finished sessions back into the quests
    pub fn tick(&mut self, dt: Duration) {
        self.pump();
        self.sessions.tick(dt);
        self.pump();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Drain notifications and completions until both queues are empty
    fn pump(&mut self) {
        for _ in 0..MAX_PUMP_ROUNDS {
            let notifications = self.quests.take_notifications();
            let completions = std::mem::take(&mut *self.completions.borrow_mut());
            if notifications.is_empty() && completions.is_empty() {
                return;
            }

            for notification in notifications {
                self.handle_notification(notification);
            }
            for completion in completions {
                self.handle_completion(completion);
            }
        }
        warn!(
            "Narrative still busy after {} rounds, deferring to next tick",
            MAX_PUMP_ROUNDS
        );
    }

    fn handle_notification(&mut self, notification: QuestNotification) {
        match notification {
            QuestNotification::StepChanged { quest_id, index } => {
                self.open_step_dialogue(&quest_id, index);
            }
            QuestNotification::Reward {
                quest_id,
                hook,
                bundle,
            } => self.grant(&quest_id, hook, &bundle),
            QuestNotification::Started { quest_id } => debug!("Quest '{}' started", quest_id),
            QuestNotification::Completed { quest_id } => info!("Quest '{}' complete", quest_id),
            QuestNotification::Stopped { quest_id } => debug!("Quest '{}' stopped", quest_id),
        }
    }

    fn grant(&mut self, quest_id: &str, hook: RewardHook, bundle: &RewardBundle) {
        let context = reward_context(quest_id, hook);
        match self.rewards.as_mut() {
            Some(sink) => sink.grant(&context, bundle),
            None => info!(
                "Reward {} ({} exp, {} gold, {} items) has no sink",
                context,
                bundle.exp,
                bundle.gold,
                bundle.items.len()
            ),
        }
    }

    /// Open the dialogue for a quest step. False when nothing was opened.
    fn open_step_dialogue(&mut self, quest_id: &str, index: usize) -> bool {
        let Some(definition) = self.quests.registry().get(quest_id) else {
            warn!("Step change for unknown quest '{}'", quest_id);
            return false;
        };
        let node_key = definition.node_key(index);
        let Some(node) = self.nodes.resolve_node(quest_id, &node_key) else {
            return false;
        };
        if node.play_once && self.played.is_played(quest_id, &node_key) {
            debug!("Dialogue '{}' for quest '{}' already played", node_key, quest_id);
            return false;
        }

        let surface = definition
            .surface(index)
            .unwrap_or(self.default_surface.as_str())
            .to_string();
        let display_name = self
            .speakers
            .borrow_mut()
            .display_name(&node.speaker)
            .unwrap_or_else(|| node.speaker.clone());
        let speaker = SpeakerDefaults::new(node.speaker.clone(), display_name);
        let play_once = node.play_once;
        let source = self.line_source(node);

        let mailbox = Rc::clone(&self.completions);
        let completion_quest = quest_id.to_string();
        let completion_node = node_key.clone();
        let on_complete: CompletionCallback = Box::new(move |outcome: &SessionOutcome| {
            mailbox.borrow_mut().push(DialogueCompletion {
                quest_id: completion_quest,
                node_key: completion_node,
                play_once,
                outcome: outcome.clone(),
            });
        });

        // The marker only tracks sessions that actually opened
        match self.sessions.open(&surface, &speaker, source, on_complete) {
            Ok(_) => {
                self.quests.begin_dialogue(quest_id, &node_key);
                true
            }
            Err(_) => false,
        }
    }

    /// Lazy branch-resolved lines with speaker names filled in
    fn line_source(&self, node: Arc<DialogueNode>) -> LineSource {
        let allies = Rc::clone(&self.speakers);
        let names = Rc::clone(&self.speakers);
        let default_duration = self.default_line_duration;

        let lines = BranchLines::new(node, move |speaker_id: &str| {
            allies.borrow_mut().is_ally(speaker_id)
        });

        LineSource::streaming(lines.map(move |line| {
            let speaker_name = names
                .borrow_mut()
                .display_name(&line.speaker_id)
                .unwrap_or_else(|| line.speaker_id.clone());
            DialogueLine {
                duration: line_duration(line.element.duration).or(default_duration),
                speaker_id: line.speaker_id,
                speaker_name,
                text: line.element.text,
            }
        }))
    }

    fn handle_completion(&mut self, completion: DialogueCompletion) {
        let DialogueCompletion {
            quest_id,
            node_key,
            play_once,
            outcome,
        } = completion;

        if let CloseReason::Rejected(e) = &outcome.reason {
            debug!(
                "Dialogue '{}' for quest '{}' never opened: {}",
                node_key, quest_id, e
            );
            return;
        }

        let reached_end = outcome.reached_end();
        if reached_end && play_once && self.played.mark_played(&quest_id, &node_key) {
            debug!("Dialogue '{}' for quest '{}' marked played", node_key, quest_id);
        }
        self.quests
            .notify_dialogue_completed(&quest_id, &node_key, reached_end);
    }
}

fn line_duration(secs: Option<f32>) -> Option<Duration> {
    secs.filter(|s| *s > 0.0)
        .and_then(|s| Duration::try_from_secs_f32(s).ok())
}
