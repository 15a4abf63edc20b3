//! Quest Dispatcher
//!
//! Owns every quest instance, fans domain events out to the active ones in
//! start order and queues the resulting notifications for the host.

use std::collections::HashMap;
use tracing::{debug, error, info, warn};

use super::events::{DIALOGUE_COMPLETED, DomainEvent, QuestNotification};
use super::registry::QuestRegistry;
use super::state::{QuestInstance, QuestSnapshot};
use crate::error::QuestError;

pub struct QuestDispatcher {
    registry: QuestRegistry,
    /// Every quest that has been started at least once
    instances: HashMap<String, QuestInstance>,
    /// Active quest ids in start order
    active: Vec<String>,
    /// Notifications not yet drained by the host
    notifications: Vec<QuestNotification>,
    /// quest_id -> node key of the dialogue currently playing for it
    dialogue_in_flight: HashMap<String, String>,
}

impl QuestDispatcher {
    pub fn new(registry: QuestRegistry) -> Self {
        Self {
            registry,
            instances: HashMap::new(),
            active: Vec::new(),
            notifications: Vec::new(),
            dialogue_in_flight: HashMap::new(),
        }
    }

    pub fn registry(&self) -> &QuestRegistry {
        &self.registry
    }

    /// Start (or resume) a quest. Returns `Ok(false)` if it was already active.
    pub fn start_quest(&mut self, quest_id: &str, reset_steps: bool) -> Result<bool, QuestError> {
        if !self.instances.contains_key(quest_id) {
            let definition = self
                .registry
                .get(quest_id)
                .ok_or_else(|| QuestError::UnknownQuest(quest_id.to_string()))?;
            self.instances
                .insert(quest_id.to_string(), QuestInstance::new(definition));
        }

        let Some(instance) = self.instances.get_mut(quest_id) else {
            return Err(QuestError::UnknownQuest(quest_id.to_string()));
        };

        let mut out = Vec::new();
        let started = instance.start(reset_steps, &mut out)?;
        if started {
            self.active.push(quest_id.to_string());
        }
        self.queue(out);
        Ok(started)
    }

    /// Start a quest, logging failures. True when the quest is active afterwards.
    pub fn try_start_quest(&mut self, quest_id: &str, reset_steps: bool) -> bool {
        match self.start_quest(quest_id, reset_steps) {
            Ok(_) => true,
            Err(e) => {
                warn!("Could not start quest: {}", e);
                false
            }
        }
    }

    /// Stop an active quest, logging failures
    pub fn stop_quest(&mut self, quest_id: &str) {
        let result = match self.instances.get_mut(quest_id) {
            Some(instance) => {
                let mut out = Vec::new();
                let result = instance.stop(&mut out);
                self.queue(out);
                result
            }
            None => Err(QuestError::UnknownQuest(quest_id.to_string())),
        };

        match result {
            Ok(()) => self.active.retain(|id| id != quest_id),
            Err(e) => warn!("Could not stop quest: {}", e),
        }
    }

    /// Route a domain event to every active quest. Quests that finish during
    /// the pass leave the active set afterwards.
    pub fn push_event(&mut self, event: DomainEvent) {
        debug!("Dispatching {} {:?} x{}", event.event_type, event.key, event.value);

        for quest_id in &self.active {
            let Some(instance) = self.instances.get_mut(quest_id) else {
                continue;
            };
            let mut out = Vec::new();
            if let Err(e) = instance.on_event(&event, &mut out) {
                error!("Quest '{}' rejected event {}: {}", quest_id, event.event_type, e);
            }
            for notification in &out {
                if let QuestNotification::StepChanged { quest_id, index } = notification {
                    if let Some(node) = self.dialogue_in_flight.get(quest_id) {
                        warn!(
                            "Quest '{}' moved to step {} while dialogue '{}' is still open; possible desync",
                            quest_id, index, node
                        );
                    }
                }
            }
            self.notifications.extend(out);
        }

        let instances = &self.instances;
        self.active
            .retain(|id| instances.get(id).is_some_and(|q| q.is_active()));
    }

    /// Index of the step with `step_key`
    pub fn get_step_index(&self, quest_id: &str, step_key: &str) -> Option<usize> {
        self.registry.get(quest_id)?.step_index(step_key)
    }

    /// Key of the step at `index`
    pub fn get_step_key(&self, quest_id: &str, index: usize) -> Option<String> {
        self.registry
            .get(quest_id)?
            .step_key(index)
            .map(str::to_string)
    }

    pub fn instance(&self, quest_id: &str) -> Option<&QuestInstance> {
        self.instances.get(quest_id)
    }

    pub fn is_active(&self, quest_id: &str) -> bool {
        self.instances.get(quest_id).is_some_and(|q| q.is_active())
    }

    pub fn is_completed(&self, quest_id: &str) -> bool {
        self.instances.get(quest_id).is_some_and(|q| q.is_completed())
    }

    pub fn active_ids(&self) -> &[String] {
        &self.active
    }

    /// Drain queued notifications in emission order
    pub fn take_notifications(&mut self) -> Vec<QuestNotification> {
        std::mem::take(&mut self.notifications)
    }

    /// Mark a dialogue as playing for a quest. Returns false (and warns) if
    /// another one was already in flight.
    pub fn begin_dialogue(&mut self, quest_id: &str, node_key: &str) -> bool {
        match self
            .dialogue_in_flight
            .insert(quest_id.to_string(), node_key.to_string())
        {
            Some(previous) => {
                warn!(
                    "Quest '{}' opened dialogue '{}' while '{}' was still in flight",
                    quest_id, node_key, previous
                );
                false
            }
            None => true,
        }
    }

    pub fn dialogue_in_flight(&self, quest_id: &str) -> Option<&str> {
        self.dialogue_in_flight.get(quest_id).map(String::as_str)
    }

    /// Clear the in-flight marker. A dialogue that ran to its end becomes a
    /// `dialogue_completed` event keyed by the node.
    pub fn notify_dialogue_completed(&mut self, quest_id: &str, node_key: &str, reached_end: bool) {
        let in_flight = self.dialogue_in_flight.get(quest_id).cloned();
        match in_flight {
            Some(current) if current == node_key => {
                self.dialogue_in_flight.remove(quest_id);
            }
            Some(current) => {
                warn!(
                    "Quest '{}' finished dialogue '{}' but '{}' is in flight",
                    quest_id, node_key, current
                );
            }
            None => {}
        }

        info!(
            "Dialogue '{}' for quest '{}' closed (reached end: {})",
            node_key, quest_id, reached_end
        );
        if reached_end {
            self.push_event(DomainEvent::keyed(DIALOGUE_COMPLETED, node_key));
        }
    }

    pub fn snapshot(&self, quest_id: &str) -> Option<QuestSnapshot> {
        self.instances.get(quest_id).map(QuestInstance::snapshot)
    }

    /// Rebuild a quest's runtime state from a snapshot
    pub fn restore(&mut self, snapshot: &QuestSnapshot) -> Result<(), QuestError> {
        let definition = self
            .registry
            .get(&snapshot.quest_id)
            .ok_or_else(|| QuestError::UnknownQuest(snapshot.quest_id.clone()))?;
        let mut instance = QuestInstance::new(definition);
        instance.restore(snapshot)?;

        self.active.retain(|id| id != &snapshot.quest_id);
        if instance.is_active() {
            self.active.push(snapshot.quest_id.clone());
        }
        self.instances.insert(snapshot.quest_id.clone(), instance);
        Ok(())
    }

    fn queue(&mut self, out: Vec<QuestNotification>) {
        for n in &out {
            debug!("Quest notification: {} ({})", n.kind(), n.quest_id());
        }
        self.notifications.extend(out);
    }
}
