//! Quest Event Types
//!
//! Domain events feed requirement progress; notifications report what the
//! quest engine did in response.

use serde::{Deserialize, Serialize};

use super::definition::RewardBundle;

/// Event type emitted when a dialogue session ran through its lines
pub const DIALOGUE_COMPLETED: &str = "dialogue_completed";

/// A domain event routed to every active quest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event type (e.g., "monster_killed", "npc_interaction")
    pub event_type: String,
    /// Optional key (e.g., "slime", "elder_villager")
    pub key: Option<String>,
    /// Amount; values below 1 count as 1
    pub value: i32,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>, key: Option<&str>, value: i32) -> Self {
        Self {
            event_type: event_type.into(),
            key: key.map(str::to_string),
            value,
        }
    }

    /// Event with no key and the default value of 1
    pub fn simple(event_type: impl Into<String>) -> Self {
        Self::new(event_type, None, 1)
    }

    /// Event with a key and the default value of 1
    pub fn keyed(event_type: impl Into<String>, key: &str) -> Self {
        Self::new(event_type, Some(key), 1)
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Progress this event contributes to a matching requirement
    pub fn amount(&self) -> i32 {
        self.value.max(1)
    }
}

/// Where a reward bundle was attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RewardHook {
    StepEnter(usize),
    StepExit(usize),
    QuestCompleted,
}

/// Lifecycle notifications emitted by quest instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QuestNotification {
    Started {
        quest_id: String,
    },
    StepChanged {
        quest_id: String,
        index: usize,
    },
    Completed {
        quest_id: String,
    },
    Stopped {
        quest_id: String,
    },
    /// A reward bundle for the reward collaborator to apply
    Reward {
        quest_id: String,
        hook: RewardHook,
        bundle: RewardBundle,
    },
}

impl QuestNotification {
    pub fn quest_id(&self) -> &str {
        match self {
            QuestNotification::Started { quest_id }
            | QuestNotification::StepChanged { quest_id, .. }
            | QuestNotification::Completed { quest_id }
            | QuestNotification::Stopped { quest_id }
            | QuestNotification::Reward { quest_id, .. } => quest_id,
        }
    }

    /// Get notification type as string (for logging/debugging)
    pub fn kind(&self) -> &'static str {
        match self {
            QuestNotification::Started { .. } => "started",
            QuestNotification::StepChanged { .. } => "step_changed",
            QuestNotification::Completed { .. } => "completed",
            QuestNotification::Stopped { .. } => "stopped",
            QuestNotification::Reward { .. } => "reward",
        }
    }
}

/// Context string handed to the reward collaborator
pub fn reward_context(quest_id: &str, hook: RewardHook) -> String {
    match hook {
        RewardHook::StepEnter(index) => format!("quest:{}:step:{}:enter", quest_id, index),
        RewardHook::StepExit(index) => format!("quest:{}:step:{}:exit", quest_id, index),
        RewardHook::QuestCompleted => format!("quest:{}:completed", quest_id),
    }
}
