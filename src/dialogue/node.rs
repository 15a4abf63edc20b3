//! Dialogue Node Structures
//!
//! Nodes are deserialized from pack TOML files and stay immutable. Whether a
//! play-once node has been shown lives in [`PlayedFlags`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Who a line is shown for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Always shown
    #[default]
    Any,
    /// Shown only when the line's speaker is ally-affiliated
    OnlyAlly,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Any => "any",
            Audience::OnlyAlly => "only_ally",
        }
    }
}

/// One line of dialogue
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LineElement {
    /// Overrides the node's default speaker for this line
    #[serde(default)]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default)]
    pub audience: Audience,
    /// Auto-advance after this many seconds
    #[serde(default)]
    pub duration: Option<f32>,
}

impl LineElement {
    pub fn new(text: impl Into<String>, audience: Audience) -> Self {
        Self {
            speaker: None,
            text: text.into(),
            audience,
            duration: None,
        }
    }

    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    pub fn with_duration(mut self, secs: f32) -> Self {
        self.duration = Some(secs);
        self
    }

    /// The speaker for this line: the override, else the node default
    pub fn speaker_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.speaker.as_deref().unwrap_or(default)
    }
}

/// One unit of dialogue content tied to a quest step
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DialogueNode {
    pub key: String,
    /// Default speaker id
    pub speaker: String,
    #[serde(default)]
    pub main: Vec<LineElement>,
    /// Lines jumped to after the first emitted ally-only main line
    #[serde(default)]
    pub ally: Vec<LineElement>,
    #[serde(default)]
    pub play_once: bool,
    /// Node that conventionally follows this one
    #[serde(default)]
    pub next: Option<String>,
}

impl DialogueNode {
    pub fn new(key: impl Into<String>, speaker: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            speaker: speaker.into(),
            main: Vec::new(),
            ally: Vec::new(),
            play_once: false,
            next: None,
        }
    }

    pub fn next_key(&self) -> Option<&str> {
        self.next.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.main.is_empty()
    }
}

/// Runtime "played" state for play-once nodes, keyed by (quest, node)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedFlags {
    played: HashSet<(String, String)>,
}

impl PlayedFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_played(&self, quest_id: &str, node_key: &str) -> bool {
        self.played
            .contains(&(quest_id.to_string(), node_key.to_string()))
    }

    /// Mark a node played. Setting it again is a no-op.
    pub fn mark_played(&mut self, quest_id: &str, node_key: &str) -> bool {
        self.played
            .insert((quest_id.to_string(), node_key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.played.len()
    }

    pub fn is_empty(&self) -> bool {
        self.played.is_empty()
    }
}
