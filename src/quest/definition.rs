//! Quest Definition Structures
//!
//! These structures are deserialized from TOML quest files and resolved into
//! immutable definitions. Runtime progress never lives here.

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// A quest definition file as loaded from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuestFile {
    pub quest: RawQuest,
}

/// Raw quest data as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawQuest {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Ordered steps
    #[serde(default)]
    pub steps: Vec<RawStep>,
    /// Granted when the last step completes
    #[serde(default)]
    pub completion_reward: Option<RawReward>,
}

/// Raw step as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawStep {
    /// Stable lookup key (defaults to `S<index>`)
    pub key: Option<String>,
    /// Dialogue node shown when the step is entered
    pub node: Option<String>,
    /// Surface the dialogue runs on
    pub surface: Option<String>,
    /// Legacy single-condition form
    pub requirement: Option<RawRequirement>,
    /// Multi-condition form (all must complete)
    pub requirements: Option<Vec<RawRequirement>>,
    #[serde(default)]
    pub enter_reward: Option<RawReward>,
    #[serde(default)]
    pub exit_reward: Option<RawReward>,
}

/// Raw requirement as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawRequirement {
    pub event: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default = "default_count")]
    pub count: i32,
}

fn default_count() -> i32 {
    1
}

/// Raw reward as it appears in TOML
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReward {
    #[serde(default)]
    pub exp: i32,
    #[serde(default)]
    pub gold: i32,
    #[serde(default)]
    pub items: Vec<RawItemReward>,
}

/// Item reward entry
#[derive(Debug, Clone, Deserialize)]
pub struct RawItemReward {
    pub id: String,
    #[serde(default = "default_count")]
    pub count: i32,
}

// ============================================================================
// Resolved Quest Structures (after parsing)
// ============================================================================

/// One trackable condition inside a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementDefinition {
    /// Domain event type this requirement listens to
    pub event_type: String,
    /// Exact event key filter; `None` accepts any key
    pub key_filter: Option<String>,
    /// Amount needed to complete
    pub required: i32,
}

impl RequirementDefinition {
    pub fn new(event_type: impl Into<String>, key_filter: Option<&str>, required: i32) -> Self {
        Self {
            event_type: event_type.into(),
            key_filter: key_filter.filter(|k| !k.is_empty()).map(str::to_string),
            required,
        }
    }

    fn from_raw(quest_id: &str, raw: &RawRequirement) -> Result<Self, RegistryError> {
        if raw.count <= 0 {
            return Err(RegistryError::invalid(
                quest_id,
                format!("requirement on '{}' needs a positive count", raw.event),
            ));
        }
        Ok(Self::new(raw.event.clone(), raw.key.as_deref(), raw.count))
    }

    /// Whether an event of this type/key feeds this requirement
    pub fn matches(&self, event_type: &str, key: Option<&str>) -> bool {
        if self.event_type != event_type {
            return false;
        }
        match &self.key_filter {
            None => true,
            Some(filter) => key == Some(filter.as_str()),
        }
    }
}

/// Completion condition of a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepCondition {
    /// Legacy form: one requirement
    Single(RequirementDefinition),
    /// All listed requirements must complete
    All(Vec<RequirementDefinition>),
}

impl StepCondition {
    /// Requirements in evaluation order. The legacy form is a list of one.
    pub fn requirements(&self) -> &[RequirementDefinition] {
        match self {
            StepCondition::Single(req) => std::slice::from_ref(req),
            StepCondition::All(reqs) => reqs,
        }
    }
}

/// Item reward entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReward {
    pub item_id: String,
    pub count: i32,
}

/// Reward bundle handed to the reward collaborator. Never applied here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RewardBundle {
    pub exp: i32,
    pub gold: i32,
    pub items: Vec<ItemReward>,
}

impl RewardBundle {
    pub fn from_raw(raw: &RawReward) -> Self {
        Self {
            exp: raw.exp,
            gold: raw.gold,
            items: raw
                .items
                .iter()
                .map(|i| ItemReward {
                    item_id: i.id.clone(),
                    count: i.count,
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exp == 0 && self.gold == 0 && self.items.is_empty()
    }
}

/// A resolved step definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepDefinition {
    pub key: String,
    /// Dialogue node key; falls back to the step key
    pub node: Option<String>,
    pub surface: Option<String>,
    pub condition: StepCondition,
    pub enter_reward: Option<RewardBundle>,
    pub exit_reward: Option<RewardBundle>,
}

impl StepDefinition {
    /// Build a step with no rewards and no dialogue metadata
    pub fn new(key: impl Into<String>, condition: StepCondition) -> Self {
        Self {
            key: key.into(),
            node: None,
            surface: None,
            condition,
            enter_reward: None,
            exit_reward: None,
        }
    }

    fn from_raw(quest_id: &str, index: usize, raw: &RawStep) -> Result<Self, RegistryError> {
        let condition = match (&raw.requirement, &raw.requirements) {
            (Some(single), None) => {
                StepCondition::Single(RequirementDefinition::from_raw(quest_id, single)?)
            }
            (None, Some(list)) => {
                if list.is_empty() {
                    return Err(RegistryError::invalid(
                        quest_id,
                        format!("step {} has an empty requirement list", index),
                    ));
                }
                StepCondition::All(
                    list.iter()
                        .map(|r| RequirementDefinition::from_raw(quest_id, r))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
            (Some(_), Some(_)) => {
                return Err(RegistryError::invalid(
                    quest_id,
                    format!("step {} sets both 'requirement' and 'requirements'", index),
                ));
            }
            (None, None) => {
                return Err(RegistryError::invalid(
                    quest_id,
                    format!("step {} has no requirement", index),
                ));
            }
        };

        Ok(Self {
            key: raw
                .key
                .clone()
                .unwrap_or_else(|| synthesized_step_key(index)),
            node: raw.node.clone(),
            surface: raw.surface.clone(),
            condition,
            enter_reward: raw.enter_reward.as_ref().map(RewardBundle::from_raw),
            exit_reward: raw.exit_reward.as_ref().map(RewardBundle::from_raw),
        })
    }
}

/// Key used for steps that carry none
pub fn synthesized_step_key(index: usize) -> String {
    format!("S{}", index)
}

/// A fully resolved quest definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestDefinition {
    pub id: String,
    pub name: String,
    pub steps: Vec<StepDefinition>,
    pub completion_reward: Option<RewardBundle>,
}

impl QuestDefinition {
    /// Create a QuestDefinition from raw TOML data
    pub fn from_raw(raw: &RawQuest) -> Result<Self, RegistryError> {
        if raw.steps.is_empty() {
            return Err(RegistryError::invalid(&raw.id, "quest has no steps"));
        }

        let steps = raw
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepDefinition::from_raw(&raw.id, i, s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: raw.id.clone(),
            name: if raw.name.is_empty() {
                raw.id.clone()
            } else {
                raw.name.clone()
            },
            steps,
            completion_reward: raw.completion_reward.as_ref().map(RewardBundle::from_raw),
        })
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Key of the step at `index`
    pub fn step_key(&self, index: usize) -> Option<&str> {
        self.steps.get(index).map(|s| s.key.as_str())
    }

    /// Index of the step with the given key
    pub fn step_index(&self, key: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.key == key)
    }

    /// Dialogue node key for a step; the step key when the step names none
    pub fn node_key(&self, index: usize) -> String {
        match self.steps.get(index) {
            Some(step) => step.node.clone().unwrap_or_else(|| step.key.clone()),
            None => synthesized_step_key(index),
        }
    }

    /// Surface requested by a step, if any
    pub fn surface(&self, index: usize) -> Option<&str> {
        self.steps.get(index).and_then(|s| s.surface.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<QuestDefinition, RegistryError> {
        let raw: RawQuestFile = toml::from_str(src).unwrap();
        QuestDefinition::from_raw(&raw.quest)
    }

    #[test]
    fn test_step_keys_default_to_index() {
        let quest = parse(
            r#"
[quest]
id = "first_hunt"

[[quest.steps]]
requirement = { event = "npc_interaction", key = "elder" }

[[quest.steps]]
key = "hunt"
node = "hunt_intro"
[[quest.steps.requirements]]
event = "monster_killed"
key = "slime"
count = 3
[[quest.steps.requirements]]
event = "item_collected"
"#,
        )
        .unwrap();

        assert_eq!(quest.name, "first_hunt");
        assert_eq!(quest.step_key(0), Some("S0"));
        assert_eq!(quest.step_key(1), Some("hunt"));
        assert_eq!(quest.step_index("hunt"), Some(1));
        assert_eq!(quest.step_index("S5"), None);
        assert_eq!(quest.node_key(0), "S0");
        assert_eq!(quest.node_key(1), "hunt_intro");
        assert_eq!(quest.steps[1].condition.requirements().len(), 2);
        assert!(matches!(quest.steps[0].condition, StepCondition::Single(_)));
    }

    #[test]
    fn test_invalid_steps_rejected() {
        let both = parse(
            r#"
[quest]
id = "q"
[[quest.steps]]
requirement = { event = "a" }
requirements = [{ event = "b" }]
"#,
        );
        assert!(matches!(both, Err(RegistryError::Invalid { .. })));

        let empty_list = parse(
            r#"
[quest]
id = "q"
[[quest.steps]]
requirements = []
"#,
        );
        assert!(matches!(empty_list, Err(RegistryError::Invalid { .. })));

        let no_steps = parse("[quest]\nid = \"q\"\n");
        assert!(matches!(no_steps, Err(RegistryError::Invalid { .. })));

        let zero_count = parse(
            r#"
[quest]
id = "q"
[[quest.steps]]
requirement = { event = "a", count = 0 }
"#,
        );
        assert!(matches!(zero_count, Err(RegistryError::Invalid { .. })));
    }

    #[test]
    fn test_requirement_key_filter() {
        let any_key = RequirementDefinition::new("monster_killed", None, 1);
        assert!(any_key.matches("monster_killed", Some("slime")));
        assert!(any_key.matches("monster_killed", None));
        assert!(!any_key.matches("item_collected", Some("slime")));

        let filtered = RequirementDefinition::new("monster_killed", Some("slime"), 1);
        assert!(filtered.matches("monster_killed", Some("slime")));
        assert!(!filtered.matches("monster_killed", Some("slime_king")));
        assert!(!filtered.matches("monster_killed", None));

        // An empty filter string behaves like no filter
        let empty = RequirementDefinition::new("monster_killed", Some(""), 1);
        assert_eq!(empty.key_filter, None);
    }
}
