//! Quest Registry
//!
//! Loads and caches quest definitions from TOML files. Definitions are
//! read-only once loaded.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::definition::{QuestDefinition, RawQuestFile};
use crate::error::RegistryError;
use crate::loader::{collect_toml_files, read_toml};

/// Registry for all quest definitions
pub struct QuestRegistry {
    quests: HashMap<String, Arc<QuestDefinition>>,
}

impl QuestRegistry {
    pub fn new() -> Self {
        Self {
            quests: HashMap::new(),
        }
    }

    /// Load all quest definitions from `<data_dir>/quests`, recursively
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<usize, RegistryError> {
        let quests_dir = data_dir.join("quests");
        info!("Loading quests from {:?}", quests_dir);

        if !quests_dir.exists() {
            warn!("Quest directory does not exist: {:?}", quests_dir);
            return Ok(0);
        }

        let mut paths = Vec::new();
        collect_toml_files(&quests_dir, &mut paths)?;
        paths.sort();

        let mut count = 0;
        for path in paths {
            match load_quest_file(&path) {
                Ok(quest) => {
                    self.insert(quest);
                    count += 1;
                }
                Err(e) => warn!("Failed to load quest {:?}: {}", path, e),
            }
        }

        info!("Loaded {} quest definitions", count);
        Ok(count)
    }

    /// Add a definition, replacing any with the same id
    pub fn insert(&mut self, quest: QuestDefinition) -> Arc<QuestDefinition> {
        if self.quests.contains_key(&quest.id) {
            warn!("Duplicate quest ID '{}', overwriting", quest.id);
        }
        info!("Loaded quest: {} ({}, {} steps)", quest.name, quest.id, quest.step_count());
        let quest = Arc::new(quest);
        self.quests.insert(quest.id.clone(), Arc::clone(&quest));
        quest
    }

    /// Get a quest by ID
    pub fn get(&self, quest_id: &str) -> Option<Arc<QuestDefinition>> {
        self.quests.get(quest_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.quests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty()
    }
}

impl Default for QuestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn load_quest_file(path: &Path) -> Result<QuestDefinition, RegistryError> {
    let raw: RawQuestFile = read_toml(path)?;
    QuestDefinition::from_raw(&raw.quest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_quest_toml() -> &'static str {
        r#"
[quest]
id = "test_quest"
name = "Test Quest"

[[quest.steps]]
requirement = { event = "npc_interaction", key = "test_npc" }

[[quest.steps]]
[[quest.steps.requirements]]
event = "monster_killed"
key = "slime"
count = 3

[quest.completion_reward]
exp = 50
gold = 25
"#
    }

    #[test]
    fn test_load_quest() {
        let temp_dir = TempDir::new().unwrap();
        let quest_dir = temp_dir.path().join("quests").join("chapter1");
        std::fs::create_dir_all(&quest_dir).unwrap();

        std::fs::write(quest_dir.join("test.toml"), create_test_quest_toml()).unwrap();
        std::fs::write(quest_dir.join("broken.toml"), "[quest\nid=").unwrap();
        std::fs::write(quest_dir.join("notes.txt"), "ignored").unwrap();

        let mut registry = QuestRegistry::new();
        assert_eq!(registry.load_from_directory(temp_dir.path()).unwrap(), 1);

        let quest = registry.get("test_quest").unwrap();
        assert_eq!(quest.name, "Test Quest");
        assert_eq!(quest.step_count(), 2);
        assert_eq!(quest.completion_reward.as_ref().unwrap().exp, 50);
        assert!(registry.get("broken").is_none());
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let mut registry = QuestRegistry::new();
        assert_eq!(registry.load_from_directory(temp_dir.path()).unwrap(), 0);
        assert!(registry.is_empty());
    }
}
