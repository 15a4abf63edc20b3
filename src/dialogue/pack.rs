//! Dialogue Pack Registry
//!
//! One pack per quest, each holding the nodes for that quest's steps.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::node::DialogueNode;
use crate::error::RegistryError;
use crate::loader::{collect_toml_files, read_toml};

/// A pack file as it appears in TOML
#[derive(Debug, Clone, Deserialize)]
pub struct RawPackFile {
    pub quest_id: String,
    #[serde(default)]
    pub nodes: Vec<DialogueNode>,
}

/// Dialogue nodes for a single quest
#[derive(Debug, Clone, Default)]
pub struct DialoguePack {
    pub quest_id: String,
    nodes: HashMap<String, Arc<DialogueNode>>,
}

impl DialoguePack {
    pub fn new(quest_id: impl Into<String>) -> Self {
        Self {
            quest_id: quest_id.into(),
            nodes: HashMap::new(),
        }
    }

    pub fn from_raw(raw: RawPackFile) -> Self {
        let mut pack = Self::new(raw.quest_id);
        for node in raw.nodes {
            pack.insert(node);
        }
        pack
    }

    pub fn insert(&mut self, node: DialogueNode) {
        if self.nodes.contains_key(&node.key) {
            warn!(
                "Duplicate node '{}' in pack '{}', overwriting",
                node.key, self.quest_id
            );
        }
        self.nodes.insert(node.key.clone(), Arc::new(node));
    }

    pub fn find_node(&self, key: &str) -> Option<Arc<DialogueNode>> {
        self.nodes.get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// `next` keys that name no node in this pack
    pub fn dangling_next_keys(&self) -> Vec<(&str, &str)> {
        self.nodes
            .values()
            .filter_map(|node| {
                let next = node.next_key()?;
                (!self.nodes.contains_key(next)).then_some((node.key.as_str(), next))
            })
            .collect()
    }
}

/// Resolves `(quest_id, node_key)` to a node
pub trait NodeSource {
    fn get_pack(&self, quest_id: &str) -> Option<&DialoguePack>;

    /// Look up a node, logging which part of the lookup missed
    fn resolve_node(&self, quest_id: &str, node_key: &str) -> Option<Arc<DialogueNode>> {
        let Some(pack) = self.get_pack(quest_id) else {
            warn!("No dialogue pack for quest '{}'", quest_id);
            return None;
        };
        let node = pack.find_node(node_key);
        if node.is_none() {
            warn!("Dialogue pack '{}' has no node '{}'", quest_id, node_key);
        }
        node
    }
}

/// Registry for all dialogue packs
pub struct PackRegistry {
    packs: HashMap<String, DialoguePack>,
}

impl PackRegistry {
    pub fn new() -> Self {
        Self {
            packs: HashMap::new(),
        }
    }

    /// Load every pack under `<data_dir>/dialogue`
    pub fn load_from_directory(&mut self, data_dir: &Path) -> Result<usize, RegistryError> {
        let dialogue_dir = data_dir.join("dialogue");

        if !dialogue_dir.exists() {
            warn!("Dialogue directory does not exist: {:?}", dialogue_dir);
            return Ok(0);
        }

        let mut paths = Vec::new();
        collect_toml_files(&dialogue_dir, &mut paths)?;
        paths.sort();

        let mut count = 0;
        for path in paths {
            match read_toml::<RawPackFile>(&path) {
                Ok(raw) => {
                    self.insert(DialoguePack::from_raw(raw));
                    count += 1;
                }
                Err(e) => warn!("Failed to load dialogue pack {:?}: {}", path, e),
            }
        }

        info!("Loaded {} dialogue packs", count);
        Ok(count)
    }

    pub fn insert(&mut self, pack: DialoguePack) {
        for (node, next) in pack.dangling_next_keys() {
            warn!(
                "Node '{}' in pack '{}' points at missing next node '{}'",
                node, pack.quest_id, next
            );
        }
        if self.packs.contains_key(&pack.quest_id) {
            warn!("Duplicate dialogue pack '{}', overwriting", pack.quest_id);
        }
        info!("Loaded dialogue pack: {} ({} nodes)", pack.quest_id, pack.len());
        self.packs.insert(pack.quest_id.clone(), pack);
    }

    pub fn len(&self) -> usize {
        self.packs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }
}

impl Default for PackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeSource for PackRegistry {
    fn get_pack(&self, quest_id: &str) -> Option<&DialoguePack> {
        self.packs.get(quest_id)
    }
}
