//! Speaker Directory
//!
//! Maps stable speaker ids to their affiliation and world anchor. The cache
//! is filled once from the directory and only rebuilt when a lookup misses.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::loader::read_toml;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affiliation {
    Ally,
    #[default]
    Neutral,
    Hostile,
}

/// What the directory knows about one speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerRecord {
    pub id: String,
    pub display_name: String,
    pub affiliation: Affiliation,
    /// World entity the speaker is anchored to (e.g., an NPC instance id)
    pub anchor: Option<String>,
}

/// External source of speaker records
pub trait SpeakerDirectory {
    fn speakers(&self) -> Vec<SpeakerRecord>;
}

/// Speaker lookups backed by a [`SpeakerDirectory`]
pub struct SpeakerCache {
    directory: Box<dyn SpeakerDirectory>,
    entries: HashMap<String, SpeakerRecord>,
    built: bool,
    rebuilds: usize,
}

impl SpeakerCache {
    pub fn new(directory: Box<dyn SpeakerDirectory>) -> Self {
        Self {
            directory,
            entries: HashMap::new(),
            built: false,
            rebuilds: 0,
        }
    }

    fn rebuild(&mut self) {
        self.entries = self
            .directory
            .speakers()
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        self.built = true;
        self.rebuilds += 1;
        debug!("Speaker cache rebuilt ({} speakers)", self.entries.len());
    }

    /// Find a speaker, rebuilding the cache once on a miss
    pub fn lookup(&mut self, speaker_id: &str) -> Option<&SpeakerRecord> {
        if !self.built || !self.entries.contains_key(speaker_id) {
            self.rebuild();
        }
        self.entries.get(speaker_id)
    }

    /// `None` when the speaker is unknown
    pub fn is_ally(&mut self, speaker_id: &str) -> Option<bool> {
        self.lookup(speaker_id)
            .map(|r| r.affiliation == Affiliation::Ally)
    }

    pub fn display_name(&mut self, speaker_id: &str) -> Option<String> {
        self.lookup(speaker_id).map(|r| r.display_name.clone())
    }

    pub fn anchor(&mut self, speaker_id: &str) -> Option<String> {
        self.lookup(speaker_id).and_then(|r| r.anchor.clone())
    }

    /// How many times the cache has been filled
    pub fn rebuild_count(&self) -> usize {
        self.rebuilds
    }
}

/// Speaker entry as it appears in `speakers.toml`
#[derive(Debug, Clone, Deserialize)]
pub struct RawSpeaker {
    pub display_name: Option<String>,
    #[serde(default)]
    pub affiliation: Affiliation,
    pub anchor: Option<String>,
}

/// Speaker directory loaded from a TOML table of `id -> speaker`
#[derive(Debug, Clone, Default)]
pub struct StaticSpeakerDirectory {
    records: Vec<SpeakerRecord>,
}

impl StaticSpeakerDirectory {
    pub fn new(records: Vec<SpeakerRecord>) -> Self {
        Self { records }
    }

    /// Load `<data_dir>/speakers.toml`; a missing file yields an empty directory
    pub fn load_from_directory(data_dir: &Path) -> Result<Self, RegistryError> {
        let path = data_dir.join("speakers.toml");
        if !path.exists() {
            warn!("Speaker file does not exist: {:?}", path);
            return Ok(Self::default());
        }

        let table: HashMap<String, RawSpeaker> = read_toml(&path)?;
        let mut records: Vec<SpeakerRecord> = table
            .into_iter()
            .map(|(id, raw)| SpeakerRecord {
                display_name: raw.display_name.unwrap_or_else(|| id.clone()),
                affiliation: raw.affiliation,
                anchor: raw.anchor,
                id,
            })
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));

        info!("Loaded {} speakers", records.len());
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl SpeakerDirectory for StaticSpeakerDirectory {
    fn speakers(&self) -> Vec<SpeakerRecord> {
        self.records.clone()
    }
}
