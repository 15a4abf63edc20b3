//! Quest progression and dialogue playback for the isometric game.
//!
//! Quests advance on domain events; each step change opens the step's
//! dialogue node on a surface, filtered through the ally branch resolver.
//! Hosts drive everything through [`Narrative::tick`].

pub mod config;
pub mod dialogue;
pub mod error;
pub mod loader;
pub mod narrative;
pub mod quest;
pub mod speaker;

pub use config::NarrativeConfig;
pub use error::{QuestError, RegistryError, SessionError};
pub use narrative::{Narrative, RewardSink};
