//! Error types shared across the quest and dialogue engines.

use std::path::PathBuf;
use thiserror::Error;

/// Failures from quest control operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QuestError {
    #[error("Quest '{0}' is not registered")]
    UnknownQuest(String),

    #[error("Quest '{0}' is already completed")]
    AlreadyCompleted(String),

    #[error("Quest '{0}' is not active")]
    NotActive(String),

    /// A step transition left `[0, step_count]`
    #[error("Quest '{quest_id}' cannot move to step {index} (step count {step_count})")]
    StepOutOfRange {
        quest_id: String,
        index: usize,
        step_count: usize,
    },
}

/// Failures while loading content files
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid definition '{id}': {reason}")]
    Invalid { id: String, reason: String },
}

impl RegistryError {
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

/// Reasons a dialogue session could not be opened
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Surface '{0}' is not registered")]
    UnknownSurface(String),

    #[error("Surface '{0}' already has a session in flight")]
    SurfaceBusy(String),

    #[error("Surface '{0}' does not report closed")]
    SurfaceNotClosed(String),

    #[error("Line source for surface '{0}' produced no lines")]
    EmptyLineSource(String),
}
