//! Runtime configuration
//!
//! Read once at startup from `narrative.toml` (or the file named by
//! `NARRATIVE_CONFIG`). Every field has a default, so a partial file is fine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::loader::read_toml;

pub const CONFIG_ENV: &str = "NARRATIVE_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "narrative.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct NarrativeConfig {
    /// Root holding `quests/`, `dialogue/` and `speakers.toml`
    pub data_dir: PathBuf,
    pub tick_rate_hz: u32,
    /// Surface used when a step names none
    pub default_surface: String,
    /// Surfaces the host registers at startup
    pub surfaces: Vec<String>,
    /// Auto-advance delay for lines without their own duration
    pub default_line_secs: Option<f32>,
    pub watchdog: bool,
    pub log_filter: String,
    /// Quests started as soon as the host is up
    pub autostart: Vec<String>,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            tick_rate_hz: 20,
            default_surface: "main".to_string(),
            surfaces: vec!["main".to_string()],
            default_line_secs: None,
            watchdog: true,
            log_filter: "isometric_narrative=info".to_string(),
            autostart: Vec::new(),
        }
    }
}

impl NarrativeConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            warn!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let config: Self = read_toml(path)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load from `$NARRATIVE_CONFIG`, else `narrative.toml`
    pub fn from_env() -> Result<Self, RegistryError> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(Path::new(&path))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.tick_rate_hz.max(1)))
    }

    pub fn default_line_duration(&self) -> Option<Duration> {
        self.default_line_secs
            .filter(|secs| *secs > 0.0)
            .and_then(|secs| Duration::try_from_secs_f32(secs).ok())
    }

    /// Every surface the host should register, the default one included
    pub fn surface_names(&self) -> Vec<String> {
        let mut names = self.surfaces.clone();
        if !names.contains(&self.default_surface) {
            names.push(self.default_surface.clone());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = NarrativeConfig::load(&temp_dir.path().join("narrative.toml")).unwrap();
        assert_eq!(config, NarrativeConfig::default());
        assert_eq!(config.tick_interval(), Duration::from_millis(50));
        assert_eq!(config.default_line_duration(), None);
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("narrative.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "content"
default_surface = "bubble"
default_line_secs = 1.5
watchdog = false
autostart = ["first_hunt"]
"#,
        )
        .unwrap();

        let config = NarrativeConfig::load(&path).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("content"));
        assert_eq!(config.tick_rate_hz, 20);
        assert!(!config.watchdog);
        assert_eq!(config.default_line_duration(), Some(Duration::from_millis(1500)));
        assert_eq!(config.surface_names(), vec!["main".to_string(), "bubble".to_string()]);
        assert_eq!(config.autostart, vec!["first_hunt".to_string()]);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("narrative.toml");
        std::fs::write(&path, "tick_rate_hz = \"fast\"").unwrap();
        assert!(matches!(
            NarrativeConfig::load(&path),
            Err(RegistryError::Parse { .. })
        ));
    }
}
