//! Shared TOML file helpers for the content registries

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::RegistryError;

/// Recursively collect `.toml` files under `dir`
pub fn collect_toml_files(dir: &Path, paths: &mut Vec<PathBuf>) -> Result<(), RegistryError> {
    let entries = std::fs::read_dir(dir).map_err(|source| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| RegistryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();

        if path.is_dir() {
            collect_toml_files(&path, paths)?;
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            paths.push(path);
        }
    }

    Ok(())
}

/// Read and parse a TOML file into `T`
pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, RegistryError> {
    let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| RegistryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
