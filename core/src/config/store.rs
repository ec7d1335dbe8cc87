//! Persisted configuration file.
//!
//! The file is read at startup, re-read when an operator closes the
//! configuration menu, and rewritten when that check finds the running
//! bridge missing from it.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::validation::validate_config;
use super::ServerConfig;
use crate::errors::ConfigError;

/// Handle on the JSON configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the file without semantic validation.
    pub fn read(&self) -> Result<ServerConfig, ConfigError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })?;
        let config: ServerConfig = serde_json::from_str(&contents)?;
        debug!(
            "Read configuration with {} bridges from {}",
            config.bridges.len(),
            self.path.display()
        );
        Ok(config)
    }

    /// Read, parse and validate the file.
    pub fn load(&self) -> Result<ServerConfig, ConfigError> {
        let config = self.read()?;
        let errors = validate_config(&config);
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConfigError::Invalid(joined));
        }
        Ok(config)
    }

    /// Write the configuration as pretty-printed JSON.
    ///
    /// The new content goes to a sibling temporary file first and is then
    /// renamed over the original, so a crash never leaves a truncated file.
    pub fn save(&self, config: &ServerConfig) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let mut json = serde_json::to_string_pretty(config)?;
        json.push('\n');

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        info!("Saved configuration to {}", self.path.display());
        Ok(())
    }
}
