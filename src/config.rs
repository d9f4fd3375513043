// Application configuration
// JSON settings file; every field is optional and falls back to app-data defaults

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::audio::ANALYSIS_SAMPLE_RATE;
use crate::state::storage::{get_app_data_dir, StorageError};

/// Config file name inside the app data directory
pub const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding `emotion_model.json` and `scaler.json`
    pub model_dir: Option<PathBuf>,

    /// Train and save a synthetic model when no artifacts exist
    pub bootstrap_if_missing: bool,

    /// SQLite database for recordings and analyses
    pub database_path: Option<PathBuf>,

    /// Root for stored recordings (`audio_uploads/YYYY/MM/DD/...`)
    pub storage_dir: Option<PathBuf>,

    /// Write a JSONL trace per analysis into this directory
    pub trace_dir: Option<PathBuf>,

    /// Rate used when a non-WAV file has to be resampled
    pub target_sample_rate: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            model_dir: None,
            bootstrap_if_missing: true,
            database_path: None,
            storage_dir: None,
            trace_dir: None,
            target_sample_rate: ANALYSIS_SAMPLE_RATE,
        }
    }
}

impl AppConfig {
    /// Load from `path`; a missing file gives defaults
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(AppConfig::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load from `path`, warning and using defaults if it can't be read
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(config) => {
                log::debug!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to load config from {}: {}. Using defaults", path.display(), e);
                AppConfig::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        Ok(get_app_data_dir()?.join(CONFIG_FILE_NAME))
    }

    pub fn resolved_model_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.model_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_app_data_dir()?.join("model")),
        }
    }

    pub fn resolved_database_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(get_app_data_dir()?.join("vocalis.db")),
        }
    }

    pub fn resolved_storage_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(get_app_data_dir()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("nope.json"));
        assert_eq!(config, AppConfig::default());
        assert!(config.bootstrap_if_missing);
        assert_eq!(config.target_sample_rate, 22050);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "model_dir": "/opt/models", "bootstrap_if_missing": false }"#).unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.model_dir, Some(PathBuf::from("/opt/models")));
        assert!(!config.bootstrap_if_missing);
        assert_eq!(config.target_sample_rate, 22050);
        assert_eq!(config.resolved_model_dir().unwrap(), PathBuf::from("/opt/models"));
    }

    #[test]
    fn test_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(AppConfig::try_load(&path), Err(ConfigError::Parse(_))));
        assert_eq!(AppConfig::load(&path), AppConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = AppConfig {
            trace_dir: Some(dir.path().join("traces")),
            target_sample_rate: 16000,
            ..AppConfig::default()
        };

        config.save(&path).unwrap();
        assert_eq!(AppConfig::try_load(&path).unwrap(), config);
    }
}
