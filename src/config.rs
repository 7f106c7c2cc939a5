use crate::error::NodeflowError;
use crate::processing::PayloadFormat;
use crate::processing::cleaning::CleaningOptions;
use crate::processing::classify::DEFAULT_DETECTION_THRESHOLD;
use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Categorical columns with at most this many distinct values are one-hot encoded
    /// (default: 10)
    pub one_hot_threshold: usize,
    /// Fraction of values that must parse for a column to count as datetime or numeric
    pub detection_threshold: f64,
    /// Fill value for categorical columns with nothing to take a mode from
    pub unknown_label: String,
    /// "csv", "json" or "xml"
    pub default_export_format: String,
    /// Used when `RUST_LOG` is unset
    pub log_level: String,
    /// Write rolling log files under the data directory
    pub log_to_file: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        let cleaning = CleaningOptions::default();
        Self {
            one_hot_threshold: cleaning.one_hot_threshold,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
            unknown_label: cleaning.unknown_label,
            default_export_format: "csv".to_owned(),
            log_level: "info".to_owned(),
            log_to_file: true,
        }
    }
}

impl EngineSettings {
    pub fn cleaning_options(&self) -> CleaningOptions {
        CleaningOptions {
            one_hot_threshold: self.one_hot_threshold,
            detection_threshold: self.detection_threshold,
            unknown_label: self.unknown_label.clone(),
        }
    }

    /// Rejects settings the engine cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        if !(self.detection_threshold > 0.0 && self.detection_threshold <= 1.0) {
            return Err(NodeflowError::Config(format!(
                "detection_threshold must be in (0, 1], got {}",
                self.detection_threshold
            )));
        }
        if PayloadFormat::parse(&self.default_export_format).is_none() {
            return Err(NodeflowError::Config(format!(
                "Unsupported default_export_format: {}",
                self.default_export_format
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub settings: EngineSettings,
}

impl AppConfig {
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut EngineSettings {
        &mut self.settings
    }
}

pub fn get_config_path() -> Result<PathBuf> {
    let base_dir = dirs::config_dir().context("Failed to determine config directory")?;
    Ok(base_dir.join("nodeflow").join("config.json"))
}

/// Loads the config at the standard location, falling back to defaults when it is
/// missing or unreadable.
pub fn load_app_config() -> AppConfig {
    match get_config_path() {
        Ok(path) if path.exists() => load_from(&path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring unreadable config {}: {e:#}", path.display());
            AppConfig::default()
        }),
        _ => AppConfig::default(),
    }
}

/// Loads an explicit config file. Unlike [`load_app_config`] a bad file is an error.
pub fn load_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: AppConfig = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    config
        .settings
        .validate()
        .with_context(|| format!("Invalid config: {}", path.display()))?;
    Ok(config)
}

pub fn save_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.settings_mut().one_hot_threshold = 3;
        config.settings_mut().unknown_label = "n/a".to_owned();
        save_to(&config, &path)?;

        let loaded = load_from(&path)?;
        assert_eq!(loaded, config);
        assert_eq!(loaded.settings().cleaning_options().one_hot_threshold, 3);
        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"settings": {"log_level": "debug"}}"#)?;

        let loaded = load_from(&path)?;
        assert_eq!(loaded.settings.log_level, "debug");
        assert_eq!(loaded.settings.one_hot_threshold, 10);
        assert!((loaded.settings.detection_threshold - 0.9).abs() < f64::EPSILON);
        Ok(())
    }

    #[test]
    fn test_out_of_range_settings_are_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");

        std::fs::write(&path, r#"{"settings": {"detection_threshold": 1.5}}"#)?;
        let err = load_from(&path).expect_err("threshold above one");
        let cause = err.downcast_ref::<NodeflowError>().expect("config error");
        assert!(matches!(cause, NodeflowError::Config(_)), "got {cause}");

        std::fs::write(&path, r#"{"settings": {"default_export_format": "parquet"}}"#)?;
        let err = load_from(&path).expect_err("unknown format");
        assert!(
            format!("{err:#}").contains("Unsupported default_export_format: parquet"),
            "got {err:#}"
        );

        assert!(EngineSettings::default().validate().is_ok());
        Ok(())
    }

    #[test]
    fn test_bad_file_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope")?;
        assert!(load_from(&path).is_err());
        Ok(())
    }
}
