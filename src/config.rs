use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::divergence::{ThresholdError, Thresholds};

pub const DEFAULT_CONFIG_FILE: &str = "daily-divergence.toml";
pub const DEFAULT_CAUTION: f64 = 1.0;
pub const DEFAULT_ALERT: f64 = 2.0;
pub const DEFAULT_EXCLUDE_WINDOW_DAYS: i64 = 7;
pub const DEFAULT_TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub divergence: DivergenceSettings,
    #[serde(default)]
    pub similarity: SimilaritySettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceSettings {
    #[serde(default = "default_caution")]
    pub caution: f64,
    #[serde(default = "default_alert")]
    pub alert: f64,
}

impl Default for DivergenceSettings {
    fn default() -> Self {
        Self {
            caution: DEFAULT_CAUTION,
            alert: DEFAULT_ALERT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilaritySettings {
    #[serde(default = "default_exclude_window_days")]
    pub exclude_window_days: i64,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for SimilaritySettings {
    fn default() -> Self {
        Self {
            exclude_window_days: DEFAULT_EXCLUDE_WINDOW_DAYS,
            top_n: DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("invalid divergence thresholds: {0}")]
    Thresholds(#[from] ThresholdError),
    #[error("exclude_window_days must not be negative, got {0}")]
    NegativeWindow(i64),
}

impl Settings {
    pub fn thresholds(&self) -> Result<Thresholds, ThresholdError> {
        Thresholds::new(self.divergence.caution, self.divergence.alert)
    }
}

/// Missing file means defaults. The file is only read, never written back.
pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Settings::default());
    }

    let raw = fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&raw)?;
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    settings.thresholds()?;
    if settings.similarity.exclude_window_days < 0 {
        return Err(ConfigError::NegativeWindow(
            settings.similarity.exclude_window_days,
        ));
    }
    Ok(())
}

fn default_caution() -> f64 {
    DEFAULT_CAUTION
}

fn default_alert() -> f64 {
    DEFAULT_ALERT
}

fn default_exclude_window_days() -> i64 {
    DEFAULT_EXCLUDE_WINDOW_DAYS
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let settings = load_settings(temp.path().join(DEFAULT_CONFIG_FILE)).expect("settings");

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.divergence.caution, 1.0);
        assert_eq!(settings.similarity.top_n, 5);
        assert!(settings.thresholds().is_ok());
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);
        let raw = r#"
[divergence]
alert = 2.5

[similarity]
exclude_window_days = 14
"#;
        fs::write(&path, raw).expect("write config");

        let settings = load_settings(&path).expect("settings");

        assert_eq!(settings.divergence.caution, DEFAULT_CAUTION);
        assert_eq!(settings.divergence.alert, 2.5);
        assert_eq!(settings.similarity.exclude_window_days, 14);
        assert_eq!(settings.similarity.top_n, DEFAULT_TOP_N);
    }

    #[test]
    fn rejects_inverted_thresholds_and_negative_window() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join(DEFAULT_CONFIG_FILE);

        fs::write(&path, "[divergence]\ncaution = 3.0\nalert = 1.0\n").expect("write config");
        assert!(matches!(
            load_settings(&path),
            Err(ConfigError::Thresholds(ThresholdError::Inverted { .. }))
        ));

        fs::write(&path, "[similarity]\nexclude_window_days = -1\n").expect("write config");
        assert!(matches!(
            load_settings(&path),
            Err(ConfigError::NegativeWindow(-1))
        ));

        fs::write(&path, "[divergence\n").expect("write config");
        assert!(matches!(load_settings(&path), Err(ConfigError::TomlParse(_))));
    }
}
