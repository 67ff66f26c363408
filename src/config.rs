//! Configuration for the TremorSense session agent.

use crate::analysis::AnalysisConfig;
use crate::core::SAMPLING_RATE_HZ;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

const APP_DIR: &str = "tremorsense-agent";

/// Main configuration for the session agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the session history and the audit log
    pub data_path: PathBuf,

    /// Directory where exported summaries are written
    pub export_path: PathBuf,

    /// Nominal sensor sampling rate reported in summaries
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate_hz: u32,

    /// External analysis service
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_sampling_rate() -> u32 {
    SAMPLING_RATE_HZ
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            export_path: data_dir.join("exports"),
            data_path: data_dir,
            sampling_rate_hz: SAMPLING_RATE_HZ,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content).map_err(ConfigError::Parse)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.json")
    }

    /// Session history file.
    pub fn history_path(&self) -> PathBuf {
        self.data_path.join("session_history.json")
    }

    /// Audit counters file.
    pub fn audit_path(&self) -> PathBuf {
        self.data_path.join("audit_log.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)?;
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
}

/// Serde support for Duration as whole seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sampling_rate_hz, 50);
        assert_eq!(config.analysis.timeout, Duration::from_secs(30));
        assert_eq!(config.analysis.retries, 1);
        assert!(config.history_path().starts_with(&config.data_path));
        assert!(config.audit_path().ends_with("audit_log.json"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"data_path":"/tmp/ts","export_path":"/tmp/ts/exports"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.sampling_rate_hz, 50);
        assert_eq!(config.analysis.timeout, Duration::from_secs(30));
        assert_eq!(config.history_path(), PathBuf::from("/tmp/ts/session_history.json"));
    }

    #[test]
    fn test_analysis_timeout_serializes_as_seconds() {
        let config = Config::default();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["analysis"]["timeout_secs"], 30);
    }

    #[test]
    fn test_ensure_directories() {
        let root = std::env::temp_dir().join(format!("tremorsense-config-{}", uuid::Uuid::new_v4()));
        let config = Config {
            data_path: root.join("data"),
            export_path: root.join("exports"),
            ..Config::default()
        };
        config.ensure_directories().unwrap();
        assert!(config.data_path.is_dir());
        assert!(config.export_path.is_dir());
        let _ = std::fs::remove_dir_all(root);
    }
}
