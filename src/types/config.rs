//! Configuration structures.
//!
//! Configuration is loaded from a JSON config file; every section falls back
//! to its defaults when omitted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::errors::{Error, Result};

/// Global host configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Registry persistence configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Feature loading configuration.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// Interaction handler defaults.
    #[serde(default)]
    pub interactions: InteractionConfig,

    /// Opaque configuration shared with every feature.
    #[serde(default)]
    pub shared: serde_json::Value,

    /// Named channels: internal name → platform channel id.
    #[serde(default)]
    pub channels: BTreeMap<String, String>,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::config(format!("invalid config: {}", e)))
    }
}

/// Registry persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// File holding the `interactionHandlers` and `cronJobs` tables.
    pub registry_path: PathBuf,

    /// File holding feature-owned application data.
    pub data_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from("data/registry.json"),
            data_path: PathBuf::from("data/state.json"),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Feature loading configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Feature names skipped at boot.
    #[serde(default)]
    pub disabled: Vec<String>,
}

/// Interaction handler defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    /// Time-to-live applied when a feature creates a handler without one.
    /// `None` keeps such handlers alive until removed.
    #[serde(with = "humantime_serde")]
    pub default_time_to_live: Option<Duration>,

    /// Ephemeral reply sent when a component event carries an unknown or
    /// expired token.
    pub stale_message: String,

    /// Reply sent when handling an interaction fails.
    pub apology_message: String,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            default_time_to_live: None,
            stale_message: "This interaction has expired. Please start over.".to_string(),
            apology_message: "Something went wrong while handling this interaction.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.storage.registry_path, PathBuf::from("data/registry.json"));
        assert_eq!(config.observability.log_level, "info");
        assert!(config.features.disabled.is_empty());
        assert!(config.interactions.default_time_to_live.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config = Config::from_json_str(
            r#"{
                "features": {"disabled": ["polls"]},
                "interactions": {"default_time_to_live": "15m"},
                "shared": {"guild": "123"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.features.disabled, vec!["polls".to_string()]);
        assert_eq!(
            config.interactions.default_time_to_live,
            Some(Duration::from_secs(900))
        );
        assert_eq!(config.shared["guild"], "123");
        assert_eq!(config.storage.registry_path, PathBuf::from("data/registry.json"));
        assert_eq!(config.storage.data_path, PathBuf::from("data/state.json"));
        assert!(config.channels.is_empty());
    }

    #[test]
    fn test_named_channels() {
        let config = Config::from_json_str(
            r#"{"channels": {"announcements": "1180000000000000001"}, "storage": {"data_path": "var/app.json"}}"#,
        )
        .unwrap();

        assert_eq!(config.channels["announcements"], "1180000000000000001");
        assert_eq!(config.storage.data_path, PathBuf::from("var/app.json"));
        assert_eq!(config.storage.registry_path, PathBuf::from("data/registry.json"));
    }

    #[test]
    fn test_partial_section_fills_field_defaults() {
        let config = Config::from_json_str(
            r#"{"observability": {"json_logs": true}, "interactions": {"stale_message": "too late"}}"#,
        )
        .unwrap();

        assert!(config.observability.json_logs);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.interactions.stale_message, "too late");
        assert!(config.interactions.default_time_to_live.is_none());
        assert_eq!(
            config.interactions.apology_message,
            InteractionConfig::default().apology_message
        );
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let err = Config::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
