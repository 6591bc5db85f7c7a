//! CLI configuration management.
//!
//! Optional defaults live in `~/.hookr/config.json`. Command-line flags and
//! environment variables always win over the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::output::OutputFormat;

/// Persistent CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CliConfig {
    /// Service WebSocket URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Default output format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    /// Default file to append received events to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save: Option<PathBuf>,
    /// Handshake timeout in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
    /// Reconnect after unexpected drops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_attempts: Option<u32>,
}

impl CliConfig {
    /// Path to the config file: `~/.hookr/config.json`.
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".hookr").join("config.json"))
    }

    /// Load config from disk. Returns default if file doesn't exist or is invalid.
    pub fn load() -> Self {
        Self::config_path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default()
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(contents) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring invalid config file");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_empty() {
        let cfg = CliConfig::default();
        assert!(cfg.url.is_none());
        assert!(cfg.format.is_none());
        assert_eq!(serde_json::to_string(&cfg).unwrap(), "{}");
    }

    #[test]
    fn loads_every_field_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "url": "ws://localhost:8080/events",
                "format": "json",
                "save": "/tmp/hooks.ndjson",
                "connect_timeout_secs": 3,
                "reconnect": false,
                "max_reconnect_attempts": 9
            }"#,
        )
        .unwrap();
        let expected = CliConfig {
            url: Some("ws://localhost:8080/events".into()),
            format: Some(OutputFormat::Json),
            save: Some(PathBuf::from("/tmp/hooks.ndjson")),
            connect_timeout_secs: Some(3),
            reconnect: Some(false),
            max_reconnect_attempts: Some(9),
        };
        assert_eq!(CliConfig::load_from(&path), expected);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            CliConfig::load_from(&dir.path().join("nope.json")),
            CliConfig::default()
        );
    }

    #[test]
    fn invalid_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(CliConfig::load_from(&path), CliConfig::default());
    }

    #[test]
    fn format_uses_lowercase_names() {
        let cfg: CliConfig = serde_json::from_str(r#"{"format":"pretty"}"#).unwrap();
        assert_eq!(cfg.format, Some(OutputFormat::Pretty));
    }
}
