//! Configuration management for the plugin host.
//!
//! This module handles loading and validation of host configuration from
//! TOML files. A missing file is created with default contents.

use anyhow::Context;
use plugin_system::{LoaderConfig, MemoryConfigStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Plugin loading settings
    pub plugins: PluginSettings,
    /// Logging configuration settings
    pub logging: LoggingSettings,
    /// Values handed to plugins through their config store, keyed by option
    /// key. These override the defaults plugins declare.
    #[serde(default)]
    pub plugin_config: BTreeMap<String, serde_json::Value>,
}

/// Plugin system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSettings {
    /// Directory path where plugin files are located
    pub directory: String,
    /// File extensions recognised as plugin artifacts
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Whether to enable every loaded plugin on startup
    #[serde(default = "default_auto_enable")]
    pub auto_enable: bool,
}

fn default_extensions() -> Vec<String> {
    LoaderConfig::default().extensions
}

fn default_auto_enable() -> bool {
    true
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            plugins: PluginSettings {
                directory: "plugins".to_string(),
                extensions: default_extensions(),
                auto_enable: true,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                json_format: false,
            },
            plugin_config: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let config: AppConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content)
                .await
                .with_context(|| format!("writing default config to {}", path.display()))?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn plugin_directory(&self) -> PathBuf {
        PathBuf::from(&self.plugins.directory)
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            extensions: self.plugins.extensions.clone(),
        }
    }

    /// Config store pre-seeded with the `[plugin_config]` overrides.
    pub fn config_store(&self) -> MemoryConfigStore {
        MemoryConfigStore::with_overrides(self.plugin_config.clone())
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.plugins.directory.trim().is_empty() {
            return Err("Plugin directory cannot be empty".to_string());
        }

        if self.plugins.extensions.is_empty() {
            return Err("At least one plugin extension is required".to_string());
        }
        if let Some(bad) = self
            .plugins
            .extensions
            .iter()
            .find(|ext| ext.trim_start_matches('.').is_empty())
        {
            return Err(format!("Invalid plugin extension: '{}'", bad));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_api::ConfigStore;
    use serde_json::json;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();

        assert_eq!(config.plugins.directory, "plugins");
        assert!(config.plugins.auto_enable);
        assert_eq!(config.plugins.extensions, LoaderConfig::default().extensions);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
        assert!(config.plugin_config.is_empty());
    }

    #[tokio::test]
    async fn test_load_from_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin_host.toml");

        let config = AppConfig::load_from_file(&path).await.unwrap();

        assert_eq!(config.plugins.directory, "plugins");
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded.plugins.directory, config.plugins.directory);
        assert_eq!(reloaded.plugins.extensions, config.plugins.extensions);
    }

    #[tokio::test]
    async fn test_load_from_existing_file() {
        let toml_content = r#"
[plugins]
directory = "custom_plugins"
extensions = ["plugin", "so"]
auto_enable = false

[logging]
level = "debug"
json_format = true

[plugin_config]
"greeter.motd" = "Welcome aboard"
"greeter.max_greetings" = 3
"#;

        let temp_file = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), toml_content).await.unwrap();

        let config = AppConfig::load_from_file(temp_file.path()).await.unwrap();

        assert_eq!(config.plugin_directory(), PathBuf::from("custom_plugins"));
        assert_eq!(config.loader_config().extensions, vec!["plugin", "so"]);
        assert!(!config.plugins.auto_enable);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.plugin_config["greeter.motd"], json!("Welcome aboard"));
        assert_eq!(config.plugin_config["greeter.max_greetings"], json!(3));
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_toml() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "[plugins\ndirectory = ").await.unwrap();

        let result = AppConfig::load_from_file(temp_file.path()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_serde_deserialization_with_defaults() {
        let toml_content = r#"
[plugins]
directory = "plugins"

[logging]
level = "warn"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();

        assert!(config.plugins.auto_enable);
        assert_eq!(config.plugins.extensions, default_extensions());
        assert!(!config.logging.json_format);
        assert!(config.plugin_config.is_empty());
    }

    #[test]
    fn test_config_store_uses_overrides() {
        let mut config = AppConfig::default();
        config
            .plugin_config
            .insert("greeter.motd".to_string(), json!("Hi there"));

        let store = config.config_store();
        assert_eq!(store.get("greeter.motd"), Some(json!("Hi there")));
        assert_eq!(store.get("greeter.other"), None);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_empty_plugin_directory() {
        let mut config = AppConfig::default();
        config.plugins.directory = "  ".to_string();

        let result = config.validate();
        assert!(result.unwrap_err().contains("Plugin directory cannot be empty"));
    }

    #[test]
    fn test_validation_bad_extensions() {
        let mut config = AppConfig::default();
        config.plugins.extensions.clear();
        assert!(config.validate().is_err());

        config.plugins.extensions = vec![".".to_string()];
        let result = config.validate();
        assert!(result.unwrap_err().contains("Invalid plugin extension"));
    }

    #[test]
    fn test_validation_log_levels() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            let mut config = AppConfig::default();
            config.logging.level = level.to_string();
            assert!(config.validate().is_ok(), "Level '{}' should be valid", level);
        }

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().unwrap_err().contains("Invalid log level"));
    }
}
