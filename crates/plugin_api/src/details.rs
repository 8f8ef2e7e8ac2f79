//! Static plugin metadata.

use crate::version::HOST_VERSION;
use serde::{Deserialize, Serialize};

/// Descriptor attached to every plugin type.
///
/// The `id` is the registry key and must be globally unique. A descriptor
/// with a blank id is never registered by the loader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDetails {
    pub id: String,
    pub name: String,
    pub author: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Host major version this plugin was built against
    pub required_major: u32,
    /// Host minor version this plugin was built against
    pub required_minor: u32,
}

impl PluginDetails {
    /// Creates a descriptor targeting the current [`HOST_VERSION`].
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            author: String::new(),
            version: "0.1.0".to_string(),
            description: String::new(),
            required_major: HOST_VERSION.major,
            required_minor: HOST_VERSION.minor,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn requires(mut self, major: u32, minor: u32) -> Self {
        self.required_major = major;
        self.required_minor = minor;
        self
    }

    /// Returns `true` when the descriptor carries a usable id.
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }

    /// Case-sensitive substring match against the name or the author.
    pub fn matches(&self, query: &str) -> bool {
        self.name.contains(query) || self.author.contains(query)
    }
}

/// A configuration key declared by a plugin, with its default value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigOption {
    pub key: String,
    pub default: serde_json::Value,
    #[serde(default)]
    pub description: String,
}

impl ConfigOption {
    pub fn new(key: impl Into<String>, default: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            default,
            description: String::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
