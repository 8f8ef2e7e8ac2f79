//! Contracts for the host subsystems a plugin manager wires plugins into.
//!
//! The plugin manager never owns configuration, events, or commands. It only
//! calls through these traits, and every registration is keyed by the id of
//! the owning plugin so that a single call can tear down everything that
//! plugin installed.

use crate::{ConfigOption, PluginDetails, PluginError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Severity levels understood by the host logging sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Tagged logging sink.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, tag: &str, message: &str);

    fn debug(&self, tag: &str, message: &str) {
        self.log(LogLevel::Debug, tag, message);
    }

    fn info(&self, tag: &str, message: &str) {
        self.log(LogLevel::Info, tag, message);
    }

    fn warn(&self, tag: &str, message: &str) {
        self.log(LogLevel::Warn, tag, message);
    }

    fn error(&self, tag: &str, message: &str) {
        self.log(LogLevel::Error, tag, message);
    }
}

/// Configuration store that plugins declare their options into.
pub trait ConfigStore: Send + Sync {
    /// Records the plugin's declared options. Called once per enable, before
    /// the plugin's `register` hook runs.
    fn register_plugin(&self, details: &PluginDetails, options: &[ConfigOption]);

    /// Current value of a configuration key, falling back to a registered
    /// default.
    fn get(&self, key: &str) -> Option<serde_json::Value>;
}

/// Event handler invoked with the event payload.
pub type EventHandler = Arc<dyn Fn(&serde_json::Value) -> Result<(), PluginError> + Send + Sync>;

/// Handler ordering within one event. Higher priorities run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
}

/// Event dispatch subsystem.
pub trait EventBus: Send + Sync {
    fn add_event_handler(&self, owner: &str, event: &str, priority: Priority, handler: EventHandler);

    /// Removes every handler owned by `owner`, and no others.
    fn remove_event_handlers(&self, owner: &str);
}

/// Command handler; receives the arguments after the command name and
/// returns the lines to print back to the caller.
pub type CommandHandler = Arc<dyn Fn(&[String]) -> Result<Vec<String>, PluginError> + Send + Sync>;

/// Description of an administrative command contributed by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub name: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub description: String,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            usage: String::new(),
            description: String::new(),
        }
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = usage.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Command registration subsystem.
pub trait CommandDispatcher: Send + Sync {
    fn register_command(
        &self,
        owner: &str,
        command: CommandSpec,
        handler: CommandHandler,
    ) -> Result<(), PluginError>;

    /// Removes every command owned by `owner`, and no others.
    fn unregister_commands(&self, owner: &str);
}

/// The set of host subsystems handed to the plugin manager at construction.
#[derive(Clone)]
pub struct HostServices {
    pub config: Arc<dyn ConfigStore>,
    pub events: Arc<dyn EventBus>,
    pub commands: Arc<dyn CommandDispatcher>,
    pub logger: Arc<dyn Logger>,
}

impl fmt::Debug for HostServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostServices").finish_non_exhaustive()
    }
}
