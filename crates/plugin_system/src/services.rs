//! In-process implementations of the host subsystems.
//!
//! A host can pass these straight to [`HostServices`](plugin_api::HostServices)
//! or swap any of them for its own implementation of the matching trait.

use dashmap::DashMap;
use plugin_api::{
    CommandDispatcher, CommandHandler, CommandSpec, ConfigOption, ConfigStore, EventBus,
    EventHandler, LogLevel, Logger, PluginDetails, PluginError, Priority,
};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

// ============================================================================
// Logging
// ============================================================================

/// Forwards tagged log lines to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, tag: &str, message: &str) {
        match level {
            LogLevel::Debug => debug!(tag = %tag, "{}", message),
            LogLevel::Info => info!(tag = %tag, "{}", message),
            LogLevel::Warn => warn!(tag = %tag, "{}", message),
            LogLevel::Error => error!(tag = %tag, "{}", message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub tag: String,
    pub message: String,
}

/// Keeps every log line in memory, e.g. for an admin console backlog.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.entries().iter().filter(|e| e.level == level).count()
    }

    pub fn contains(&self, level: LogLevel, fragment: &str) -> bool {
        self.entries()
            .iter()
            .any(|e| e.level == level && e.message.contains(fragment))
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, tag: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(LogEntry {
                level,
                tag: tag.to_string(),
                message: message.to_string(),
            });
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Config store holding plugin-declared defaults plus host overrides.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    overrides: DashMap<String, serde_json::Value>,
    defaults: DashMap<String, serde_json::Value>,
    /// plugin id -> declared option keys
    declared: DashMap<String, Vec<String>>,
    registrations: DashMap<String, usize>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(
        overrides: impl IntoIterator<Item = (String, serde_json::Value)>,
    ) -> Self {
        let store = Self::new();
        for (key, value) in overrides {
            store.set(key, value);
        }
        store
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.overrides.insert(key.into(), value);
    }

    /// Option keys the plugin declared at its last registration.
    pub fn declared_keys(&self, plugin_id: &str) -> Vec<String> {
        self.declared
            .get(plugin_id)
            .map(|keys| keys.value().clone())
            .unwrap_or_default()
    }

    /// How often `register_plugin` has been called for this plugin.
    pub fn registration_count(&self, plugin_id: &str) -> usize {
        self.registrations.get(plugin_id).map(|n| *n).unwrap_or(0)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn register_plugin(&self, details: &PluginDetails, options: &[ConfigOption]) {
        for option in options {
            self.defaults.insert(option.key.clone(), option.default.clone());
        }
        self.declared.insert(
            details.id.clone(),
            options.iter().map(|o| o.key.clone()).collect(),
        );
        *self.registrations.entry(details.id.clone()).or_insert(0) += 1;
    }

    fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.overrides
            .get(key)
            .or_else(|| self.defaults.get(key))
            .map(|value| value.value().clone())
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Clone)]
struct RegisteredHandler {
    owner: String,
    priority: Priority,
    handler: EventHandler,
}

/// Event bus keyed by event name, with owner-scoped handler removal.
#[derive(Default)]
pub struct EventHandlerTable {
    handlers: DashMap<String, Vec<RegisteredHandler>>,
}

impl EventHandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every handler for `event`, highest priority first.
    ///
    /// Handler errors are logged and do not stop later handlers. Returns the
    /// number of handlers that completed successfully.
    pub fn dispatch(&self, event: &str, payload: &serde_json::Value) -> usize {
        // Clone out so handlers can touch the table without deadlocking.
        let handlers = match self.handlers.get(event) {
            Some(entry) => entry.value().clone(),
            None => return 0,
        };

        let mut handled = 0;
        for registered in handlers {
            match (registered.handler)(payload) {
                Ok(()) => handled += 1,
                Err(e) => error!(
                    "Handler for {} owned by {} failed: {}",
                    event, registered.owner, e
                ),
            }
        }
        handled
    }

    pub fn handler_count(&self, owner: &str) -> usize {
        self.handlers
            .iter()
            .map(|entry| entry.value().iter().filter(|h| h.owner == owner).count())
            .sum()
    }

    pub fn total_handlers(&self) -> usize {
        self.handlers.iter().map(|entry| entry.value().len()).sum()
    }
}

impl EventBus for EventHandlerTable {
    fn add_event_handler(&self, owner: &str, event: &str, priority: Priority, handler: EventHandler) {
        let mut entry = self.handlers.entry(event.to_string()).or_default();
        entry.push(RegisteredHandler {
            owner: owner.to_string(),
            priority,
            handler,
        });
        // Stable sort keeps registration order within one priority.
        entry.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    fn remove_event_handlers(&self, owner: &str) {
        self.handlers.retain(|_, handlers| {
            handlers.retain(|h| h.owner != owner);
            !handlers.is_empty()
        });
    }
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Clone)]
struct RegisteredCommand {
    owner: String,
    spec: CommandSpec,
    handler: CommandHandler,
}

/// Command dispatcher with case-insensitive names.
///
/// A name can only be held by one plugin at a time.
#[derive(Default)]
pub struct CommandTable {
    commands: DashMap<String, RegisteredCommand>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn execute(&self, name: &str, args: &[String]) -> Result<Vec<String>, PluginError> {
        let handler = self
            .commands
            .get(&name.to_lowercase())
            .map(|command| Arc::clone(&command.handler))
            .ok_or_else(|| PluginError::ExecutionError(format!("Unknown command: {}", name)))?;

        handler(args)
    }

    /// Commands registered by one plugin, sorted by name.
    pub fn commands_of(&self, owner: &str) -> Vec<CommandSpec> {
        let mut specs: Vec<CommandSpec> = self
            .commands
            .iter()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.spec.clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        specs
    }

    pub fn owner_of(&self, name: &str) -> Option<String> {
        self.commands
            .get(&name.to_lowercase())
            .map(|command| command.owner.clone())
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl CommandDispatcher for CommandTable {
    fn register_command(
        &self,
        owner: &str,
        command: CommandSpec,
        handler: CommandHandler,
    ) -> Result<(), PluginError> {
        use dashmap::mapref::entry::Entry;

        match self.commands.entry(command.name.to_lowercase()) {
            Entry::Occupied(existing) => Err(PluginError::ExecutionError(format!(
                "Command {} is already registered by {}",
                command.name,
                existing.get().owner
            ))),
            Entry::Vacant(slot) => {
                slot.insert(RegisteredCommand {
                    owner: owner.to_string(),
                    spec: command,
                    handler,
                });
                Ok(())
            }
        }
    }

    fn unregister_commands(&self, owner: &str) {
        self.commands.retain(|_, command| command.owner != owner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_config_overrides_win_over_defaults() {
        let store = MemoryConfigStore::with_overrides([("motd".to_string(), json!("Hi"))]);
        let details = PluginDetails::new("greeter", "Greeter");
        let options = vec![
            ConfigOption::new("motd", json!("Welcome")),
            ConfigOption::new("greet_delay", json!(5)),
        ];

        store.register_plugin(&details, &options);

        assert_eq!(store.get("motd"), Some(json!("Hi")));
        assert_eq!(store.get("greet_delay"), Some(json!(5)));
        assert_eq!(store.get("unknown"), None);
        assert_eq!(store.declared_keys("greeter"), vec!["motd", "greet_delay"]);
        assert_eq!(store.registration_count("greeter"), 1);
        assert_eq!(store.registration_count("other"), 0);
    }

    #[test]
    fn test_handlers_run_by_priority_and_remove_by_owner() {
        let table = EventHandlerTable::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (owner, priority) in [("a", Priority::Low), ("b", Priority::Highest), ("a", Priority::Normal)] {
            let order = order.clone();
            let tag = format!("{}:{:?}", owner, priority);
            table.add_event_handler(
                owner,
                "round_start",
                priority,
                Arc::new(move |_: &serde_json::Value| {
                    order.lock().unwrap().push(tag.clone());
                    Ok(())
                }),
            );
        }

        assert_eq!(table.dispatch("round_start", &json!({})), 3);
        assert_eq!(
            *order.lock().unwrap(),
            vec!["b:Highest", "a:Normal", "a:Low"]
        );

        table.remove_event_handlers("a");
        assert_eq!(table.handler_count("a"), 0);
        assert_eq!(table.handler_count("b"), 1);
        assert_eq!(table.total_handlers(), 1);
    }

    #[test]
    fn test_failing_handler_does_not_stop_dispatch() {
        let table = EventHandlerTable::new();
        let calls = Arc::new(AtomicUsize::new(0));

        table.add_event_handler(
            "bad",
            "tick",
            Priority::High,
            Arc::new(|_: &serde_json::Value| -> Result<(), PluginError> {
                Err(PluginError::ExecutionError("boom".to_string()))
            }),
        );
        let counter = calls.clone();
        table.add_event_handler(
            "good",
            "tick",
            Priority::Normal,
            Arc::new(move |_: &serde_json::Value| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        );

        assert_eq!(table.dispatch("tick", &json!(null)), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(table.dispatch("no_such_event", &json!(null)), 0);
    }

    #[test]
    fn test_command_conflicts_and_owner_removal() {
        let table = CommandTable::new();
        let echo: CommandHandler = Arc::new(|args: &[String]| Ok(args.to_vec()));

        table
            .register_command("alpha", CommandSpec::new("echo"), echo.clone())
            .unwrap();
        table
            .register_command(
                "alpha",
                CommandSpec::new("ping"),
                Arc::new(|_: &[String]| Ok(vec!["pong".to_string()])),
            )
            .unwrap();
        assert!(table
            .register_command("beta", CommandSpec::new("ECHO"), echo.clone())
            .is_err());

        assert_eq!(
            table.execute("Echo", &["hello".to_string()]).unwrap(),
            vec!["hello"]
        );
        assert_eq!(table.owner_of("ping").as_deref(), Some("alpha"));
        let names: Vec<String> = table.commands_of("alpha").into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["echo", "ping"]);

        table.unregister_commands("alpha");
        assert!(table.is_empty());
        assert!(table.execute("echo", &[]).is_err());
    }

    #[test]
    fn test_memory_logger_records() {
        let logger = MemoryLogger::default();
        logger.info("PLUGIN_LOADER", "Plugin loaded: foo");
        logger.warn("foo", "careful");

        assert_eq!(logger.entries().len(), 2);
        assert_eq!(logger.count(LogLevel::Warn), 1);
        assert!(logger.contains(LogLevel::Info, "foo"));
        assert!(!logger.contains(LogLevel::Error, "foo"));
    }
}
