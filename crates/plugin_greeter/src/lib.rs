use plugin_api::{
    declare_plugins, CommandSpec, ConfigOption, DeclaredPlugin, Plugin, PluginContext,
    PluginDetails, PluginError, Priority,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

const MOTD_KEY: &str = "greeter.motd";
const ANNOUNCE_KEY: &str = "greeter.announce_joins";

// ============================================================================
// Greeter Plugin
// ============================================================================

/// Welcomes players as they join and answers the `greet` command.
pub struct GreeterPlugin {
    welcome_count: Arc<AtomicU32>,
}

/// Payload of the `player_joined` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerJoinedEvent {
    pub player_id: u64,
    pub name: String,
}

impl GreeterPlugin {
    pub fn new() -> Self {
        Self {
            welcome_count: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn welcome_count(&self) -> u32 {
        self.welcome_count.load(Ordering::Relaxed)
    }
}

impl Default for GreeterPlugin {
    fn default() -> Self {
        Self::new()
    }
}

fn motd(ctx: &PluginContext<'_>) -> String {
    ctx.config(MOTD_KEY)
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "Welcome!".to_string())
}

impl Plugin for GreeterPlugin {
    fn config_options(&self) -> Vec<ConfigOption> {
        vec![
            ConfigOption::new(MOTD_KEY, json!("Welcome!"))
                .describe("Message shown to every joining player"),
            ConfigOption::new(ANNOUNCE_KEY, json!(true))
                .describe("Log a line for each player that joins"),
        ]
    }

    fn register(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        let message = motd(ctx);
        let announce = ctx
            .config(ANNOUNCE_KEY)
            .and_then(|value| value.as_bool())
            .unwrap_or(true);
        let counter = self.welcome_count.clone();

        ctx.add_event_handler(
            "player_joined",
            Priority::Normal,
            Arc::new(move |payload: &serde_json::Value| -> Result<(), PluginError> {
                let event: PlayerJoinedEvent = serde_json::from_value(payload.clone())
                    .map_err(|e| PluginError::ExecutionError(e.to_string()))?;
                let count = counter.fetch_add(1, Ordering::Relaxed) + 1;
                if announce {
                    println!("{} {} (welcome #{})", message, event.name, count);
                }
                Ok(())
            }),
        );

        let message = motd(ctx);
        ctx.register_command(
            CommandSpec::new("greet")
                .usage("greet <name>")
                .description("Greets a player by name"),
            Arc::new(move |args: &[String]| -> Result<Vec<String>, PluginError> {
                let name = args
                    .first()
                    .ok_or_else(|| PluginError::ExecutionError("Usage: greet <name>".to_string()))?;
                Ok(vec![format!("{} {}", message, name)])
            }),
        )?;

        ctx.debug("Registered player_joined handler and greet command");
        Ok(())
    }

    fn on_enable(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        ctx.info(&format!("Greeter ready, motd: {}", motd(ctx)));
        Ok(())
    }

    fn on_disable(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        ctx.info(&format!(
            "Greeter shutting down after {} welcomes",
            self.welcome_count()
        ));
        Ok(())
    }
}

impl DeclaredPlugin for GreeterPlugin {
    fn details() -> PluginDetails {
        PluginDetails::new("greeter", "Greeter")
            .author("Horizon Team")
            .version(env!("CARGO_PKG_VERSION"))
            .description("Welcomes players and answers the greet command")
    }

    fn create() -> Result<Self, PluginError> {
        Ok(Self::new())
    }
}

declare_plugins!(GreeterPlugin);
