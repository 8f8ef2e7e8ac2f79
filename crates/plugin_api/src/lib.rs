//! # Plugin API
//!
//! Shared types between the plugin host and dynamically loaded plugins.
//!
//! A plugin artifact is a `cdylib` that exports two symbols, both generated
//! by [`declare_plugins!`]:
//!
//! - `plugin_abi_version` returns [`PLUGIN_ABI_VERSION`]; the host refuses
//!   artifacts whose marker differs from its own.
//! - `register_plugins` fills a [`PluginRegistrar`] with one
//!   [`PluginDeclaration`] per plugin type: descriptor plus constructor.
//!
//! The host instantiates the declared types, checks each descriptor against
//! its [`VersionInfo`], and drives the plugin through its hooks:
//!
//! 1. [`ConfigStore::register_plugin`] with the plugin's [`ConfigOption`]s
//! 2. [`Plugin::register`] to wire commands and event handlers
//! 3. [`Plugin::on_enable`]
//! 4. ... operation ...
//! 5. [`Plugin::on_disable`], after which the host removes every handler and
//!    command the plugin owns
//!
//! ## Writing a plugin
//!
//! ```rust,ignore
//! use plugin_api::*;
//! use std::sync::Arc;
//!
//! #[derive(Default)]
//! struct MotdPlugin;
//!
//! impl Plugin for MotdPlugin {
//!     fn config_options(&self) -> Vec<ConfigOption> {
//!         vec![ConfigOption::new("motd_text", serde_json::json!("Welcome!"))]
//!     }
//!
//!     fn register(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
//!         ctx.register_command(
//!             CommandSpec::new("motd"),
//!             Arc::new(|_args| Ok(vec!["Welcome!".to_string()])),
//!         )
//!     }
//!
//!     fn on_enable(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError> {
//!         ctx.info("MOTD ready");
//!         Ok(())
//!     }
//!
//!     fn on_disable(&mut self, _ctx: &PluginContext<'_>) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! impl DeclaredPlugin for MotdPlugin {
//!     fn details() -> PluginDetails {
//!         PluginDetails::new("motd", "Message of the Day").author("Horizon Team")
//!     }
//!
//!     fn create() -> Result<Self, PluginError> {
//!         Ok(MotdPlugin)
//!     }
//! }
//!
//! declare_plugins!(MotdPlugin);
//! ```

pub mod details;
pub mod host;
mod macros;
pub mod plugin;
pub mod version;

pub use details::{ConfigOption, PluginDetails};
pub use host::{
    CommandDispatcher, CommandHandler, CommandSpec, ConfigStore, EventBus, EventHandler,
    HostServices, LogLevel, Logger, Priority,
};
pub use plugin::{
    panic_to_error, AbiVersionFn, DeclaredPlugin, Plugin, PluginConstructor, PluginContext,
    PluginDeclaration, PluginRegistrar, RegisterPluginsFn, ABI_VERSION_SYMBOL,
    PLUGIN_ABI_VERSION, REGISTER_SYMBOL,
};
pub use version::{VersionInfo, HOST_VERSION};

/// Errors raised by plugin code.
///
/// # Error Categories
///
/// - **InitializationFailed**: a constructor refused to build the plugin
/// - **ExecutionError**: a hook or handler failed while running
/// - **Runtime**: a panic or other unexpected runtime condition
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Plugin could not be constructed
    #[error("Plugin initialization failed: {0}")]
    InitializationFailed(String),
    /// Error occurred during plugin execution
    #[error("Plugin execution error: {0}")]
    ExecutionError(String),
    /// Runtime error such as panic or system failure
    #[error("Plugin runtime error: {0}")]
    Runtime(String),
}
