//! Plugin trait, hook context, and the artifact registration protocol.

use crate::host::{CommandHandler, CommandSpec, EventHandler, HostServices, LogLevel, Priority};
use crate::{ConfigOption, PluginDetails, PluginError};
use std::any::type_name;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// ABI marker compared by the loader before calling into an artifact.
///
/// Artifacts built against a different `plugin_api` release are refused
/// before any of their code runs.
pub const PLUGIN_ABI_VERSION: &str = concat!("plugin_api/", env!("CARGO_PKG_VERSION"), "\0");

/// Symbol exporting [`PLUGIN_ABI_VERSION`] as a NUL-terminated C string.
pub const ABI_VERSION_SYMBOL: &[u8] = b"plugin_abi_version\0";

/// Symbol of the registration entry point, see [`RegisterPluginsFn`].
pub const REGISTER_SYMBOL: &[u8] = b"register_plugins\0";

/// Signature of the exported ABI marker.
pub type AbiVersionFn = unsafe extern "C" fn() -> *const c_char;

/// Signature of the exported registration entry point. Returns `false` if
/// the artifact failed while declaring its plugins.
#[allow(improper_ctypes_definitions)]
pub type RegisterPluginsFn = unsafe extern "C" fn(registrar: &mut PluginRegistrar) -> bool;

/// A loadable plugin.
///
/// Hooks run synchronously on the thread driving the plugin manager. An
/// error returned from a hook is not swallowed: it propagates to whoever
/// asked for the lifecycle transition.
pub trait Plugin: Send + Sync {
    /// Configuration keys this plugin reads, registered before [`Plugin::register`].
    fn config_options(&self) -> Vec<ConfigOption> {
        Vec::new()
    }

    /// Wires the plugin's commands and event handlers.
    fn register(&mut self, _ctx: &PluginContext<'_>) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_enable(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError>;

    fn on_disable(&mut self, ctx: &PluginContext<'_>) -> Result<(), PluginError>;
}

/// Handle given to every hook.
///
/// Everything registered through it is owned by the plugin it was created
/// for, so the host can remove it again on disable.
pub struct PluginContext<'a> {
    details: &'a PluginDetails,
    services: &'a HostServices,
}

impl<'a> PluginContext<'a> {
    pub fn new(details: &'a PluginDetails, services: &'a HostServices) -> Self {
        Self { details, services }
    }

    pub fn details(&self) -> &PluginDetails {
        self.details
    }

    pub fn config(&self, key: &str) -> Option<serde_json::Value> {
        self.services.config.get(key)
    }

    pub fn add_event_handler(&self, event: &str, priority: Priority, handler: EventHandler) {
        self.services
            .events
            .add_event_handler(&self.details.id, event, priority, handler);
    }

    pub fn register_command(
        &self,
        command: CommandSpec,
        handler: CommandHandler,
    ) -> Result<(), PluginError> {
        self.services
            .commands
            .register_command(&self.details.id, command, handler)
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        self.services.logger.log(level, &self.details.id, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// A plugin type that carries its own descriptor and constructor.
///
/// Implement this for every type listed in [`crate::declare_plugins!`].
pub trait DeclaredPlugin: Plugin + Sized + 'static {
    fn details() -> PluginDetails;

    fn create() -> Result<Self, PluginError>;
}

/// Constructor stored in a declaration.
pub type PluginConstructor = fn() -> Result<Box<dyn Plugin>, PluginError>;

/// One plugin type offered by an artifact.
#[derive(Clone)]
pub struct PluginDeclaration {
    pub type_name: &'static str,
    /// `None` when the type was declared without a descriptor.
    pub details: Option<PluginDetails>,
    pub constructor: PluginConstructor,
}

impl PluginDeclaration {
    pub fn of<T: DeclaredPlugin>() -> Self {
        Self {
            type_name: type_name::<T>(),
            details: Some(T::details()),
            constructor: construct::<T>,
        }
    }

    /// Runs the constructor, turning a panic into [`PluginError::Runtime`].
    pub fn instantiate(&self) -> Result<Box<dyn Plugin>, PluginError> {
        catch_unwind(AssertUnwindSafe(|| (self.constructor)())).map_err(panic_to_error)?
    }
}

impl std::fmt::Debug for PluginDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDeclaration")
            .field("type_name", &self.type_name)
            .field("details", &self.details)
            .finish_non_exhaustive()
    }
}

fn construct<T: DeclaredPlugin>() -> Result<Box<dyn Plugin>, PluginError> {
    T::create().map(|plugin| Box::new(plugin) as Box<dyn Plugin>)
}

/// Collects the declarations an artifact hands to the host.
#[derive(Debug, Default)]
pub struct PluginRegistrar {
    declarations: Vec<PluginDeclaration>,
}

impl PluginRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, declaration: PluginDeclaration) {
        self.declarations.push(declaration);
    }

    pub fn declare_type<T: DeclaredPlugin>(&mut self) {
        self.declare(PluginDeclaration::of::<T>());
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    pub fn into_declarations(self) -> Vec<PluginDeclaration> {
        self.declarations
    }
}

/// Converts a panic payload into a structured error.
pub fn panic_to_error(payload: Box<dyn std::any::Any + Send>) -> PluginError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Plugin panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Plugin panicked: {}", s)
    } else {
        "Plugin panicked with unknown error".to_string()
    };

    PluginError::Runtime(message)
}
