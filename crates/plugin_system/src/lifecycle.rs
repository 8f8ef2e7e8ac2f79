//! Enable/disable transitions and their side effects on host subsystems.
//!
//! Enabling a plugin runs, in order: config registration, the `register`
//! hook, the `on_enable` hook, and finally the move to the enabled bucket.
//! Disabling runs `on_disable`, removes the plugin's event handlers and
//! commands, then moves it back to the disabled bucket. A failing hook aborts
//! the transition and leaves the plugin where it was.

use crate::error::{Hook, ManagerError};
use crate::registry::{PluginState, Registry};
use crate::LOADER_TAG;
use plugin_api::{HostServices, PluginContext, PluginDetails, PluginError};

pub struct LifecycleController {
    services: HostServices,
}

impl LifecycleController {
    pub fn new(services: HostServices) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &HostServices {
        &self.services
    }

    /// Enables every disabled plugin in load order.
    ///
    /// Stops at the first hook failure: plugins before it stay enabled, the
    /// failing plugin and everything after it stay disabled.
    pub fn enable_all(&self, registry: &mut Registry) -> Result<Vec<String>, ManagerError> {
        let pending = registry.ids(PluginState::Disabled);
        let mut enabled = Vec::with_capacity(pending.len());

        for id in pending {
            self.enable(registry, &id)?;
            enabled.push(id);
        }

        Ok(enabled)
    }

    pub fn enable_one(&self, registry: &mut Registry, id: &str) -> Result<(), ManagerError> {
        if registry.get_disabled(id).is_none() {
            return Err(ManagerError::NotFound(id.to_string()));
        }
        self.enable(registry, id)
    }

    /// Disables every enabled plugin, most recently loaded first.
    pub fn disable_all(&self, registry: &mut Registry) -> Result<Vec<String>, ManagerError> {
        let mut active = registry.ids(PluginState::Enabled);
        active.reverse();
        let mut disabled = Vec::with_capacity(active.len());

        for id in active {
            self.disable(registry, &id)?;
            disabled.push(id);
        }

        Ok(disabled)
    }

    /// Disables one plugin. Returns `Ok(false)` without touching anything
    /// when `id` is not currently enabled.
    pub fn disable_one(&self, registry: &mut Registry, id: &str) -> Result<bool, ManagerError> {
        if registry.get_enabled(id).is_none() {
            self.services.logger.debug(
                LOADER_TAG,
                &format!("Plugin {} is not enabled, nothing to disable", id),
            );
            return Ok(false);
        }
        self.disable(registry, id)?;
        Ok(true)
    }

    /// Disables every enabled plugin for host shutdown, most recently loaded
    /// first.
    ///
    /// Unlike [`disable_all`](Self::disable_all) a failing `on_disable` does
    /// not stop the pass, and the failing plugin's event handlers and
    /// commands are still removed: once the host drops the plugin and unloads
    /// its library, nothing may point into that code. Returns the hook
    /// failures that occurred.
    pub fn teardown_all(&self, registry: &mut Registry) -> Vec<ManagerError> {
        let mut active = registry.ids(PluginState::Enabled);
        active.reverse();
        let mut failures = Vec::new();

        for id in active {
            if let Err(e) = self.disable(registry, &id) {
                self.release(&id);
                failures.push(e);
            }
        }

        failures
    }

    fn enable(&self, registry: &mut Registry, id: &str) -> Result<(), ManagerError> {
        {
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
            let (details, plugin) = entry.parts_mut();

            self.services.logger.info(
                LOADER_TAG,
                &format!("Enabling plugin {} {}", details.name, details.version),
            );

            let ctx = PluginContext::new(details, &self.services);
            self.services
                .config
                .register_plugin(details, &plugin.config_options());

            if let Err(source) = plugin.register(&ctx) {
                self.release(&details.id);
                return Err(self.hook_failed(details, Hook::Register, source));
            }
            if let Err(source) = plugin.on_enable(&ctx) {
                self.release(&details.id);
                return Err(self.hook_failed(details, Hook::Enable, source));
            }
        }

        registry.move_disabled_to_enabled(id)?;
        self.services
            .logger
            .info(LOADER_TAG, &format!("Plugin enabled: {}", id));
        Ok(())
    }

    fn disable(&self, registry: &mut Registry, id: &str) -> Result<(), ManagerError> {
        {
            let entry = registry
                .get_mut(id)
                .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
            let (details, plugin) = entry.parts_mut();

            self.services.logger.info(
                LOADER_TAG,
                &format!("Disabling plugin {} {}", details.name, details.version),
            );

            let ctx = PluginContext::new(details, &self.services);
            if let Err(source) = plugin.on_disable(&ctx) {
                return Err(self.hook_failed(details, Hook::Disable, source));
            }
            self.release(&details.id);
        }

        registry.move_enabled_to_disabled(id)?;
        self.services
            .logger
            .info(LOADER_TAG, &format!("Plugin disabled: {}", id));
        Ok(())
    }

    /// Drops every event handler and command owned by the plugin.
    fn release(&self, id: &str) {
        self.services.events.remove_event_handlers(id);
        self.services.commands.unregister_commands(id);
    }

    fn hook_failed(&self, details: &PluginDetails, hook: Hook, source: PluginError) -> ManagerError {
        self.services.logger.error(
            LOADER_TAG,
            &format!("Plugin {} failed in {}: {}", details.id, hook, source),
        );
        ManagerError::Hook {
            id: details.id.clone(),
            hook,
            source,
        }
    }
}
