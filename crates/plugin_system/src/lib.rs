//! Plugin manager with safe dynamic library loading.
//!
//! Plugins are discovered in a directory, checked against the host version,
//! instantiated, and registered as disabled. Enabling wires each plugin into
//! the host's config store, event bus, and command dispatcher; disabling tears
//! those registrations down again.
//!
//! ```rust,ignore
//! let services = StandardServices::new(MemoryConfigStore::new());
//! let manager = create_plugin_manager(&services, LoaderConfig::default());
//!
//! manager.load_assemblies("plugins").await?;
//! manager.enable_plugins().await?;
//! services.events.dispatch("round_start", &serde_json::json!({ "round": 1 }));
//! manager.shutdown().await;
//! ```

pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod registry;
pub mod services;

pub use error::{Hook, ManagerError};
pub use lifecycle::LifecycleController;
pub use loader::{
    ArtifactOpener, LibraryOpener, LoadEvent, LoadResult, Loader, LoaderConfig, OpenedArtifact,
    StaticArtifacts,
};
pub use registry::{PluginState, RegisteredPlugin, Registry};
pub use services::{
    CommandTable, EventHandlerTable, LogEntry, MemoryConfigStore, MemoryLogger, TracingLogger,
};

use libloading::Library;
use plugin_api::{HostServices, PluginDetails, VersionInfo, HOST_VERSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Log tag used for every loader and lifecycle message.
pub const LOADER_TAG: &str = "PLUGIN_LOADER";

// ============================================================================
// Plugin Manager
// ============================================================================

/// Registered plugins plus the libraries their code lives in.
///
/// Field order matters: the registry (and with it every plugin instance) is
/// dropped before the libraries are unloaded.
#[derive(Default)]
struct PluginSet {
    registry: Registry,
    libraries: Vec<Library>,
}

/// Owns the registry and drives loading and lifecycle transitions.
///
/// Every mutation holds the write lock for its whole duration, so bulk
/// passes never interleave with each other. Lookups share the read lock.
pub struct PluginManager {
    state: RwLock<PluginSet>,
    loader: Loader,
    lifecycle: LifecycleController,
    host_version: VersionInfo,
}

impl PluginManager {
    /// Manager loading real dynamic libraries for the current host version.
    pub fn new(services: HostServices, config: LoaderConfig) -> Self {
        Self::with_opener(services, config, Arc::new(LibraryOpener), HOST_VERSION)
    }

    pub fn with_opener(
        services: HostServices,
        config: LoaderConfig,
        opener: Arc<dyn ArtifactOpener>,
        host_version: VersionInfo,
    ) -> Self {
        let loader = Loader::new(config, host_version, opener, services.logger.clone());

        Self {
            state: RwLock::new(PluginSet::default()),
            loader,
            lifecycle: LifecycleController::new(services),
            host_version,
        }
    }

    pub fn host_version(&self) -> VersionInfo {
        self.host_version
    }

    pub fn services(&self) -> &HostServices {
        self.lifecycle.services()
    }

    pub async fn get_enabled_plugin(&self, id: &str) -> Option<PluginInfo> {
        let state = self.state.read().await;
        state.registry.get_enabled(id).map(PluginInfo::from)
    }

    pub async fn get_disabled_plugin(&self, id: &str) -> Option<PluginInfo> {
        let state = self.state.read().await;
        state.registry.get_disabled(id).map(PluginInfo::from)
    }

    /// Enabled plugins whose name or author contains `query`.
    pub async fn find_enabled_plugins(&self, query: &str) -> Vec<PluginInfo> {
        let state = self.state.read().await;
        state
            .registry
            .find_enabled(query)
            .into_iter()
            .map(PluginInfo::from)
            .collect()
    }

    /// Ids of the enabled plugins, in load order.
    pub async fn enabled_plugins(&self) -> Vec<String> {
        self.state.read().await.registry.ids(PluginState::Enabled)
    }

    /// Ids of the disabled plugins, in load order.
    pub async fn disabled_plugins(&self) -> Vec<String> {
        self.state.read().await.registry.ids(PluginState::Disabled)
    }

    /// Loads every artifact in `dir`. Plugins land in the disabled bucket.
    ///
    /// Only an unreadable directory is an error; per-artifact and
    /// per-plugin failures are reported in the returned results.
    pub async fn load_assemblies(
        &self,
        dir: impl AsRef<Path>,
    ) -> Result<Vec<LoadResult>, ManagerError> {
        let dir = dir.as_ref();
        let mut guard = self.state.write().await;
        let PluginSet {
            registry,
            libraries,
        } = &mut *guard;

        let logger = &self.lifecycle.services().logger;
        let artifacts = match self.loader.discover(dir).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                logger.error(LOADER_TAG, &format!("Plugin directory scan failed: {}", e));
                return Err(e);
            }
        };
        logger.info(
            LOADER_TAG,
            &format!(
                "Found {} plugin artifacts in {}",
                artifacts.len(),
                dir.display()
            ),
        );

        let mut results = Vec::with_capacity(artifacts.len());
        for path in &artifacts {
            results.push(self.loader.load_one(path, registry, libraries));
        }

        let loaded: usize = results.iter().map(|r| r.loaded_ids().len()).sum();
        let failed: usize = results.iter().map(|r| r.failures().count()).sum();
        if failed > 0 {
            logger.warn(LOADER_TAG, &format!("{} plugins failed to load", failed));
        }
        logger.info(
            LOADER_TAG,
            &format!(
                "Loaded {} plugins ({} total registered)",
                loaded,
                registry.len()
            ),
        );

        Ok(results)
    }

    /// Loads a single artifact. Plugins land in the disabled bucket.
    pub async fn load_assembly(&self, path: impl AsRef<Path>) -> LoadResult {
        let mut guard = self.state.write().await;
        let PluginSet {
            registry,
            libraries,
        } = &mut *guard;

        self.loader.load_one(path.as_ref(), registry, libraries)
    }

    /// Enables every disabled plugin in load order and returns their ids.
    pub async fn enable_plugins(&self) -> Result<Vec<String>, ManagerError> {
        let mut state = self.state.write().await;
        let enabled = self.lifecycle.enable_all(&mut state.registry)?;
        info!("Enabled {} plugins", enabled.len());
        Ok(enabled)
    }

    pub async fn enable_plugin(&self, id: &str) -> Result<(), ManagerError> {
        let mut state = self.state.write().await;
        self.lifecycle.enable_one(&mut state.registry, id)
    }

    /// Disables every enabled plugin, last loaded first, and returns their
    /// ids in teardown order.
    pub async fn disable_plugins(&self) -> Result<Vec<String>, ManagerError> {
        let mut state = self.state.write().await;
        let disabled = self.lifecycle.disable_all(&mut state.registry)?;
        info!("Disabled {} plugins", disabled.len());
        Ok(disabled)
    }

    /// Disables one plugin. `Ok(false)` when `id` was not enabled.
    pub async fn disable_plugin(&self, id: &str) -> Result<bool, ManagerError> {
        let mut state = self.state.write().await;
        self.lifecycle.disable_one(&mut state.registry, id)
    }

    pub async fn get_plugin_stats(&self) -> PluginSystemStats {
        let state = self.state.read().await;

        PluginSystemStats {
            total_plugins: state.registry.len(),
            enabled_plugins: state.registry.count(PluginState::Enabled),
            disabled_plugins: state.registry.count(PluginState::Disabled),
            loaded_libraries: state.libraries.len(),
            plugins: state.registry.iter().map(PluginInfo::from).collect(),
        }
    }

    /// Disables everything that is still enabled, then drops every plugin
    /// and unloads their libraries.
    ///
    /// A plugin failing in `on_disable` is logged and does not stop the
    /// rest from being torn down; its handlers and commands are removed
    /// regardless.
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        info!(
            "Shutting down {} plugins",
            state.registry.count(PluginState::Enabled)
        );

        // Handlers and commands of every plugin are gone after this pass, so
        // dropping the libraries below leaves nothing pointing into them.
        for e in self.lifecycle.teardown_all(&mut state.registry) {
            error!("Error shutting down plugin: {}", e);
        }

        *state = PluginSet::default();
        info!("All plugins shut down");
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of one registered plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginInfo {
    pub details: PluginDetails,
    pub state: PluginState,
    pub path: PathBuf,
    pub loaded_at: SystemTime,
}

impl From<&RegisteredPlugin> for PluginInfo {
    fn from(plugin: &RegisteredPlugin) -> Self {
        Self {
            details: plugin.details().clone(),
            state: plugin.state(),
            path: plugin.source().to_path_buf(),
            loaded_at: plugin.loaded_at(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginSystemStats {
    pub total_plugins: usize,
    pub enabled_plugins: usize,
    pub disabled_plugins: usize,
    pub loaded_libraries: usize,
    pub plugins: Vec<PluginInfo>,
}

// ============================================================================
// Utility Functions
// ============================================================================

/// The in-memory collaborators shipped with this crate.
///
/// The host keeps this around to dispatch events and run commands against
/// whatever the enabled plugins registered.
#[derive(Clone)]
pub struct StandardServices {
    pub config: Arc<MemoryConfigStore>,
    pub events: Arc<EventHandlerTable>,
    pub commands: Arc<CommandTable>,
}

impl StandardServices {
    pub fn new(config: MemoryConfigStore) -> Self {
        Self {
            config: Arc::new(config),
            events: Arc::new(EventHandlerTable::new()),
            commands: Arc::new(CommandTable::new()),
        }
    }

    /// Services handed to plugins, logging through `tracing`.
    pub fn host_services(&self) -> HostServices {
        HostServices {
            config: self.config.clone(),
            events: self.events.clone(),
            commands: self.commands.clone(),
            logger: Arc::new(TracingLogger),
        }
    }
}

/// Create a plugin manager backed by the standard services.
pub fn create_plugin_manager(services: &StandardServices, config: LoaderConfig) -> PluginManager {
    PluginManager::new(services.host_services(), config)
}
