//! Plugin host entry point.
//!
//! Loads the configuration, scans the plugin directory, enables what it
//! found, and tears everything down again on SIGINT/SIGTERM.

mod cli;
mod config;
mod logging;
mod signals;

use anyhow::anyhow;
use cli::CliArgs;
use config::AppConfig;
use plugin_system::{LoadEvent, PluginManager, StandardServices};
use tracing::{error, info, warn};

/// The running host: its configuration, collaborators, and plugin manager.
pub struct Application {
    config: AppConfig,
    services: StandardServices,
    manager: PluginManager,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        // Config comes first so logging can honour it
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(plugin_dir) = args.plugin_dir {
            config.plugins.directory = plugin_dir.to_string_lossy().to_string();
        }
        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        logging::setup_logging(&config.logging)?;

        let services = StandardServices::new(config.config_store());
        let manager = plugin_system::create_plugin_manager(&services, config.loader_config());

        info!(
            "Plugin host v{} (host API {})",
            env!("CARGO_PKG_VERSION"),
            manager.host_version()
        );
        info!(
            "Config: {} | Plugins: {}",
            args.config_path.display(),
            config.plugins.directory
        );

        Ok(Self {
            config,
            services,
            manager,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let results = self
            .manager
            .load_assemblies(self.config.plugin_directory())
            .await?;

        for result in &results {
            for event in &result.events {
                match event {
                    LoadEvent::Loaded { .. } => {}
                    LoadEvent::MissingId { type_name, path } => {
                        warn!("Skipped {} from {}: no plugin id", type_name, path.display())
                    }
                    LoadEvent::Outdated { name, version, .. } => {
                        warn!("Skipped outdated plugin {} {}", name, version)
                    }
                    LoadEvent::Failed(e) => warn!("Load failure: {}", e),
                }
            }
        }

        if self.config.plugins.auto_enable {
            if let Err(e) = self.manager.enable_plugins().await {
                error!("Enabling plugins stopped early: {}", e);
            }
        } else {
            info!("auto_enable is off, all plugins left disabled");
        }

        let stats = self.manager.get_plugin_stats().await;
        info!(
            "Plugins: {} enabled, {} disabled, {} libraries loaded | {} event handlers, {} commands",
            stats.enabled_plugins,
            stats.disabled_plugins,
            stats.loaded_libraries,
            self.services.events.total_handlers(),
            self.services.commands.len()
        );

        signals::wait_for_shutdown().await?;

        info!("Shutting down plugin host");
        self.manager.shutdown().await;
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            eprintln!("Failed to start plugin host: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("Plugin host error: {:#}", e);
        std::process::exit(1);
    }
}
