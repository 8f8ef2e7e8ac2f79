//! Error types for the plugin manager.

use plugin_api::PluginError;
use std::fmt;
use std::path::PathBuf;

/// The plugin hook that was running when a lifecycle transition failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Register,
    Enable,
    Disable,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::Register => "register",
            Hook::Enable => "on_enable",
            Hook::Disable => "on_disable",
        };
        f.write_str(name)
    }
}

/// Errors raised by the registry, the loader, and lifecycle transitions.
///
/// Loader failures are normally reported per candidate inside a
/// [`LoadResult`](crate::loader::LoadResult) rather than returned; only an
/// unreadable plugin directory aborts a scan.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A plugin with this id is already registered, enabled or disabled
    #[error("Plugin id already registered: {0}")]
    DuplicateId(String),
    /// The plugin is not in the bucket the operation expected
    #[error("Plugin not found: {0}")]
    NotFound(String),
    /// Descriptor without a usable id
    #[error("Plugin {name} has no id")]
    MissingId { name: String },
    /// A declared plugin type could not be constructed
    #[error("Failed to create instance of plugin {type_name} [{}]: {reason}", .path.display())]
    Instantiation {
        type_name: String,
        path: PathBuf,
        reason: String,
    },
    /// The artifact could not be opened or refused to declare its plugins
    #[error("Failed to load artifact [{}]: {reason}", .path.display())]
    ArtifactLoad { path: PathBuf, reason: String },
    /// The plugin directory could not be read
    #[error("Failed to read plugin directory {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A plugin hook returned an error; the plugin stayed in its previous state
    #[error("Plugin {id} failed in {hook}: {source}")]
    Hook {
        id: String,
        hook: Hook,
        #[source]
        source: PluginError,
    },
}
