//! Plugin discovery and loading.
//!
//! The loader finds artifacts in a plugin directory, asks each one for its
//! declared plugin types, validates every declaration against the host
//! version, and registers the survivors as disabled. Failures are isolated:
//! a bad declaration never stops the rest of its artifact, and a bad
//! artifact never stops the rest of the directory.

use crate::error::ManagerError;
use crate::registry::{PluginState, Registry};
use crate::LOADER_TAG;
use libloading::{Library, Symbol};
use plugin_api::{
    AbiVersionFn, Logger, PluginDeclaration, PluginRegistrar, RegisterPluginsFn, VersionInfo,
    ABI_VERSION_SYMBOL, PLUGIN_ABI_VERSION, REGISTER_SYMBOL,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ffi::CStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loader settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// File extensions recognised as plugin artifacts, without the dot
    pub extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            extensions: vec![std::env::consts::DLL_EXTENSION.to_string()],
        }
    }
}

/// The declarations read from one artifact.
///
/// `library` keeps the code behind the declarations mapped; it must outlive
/// every plugin instance constructed from them.
pub struct OpenedArtifact {
    pub declarations: Vec<PluginDeclaration>,
    pub library: Option<Library>,
}

/// Source of plugin declarations for an artifact path.
pub trait ArtifactOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<OpenedArtifact, ManagerError>;
}

/// Opens artifacts as dynamic libraries exporting the `plugin_api` entry
/// points.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryOpener;

impl ArtifactOpener for LibraryOpener {
    fn open(&self, path: &Path) -> Result<OpenedArtifact, ManagerError> {
        let fail = |reason: String| ManagerError::ArtifactLoad {
            path: path.to_path_buf(),
            reason,
        };

        // Loading runs the library's initialisers; artifacts are trusted.
        let library = unsafe { Library::new(path) }
            .map_err(|e| fail(format!("Failed to load library: {}", e)))?;

        let declarations = {
            let abi_version: Symbol<AbiVersionFn> = unsafe { library.get(ABI_VERSION_SYMBOL) }
                .map_err(|e| fail(format!("Missing ABI marker: {}", e)))?;

            let marker_ptr = unsafe { abi_version() };
            if marker_ptr.is_null() {
                return Err(fail("ABI marker returned null pointer".to_string()));
            }
            let marker = unsafe { CStr::from_ptr(marker_ptr) }.to_string_lossy();
            let expected = PLUGIN_ABI_VERSION.trim_end_matches('\0');
            if marker != expected {
                return Err(fail(format!(
                    "ABI mismatch: artifact built against {}, host expects {}",
                    marker, expected
                )));
            }

            let register: Symbol<RegisterPluginsFn> = unsafe { library.get(REGISTER_SYMBOL) }
                .map_err(|e| fail(format!("Failed to find register_plugins function: {}", e)))?;

            let mut registrar = PluginRegistrar::new();
            if !unsafe { register(&mut registrar) } {
                return Err(fail("register_plugins panicked".to_string()));
            }
            registrar.into_declarations()
        };

        Ok(OpenedArtifact {
            declarations,
            library: Some(library),
        })
    }
}

/// Plugin bundles linked into the host binary, addressed by a virtual
/// artifact path.
#[derive(Debug, Default, Clone)]
pub struct StaticArtifacts {
    artifacts: HashMap<PathBuf, Vec<PluginDeclaration>>,
}

impl StaticArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, declarations: Vec<PluginDeclaration>) {
        self.artifacts.insert(path.into(), declarations);
    }

    pub fn with(mut self, path: impl Into<PathBuf>, declarations: Vec<PluginDeclaration>) -> Self {
        self.insert(path, declarations);
        self
    }
}

impl ArtifactOpener for StaticArtifacts {
    fn open(&self, path: &Path) -> Result<OpenedArtifact, ManagerError> {
        self.artifacts
            .get(path)
            .map(|declarations| OpenedArtifact {
                declarations: declarations.clone(),
                library: None,
            })
            .ok_or_else(|| ManagerError::ArtifactLoad {
                path: path.to_path_buf(),
                reason: "no plugin bundle registered for this path".to_string(),
            })
    }
}

/// Outcome of one declaration (or of the whole artifact) during loading.
#[derive(Debug)]
pub enum LoadEvent {
    /// Registered as disabled
    Loaded { id: String },
    /// Declared without a descriptor or with a blank id; not registered
    MissingId { type_name: String, path: PathBuf },
    /// Built for an incompatible host version; not registered
    Outdated {
        name: String,
        version: String,
        required_major: u32,
        required_minor: u32,
    },
    /// Instantiation, registration, or artifact failure
    Failed(ManagerError),
}

/// Everything that happened while loading one artifact.
#[derive(Debug)]
pub struct LoadResult {
    pub path: PathBuf,
    pub events: Vec<LoadEvent>,
}

impl LoadResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            events: Vec::new(),
        }
    }

    pub fn loaded_ids(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                LoadEvent::Loaded { id } => Some(id.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ManagerError> + '_ {
        self.events.iter().filter_map(|event| match event {
            LoadEvent::Failed(error) => Some(error),
            _ => None,
        })
    }

    /// `true` when the artifact itself could not be opened.
    pub fn artifact_failed(&self) -> bool {
        self.failures()
            .any(|error| matches!(error, ManagerError::ArtifactLoad { .. }))
    }
}

pub struct Loader {
    config: LoaderConfig,
    host_version: VersionInfo,
    opener: Arc<dyn ArtifactOpener>,
    logger: Arc<dyn Logger>,
}

impl Loader {
    pub fn new(
        config: LoaderConfig,
        host_version: VersionInfo,
        opener: Arc<dyn ArtifactOpener>,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            config,
            host_version,
            opener,
            logger,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Whether `path` carries one of the configured artifact extensions.
    pub fn is_artifact(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.config
            .extensions
            .iter()
            .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }

    /// Lists the artifacts in `dir`, sorted by path for a stable load order.
    pub async fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, ManagerError> {
        let io_error = |source: std::io::Error| ManagerError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
        let mut artifacts = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir && self.is_artifact(&path) {
                artifacts.push(path);
            }
        }

        artifacts.sort();
        Ok(artifacts)
    }

    /// Loads every plugin declared by one artifact into `registry` as
    /// disabled.
    ///
    /// The artifact's library handle is pushed onto `libraries` when at least
    /// one plugin from it was registered.
    pub fn load_one(
        &self,
        path: &Path,
        registry: &mut Registry,
        libraries: &mut Vec<Library>,
    ) -> LoadResult {
        let mut result = LoadResult::new(path);
        self.logger
            .debug(LOADER_TAG, &format!("Loading artifact {}", path.display()));

        let artifact = match self.opener.open(path) {
            Ok(artifact) => artifact,
            Err(error) => {
                self.logger.error(
                    LOADER_TAG,
                    &format!("Failed to load artifact [{}], is it up to date? {}", path.display(), error),
                );
                result.events.push(LoadEvent::Failed(error));
                return result;
            }
        };

        for declaration in &artifact.declarations {
            let event = self.load_declaration(path, declaration, registry);
            result.events.push(event);
        }

        if let Some(library) = artifact.library {
            if result.loaded_ids().is_empty() {
                self.logger.debug(
                    LOADER_TAG,
                    &format!("No plugins registered from {}, unloading", path.display()),
                );
            } else {
                libraries.push(library);
            }
        }

        result
    }

    fn load_declaration(
        &self,
        path: &Path,
        declaration: &PluginDeclaration,
        registry: &mut Registry,
    ) -> LoadEvent {
        let plugin = match declaration.instantiate() {
            Ok(plugin) => plugin,
            Err(e) => {
                self.logger.error(
                    LOADER_TAG,
                    &format!(
                        "Failed to create instance of plugin {} [{}]: {}",
                        declaration.type_name,
                        path.display(),
                        e
                    ),
                );
                return LoadEvent::Failed(ManagerError::Instantiation {
                    type_name: declaration.type_name.to_string(),
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        let details = match &declaration.details {
            Some(details) if details.has_id() => details.clone(),
            _ => {
                self.logger.warn(
                    LOADER_TAG,
                    &format!(
                        "Plugin loaded but missing an id: {} [{}]",
                        declaration.type_name,
                        path.display()
                    ),
                );
                return LoadEvent::MissingId {
                    type_name: declaration.type_name.to_string(),
                    path: path.to_path_buf(),
                };
            }
        };

        if !self.host_version.is_compatible(&details) {
            self.logger.warn(
                LOADER_TAG,
                &format!(
                    "Trying to load an outdated plugin {} {} (built for {}.{}, host is {})",
                    details.name,
                    details.version,
                    details.required_major,
                    details.required_minor,
                    self.host_version
                ),
            );
            return LoadEvent::Outdated {
                name: details.name,
                version: details.version,
                required_major: details.required_major,
                required_minor: details.required_minor,
            };
        }

        let id = details.id.clone();
        let name = details.name.clone();
        let version = details.version.clone();
        match registry.insert(details, plugin, path, PluginState::Disabled) {
            Ok(()) => {
                self.logger.info(
                    LOADER_TAG,
                    &format!("Plugin loaded: {} {} ({})", name, version, id),
                );
                LoadEvent::Loaded { id }
            }
            Err(error) => {
                self.logger.error(
                    LOADER_TAG,
                    &format!("Refusing to register {} from [{}]: {}", name, path.display(), error),
                );
                LoadEvent::Failed(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryLogger;
    use plugin_api::{LogLevel, Plugin, PluginContext, PluginDetails, PluginError, HOST_VERSION};

    struct Inert;

    impl Plugin for Inert {
        fn on_enable(&mut self, _ctx: &PluginContext<'_>) -> Result<(), PluginError> {
            Ok(())
        }

        fn on_disable(&mut self, _ctx: &PluginContext<'_>) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn inert() -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(Inert))
    }

    fn refuses() -> Result<Box<dyn Plugin>, PluginError> {
        Err(PluginError::InitializationFailed("no database".to_string()))
    }

    fn declaration(details: Option<PluginDetails>) -> PluginDeclaration {
        PluginDeclaration {
            type_name: "tests::Inert",
            details,
            constructor: inert,
        }
    }

    fn loader(artifacts: StaticArtifacts, logger: Arc<MemoryLogger>) -> Loader {
        Loader::new(
            LoaderConfig {
                extensions: vec!["plugin".to_string()],
            },
            HOST_VERSION,
            Arc::new(artifacts),
            logger,
        )
    }

    #[test]
    fn test_extension_matching() {
        let loader = loader(StaticArtifacts::new(), Arc::new(MemoryLogger::default()));

        assert!(loader.is_artifact(Path::new("plugins/foo.plugin")));
        assert!(loader.is_artifact(Path::new("plugins/FOO.PLUGIN")));
        assert!(!loader.is_artifact(Path::new("plugins/foo.plugin.bak")));
        assert!(!loader.is_artifact(Path::new("plugins/readme")));
    }

    #[test]
    fn test_bad_declaration_does_not_abort_artifact() {
        let path = PathBuf::from("plugins/mixed.plugin");
        let artifacts = StaticArtifacts::new().with(
            &path,
            vec![
                PluginDeclaration {
                    type_name: "tests::Refuses",
                    details: Some(PluginDetails::new("broken", "Broken")),
                    constructor: refuses,
                },
                declaration(None),
                declaration(Some(PluginDetails::new("", "Blank"))),
                declaration(Some(PluginDetails::new("good", "Good"))),
            ],
        );
        let logger = Arc::new(MemoryLogger::default());
        let loader = loader(artifacts, logger.clone());
        let mut registry = Registry::new();
        let mut libraries = Vec::new();

        let result = loader.load_one(&path, &mut registry, &mut libraries);

        assert_eq!(result.events.len(), 4);
        assert!(matches!(
            result.events[0],
            LoadEvent::Failed(ManagerError::Instantiation { .. })
        ));
        assert!(matches!(result.events[1], LoadEvent::MissingId { .. }));
        assert!(matches!(result.events[2], LoadEvent::MissingId { .. }));
        assert_eq!(result.loaded_ids(), vec!["good"]);
        assert!(!result.artifact_failed());

        assert_eq!(registry.len(), 1);
        assert!(registry.get_disabled("good").is_some());
        assert!(libraries.is_empty());

        assert_eq!(logger.count(LogLevel::Error), 1);
        assert_eq!(logger.count(LogLevel::Warn), 2);
        assert!(logger.entries().iter().all(|e| e.tag == LOADER_TAG));
    }

    #[test]
    fn test_outdated_plugin_is_skipped() {
        let path = PathBuf::from("plugins/old.plugin");
        let old = PluginDetails::new("old", "Old")
            .version("0.9.0")
            .requires(HOST_VERSION.major + 1, HOST_VERSION.minor + 1);
        let artifacts = StaticArtifacts::new().with(&path, vec![declaration(Some(old))]);
        let loader = loader(artifacts, Arc::new(MemoryLogger::default()));
        let mut registry = Registry::new();

        let result = loader.load_one(&path, &mut registry, &mut Vec::new());

        match &result.events[..] {
            [LoadEvent::Outdated { name, version, .. }] => {
                assert_eq!(name, "Old");
                assert_eq!(version, "0.9.0");
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_reported_per_candidate() {
        let path = PathBuf::from("plugins/twins.plugin");
        let artifacts = StaticArtifacts::new().with(
            &path,
            vec![
                declaration(Some(PluginDetails::new("twin", "First"))),
                declaration(Some(PluginDetails::new("twin", "Second"))),
            ],
        );
        let loader = loader(artifacts, Arc::new(MemoryLogger::default()));
        let mut registry = Registry::new();

        let result = loader.load_one(&path, &mut registry, &mut Vec::new());

        assert_eq!(result.loaded_ids(), vec!["twin"]);
        assert!(matches!(
            result.events[1],
            LoadEvent::Failed(ManagerError::DuplicateId(_))
        ));
        assert_eq!(registry.get_disabled("twin").unwrap().details().name, "First");
    }

    #[test]
    fn test_unknown_artifact_is_artifact_failure() {
        let logger = Arc::new(MemoryLogger::default());
        let loader = loader(StaticArtifacts::new(), logger.clone());
        let mut registry = Registry::new();

        let result = loader.load_one(Path::new("plugins/ghost.plugin"), &mut registry, &mut Vec::new());

        assert!(result.artifact_failed());
        assert!(registry.is_empty());
        assert_eq!(logger.count(LogLevel::Error), 1);
    }

    #[test]
    fn test_library_opener_rejects_non_library() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.so");
        std::fs::write(&path, b"not a shared object").unwrap();

        let result = LibraryOpener.open(&path);
        assert!(matches!(result, Err(ManagerError::ArtifactLoad { .. })));
    }

    #[tokio::test]
    async fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.plugin", "a.plugin", "notes.txt", "c.plugin.disabled"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.plugin")).unwrap();
        let loader = loader(StaticArtifacts::new(), Arc::new(MemoryLogger::default()));

        let found = loader.discover(dir.path()).await.unwrap();

        assert_eq!(
            found,
            vec![dir.path().join("a.plugin"), dir.path().join("b.plugin")]
        );
    }

    #[tokio::test]
    async fn test_discover_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader(StaticArtifacts::new(), Arc::new(MemoryLogger::default()));

        let result = loader.discover(&dir.path().join("absent")).await;
        assert!(matches!(result, Err(ManagerError::Io { .. })));
    }
}
