//! Registry of loaded plugins and their lifecycle state.
//!
//! Each plugin id maps to exactly one entry carrying a [`PluginState`], so a
//! plugin is always either enabled or disabled and can never sit in both
//! buckets. Iteration follows insertion (load) order.

use crate::error::ManagerError;
use plugin_api::{Plugin, PluginDetails};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Bucket a registered plugin currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginState {
    Disabled,
    Enabled,
}

/// A plugin instance owned by the registry.
pub struct RegisteredPlugin {
    plugin: Box<dyn Plugin>,
    details: PluginDetails,
    state: PluginState,
    source: PathBuf,
    loaded_at: SystemTime,
}

impl RegisteredPlugin {
    pub fn details(&self) -> &PluginDetails {
        &self.details
    }

    pub fn id(&self) -> &str {
        &self.details.id
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    /// Artifact the plugin was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }

    /// Split borrow used by the lifecycle controller to hand the descriptor
    /// to a hook while the instance is borrowed mutably.
    pub(crate) fn parts_mut(&mut self) -> (&PluginDetails, &mut dyn Plugin) {
        (&self.details, self.plugin.as_mut())
    }
}

impl std::fmt::Debug for RegisteredPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPlugin")
            .field("details", &self.details)
            .field("state", &self.state)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, RegisteredPlugin>,
    order: Vec<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_enabled(&self, id: &str) -> Option<&RegisteredPlugin> {
        self.get_in(id, PluginState::Enabled)
    }

    pub fn get_disabled(&self, id: &str) -> Option<&RegisteredPlugin> {
        self.get_in(id, PluginState::Disabled)
    }

    fn get_in(&self, id: &str, state: PluginState) -> Option<&RegisteredPlugin> {
        self.entries.get(id).filter(|entry| entry.state == state)
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut RegisteredPlugin> {
        self.entries.get_mut(id)
    }

    /// Every enabled plugin whose name or author contains `query`.
    pub fn find_enabled(&self, query: &str) -> Vec<&RegisteredPlugin> {
        self.iter()
            .filter(|entry| entry.state == PluginState::Enabled && entry.details.matches(query))
            .collect()
    }

    /// Adds a plugin to the given bucket.
    ///
    /// Fails if the id is blank or already present in either bucket.
    pub fn insert(
        &mut self,
        details: PluginDetails,
        plugin: Box<dyn Plugin>,
        source: impl Into<PathBuf>,
        state: PluginState,
    ) -> Result<(), ManagerError> {
        if !details.has_id() {
            return Err(ManagerError::MissingId { name: details.name });
        }
        if self.entries.contains_key(&details.id) {
            return Err(ManagerError::DuplicateId(details.id));
        }

        let id = details.id.clone();
        self.entries.insert(
            id.clone(),
            RegisteredPlugin {
                plugin,
                details,
                state,
                source: source.into(),
                loaded_at: SystemTime::now(),
            },
        );
        self.order.push(id);
        Ok(())
    }

    pub fn move_enabled_to_disabled(&mut self, id: &str) -> Result<(), ManagerError> {
        self.transition(id, PluginState::Enabled, PluginState::Disabled)
    }

    pub fn move_disabled_to_enabled(&mut self, id: &str) -> Result<(), ManagerError> {
        self.transition(id, PluginState::Disabled, PluginState::Enabled)
    }

    fn transition(&mut self, id: &str, from: PluginState, to: PluginState) -> Result<(), ManagerError> {
        match self.entries.get_mut(id) {
            Some(entry) if entry.state == from => {
                entry.state = to;
                Ok(())
            }
            _ => Err(ManagerError::NotFound(id.to_string())),
        }
    }

    pub fn state_of(&self, id: &str) -> Option<PluginState> {
        self.entries.get(id).map(|entry| entry.state)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Snapshot of the ids in one bucket, in insertion order.
    pub fn ids(&self, state: PluginState) -> Vec<String> {
        self.iter()
            .filter(|entry| entry.state == state)
            .map(|entry| entry.details.id.clone())
            .collect()
    }

    pub fn count(&self, state: PluginState) -> usize {
        self.entries.values().filter(|entry| entry.state == state).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredPlugin> + '_ {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plugin_api::{PluginContext, PluginError};

    struct Inert;

    impl Plugin for Inert {
        fn on_enable(&mut self, _ctx: &PluginContext<'_>) -> Result<(), PluginError> {
            Ok(())
        }

        fn on_disable(&mut self, _ctx: &PluginContext<'_>) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn insert(registry: &mut Registry, id: &str, name: &str, author: &str, state: PluginState) {
        registry
            .insert(
                PluginDetails::new(id, name).author(author),
                Box::new(Inert),
                "plugins/test.so",
                state,
            )
            .unwrap();
    }

    #[test]
    fn test_lookup_respects_bucket() {
        let mut registry = Registry::new();
        insert(&mut registry, "foo", "Foo", "Alice", PluginState::Disabled);

        assert!(registry.get_disabled("foo").is_some());
        assert!(registry.get_enabled("foo").is_none());
        assert!(registry.get_disabled("missing").is_none());

        registry.move_disabled_to_enabled("foo").unwrap();
        assert!(registry.get_enabled("foo").is_some());
        assert!(registry.get_disabled("foo").is_none());
        assert_eq!(registry.state_of("foo"), Some(PluginState::Enabled));
    }

    #[test]
    fn test_duplicate_rejected_across_buckets() {
        let mut registry = Registry::new();
        insert(&mut registry, "foo", "Foo", "Alice", PluginState::Enabled);

        let result = registry.insert(
            PluginDetails::new("foo", "Other Foo"),
            Box::new(Inert),
            "plugins/other.so",
            PluginState::Disabled,
        );

        assert!(matches!(result, Err(ManagerError::DuplicateId(id)) if id == "foo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get_enabled("foo").unwrap().details().name, "Foo");
    }

    #[test]
    fn test_blank_id_rejected() {
        let mut registry = Registry::new();
        let result = registry.insert(
            PluginDetails::new(" ", "Nameless"),
            Box::new(Inert),
            "plugins/test.so",
            PluginState::Disabled,
        );

        assert!(matches!(result, Err(ManagerError::MissingId { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_move_from_wrong_bucket_is_not_found() {
        let mut registry = Registry::new();
        insert(&mut registry, "foo", "Foo", "Alice", PluginState::Disabled);

        assert!(matches!(
            registry.move_enabled_to_disabled("foo"),
            Err(ManagerError::NotFound(_))
        ));
        assert!(matches!(
            registry.move_disabled_to_enabled("nope"),
            Err(ManagerError::NotFound(_))
        ));
        assert_eq!(registry.state_of("foo"), Some(PluginState::Disabled));
    }

    #[test]
    fn test_find_enabled_matches_name_or_author() {
        let mut registry = Registry::new();
        insert(&mut registry, "a", "Bob's Kit", "Alice", PluginState::Enabled);
        insert(&mut registry, "b", "Chat", "Bobby", PluginState::Enabled);
        insert(&mut registry, "c", "Bobsled", "Carol", PluginState::Disabled);
        insert(&mut registry, "d", "Admin", "Dave", PluginState::Enabled);

        let found: Vec<&str> = registry.find_enabled("Bob").iter().map(|p| p.id()).collect();
        assert_eq!(found, vec!["a", "b"]);
        assert!(registry.find_enabled("bob").is_empty());
    }

    #[test]
    fn test_ids_follow_insertion_order() {
        let mut registry = Registry::new();
        for id in ["zeta", "alpha", "mid"] {
            insert(&mut registry, id, id, "", PluginState::Disabled);
        }
        registry.move_disabled_to_enabled("alpha").unwrap();

        assert_eq!(registry.ids(PluginState::Disabled), vec!["zeta", "mid"]);
        assert_eq!(registry.ids(PluginState::Enabled), vec!["alpha"]);
        assert_eq!(registry.count(PluginState::Disabled), 2);
        assert_eq!(registry.count(PluginState::Enabled), 1);
    }
}
