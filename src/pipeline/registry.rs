//! Plugin registry: the name to plugin table pipelines are resolved against.
//!
//! The registry holds a factory per plugin name and is fixed once the bridge
//! starts. Instances live in a [`PluginSet`]; every packet source gets its own
//! set, so a plugin that blocks in one source never holds up another.

use crate::pipeline::plugin::{AnyPlugin, BuiltinPlugin, Plugin};
use crate::pipeline::plugins::PacketFilterPlugin;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a fresh instance of one plugin.
pub type PluginFactory = Arc<dyn Fn() -> AnyPlugin + Send + Sync>;

#[derive(Default)]
pub struct PluginRegistry {
    factories: HashMap<String, PluginFactory>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing every built-in plugin.
    ///
    /// All packet filter instances share one window of recent packet ids.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for make in BuiltinPlugin::constructors() {
            if matches!(make(), BuiltinPlugin::PacketFilter(_)) {
                continue;
            }
            registry.register(move || AnyPlugin::Builtin(make()));
        }
        let filter = PacketFilterPlugin::new();
        registry.register(move || {
            AnyPlugin::Builtin(BuiltinPlugin::PacketFilter(filter.sibling()))
        });
        registry
    }

    /// Register a factory under the name of the plugins it builds, replacing
    /// any factory of that name.
    pub fn register<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> AnyPlugin + Send + Sync + 'static,
    {
        let name = factory().name().to_string();
        if self.factories.insert(name.clone(), Arc::new(factory)).is_some() {
            tracing::debug!("Replaced plugin {}", name);
        }
        self
    }

    /// Register a user-defined plugin. `factory` is called once per packet
    /// source, plus once here to learn the plugin's name.
    pub fn register_custom<F>(&mut self, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(move || AnyPlugin::Custom(factory()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// A fresh instance of every registered plugin.
    pub fn instantiate(&self) -> PluginSet {
        PluginSet {
            plugins: self
                .factories
                .iter()
                .map(|(name, factory)| (name.clone(), factory()))
                .collect(),
        }
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}

/// Plugin instances owned by a single packet source.
pub struct PluginSet {
    plugins: HashMap<String, AnyPlugin>,
}

impl PluginSet {
    /// The instance registered as `name`, or `None` if there is none.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut AnyPlugin> {
        self.plugins.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl std::fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("PluginSet").field("plugins", &names).finish()
    }
}
