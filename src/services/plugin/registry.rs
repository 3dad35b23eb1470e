// src/services/plugin/registry.rs

//! Module tag to plugin lookup, built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::Resource;
use crate::services::fetcher::Requester;
use crate::services::plugin::{JsonFeedPlugin, LocalFilesPlugin, StandingsPlugin};

/// Registry of standings plugins keyed by module tag.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn StandingsPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the plugins shipped with the crate.
    pub fn with_bundled(requester: Arc<Requester>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(JsonFeedPlugin::new(requester)));
        registry.register(Arc::new(LocalFilesPlugin));
        registry
    }

    /// Register a plugin under its own name, replacing any previous one.
    pub fn register(&mut self, plugin: Arc<dyn StandingsPlugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    pub fn get(&self, module: &str) -> Result<Arc<dyn StandingsPlugin>> {
        self.plugins
            .get(module)
            .cloned()
            .ok_or_else(|| AppError::PluginNotFound(module.to_string()))
    }

    /// Plugin bound to a resource.
    pub fn for_resource(&self, resource: &Resource) -> Result<Arc<dyn StandingsPlugin>> {
        self.get(&resource.module)
    }

    /// Registered module tags, sorted.
    pub fn modules(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.plugins.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Fail if any resource is bound to an unknown module.
    pub fn check_resources(&self, resources: &[Resource]) -> Result<()> {
        for resource in resources {
            self.for_resource(resource)?;
        }
        Ok(())
    }
}
