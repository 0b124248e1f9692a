use super::DetectorPlugin;
use anyhow::{anyhow, Result};
use common::detections::DetectorInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedDetector = Arc<RwLock<dyn DetectorPlugin>>;

/// Registry of available detector plugins
#[derive(Clone)]
pub struct PluginRegistry {
    plugins: Arc<RwLock<HashMap<String, SharedDetector>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            plugins: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn register(&self, plugin: SharedDetector) -> Result<()> {
        let mut plugins = self.plugins.write().await;
        let id = plugin.read().await.id().to_string();

        if plugins.contains_key(&id) {
            return Err(anyhow!("Plugin '{}' is already registered", id));
        }

        plugins.insert(id.clone(), plugin);
        tracing::info!("Registered detector plugin: {}", id);
        Ok(())
    }

    pub async fn get(&self, plugin_id: &str) -> Result<SharedDetector> {
        let plugins = self.plugins.read().await;
        plugins
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| anyhow!("Plugin '{}' not found", plugin_id))
    }

    pub async fn list(&self) -> Vec<DetectorInfo> {
        let plugins = self.plugins.read().await;
        let mut infos = Vec::new();

        for plugin in plugins.values() {
            infos.push(plugin.read().await.info());
        }

        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub async fn has_plugin(&self, plugin_id: &str) -> bool {
        self.plugins.read().await.contains_key(plugin_id)
    }

    pub async fn count(&self) -> usize {
        self.plugins.read().await.len()
    }

    pub async fn health_check_all(&self) -> HashMap<String, bool> {
        let plugins = self.plugins.read().await;
        let mut results = HashMap::new();

        for (id, plugin) in plugins.iter() {
            let healthy = plugin.read().await.health_check().await.unwrap_or(false);
            results.insert(id.clone(), healthy);
        }

        results
    }

    pub async fn shutdown_all(&self) -> Result<()> {
        let plugins = self.plugins.read().await;

        for (id, plugin) in plugins.iter() {
            let mut plugin_write = plugin.write().await;
            if let Err(e) = plugin_write.shutdown().await {
                tracing::error!("Error shutting down plugin '{}': {}", id, e);
            }
        }

        Ok(())
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
