use crate::error::ConfigError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// One credential a plugin needs before it counts as authenticated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthField {
    /// Environment variable name, or alternatives separated by `||`.
    pub auth_field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A plugin entry from the manifest, or one synthesized for an MCP tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    pub name: String,
    pub plugin_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auth_config: Vec<AuthField>,
    /// Derived on every reconciliation; absent means not authenticated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PluginDescriptor {
    pub fn is_authenticated(&self) -> bool {
        self.authenticated.unwrap_or(false)
    }
}

/// Keep the first descriptor for each plugin key, preserving order.
pub fn unique_plugins(plugins: Vec<PluginDescriptor>) -> Vec<PluginDescriptor> {
    let mut seen = HashSet::new();
    plugins
        .into_iter()
        .filter(|p| seen.insert(p.plugin_key.clone()))
        .collect()
}

#[async_trait]
pub trait ManifestLoader: Send + Sync + fmt::Debug {
    async fn read(&self) -> Result<Vec<PluginDescriptor>, ConfigError>;
}

/// Reads the manifest from a JSON file holding an array of descriptors.
#[derive(Debug, Clone)]
pub struct FileManifestLoader {
    path: PathBuf,
}

impl FileManifestLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ManifestLoader for FileManifestLoader {
    async fn read(&self) -> Result<Vec<PluginDescriptor>, ConfigError> {
        let manifest_error = |reason: String| ConfigError::ManifestLoad {
            path: self.path.clone(),
            reason,
        };

        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| manifest_error(e.to_string()))?;
        serde_json::from_str(&text).map_err(|e| manifest_error(e.to_string()))
    }
}
