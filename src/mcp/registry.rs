use crate::document::{ServerDefinition, ServerDefinitions};
use crate::mcp::config::McpServerEntry;
use crate::mcp::connector::{ServerConnection, ServerConnector};
use crate::mcp::types::{InitReport, ServerInitFailure, ServerTool};
use crate::tools::{PluginDescriptor, StaticTool};
use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Separator between tool and server in the plugin key of an MCP tool.
pub const MCP_DELIMITER: &str = "_mcp_";

/// Live connections plus the map of tools currently available to the
/// platform.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync + fmt::Debug {
    /// Close every live connection and forget every available tool.
    async fn disconnect_all(&self);

    /// Connect every server in `definitions`. A server that fails is left
    /// out of the live set and reported; the others still connect.
    async fn initialize_from(&self, definitions: &ServerDefinitions) -> InitReport;

    async fn register_available_tools(&self, tools: &[StaticTool]);

    /// Append one descriptor per tool of every connected server to
    /// `manifest` and mark those tools available.
    async fn load_manifest_tools(&self, manifest: Vec<PluginDescriptor>) -> Vec<PluginDescriptor>;

    async fn available_tool_keys(&self) -> BTreeSet<String>;

    async fn connected_servers(&self) -> Vec<String>;
}

/// Where an available tool comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOrigin {
    Static,
    Mcp { server: String, tool: String },
}

struct ConnectedServer {
    connection: Box<dyn ServerConnection>,
    tools: Vec<ServerTool>,
}

#[derive(Default)]
struct RegistryState {
    servers: BTreeMap<String, ConnectedServer>,
    available: BTreeMap<String, ToolOrigin>,
}

pub struct McpRegistry {
    connector: Arc<dyn ServerConnector>,
    init_timeout: Duration,
    state: RwLock<RegistryState>,
}

impl fmt::Debug for McpRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (servers, tools) = self
            .state
            .try_read()
            .map(|s| (s.servers.len(), s.available.len()))
            .unwrap_or_default();
        f.debug_struct("McpRegistry")
            .field("connector", &self.connector)
            .field("init_timeout", &self.init_timeout)
            .field("server_count", &servers)
            .field("available_tool_count", &tools)
            .finish()
    }
}

impl McpRegistry {
    pub fn new(connector: Arc<dyn ServerConnector>, init_timeout: Duration) -> Self {
        Self {
            connector,
            init_timeout,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Sanitize tool names for `OpenAI` API compatibility.
    pub fn sanitize_tool_name(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    pub fn mcp_plugin_key(server: &str, tool: &str) -> String {
        Self::sanitize_tool_name(&format!("{tool}{MCP_DELIMITER}{server}"))
    }

    pub async fn tool_origin(&self, key: &str) -> Option<ToolOrigin> {
        self.state.read().await.available.get(key).cloned()
    }

    async fn connect_one(
        &self,
        name: &str,
        definition: &ServerDefinition,
    ) -> anyhow::Result<ConnectedServer> {
        let entry = McpServerEntry::from_definition(definition).map_err(|e| anyhow!(e))?;
        let connector = Arc::clone(&self.connector);

        let attempt = async move {
            let connection = connector.connect(name, &entry).await?;
            match connection.list_tools().await {
                Ok(tools) => Ok::<_, anyhow::Error>(ConnectedServer { connection, tools }),
                Err(e) => {
                    connection.close().await;
                    Err(e)
                }
            }
        };

        tokio::time::timeout(self.init_timeout, attempt)
            .await
            .map_err(|elapsed| {
                anyhow!(
                    "initialization timed out after {:?} ({elapsed})",
                    self.init_timeout
                )
            })?
    }
}

#[async_trait]
impl ConnectionRegistry for McpRegistry {
    async fn disconnect_all(&self) {
        let previous = std::mem::take(&mut *self.state.write().await);
        let count = previous.servers.len();

        for (name, server) in previous.servers {
            debug!(server = %name, "Disconnecting MCP server");
            server.connection.close().await;
        }

        info!(name: "mcp.registry.disconnected", servers = count, "All MCP servers disconnected");
    }

    async fn initialize_from(&self, definitions: &ServerDefinitions) -> InitReport {
        let attempts = definitions.iter().map(|(name, definition)| async move {
            (name.clone(), self.connect_one(name, definition).await)
        });
        let results = join_all(attempts).await;

        let mut report = InitReport::default();
        let mut replaced = Vec::new();
        {
            let mut state = self.state.write().await;
            for (name, result) in results {
                match result {
                    Ok(server) => {
                        info!(
                            name: "mcp.server.connected",
                            server = %name,
                            tools = server.tools.len(),
                            "MCP server connected"
                        );
                        if let Some(old) = state.servers.insert(name.clone(), server) {
                            replaced.push(old);
                        }
                        report.connected.push(name);
                    }
                    Err(e) => {
                        warn!(
                            name: "mcp.server.init_failed",
                            server = %name,
                            error = %format!("{e:#}"),
                            "MCP server failed to initialize"
                        );
                        report.failures.push(ServerInitFailure {
                            server: name,
                            reason: format!("{e:#}"),
                        });
                    }
                }
            }
        }

        for old in replaced {
            old.connection.close().await;
        }
        report
    }

    async fn register_available_tools(&self, tools: &[StaticTool]) {
        let mut state = self.state.write().await;
        for tool in tools {
            state.available.insert(tool.name.clone(), ToolOrigin::Static);
        }
    }

    async fn load_manifest_tools(
        &self,
        mut manifest: Vec<PluginDescriptor>,
    ) -> Vec<PluginDescriptor> {
        let mut state = self.state.write().await;
        let RegistryState { servers, available } = &mut *state;

        for (server_name, server) in servers.iter() {
            for tool in &server.tools {
                let plugin_key = Self::mcp_plugin_key(server_name, &tool.name);
                available.insert(
                    plugin_key.clone(),
                    ToolOrigin::Mcp {
                        server: server_name.clone(),
                        tool: tool.name.clone(),
                    },
                );

                let mut extra = Map::new();
                extra.insert("serverName".to_string(), Value::String(server_name.clone()));
                manifest.push(PluginDescriptor {
                    name: tool.name.clone(),
                    plugin_key,
                    description: tool.description.clone(),
                    icon: None,
                    auth_config: Vec::new(),
                    authenticated: Some(true),
                    extra,
                });
            }
        }
        manifest
    }

    async fn available_tool_keys(&self) -> BTreeSet<String> {
        self.state.read().await.available.keys().cloned().collect()
    }

    async fn connected_servers(&self) -> Vec<String> {
        self.state.read().await.servers.keys().cloned().collect()
    }
}
