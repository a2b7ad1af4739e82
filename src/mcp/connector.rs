use crate::mcp::config::{McpServerEntry, expand_env_map, expand_env_placeholders};
use crate::mcp::types::ServerTool;
use anyhow::Context;
use async_trait::async_trait;
use rmcp::{
    service::ServiceExt,
    transport::{StreamableHttpClientTransport, TokioChildProcess},
};
use std::fmt;
use tokio::process::Command;
use url::Url;

/// A live connection to one MCP server.
#[async_trait]
pub trait ServerConnection: Send + Sync + fmt::Debug {
    async fn list_tools(&self) -> anyhow::Result<Vec<ServerTool>>;

    /// Tear the connection down. Errors are logged by the implementation.
    async fn close(self: Box<Self>);
}

/// Opens connections from parsed server entries.
#[async_trait]
pub trait ServerConnector: Send + Sync + fmt::Debug {
    async fn connect(
        &self,
        name: &str,
        entry: &McpServerEntry,
    ) -> anyhow::Result<Box<dyn ServerConnection>>;
}

type DynClientService = rmcp::service::RunningService<
    rmcp::service::RoleClient,
    Box<dyn rmcp::service::DynService<rmcp::service::RoleClient>>,
>;

/// Production connector speaking MCP over child-process stdio or
/// streamable HTTP.
#[derive(Debug, Default, Clone)]
pub struct RmcpConnector;

struct RmcpConnection {
    name: String,
    service: DynClientService,
}

impl fmt::Debug for RmcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RmcpConnection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ServerConnector for RmcpConnector {
    async fn connect(
        &self,
        name: &str,
        entry: &McpServerEntry,
    ) -> anyhow::Result<Box<dyn ServerConnection>> {
        let service = match entry {
            McpServerEntry::Stdio { command, args, env } => {
                let env = expand_env_map(env);

                let mut cmd = Command::new(command);
                cmd.args(args);
                for (k, v) in env {
                    cmd.env(k, v);
                }

                let transport = TokioChildProcess::new(cmd)
                    .with_context(|| format!("failed to spawn stdio MCP server '{name}'"))?;
                ().into_dyn()
                    .serve(transport)
                    .await
                    .with_context(|| format!("failed to connect stdio MCP server '{name}'"))?
            }

            McpServerEntry::RemoteHttp { url } => {
                // Expanded URLs may carry credentials; keep them out of logs.
                let expanded = expand_env_placeholders(url);
                let parsed = Url::parse(&expanded)
                    .with_context(|| format!("invalid url for remote MCP server '{name}'"))?;

                let transport = StreamableHttpClientTransport::from_uri(parsed.to_string());
                ().into_dyn()
                    .serve(transport)
                    .await
                    .with_context(|| format!("failed to connect remote MCP server '{name}'"))?
            }
        };

        Ok(Box::new(RmcpConnection {
            name: name.to_string(),
            service,
        }))
    }
}

#[async_trait]
impl ServerConnection for RmcpConnection {
    async fn list_tools(&self) -> anyhow::Result<Vec<ServerTool>> {
        let result = self
            .service
            .list_tools(Default::default())
            .await
            .with_context(|| format!("tools/list failed for MCP server '{}'", self.name))?;

        Ok(result
            .tools
            .into_iter()
            .map(|t| ServerTool {
                name: t.name.to_string(),
                description: t.description.as_deref().map(str::to_string),
            })
            .collect())
    }

    async fn close(self: Box<Self>) {
        let RmcpConnection { name, service } = *self;
        if let Err(e) = service.cancel().await {
            tracing::warn!(server = %name, error = %e, "MCP server did not shut down cleanly");
        }
    }
}
