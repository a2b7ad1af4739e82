//! Model Context Protocol (MCP) connection registry.
//!
//! Server definitions from the configuration document are interpreted as
//! stdio or streamable-HTTP MCP servers:
//!
//! ```yaml
//! mcpServers:
//!   time:
//!     command: npx
//!     args: ["-y", "@mcpcentral/mcp-time"]
//!   tavily:
//!     url: https://mcp.tavily.com/mcp/?tavilyApiKey=${TAVILY_API_KEY}
//! ```
//!
//! # Tool Keys
//!
//! Tools of connected servers are exposed under the plugin key
//! `<tool>_mcp_<server>` (e.g. `now_mcp_time`), sanitized to
//! `[A-Za-z0-9_-]`.

pub mod config;
pub mod connector;
pub mod registry;
pub mod stub;
pub mod types;

pub use connector::{RmcpConnector, ServerConnection, ServerConnector};
pub use registry::{ConnectionRegistry, McpRegistry, ToolOrigin};
pub use stub::StubConnector;
pub use types::{InitReport, ServerInitFailure, ServerTool};
