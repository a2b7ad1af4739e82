use serde::{Deserialize, Serialize};

/// A tool advertised by a connected MCP server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A server that could not be brought up during registry initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInitFailure {
    pub server: String,
    pub reason: String,
}

/// Outcome of (re)initializing the registry from a definitions map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitReport {
    pub connected: Vec<String>,
    pub failures: Vec<ServerInitFailure>,
}
