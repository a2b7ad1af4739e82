use crate::document::ServerDefinition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Connection parameters interpreted from an opaque server definition.
///
/// Fields this crate does not understand (`timeout`, `iconPath`, ...) are
/// ignored here but stay in the persisted definition.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum McpServerEntry {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    RemoteHttp {
        url: String,
    },
}

impl McpServerEntry {
    pub fn from_definition(definition: &ServerDefinition) -> Result<Self, String> {
        let fields = serde_yaml::Value::Mapping(definition.fields().clone());
        serde_yaml::from_value(fields).map_err(|e| {
            format!("definition has neither a `command` (stdio) nor a `url` (remote) field ({e})")
        })
    }

    pub fn transport(&self) -> &'static str {
        match self {
            McpServerEntry::Stdio { .. } => "stdio",
            McpServerEntry::RemoteHttp { .. } => "streamable-http",
        }
    }
}

/// Expand "${VAR}" placeholders from the process environment.
/// Unknown variables leave the placeholder unchanged.
pub fn expand_env_placeholders(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(value) => out.push_str(&value),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn expand_env_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_placeholders(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(value: serde_json::Value) -> Result<McpServerEntry, String> {
        McpServerEntry::from_definition(&serde_json::from_value(value).unwrap())
    }

    #[test]
    fn stdio_definition_with_extra_fields() {
        let parsed = entry(json!({
            "command": "npx",
            "args": ["-y", "@mcpcentral/mcp-time"],
            "timeout": 30000
        }))
        .unwrap();
        assert_eq!(parsed.transport(), "stdio");
    }

    #[test]
    fn url_definition_is_remote() {
        let parsed = entry(json!({"url": "https://mcp.example.com/mcp", "timeout": 30})).unwrap();
        assert_eq!(
            parsed,
            McpServerEntry::RemoteHttp {
                url: "https://mcp.example.com/mcp".into()
            }
        );
    }

    #[test]
    fn definition_without_transport_is_rejected() {
        assert!(entry(json!({"timeout": 30})).is_err());
    }

    #[test]
    fn placeholders_expand_from_environment() {
        let path = std::env::var("PATH").unwrap_or_default();
        assert_eq!(expand_env_placeholders("p=${PATH}"), format!("p={path}"));
        assert_eq!(
            expand_env_placeholders("${MCP_SYNC_SURELY_UNSET_VAR}/x"),
            "${MCP_SYNC_SURELY_UNSET_VAR}/x"
        );
        assert_eq!(expand_env_placeholders("tail ${open"), "tail ${open");
    }
}
