//! The persisted configuration document and its server-definitions map.
//!
//! The document is a YAML mapping. Only the server-definitions field and the
//! admin tool lists are interpreted; every other top-level field is carried
//! through a rewrite untouched and in its original position.
//!
//! ```yaml
//! version: 1.2.1
//! includedTools: [calculator]
//! mcpServers:
//!   search:
//!     url: https://search.example.com/mcp
//!   time:
//!     command: npx
//!     args: ["-y", "@mcpcentral/mcp-time"]
//! ```

mod store;

pub use store::DocumentStore;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_yaml::Mapping;
use std::collections::BTreeMap;

/// Top-level document key holding the tool allow-list.
pub const INCLUDED_TOOLS_KEY: &str = "includedTools";
/// Top-level document key holding the tool deny-list.
pub const FILTERED_TOOLS_KEY: &str = "filteredTools";

/// A single server definition, held as the YAML mapping found in the
/// document. The record is opaque to this crate apart from the merge rule in
/// [`ServerDefinition::overlay`]; JSON only appears at the HTTP boundary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerDefinition(Mapping);

impl ServerDefinition {
    pub fn new(fields: Mapping) -> Self {
        Self(fields)
    }

    /// Definition built from a JSON request body object.
    pub fn from_json(fields: Map<String, Value>) -> Result<Self, String> {
        match serde_yaml::to_value(Value::Object(fields)).map_err(|e| e.to_string())? {
            serde_yaml::Value::Mapping(fields) => Ok(Self(fields)),
            other => Err(format!("expected a mapping, found {}", yaml_kind(&other))),
        }
    }

    pub fn fields(&self) -> &Mapping {
        &self.0
    }

    pub fn get(&self, field: &str) -> Option<&serde_yaml::Value> {
        self.0.get(field)
    }

    /// Shallow merge with field precedence to `incoming`: every field present
    /// in `incoming` replaces the field of the same name in place, fields only
    /// present in `self` survive. Nested mappings are replaced, not merged.
    pub fn overlay(&mut self, incoming: ServerDefinition) {
        for (field, value) in incoming.0 {
            self.0.insert(field, value);
        }
    }

    /// JSON view for responses. See [`yaml_to_json`] for the lossy cases.
    pub fn to_json(&self) -> Value {
        yaml_to_json(&serde_yaml::Value::Mapping(self.0.clone()))
    }
}

/// JSON view of a definitions map, keyed by server name.
pub fn definitions_to_json(definitions: &ServerDefinitions) -> Value {
    Value::Object(
        definitions
            .iter()
            .map(|(name, definition)| (name.clone(), definition.to_json()))
            .collect(),
    )
}

/// Convert a YAML value for display as JSON. Non-string keys are rendered as
/// their scalar text, non-finite floats become `null`, tags are dropped.
pub fn yaml_to_json(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::from(i)
            } else if let Some(u) = n.as_u64() {
                Value::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Value::Null, Value::Number)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s.clone()),
        serde_yaml::Value::Sequence(items) => Value::Array(items.iter().map(yaml_to_json).collect()),
        serde_yaml::Value::Mapping(fields) => Value::Object(
            fields
                .iter()
                .map(|(key, value)| (key_text(key), yaml_to_json(value)))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

fn key_text(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|text| text.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Server name to definition.
pub type ServerDefinitions = BTreeMap<String, ServerDefinition>;

/// Per-name merge of `incoming` into `existing`. Known names are overlaid,
/// new names inserted verbatim, unmentioned names left alone.
pub fn merge_definitions(existing: &mut ServerDefinitions, incoming: ServerDefinitions) {
    for (name, definition) in incoming {
        match existing.get_mut(&name) {
            Some(current) => current.overlay(definition),
            None => {
                existing.insert(name, definition);
            }
        }
    }
}

/// Admin include/exclude lists read from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminToolFilter {
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

impl AdminToolFilter {
    /// A non-empty allow-list restricts tools to its members; the deny-list
    /// is applied afterwards.
    pub fn allows(&self, tool_name: &str) -> bool {
        if !self.included.is_empty() && !self.included.iter().any(|t| t == tool_name) {
            return false;
        }
        !self.excluded.iter().any(|t| t == tool_name)
    }
}

/// The whole configuration document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigDocument {
    fields: Mapping,
}

impl ConfigDocument {
    /// Parse YAML text. An empty file is an empty document; any root other
    /// than a mapping is rejected.
    pub fn parse(text: &str) -> Result<Self, String> {
        let root: serde_yaml::Value = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        match root {
            serde_yaml::Value::Null => Ok(Self::default()),
            serde_yaml::Value::Mapping(fields) => Ok(Self { fields }),
            other => Err(format!(
                "document root must be a mapping, found {}",
                yaml_kind(&other)
            )),
        }
    }

    pub fn to_yaml(&self) -> Result<String, String> {
        serde_yaml::to_string(&self.fields).map_err(|e| e.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&serde_yaml::Value> {
        self.fields.get(key)
    }

    /// Server definitions under `key`. Absent and null both read as empty.
    /// Definitions are taken as found; nothing inside them is validated.
    pub fn server_definitions(&self, key: &str) -> Result<ServerDefinitions, String> {
        let servers = match self.fields.get(key) {
            None | Some(serde_yaml::Value::Null) => return Ok(ServerDefinitions::new()),
            Some(serde_yaml::Value::Mapping(servers)) => servers,
            Some(other) => {
                return Err(format!(
                    "{key} must be a mapping, found {}",
                    yaml_kind(other)
                ));
            }
        };

        servers
            .iter()
            .map(|(name, definition)| {
                let name = name
                    .as_str()
                    .ok_or_else(|| format!("{key}: server names must be strings"))?;
                match definition {
                    serde_yaml::Value::Mapping(fields) => {
                        Ok((name.to_string(), ServerDefinition(fields.clone())))
                    }
                    other => Err(format!(
                        "{key}.{name} must be a mapping, found {}",
                        yaml_kind(other)
                    )),
                }
            })
            .collect()
    }

    /// Replace the value under `key`, keeping the key's position when it
    /// already exists. An empty map is written as `{}`, never dropped.
    pub fn set_server_definitions(
        &mut self,
        key: &str,
        definitions: &ServerDefinitions,
    ) -> Result<(), String> {
        let value = serde_yaml::to_value(definitions).map_err(|e| e.to_string())?;
        self.fields
            .insert(serde_yaml::Value::String(key.to_string()), value);
        Ok(())
    }

    pub fn admin_filter(&self) -> AdminToolFilter {
        AdminToolFilter {
            included: self.string_list(INCLUDED_TOOLS_KEY),
            excluded: self.string_list(FILTERED_TOOLS_KEY),
        }
    }

    fn string_list(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .and_then(serde_yaml::Value::as_sequence)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "a boolean",
        serde_yaml::Value::Number(_) => "a number",
        serde_yaml::Value::String(_) => "a string",
        serde_yaml::Value::Sequence(_) => "a sequence",
        serde_yaml::Value::Mapping(_) => "a mapping",
        serde_yaml::Value::Tagged(_) => "a tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: Value) -> ServerDefinition {
        serde_json::from_value(value).unwrap()
    }

    fn definitions(value: Value) -> ServerDefinitions {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn overlay_keeps_fields_missing_from_incoming() {
        let mut current = definition(json!({"a": 1, "b": 1, "c": 1}));
        current.overlay(definition(json!({"b": 2})));
        assert_eq!(current.to_json(), json!({"a": 1, "b": 2, "c": 1}));
    }

    #[test]
    fn overlay_replaces_nested_objects_wholesale() {
        let mut current = definition(json!({"env": {"A": "1", "B": "2"}}));
        current.overlay(definition(json!({"env": {"A": "3"}})));
        assert_eq!(current.to_json(), json!({"env": {"A": "3"}}));
    }

    #[test]
    fn merge_only_touches_named_servers() {
        let mut existing = definitions(json!({"y": {"url": "u2"}}));
        merge_definitions(&mut existing, definitions(json!({"x": {"url": "u1"}})));
        assert_eq!(
            serde_json::to_value(&existing).unwrap(),
            json!({"x": {"url": "u1"}, "y": {"url": "u2"}})
        );
    }

    #[test]
    fn merge_search_timeout_scenario() {
        let mut existing = definitions(json!({"search": {"url": "u1"}}));
        merge_definitions(&mut existing, definitions(json!({"search": {"timeout": 30}})));
        assert_eq!(
            serde_json::to_value(&existing).unwrap(),
            json!({"search": {"url": "u1", "timeout": 30}})
        );
    }

    #[test]
    fn overlay_keeps_field_positions() {
        let mut current: ServerDefinition =
            serde_yaml::from_str("url: u1\ntimeout: 10\nheaders: {}\n").unwrap();
        current.overlay(serde_yaml::from_str("timeout: 30\niconPath: i.svg\n").unwrap());
        let fields: Vec<_> = current.fields().keys().filter_map(|k| k.as_str()).collect();
        assert_eq!(fields, vec!["url", "timeout", "headers", "iconPath"]);
    }

    #[test]
    fn unnamed_servers_survive_rewrite_exactly() {
        let text = "mcpServers:\n  a:\n    url: u\n    retryDelay: .inf\n    env:\n      1: x\n    tagged: !secret abc\n";
        let mut doc = ConfigDocument::parse(text).unwrap();
        let original_a = doc.get("mcpServers").unwrap()["a"].clone();

        let mut defs = doc.server_definitions("mcpServers").unwrap();
        merge_definitions(&mut defs, definitions(json!({"b": {"url": "u2"}})));
        doc.set_server_definitions("mcpServers", &defs).unwrap();

        let rewritten = ConfigDocument::parse(&doc.to_yaml().unwrap()).unwrap();
        let servers = rewritten.get("mcpServers").unwrap();
        assert_eq!(servers["a"], original_a);
        assert_eq!(servers["b"]["url"].as_str(), Some("u2"));
    }

    #[test]
    fn json_view_is_lossy_only_where_json_cannot_follow() {
        let definition: ServerDefinition =
            serde_yaml::from_str("url: u\nretryDelay: .inf\nenv:\n  1: x\nport: 8080\n")
                .unwrap();
        assert_eq!(
            definition.to_json(),
            json!({"url": "u", "retryDelay": null, "env": {"1": "x"}, "port": 8080})
        );
    }

    #[test]
    fn non_string_server_name_is_an_error() {
        let doc = ConfigDocument::parse("mcpServers:\n  42:\n    url: u\n").unwrap();
        assert!(doc.server_definitions("mcpServers").is_err());
    }

    #[test]
    fn parse_treats_empty_text_as_empty_document() {
        let doc = ConfigDocument::parse("").unwrap();
        assert!(doc.server_definitions("mcpServers").unwrap().is_empty());
    }

    #[test]
    fn parse_rejects_non_mapping_root() {
        let err = ConfigDocument::parse("- a\n- b\n").unwrap_err();
        assert!(err.contains("mapping"));
    }

    #[test]
    fn null_servers_field_reads_as_empty() {
        let doc = ConfigDocument::parse("mcpServers:\n").unwrap();
        assert!(doc.server_definitions("mcpServers").unwrap().is_empty());
    }

    #[test]
    fn scalar_servers_field_is_an_error() {
        let doc = ConfigDocument::parse("mcpServers: nope\n").unwrap();
        assert!(doc.server_definitions("mcpServers").is_err());
    }

    #[test]
    fn rewrite_preserves_unrelated_fields_and_order() {
        let text = "version: 1.2.1\ncache: true\nmcpServers:\n  a:\n    url: u1\ninterface:\n  privacyPolicy: x\n";
        let mut doc = ConfigDocument::parse(text).unwrap();
        let mut defs = doc.server_definitions("mcpServers").unwrap();
        defs.remove("a");
        doc.set_server_definitions("mcpServers", &defs).unwrap();

        let rewritten = ConfigDocument::parse(&doc.to_yaml().unwrap()).unwrap();
        let keys: Vec<_> = rewritten
            .fields
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect();
        assert_eq!(keys, vec!["version", "cache", "mcpServers", "interface"]);
        assert_eq!(rewritten.get("cache"), doc.get("cache"));
        assert_eq!(
            rewritten.get("mcpServers"),
            Some(&serde_yaml::Value::Mapping(Mapping::new()))
        );
    }

    #[test]
    fn admin_filter_applies_allow_then_deny() {
        let doc = ConfigDocument::parse(
            "includedTools: [calculator, wolfram]\nfilteredTools: [wolfram]\n",
        )
        .unwrap();
        let filter = doc.admin_filter();
        assert!(filter.allows("calculator"));
        assert!(!filter.allows("wolfram"));
        assert!(!filter.allows("dalle"));
    }

    #[test]
    fn admin_filter_without_allow_list_only_denies() {
        let filter = AdminToolFilter {
            included: vec![],
            excluded: vec!["dalle".into()],
        };
        assert!(filter.allows("calculator"));
        assert!(!filter.allows("dalle"));
    }
}
