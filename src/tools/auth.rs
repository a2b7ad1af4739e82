use super::manifest::{PluginDescriptor, unique_plugins};
use std::fmt;

/// Value a deployment writes into an env var to mean "each user supplies
/// their own credential"; it never authenticates a plugin globally.
pub const USER_PROVIDED: &str = "user_provided";

pub trait PluginAuth: Send + Sync + fmt::Debug {
    fn check(&self, plugin: &PluginDescriptor) -> bool;
}

/// Authenticates plugins whose declared credentials are present in the
/// process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvPluginAuth;

impl EnvPluginAuth {
    fn field_resolves(field: &str) -> bool {
        field.split("||").map(str::trim).any(|var| {
            std::env::var(var)
                .map(|value| {
                    let value = value.trim();
                    !value.is_empty() && value != USER_PROVIDED
                })
                .unwrap_or(false)
        })
    }
}

impl PluginAuth for EnvPluginAuth {
    fn check(&self, plugin: &PluginDescriptor) -> bool {
        !plugin.auth_config.is_empty()
            && plugin
                .auth_config
                .iter()
                .all(|field| Self::field_resolves(&field.auth_field))
    }
}

/// Deduplicate by plugin key and mark plugins the predicate accepts.
/// Rejected plugins are returned exactly as given.
pub fn authenticate_plugins(
    plugins: Vec<PluginDescriptor>,
    auth: &dyn PluginAuth,
) -> Vec<PluginDescriptor> {
    unique_plugins(plugins)
        .into_iter()
        .map(|mut plugin| {
            if auth.check(&plugin) {
                plugin.authenticated = Some(true);
            }
            plugin
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct AllowKeys(&'static [&'static str]);

    impl PluginAuth for AllowKeys {
        fn check(&self, plugin: &PluginDescriptor) -> bool {
            self.0.contains(&plugin.plugin_key.as_str())
        }
    }

    fn plugin(value: serde_json::Value) -> PluginDescriptor {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn marks_only_accepted_plugins() {
        let out = authenticate_plugins(
            vec![
                plugin(json!({"name": "A", "pluginKey": "a"})),
                plugin(json!({"name": "B", "pluginKey": "b"})),
            ],
            &AllowKeys(&["a"]),
        );
        assert_eq!(out[0].authenticated, Some(true));
        assert_eq!(out[1].authenticated, None);
        assert!(
            serde_json::to_value(&out[1])
                .unwrap()
                .get("authenticated")
                .is_none()
        );
    }

    #[test]
    fn deduplicates_before_checking() {
        let out = authenticate_plugins(
            vec![
                plugin(json!({"name": "first", "pluginKey": "a"})),
                plugin(json!({"name": "second", "pluginKey": "a"})),
            ],
            &AllowKeys(&[]),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "first");
    }

    #[test]
    fn env_auth_requires_declared_fields() {
        let auth = EnvPluginAuth;
        assert!(!auth.check(&plugin(json!({"name": "n", "pluginKey": "k"}))));
        assert!(auth.check(&plugin(json!({
            "name": "n",
            "pluginKey": "k",
            "authConfig": [{"authField": "MCP_SYNC_SURELY_UNSET_VAR||PATH"}]
        }))));
        assert!(!auth.check(&plugin(json!({
            "name": "n",
            "pluginKey": "k",
            "authConfig": [
                {"authField": "PATH"},
                {"authField": "MCP_SYNC_SURELY_UNSET_VAR"}
            ]
        }))));
    }
}
