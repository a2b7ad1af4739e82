use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings file picked up from the working directory when none is given.
const DEFAULT_SETTINGS_FILE: &str = "settings.yaml";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Service settings file (YAML, TOML or JSON)
    #[arg(short, long, env = "SETTINGS_FILE")]
    pub settings: Option<String>,

    /// Configuration document holding the MCP server definitions
    #[arg(long, env = "CONFIG_PATH")]
    pub config_path: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    /// Log output format: compact or json
    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub document: DocumentConfig,
    pub tools: ToolsConfig,
    pub cache: CacheConfig,
    pub resilience: ResilienceConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentConfig {
    pub path: PathBuf,
    /// Top-level field of the document that holds the server definitions.
    pub servers_key: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ToolsConfig {
    pub directory: PathBuf,
    pub manifest_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub timeout_disabled: bool,
    pub request_timeout_secs: u64,
    pub server_init_timeout_secs: u64,
}

impl ResilienceConfig {
    pub fn server_init_timeout(&self) -> Duration {
        Duration::from_secs(self.server_init_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

impl LogFormat {
    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Json => "json",
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3080)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("document.path", "./config.yaml")?
            .set_default("document.servers_key", "mcpServers")?
            .set_default("tools.directory", "./tools")?
            .set_default("tools.manifest_path", "./manifest.json")?
            .set_default("cache.ttl_secs", 300)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.request_timeout_secs", 30)?
            .set_default("resilience.server_init_timeout_secs", 15)?
            .set_default("log.format", "compact")?;

        // An explicit settings file must exist; the cwd fallback is optional.
        match &cli.settings {
            Some(path) => builder = builder.add_source(File::with_name(path).required(true)),
            None if Path::new(DEFAULT_SETTINGS_FILE).is_file() => {
                builder = builder.add_source(File::with_name(DEFAULT_SETTINGS_FILE));
            }
            None => {}
        }

        // MCP_SYNC_SERVER__PORT=8000, MCP_SYNC_DOCUMENT__PATH=/etc/librechat.yaml
        builder = builder.add_source(
            Environment::with_prefix("MCP_SYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        // CLI flags (and their env fallbacks) win over every other layer.
        if let Some(path) = cli.config_path {
            builder = builder.set_override("document.path", path)?;
        }
        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }
        if let Some(format) = cli.log_format {
            builder = builder.set_override("log.format", format.as_str())?;
        }

        builder.build()?.try_deserialize()
    }

    /// Timeout applied by the request middleware; `None` when disabled.
    pub fn request_timeout(&self) -> Option<Duration> {
        (!self.resilience.timeout_disabled)
            .then(|| Duration::from_secs(self.resilience.request_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_defaults() {
        let config = AppConfig::load_from_args([
            "mcp-config-sync",
            "--config-path",
            "/tmp/librechat.yaml",
            "--port",
            "9000",
            "--timeout-disabled",
            "true",
            "--log-format",
            "json",
        ])
        .unwrap();

        assert_eq!(config.document.path, PathBuf::from("/tmp/librechat.yaml"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn missing_explicit_settings_file_is_an_error() {
        let result =
            AppConfig::load_from_args(["mcp-config-sync", "--settings", "/nonexistent/s.yaml"]);
        assert!(result.is_err());
    }
}
