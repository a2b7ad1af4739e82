//! MCP configuration sync server.
//!
//! Entry point: loads settings, installs tracing, and serves the
//! configuration API.

use anyhow::Context;
use dotenvy::dotenv;
use mcp_config_sync::{config::AppConfig, server, telemetry};
use mimalloc::MiMalloc;
use std::sync::Arc;

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present) before settings so it can feed them.
    let _ = dotenv();

    let config = AppConfig::load().context("failed to load service settings")?;
    telemetry::init(config.log.format);

    tracing::info!(
        name: "config.loaded",
        host = %config.server.host,
        port = config.server.port,
        document = %config.document.path.display(),
        "Service settings loaded"
    );

    server::start_server(Arc::new(config)).await
}
