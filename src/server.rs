use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request},
    http::{Method, StatusCode},
    middleware::Next,
    response::IntoResponse,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::AppState;
use crate::api;
use crate::cache::{DerivedCache, InMemoryCache};
use crate::config::AppConfig;
use crate::document::DocumentStore;
use crate::mcp::{ConnectionRegistry, McpRegistry, RmcpConnector, ServerConnector};
use crate::reconcile::Reconciler;
use crate::tools::{EnvPluginAuth, FileManifestLoader, ToolAssembler};

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Wire the reconciler's collaborators from configuration. The connector
/// is injected so tests can avoid spawning real servers.
pub fn build_reconciler(config: &AppConfig, connector: Arc<dyn ServerConnector>) -> Reconciler {
    let store = Arc::new(DocumentStore::new(
        config.document.path.clone(),
        config.document.servers_key.clone(),
    ));
    let cache: Arc<dyn DerivedCache> = Arc::new(InMemoryCache::new(config.cache.ttl()));
    let registry: Arc<dyn ConnectionRegistry> = Arc::new(McpRegistry::new(
        connector,
        config.resilience.server_init_timeout(),
    ));

    Reconciler::new(
        store,
        cache,
        registry,
        ToolAssembler::new(config.tools.directory.clone()),
        Arc::new(FileManifestLoader::new(config.tools.manifest_path.clone())),
        Arc::new(EnvPluginAuth),
    )
}

/// Router with all routes and the HTTP layers applied.
pub fn build_router(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout();

    api::router()
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                let Some(duration) = request_timeout.filter(|_| !reconciles(&req)) else {
                    return next.run(req).await;
                };
                match tokio::time::timeout(duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_elapsed) => (
                        StatusCode::REQUEST_TIMEOUT,
                        Json(json!({ "error": "Request timed out" })),
                    )
                        .into_response(),
                }
            },
        ))
        .with_state(state)
}

/// Mutations of `/config` commit before they answer, so they are never
/// cut short by the request timeout. Connection setup is bounded by the
/// per-server init timeout instead.
fn reconciles(req: &Request) -> bool {
    let path = req.uri().path();
    matches!(*req.method(), Method::PUT | Method::POST | Method::DELETE)
        && (path == "/config" || path.starts_with("/config/"))
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    info!(
        name: "config.document.location",
        path = %config.document.path.display(),
        servers_key = %config.document.servers_key,
        "Configuration document location"
    );

    let reconciler = Arc::new(build_reconciler(&config, Arc::new(RmcpConnector)));

    // A failed first pass leaves the tool list uncached until the next change.
    match reconciler.reconcile().await {
        Ok(outcome) => info!(
            name: "server.initial_reconcile.completed",
            connected = outcome.connected.len(),
            failed = outcome.failures.len(),
            tools = outcome.tools.len(),
            "Initial reconciliation completed"
        ),
        Err(e) => error!(
            name: "server.initial_reconcile.failed",
            error = %e,
            "Initial reconciliation failed"
        ),
    }

    let state = AppState {
        reconciler: Arc::clone(&reconciler),
        config: Arc::clone(&config),
    };
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reconciler.shutdown().await;
    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(method: Method, uri: &str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn only_config_mutations_bypass_request_timeout() {
        assert!(reconciles(&request(Method::PUT, "/config")));
        assert!(reconciles(&request(Method::POST, "/config")));
        assert!(reconciles(&request(Method::DELETE, "/config/time")));

        assert!(!reconciles(&request(Method::GET, "/config")));
        assert!(!reconciles(&request(Method::GET, "/api/startup")));
        assert!(!reconciles(&request(Method::POST, "/configuration")));
    }
}
