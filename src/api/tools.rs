use crate::AppState;
use crate::error::ConfigError;
use crate::reconcile::StartupSnapshot;
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// GET /api/tools - tool list from the last successful reconciliation.
///
/// A miss is reported as `{"tools": null, "cached": false}`; the list is
/// only rebuilt by reconciliation.
pub async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    match state.reconciler.cached_tools().await {
        Some(tools) => Json(json!({ "tools": tools, "cached": true })),
        None => Json(json!({ "tools": null, "cached": false })),
    }
}

/// GET /api/startup
pub async fn startup_config(
    State(state): State<AppState>,
) -> Result<Json<StartupSnapshot>, ConfigError> {
    state
        .reconciler
        .startup_snapshot()
        .await
        .map(Json)
        .inspect_err(|e| tracing::error!(error = %e, "Startup snapshot unavailable"))
}
