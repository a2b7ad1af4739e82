use crate::AppState;
use crate::document::{ServerDefinition, ServerDefinitions, definitions_to_json};
use crate::error::ConfigError;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::{delete, get},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, warn};

/// Body field carrying the definitions.
const DEFINITIONS_FIELD: &str = "serverDefinitions";
/// Accepted alias, matching the document's own field name.
const DEFINITIONS_ALIAS: &str = "mcpServers";

pub fn build_router() -> Router<AppState> {
    Router::new()
        .route(
            "/config",
            get(get_config).put(merge_config).post(replace_config),
        )
        .route("/config/{server_name}", delete(remove_server))
}

/// GET /config - current server definitions
async fn get_config(State(state): State<AppState>) -> Result<Json<Value>, ConfigError> {
    let definitions = state
        .reconciler
        .get()
        .await
        .inspect_err(|e| log_failure("get", e))?;
    Ok(Json(json!({ DEFINITIONS_FIELD: definitions_to_json(&definitions) })))
}

/// PUT /config - merge definitions per server name, then reconcile
async fn merge_config(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ConfigError> {
    let partial = parse_definitions(payload).inspect_err(|e| log_failure("merge", e))?;
    let outcome = detached(&state, |reconciler| async move { reconciler.merge(partial).await })
        .await
        .inspect_err(|e| log_failure("merge", e))?;
    Ok(applied(outcome))
}

/// POST /config - replace all definitions, then reconcile
async fn replace_config(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ConfigError> {
    let definitions = parse_definitions(payload).inspect_err(|e| log_failure("replace", e))?;
    let outcome = detached(&state, |reconciler| async move {
        reconciler.replace(definitions).await
    })
    .await
    .inspect_err(|e| log_failure("replace", e))?;
    Ok(applied(outcome))
}

/// DELETE /config/{server_name} - remove one definition, then reconcile
async fn remove_server(
    State(state): State<AppState>,
    Path(server_name): Path<String>,
) -> Result<Json<Value>, ConfigError> {
    let name = server_name.clone();
    let outcome = detached(&state, |reconciler| async move {
        reconciler.remove(&name).await
    })
    .await
    .inspect_err(|e| log_failure("remove", e))?;

    Ok(Json(json!({
        "success": true,
        "message": format!("Server \"{server_name}\" removed"),
        DEFINITIONS_FIELD: definitions_to_json(&outcome.server_definitions),
    })))
}

fn applied(outcome: ReconcileOutcome) -> Json<Value> {
    Json(json!({
        "success": true,
        DEFINITIONS_FIELD: definitions_to_json(&outcome.server_definitions),
    }))
}

/// Run a reconciliation on its own task so a dropped request cannot cancel
/// it halfway through.
async fn detached<F, Fut>(state: &AppState, run: F) -> Result<ReconcileOutcome, ConfigError>
where
    F: FnOnce(Arc<Reconciler>) -> Fut,
    Fut: Future<Output = Result<ReconcileOutcome, ConfigError>> + Send + 'static,
{
    tokio::spawn(run(Arc::clone(&state.reconciler)))
        .await
        .map_err(|e| ConfigError::Internal(format!("reconciliation task failed: {e}")))?
}

/// Structural validation of a request body. Nothing is read or written
/// before it passes.
fn parse_definitions(
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<ServerDefinitions, ConfigError> {
    let Json(body) =
        payload.map_err(|rejection| ConfigError::InvalidInput(rejection.body_text()))?;

    let Value::Object(mut body) = body else {
        return Err(ConfigError::InvalidInput(
            "request body must be a JSON object".to_string(),
        ));
    };
    let definitions = body
        .remove(DEFINITIONS_FIELD)
        .or_else(|| body.remove(DEFINITIONS_ALIAS))
        .ok_or_else(|| {
            ConfigError::InvalidInput(format!("missing `{DEFINITIONS_FIELD}` field"))
        })?;

    let Value::Object(definitions) = definitions else {
        return Err(ConfigError::InvalidInput(format!(
            "`{DEFINITIONS_FIELD}` must be an object keyed by server name"
        )));
    };

    definitions
        .into_iter()
        .map(|(name, definition)| match definition {
            Value::Object(fields) => ServerDefinition::from_json(fields)
                .map(|definition| (name, definition))
                .map_err(ConfigError::InvalidInput),
            _ => Err(ConfigError::InvalidInput(format!(
                "definition of \"{name}\" must be an object"
            ))),
        })
        .collect()
}

fn log_failure(operation: &'static str, err: &ConfigError) {
    if err.status().is_server_error() {
        error!(name: "config.api.failed", operation, error = %err, "Configuration request failed");
    } else {
        warn!(name: "config.api.rejected", operation, error = %err, "Configuration request rejected");
    }
}
