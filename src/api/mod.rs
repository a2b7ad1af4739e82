//! HTTP surface.
//!
//! | Route                          | Effect                                  |
//! |--------------------------------|-----------------------------------------|
//! | `GET /config`                  | current server definitions              |
//! | `PUT /config`                  | merge per server name + reconcile       |
//! | `POST /config`                 | replace all definitions + reconcile     |
//! | `DELETE /config/{serverName}`  | remove one definition + reconcile       |
//! | `GET /api/tools`               | cached tool list, or a reported miss    |
//! | `GET /api/startup`             | startup configuration snapshot          |
//! | `GET /health`                  | liveness                                |

pub mod config;
pub mod tools;

use crate::AppState;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(config::build_router())
        .route("/api/tools", get(tools::list_tools))
        .route("/api/startup", get(tools::startup_config))
        .route("/health", get(health))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
