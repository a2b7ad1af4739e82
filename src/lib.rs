//! MCP server configuration sync service.
//!
//! Keeps a YAML configuration document, a connection registry of live MCP
//! servers, and a cached tool list consistent with each other. Every change
//! to the server definitions is persisted first and then reconciled: the
//! derived caches are invalidated, the registry is rebuilt from the stored
//! definitions, and the authenticated tool list is recomputed.
//!
//! # Modules
//!
//! - [`document`]: configuration document model and file store
//! - [`reconcile`]: the serialized reconciliation pipeline
//! - [`mcp`]: MCP connection registry and connectors
//! - [`tools`]: static tools, plugin manifest, plugin authentication
//! - [`cache`]: derived-value cache
//! - [`api`]: HTTP handlers

#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::default_trait_access)]

pub mod api;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod mcp;
pub mod reconcile;
pub mod server;
pub mod telemetry;
pub mod tools;

use crate::config::AppConfig;
use crate::reconcile::Reconciler;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub config: Arc<AppConfig>,
}
