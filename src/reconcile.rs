//! Configuration reconciliation and tool refresh.
//!
//! Every change to the server definitions runs the same sequence, serialized
//! behind one lock so document writes and registry rebuilds never
//! interleave:
//!
//! ```text
//! mutate + persist ─► invalidate cache ─► reload document ─► assemble static tools
//!        ─► disconnect all ─► initialize servers ─► register static tools
//!        ─► manifest + MCP tools ─► authenticate ─► intersect ─► cache tool list
//! ```
//!
//! A persistence failure aborts before the cache or registry is touched.
//! Servers that fail to initialize are reported and skipped. A manifest
//! failure aborts the tail of the pipeline and leaves the tool list uncached.

use crate::cache::{CacheKey, DerivedCache};
use crate::document::{DocumentStore, ServerDefinitions};
use crate::error::ConfigError;
use crate::mcp::{ConnectionRegistry, ServerInitFailure};
use crate::tools::{
    ManifestLoader, PluginAuth, PluginDescriptor, ToolAssembler, authenticate_plugins,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

/// Result of one completed reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileOutcome {
    /// Server definitions as re-read from storage after the change.
    pub server_definitions: ServerDefinitions,
    /// Authenticated-flagged, available tool list now cached.
    pub tools: Vec<PluginDescriptor>,
    pub connected: Vec<String>,
    pub failures: Vec<ServerInitFailure>,
}

/// Startup configuration view cached under
/// [`CacheKey::StartupConfigSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartupSnapshot {
    pub mcp_servers: Vec<String>,
    pub included_tools: Vec<String>,
    pub filtered_tools: Vec<String>,
}

pub struct Reconciler {
    store: Arc<DocumentStore>,
    cache: Arc<dyn DerivedCache>,
    registry: Arc<dyn ConnectionRegistry>,
    assembler: ToolAssembler,
    manifest: Arc<dyn ManifestLoader>,
    auth: Arc<dyn PluginAuth>,
    lock: Mutex<()>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("store", &self.store)
            .field("registry", &self.registry)
            .field("tools_directory", &self.assembler.directory())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<DocumentStore>,
        cache: Arc<dyn DerivedCache>,
        registry: Arc<dyn ConnectionRegistry>,
        assembler: ToolAssembler,
        manifest: Arc<dyn ManifestLoader>,
        auth: Arc<dyn PluginAuth>,
    ) -> Self {
        Self {
            store,
            cache,
            registry,
            assembler,
            manifest,
            auth,
            lock: Mutex::new(()),
        }
    }

    /// Current server definitions. Takes no lock and touches neither the
    /// cache nor the registry.
    pub async fn get(&self) -> Result<ServerDefinitions, ConfigError> {
        self.store.get().await
    }

    #[instrument(skip_all, fields(servers = definitions.len()))]
    pub async fn replace(
        &self,
        definitions: ServerDefinitions,
    ) -> Result<ReconcileOutcome, ConfigError> {
        let _guard = self.lock.lock().await;
        self.store.replace(definitions).await?;
        self.run_pipeline("replace").await
    }

    #[instrument(skip_all, fields(servers = partial.len()))]
    pub async fn merge(&self, partial: ServerDefinitions) -> Result<ReconcileOutcome, ConfigError> {
        let _guard = self.lock.lock().await;
        self.store.merge(partial).await?;
        self.run_pipeline("merge").await
    }

    #[instrument(skip(self))]
    pub async fn remove(&self, server_name: &str) -> Result<ReconcileOutcome, ConfigError> {
        let _guard = self.lock.lock().await;
        self.store.remove(server_name).await?;
        self.run_pipeline("remove").await
    }

    /// Reconcile against the document as it is on disk.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileOutcome, ConfigError> {
        let _guard = self.lock.lock().await;
        self.run_pipeline("refresh").await
    }

    /// Close every live server connection. Waits for any in-flight
    /// reconciliation first.
    pub async fn shutdown(&self) {
        let _guard = self.lock.lock().await;
        self.registry.disconnect_all().await;
        for key in CacheKey::ALL {
            self.cache.delete(key).await;
        }
    }

    /// Cached tool list; `None` means unknown (invalidated, expired, or the
    /// last refresh failed).
    pub async fn cached_tools(&self) -> Option<Vec<PluginDescriptor>> {
        let value = self.cache.get(CacheKey::ToolList).await?;
        match serde_json::from_value(value) {
            Ok(tools) => Some(tools),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed cached tool list");
                None
            }
        }
    }

    /// Startup snapshot from cache, derived and stored on a miss. Derivation
    /// waits for any in-flight reconciliation so it never caches a view of
    /// a superseded document.
    pub async fn startup_snapshot(&self) -> Result<StartupSnapshot, ConfigError> {
        if let Some(snapshot) = self.cached_snapshot().await {
            return Ok(snapshot);
        }

        let _guard = self.lock.lock().await;
        if let Some(snapshot) = self.cached_snapshot().await {
            return Ok(snapshot);
        }

        let document = self.store.load().await?;
        let definitions = self.store.definitions_of(&document)?;
        let filter = document.admin_filter();
        let snapshot = StartupSnapshot {
            mcp_servers: definitions.into_keys().collect(),
            included_tools: filter.included,
            filtered_tools: filter.excluded,
        };

        if let Ok(value) = serde_json::to_value(&snapshot) {
            self.cache.set(CacheKey::StartupConfigSnapshot, value).await;
        }
        Ok(snapshot)
    }

    async fn cached_snapshot(&self) -> Option<StartupSnapshot> {
        let value = self.cache.get(CacheKey::StartupConfigSnapshot).await?;
        serde_json::from_value(value).ok()
    }

    /// Caller must hold `self.lock`.
    async fn run_pipeline(&self, trigger: &'static str) -> Result<ReconcileOutcome, ConfigError> {
        info!(name: "config.reconcile.started", trigger, "Reconciliation started");

        for key in CacheKey::ALL {
            self.cache.delete(key).await;
        }

        let document = self.store.load().await.inspect_err(|e| {
            error!(trigger, error = %e, "Reloading configuration document failed");
        })?;
        let server_definitions = self.store.definitions_of(&document)?;

        let filter = document.admin_filter();
        let assembler = self.assembler.clone();
        let static_tools = tokio::task::spawn_blocking(move || assembler.assemble(&filter))
            .await
            .map_err(|e| ConfigError::Internal(format!("tool assembly failed: {e}")))?;

        self.registry.disconnect_all().await;
        let report = self.registry.initialize_from(&server_definitions).await;
        for failure in &report.failures {
            warn!(
                trigger,
                server = %failure.server,
                reason = %failure.reason,
                "Server left out of the live set"
            );
        }

        self.registry.register_available_tools(&static_tools).await;

        let manifest = self.manifest.read().await.inspect_err(|e| {
            error!(trigger, error = %e, "Plugin manifest could not be loaded");
        })?;
        let manifest = self.registry.load_manifest_tools(manifest).await;

        let plugins = authenticate_plugins(manifest, self.auth.as_ref());
        let available = self.registry.available_tool_keys().await;
        let tools: Vec<PluginDescriptor> = plugins
            .into_iter()
            .filter(|plugin| available.contains(&plugin.plugin_key))
            .collect();

        match serde_json::to_value(&tools) {
            Ok(value) => self.cache.set(CacheKey::ToolList, value).await,
            Err(e) => warn!(error = %e, "Tool list not cached"),
        }

        let connected = self.registry.connected_servers().await;
        info!(
            name: "config.reconcile.completed",
            trigger,
            servers = server_definitions.len(),
            connected = connected.len(),
            failed = report.failures.len(),
            tools = tools.len(),
            "Reconciliation completed"
        );

        Ok(ReconcileOutcome {
            server_definitions,
            tools,
            connected,
            failures: report.failures,
        })
    }
}
