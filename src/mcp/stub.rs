use crate::mcp::config::McpServerEntry;
use crate::mcp::connector::{ServerConnection, ServerConnector};
use crate::mcp::types::ServerTool;
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-process connector serving fixed tool lists, for tests.
///
/// Servers registered with [`StubConnector::with_server`] connect and list
/// their tools; servers marked [`StubConnector::failing`] refuse to connect;
/// any other name connects with no tools. [`StubConnector::with_connect_delay`]
/// makes every connect take a while.
#[derive(Debug, Default, Clone)]
pub struct StubConnector {
    tools: HashMap<String, Vec<ServerTool>>,
    failing: HashSet<String>,
    connect_delay: Option<Duration>,
    live: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_server(mut self, name: &str, tools: &[&str]) -> Self {
        let tools = tools
            .iter()
            .map(|t| ServerTool {
                name: (*t).to_string(),
                description: Some(format!("{t} from {name}")),
            })
            .collect();
        self.tools.insert(name.to_string(), tools);
        self
    }

    #[must_use]
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    #[must_use]
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Connections opened and not yet closed.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Total successful connects since creation.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct StubConnection {
    tools: Vec<ServerTool>,
    live: Arc<AtomicUsize>,
}

#[async_trait]
impl ServerConnector for StubConnector {
    async fn connect(
        &self,
        name: &str,
        _entry: &McpServerEntry,
    ) -> anyhow::Result<Box<dyn ServerConnection>> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(name) {
            return Err(anyhow!("connection refused by '{name}'"));
        }
        self.live.fetch_add(1, Ordering::SeqCst);
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubConnection {
            tools: self.tools.get(name).cloned().unwrap_or_default(),
            live: Arc::clone(&self.live),
        }))
    }
}

#[async_trait]
impl ServerConnection for StubConnection {
    async fn list_tools(&self) -> anyhow::Result<Vec<ServerTool>> {
        Ok(self.tools.clone())
    }

    async fn close(self: Box<Self>) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}
