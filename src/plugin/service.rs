//! Service and gateway bindings for the connection supervisor.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::PluginConfig;
use crate::connection::{ConnectionSupervisor, StatusCache};
use crate::plugin::host::{GatewayMethod, Service};

/// Service identifier registered with the host.
pub const SERVICE_ID: &str = "memlink";

/// Gateway method name for the health check.
pub const HEALTH_METHOD: &str = "memory.health";

/// Starts and stops the supervised connection with the host.
pub struct MemoryService {
    supervisor: Arc<ConnectionSupervisor>,
    config: PluginConfig,
}

impl MemoryService {
    pub fn new(supervisor: Arc<ConnectionSupervisor>, config: PluginConfig) -> Self {
        Self { supervisor, config }
    }
}

#[async_trait]
impl Service for MemoryService {
    fn id(&self) -> &'static str {
        SERVICE_ID
    }

    async fn start(&self) {
        let status = self.supervisor.start(&self.config).await;
        tracing::debug!("memlink service started (state: {})", status.state);
    }

    async fn stop(&self) {
        self.supervisor.stop().await;
        tracing::debug!("memlink service stopped");
    }
}

/// `memory.health`: last known health, no I/O.
pub struct HealthMethod {
    status: StatusCache,
}

impl HealthMethod {
    pub fn new(status: StatusCache) -> Self {
        Self { status }
    }
}

impl GatewayMethod for HealthMethod {
    fn name(&self) -> &'static str {
        HEALTH_METHOD
    }

    fn call(&self) -> Value {
        serde_json::to_value(self.status.health()).unwrap_or_else(|e| {
            json!({
                "status": "disconnected",
                "stats": null,
                "error": format!("Failed to serialize health report: {}", e)
            })
        })
    }
}
