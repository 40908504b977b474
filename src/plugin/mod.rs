//! Plugin registration for memlink.
//!
//! [`MemoryPlugin`] wires the connection supervisor, the dispatcher, the
//! memory tools, the context hook and the health method into a host.
//! Registration never touches the backend, so it succeeds even when the
//! backend is unreachable; the connection is made when the host starts the
//! `memlink` service.

pub mod host;
pub mod local;
pub mod service;
pub mod tools;

use std::sync::Arc;

use crate::config::PluginConfig;
use crate::connection::{ConnectionSupervisor, StatusCache};
use crate::discovery::BackendResolver;
use crate::dispatch::MemoryDispatcher;
use crate::hooks::{ContextInjector, HostEvent};

pub use host::{GatewayMethod, HookHandler, PluginHost, Service, Tool};
pub use local::LocalHost;
pub use service::{HealthMethod, MemoryService, HEALTH_METHOD, SERVICE_ID};
pub use tools::{memory_tools, MemoryTool, MemoryToolKind, ToolOutput};

/// The memlink plugin.
pub struct MemoryPlugin {
    config: PluginConfig,
    supervisor: Arc<ConnectionSupervisor>,
    dispatcher: MemoryDispatcher,
}

impl MemoryPlugin {
    /// Create a plugin with a fresh, disconnected supervisor.
    pub fn new(config: PluginConfig, resolver: BackendResolver) -> Self {
        let supervisor = Arc::new(ConnectionSupervisor::new(resolver));
        let dispatcher = supervisor.dispatcher(&config);
        Self {
            config,
            supervisor,
            dispatcher,
        }
    }

    pub fn config(&self) -> &PluginConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor> {
        &self.supervisor
    }

    pub fn dispatcher(&self) -> &MemoryDispatcher {
        &self.dispatcher
    }

    pub fn status_cache(&self) -> StatusCache {
        self.supervisor.status_cache()
    }

    /// Register tools, service, gateway method and hooks with `host`.
    pub fn register(&self, host: &mut dyn PluginHost) {
        for tool in memory_tools(&self.dispatcher) {
            host.register_tool(tool);
        }

        host.register_service(Arc::new(MemoryService::new(
            Arc::clone(&self.supervisor),
            self.config.clone(),
        )));
        host.register_gateway_method(Arc::new(HealthMethod::new(self.status_cache())));

        let injector = ContextInjector::new(self.dispatcher.clone(), &self.config);
        if injector.is_enabled() {
            host.on(HostEvent::BeforeAgentStart, Arc::new(injector));
        }

        tracing::debug!(
            "Registered memlink plugin (default namespace '{}', auto context: {})",
            self.dispatcher.default_namespace(),
            self.config.auto_context_injection
        );
    }
}

/// Create a plugin and register it with `host`.
pub fn register(
    host: &mut dyn PluginHost,
    config: PluginConfig,
    resolver: BackendResolver,
) -> MemoryPlugin {
    let plugin = MemoryPlugin::new(config, resolver);
    plugin.register(host);
    plugin
}
