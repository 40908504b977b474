//! In-process plugin host.
//!
//! Collects registrations in maps and lets callers invoke them directly.
//! The CLI uses it to drive the plugin without an agent runtime.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::hooks::HostEvent;
use crate::plugin::host::{GatewayMethod, HookHandler, PluginHost, Service, Tool};

/// Plugin host backed by in-memory registries.
#[derive(Default)]
pub struct LocalHost {
    tools: BTreeMap<&'static str, Arc<dyn Tool>>,
    services: Vec<Arc<dyn Service>>,
    methods: BTreeMap<&'static str, Arc<dyn GatewayMethod>>,
    hooks: BTreeMap<HostEvent, Vec<Arc<dyn HookHandler>>>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered tool names, sorted.
    pub fn tool_names(&self) -> Vec<&'static str> {
        self.tools.keys().copied().collect()
    }

    /// Registered service ids, in registration order.
    pub fn service_ids(&self) -> Vec<&'static str> {
        self.services.iter().map(|s| s.id()).collect()
    }

    /// Registered gateway method names, sorted.
    pub fn method_names(&self) -> Vec<&'static str> {
        self.methods.keys().copied().collect()
    }

    /// Number of handlers subscribed to `event`.
    pub fn hook_count(&self, event: HostEvent) -> usize {
        self.hooks.get(&event).map_or(0, Vec::len)
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, args: Value) -> Value {
        match self.tools.get(name) {
            Some(tool) => tool.call(args).await,
            None => json!({
                "success": false,
                "error": format!("Unknown tool: {}", name),
                "errorKind": "unknown_tool"
            }),
        }
    }

    /// Call a gateway method by name.
    pub fn call_method(&self, name: &str) -> Option<Value> {
        self.methods.get(name).map(|method| method.call())
    }

    /// Deliver an event to every subscribed handler, in order.
    pub async fn emit(&self, event: HostEvent, payload: Value) -> Vec<Value> {
        let mut results = Vec::new();
        if let Some(handlers) = self.hooks.get(&event) {
            for handler in handlers {
                results.push(handler.handle(payload.clone()).await);
            }
        }
        results
    }

    /// Start every service, in registration order.
    pub async fn start_services(&self) {
        for service in &self.services {
            service.start().await;
        }
    }

    /// Stop every service, in reverse registration order.
    pub async fn stop_services(&self) {
        for service in self.services.iter().rev() {
            service.stop().await;
        }
    }
}

impl PluginHost for LocalHost {
    fn register_tool(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name(), tool);
    }

    fn register_service(&mut self, service: Arc<dyn Service>) {
        self.services.push(service);
    }

    fn register_gateway_method(&mut self, method: Arc<dyn GatewayMethod>) {
        self.methods.insert(method.name(), method);
    }

    fn on(&mut self, event: HostEvent, handler: Arc<dyn HookHandler>) {
        tracing::debug!("Subscribed hook handler to {}", event);
        self.hooks.entry(event).or_default().push(handler);
    }
}
