//! Host plugin API.
//!
//! The agent runtime implements [`PluginHost`]; memlink registers its tools,
//! service, gateway method and hooks through it. Every payload crossing
//! this boundary is JSON.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::hooks::HostEvent;

/// A tool the agent can call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &'static str;

    /// Human-readable description shown to the model.
    fn description(&self) -> &'static str;

    /// JSON schema for the arguments.
    fn parameters(&self) -> Value;

    /// Execute the tool.
    ///
    /// Always returns a well-formed JSON object, including on failure.
    async fn call(&self, args: Value) -> Value;
}

/// A long-lived service started and stopped by the host.
#[async_trait]
pub trait Service: Send + Sync {
    /// Service identifier.
    fn id(&self) -> &'static str;

    async fn start(&self);

    async fn stop(&self);
}

/// A synchronous, zero-argument RPC method.
pub trait GatewayMethod: Send + Sync {
    /// Method name, e.g. `memory.health`.
    fn name(&self) -> &'static str;

    fn call(&self) -> Value;
}

/// Handler for a host lifecycle event.
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// Handle an event payload and return the hook result.
    async fn handle(&self, payload: Value) -> Value;
}

/// Registration surface provided by the host runtime.
pub trait PluginHost {
    fn register_tool(&mut self, tool: Arc<dyn Tool>);

    fn register_service(&mut self, service: Arc<dyn Service>);

    fn register_gateway_method(&mut self, method: Arc<dyn GatewayMethod>);

    /// Subscribe a handler to an event.
    fn on(&mut self, event: HostEvent, handler: Arc<dyn HookHandler>);
}
