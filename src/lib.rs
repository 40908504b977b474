//! memlink - memory backend plugin for agent runtimes
//!
//! memlink lets an agent persist and recall memory through a pluggable
//! backend. It resolves a backend from an ordered candidate list, supervises
//! a single shared connection, keeps a background-refreshed stats snapshot,
//! and keeps its tools, hooks and health checks answering in degraded mode
//! when the backend is unreachable.

pub mod backends;
pub mod cli;
pub mod config;
pub mod connection;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod plugin;

pub use backends::{
    BackendFactory, FileBackend, InMemoryBackend, ListOptions, MemoryBackend, MemoryRecord,
    NewMemory, SearchQuery, StatsSnapshot, WriteResult,
};
pub use config::{ConnectionParams, PluginConfig};
pub use connection::{
    ConnectionState, ConnectionSupervisor, HealthReport, HealthStatus, Status, StatusCache,
};
pub use discovery::{BackendProvider, BackendResolver, ProviderRegistry, ResolutionFailure};
pub use dispatch::{DispatchError, MemoryDispatcher, ALLOWED_NAMESPACES};
pub use error::{MemlinkError, Result};
pub use hooks::{ContextInjector, HostEvent};
pub use plugin::{register, LocalHost, MemoryPlugin, PluginHost};

// CLI commands
pub use cli::{BackendsCommand, MemoryCommand, StatusCommand};
