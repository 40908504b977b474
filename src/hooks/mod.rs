//! Hook integration for agent runtimes.
//!
//! This module provides types and handlers for hooks the host invokes at
//! key points in an agent's lifecycle:
//!
//! - **before-agent-start**: Auto context injection of relevant memories

pub mod context;
pub mod input;
pub mod output;

use std::fmt;

pub use context::{format_context, ContextInjector, MIN_PROMPT_CHARS};
pub use input::{parse_input, AgentStartInput};
pub use output::{to_value, AgentStartOutput};

/// Host lifecycle events a plugin can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostEvent {
    /// Fired before an agent handles a prompt.
    BeforeAgentStart,
}

impl HostEvent {
    /// Canonical event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BeforeAgentStart => "before_agent_start",
        }
    }
}

impl fmt::Display for HostEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
