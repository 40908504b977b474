//! Hook input types.
//!
//! These types represent the JSON payload the host passes to memlink hooks.

use serde::{Deserialize, Serialize};

/// Input for the before-agent-start hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentStartInput {
    /// The user prompt the agent is about to handle.
    pub prompt: String,
    /// Host session identifier, if any.
    #[serde(alias = "session_id")]
    pub session_id: Option<String>,
}

impl AgentStartInput {
    /// Create an input for a prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            session_id: None,
        }
    }
}

/// Parse hook input from a JSON value.
///
/// `null` parses as the default input.
pub fn parse_input<T>(value: serde_json::Value) -> crate::error::Result<T>
where
    T: for<'de> Deserialize<'de> + Default,
{
    if value.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(value)
        .map_err(|e| crate::error::MemlinkError::serde(format!("Failed to parse hook input: {}", e)))
}
