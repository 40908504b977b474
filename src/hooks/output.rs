//! Hook output types.
//!
//! These types represent the JSON that memlink hooks return to the host.

use serde::{Deserialize, Serialize};

/// Output for the before-agent-start hook.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentStartOutput {
    /// Context block to prepend to the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepend_context: Option<String>,
}

impl AgentStartOutput {
    /// Create an empty output.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create an output with context.
    pub fn with_context(context: impl Into<String>) -> Self {
        Self {
            prepend_context: Some(context.into()),
        }
    }
}

/// Serialize output to a JSON value.
pub fn to_value<T: Serialize>(output: &T) -> crate::error::Result<serde_json::Value> {
    serde_json::to_value(output)
        .map_err(|e| crate::error::MemlinkError::serde(format!("Failed to serialize output: {}", e)))
}
