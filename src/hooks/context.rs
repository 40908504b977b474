//! Auto context injection.
//!
//! Before an agent starts, the prompt is used as a search query against the
//! default namespace and the best matches are prepended as a context block.
//! Any failure injects nothing.

use async_trait::async_trait;
use serde_json::Value;

use crate::backends::MemoryRecord;
use crate::config::{ContextConfig, PluginConfig};
use crate::dispatch::{MemoryDispatcher, SearchRequest};
use crate::error::FailOpen;
use crate::hooks::input::{parse_input, AgentStartInput};
use crate::hooks::output::{to_value, AgentStartOutput};
use crate::plugin::HookHandler;

/// Prompts shorter than this are not worth a search.
pub const MIN_PROMPT_CHARS: usize = 5;

/// Longest prompt prefix used as a query.
const MAX_QUERY_CHARS: usize = 500;

/// Injects relevant memories before an agent starts.
#[derive(Debug, Clone)]
pub struct ContextInjector {
    dispatcher: MemoryDispatcher,
    config: ContextConfig,
    enabled: bool,
}

impl ContextInjector {
    /// Create an injector from plugin config.
    pub fn new(dispatcher: MemoryDispatcher, config: &PluginConfig) -> Self {
        Self {
            dispatcher,
            config: config.context.clone(),
            enabled: config.auto_context_injection,
        }
    }

    /// Whether injection is enabled.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Search for memories relevant to the prompt.
    pub async fn inject(&self, input: &AgentStartInput) -> AgentStartOutput {
        if !self.enabled || self.config.max_memories == 0 {
            return AgentStartOutput::empty();
        }

        let prompt = input.prompt.trim();
        if prompt.chars().count() < MIN_PROMPT_CHARS {
            return AgentStartOutput::empty();
        }

        let request = SearchRequest {
            query: prompt.chars().take(MAX_QUERY_CHARS).collect(),
            limit: Some(self.config.max_memories),
            min_score: Some(self.config.min_score.clamp(0.0, 1.0)),
            ..Default::default()
        };

        match self.dispatcher.search(request).await {
            Ok(memories) if !memories.is_empty() => {
                tracing::debug!("Injecting {} memories into agent context", memories.len());
                AgentStartOutput::with_context(format_context(&memories))
            }
            Ok(_) => AgentStartOutput::empty(),
            Err(e) => {
                tracing::debug!("Auto context injection skipped: {}", e);
                AgentStartOutput::empty()
            }
        }
    }
}

#[async_trait]
impl HookHandler for ContextInjector {
    async fn handle(&self, payload: Value) -> Value {
        let input: AgentStartInput =
            parse_input(payload).fail_open_default("Invalid before_agent_start payload");
        let output = self.inject(&input).await;
        to_value(&output).fail_open_with("Failed to serialize hook output", Value::Null)
    }
}

/// Format memories as a context block.
pub fn format_context(memories: &[MemoryRecord]) -> String {
    let mut out = String::from("<relevant-memories>\n");
    for memory in memories {
        out.push_str(&format!("- [{}] {}", memory.namespace, memory.content.trim()));
        if let Some(score) = memory.score {
            out.push_str(&format!(" (score: {:.2})", score));
        }
        out.push('\n');
    }
    out.push_str("</relevant-memories>");
    out
}
