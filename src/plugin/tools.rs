//! Memory tools exposed to the agent.
//!
//! Each tool parses its JSON arguments, runs one dispatcher operation, and
//! renders the outcome as a JSON object with a `success` flag. Failures keep
//! the success shape (an empty `results` list for search, and so on) plus an
//! `error` message and a machine-readable `errorKind`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::backends::{MemoryRecord, StatsSnapshot, WriteResult};
use crate::dispatch::{
    DeleteRequest, DispatchError, ListRequest, MemoryDispatcher, ReadRequest, SearchRequest,
    StoreRequest, ALLOWED_NAMESPACES,
};
use crate::plugin::host::Tool;

/// Envelope for every tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutput<T> {
    pub success: bool,
    #[serde(flatten)]
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "errorKind", skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl<T: Default> ToolOutput<T> {
    /// Create a success output.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
            error_kind: None,
        }
    }

    /// Create a failure output with empty data.
    pub fn failure(err: &DispatchError) -> Self {
        Self {
            success: false,
            data: T::default(),
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
        }
    }

    fn from_result(result: Result<T, DispatchError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::failure(&err),
        }
    }
}

/// `memory_store` result data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StoreData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
}

impl From<WriteResult> for StoreData {
    fn from(result: WriteResult) -> Self {
        Self {
            key: Some(result.key),
            namespace: Some(result.namespace),
            created: Some(result.created),
        }
    }
}

/// `memory_search` result data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchData {
    pub results: Vec<MemoryRecord>,
    pub count: usize,
}

/// `memory_read` result data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReadData {
    pub found: bool,
    pub record: Option<MemoryRecord>,
}

/// `memory_delete` result data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeleteData {
    pub deleted: bool,
}

/// `memory_list` result data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListData {
    pub entries: Vec<MemoryRecord>,
    pub count: usize,
}

/// `memory_stats` result data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatsData {
    pub stats: Option<StatsSnapshot>,
}

/// The memory tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryToolKind {
    Store,
    Search,
    Read,
    Delete,
    List,
    Stats,
}

impl MemoryToolKind {
    /// Every tool, in registration order.
    pub const ALL: [Self; 6] = [
        Self::Store,
        Self::Search,
        Self::Read,
        Self::Delete,
        Self::List,
        Self::Stats,
    ];

    /// Tool name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Store => "memory_store",
            Self::Search => "memory_search",
            Self::Read => "memory_read",
            Self::Delete => "memory_delete",
            Self::List => "memory_list",
            Self::Stats => "memory_stats",
        }
    }

    /// Look up a tool by name.
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    fn description(&self) -> &'static str {
        match self {
            Self::Store => "Store a memory entry. Replaces any entry with the same key.",
            Self::Search => "Search stored memories by text, best matches first.",
            Self::Read => "Read one memory entry by key.",
            Self::Delete => "Delete one memory entry by key.",
            Self::List => "List memory entries, most recently updated first.",
            Self::Stats => "Report entry counts per namespace.",
        }
    }

    fn parameters(&self) -> Value {
        let namespace = json!({
            "type": "string",
            "enum": ALLOWED_NAMESPACES,
            "description": "Namespace; defaults to the configured namespace"
        });
        match self {
            Self::Store => json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string"},
                    "key": {"type": "string", "description": "Generated when omitted"},
                    "namespace": namespace,
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "metadata": {"type": "object"}
                },
                "required": ["content"]
            }),
            Self::Search => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "namespace": namespace,
                    "limit": {"type": "integer", "minimum": 1},
                    "minScore": {"type": "number", "minimum": 0, "maximum": 1},
                    "tags": {"type": "array", "items": {"type": "string"}},
                    "includeMetadata": {"type": "boolean"}
                },
                "required": ["query"]
            }),
            Self::Read | Self::Delete => json!({
                "type": "object",
                "properties": {
                    "key": {"type": "string"},
                    "namespace": namespace
                },
                "required": ["key"]
            }),
            Self::List => json!({
                "type": "object",
                "properties": {
                    "namespace": namespace,
                    "limit": {"type": "integer", "minimum": 1},
                    "offset": {"type": "integer", "minimum": 0}
                }
            }),
            Self::Stats => json!({"type": "object", "properties": {}}),
        }
    }
}

/// One memory tool bound to a dispatcher.
#[derive(Debug, Clone)]
pub struct MemoryTool {
    kind: MemoryToolKind,
    dispatcher: MemoryDispatcher,
}

impl MemoryTool {
    pub fn new(kind: MemoryToolKind, dispatcher: MemoryDispatcher) -> Self {
        Self { kind, dispatcher }
    }

    pub fn kind(&self) -> MemoryToolKind {
        self.kind
    }

    async fn execute(&self, args: Value) -> Value {
        let d = &self.dispatcher;
        match self.kind {
            MemoryToolKind::Store => {
                let result = match parse_args::<StoreRequest>(args) {
                    Ok(request) => d.store(request).await.map(StoreData::from),
                    Err(e) => Err(e),
                };
                render(ToolOutput::from_result(result))
            }
            MemoryToolKind::Search => {
                let result = match parse_args::<SearchRequest>(args) {
                    Ok(request) => d.search(request).await.map(|results| SearchData {
                        count: results.len(),
                        results,
                    }),
                    Err(e) => Err(e),
                };
                render(ToolOutput::from_result(result))
            }
            MemoryToolKind::Read => {
                let result = match parse_args::<ReadRequest>(args) {
                    Ok(request) => d.read(request).await.map(|record| ReadData {
                        found: record.is_some(),
                        record,
                    }),
                    Err(e) => Err(e),
                };
                render(ToolOutput::from_result(result))
            }
            MemoryToolKind::Delete => {
                let result = match parse_args::<DeleteRequest>(args) {
                    Ok(request) => d.delete(request).await.map(|deleted| DeleteData { deleted }),
                    Err(e) => Err(e),
                };
                render(ToolOutput::from_result(result))
            }
            MemoryToolKind::List => {
                let result = match parse_args::<ListRequest>(args) {
                    Ok(request) => d.list(request).await.map(|entries| ListData {
                        count: entries.len(),
                        entries,
                    }),
                    Err(e) => Err(e),
                };
                render(ToolOutput::from_result(result))
            }
            MemoryToolKind::Stats => {
                let result = d.stats().await.map(|stats| StatsData { stats: Some(stats) });
                render(ToolOutput::from_result(result))
            }
        }
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn description(&self) -> &'static str {
        self.kind.description()
    }

    fn parameters(&self) -> Value {
        self.kind.parameters()
    }

    async fn call(&self, args: Value) -> Value {
        self.execute(args).await
    }
}

/// Build every memory tool over one dispatcher.
pub fn memory_tools(dispatcher: &MemoryDispatcher) -> Vec<Arc<dyn Tool>> {
    MemoryToolKind::ALL
        .into_iter()
        .map(|kind| Arc::new(MemoryTool::new(kind, dispatcher.clone())) as Arc<dyn Tool>)
        .collect()
}

fn parse_args<T: DeserializeOwned + Default>(args: Value) -> Result<T, DispatchError> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args).map_err(|e| DispatchError::invalid_input(e.to_string()))
}

fn render<T: Serialize>(output: ToolOutput<T>) -> Value {
    serde_json::to_value(&output).unwrap_or_else(|e| {
        json!({
            "success": false,
            "error": format!("Failed to serialize tool output: {}", e),
            "errorKind": "internal"
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testing::ScriptedBackend;
    use crate::backends::MemoryBackend;
    use crate::connection::{ConnectionState, SharedConnection};

    async fn connected_dispatcher() -> (Arc<ScriptedBackend>, MemoryDispatcher) {
        let backend = ScriptedBackend::new();
        backend.connect().await.unwrap();
        let shared = SharedConnection::new();
        {
            let mut slot = shared.write();
            slot.state = ConnectionState::Connected;
            slot.handle = Some(backend.clone());
        }
        (backend, MemoryDispatcher::new(shared))
    }

    fn tool(kind: MemoryToolKind, dispatcher: &MemoryDispatcher) -> MemoryTool {
        MemoryTool::new(kind, dispatcher.clone())
    }

    #[test]
    fn test_tool_names() {
        let names: Vec<&str> = MemoryToolKind::ALL.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            [
                "memory_store",
                "memory_search",
                "memory_read",
                "memory_delete",
                "memory_list",
                "memory_stats"
            ]
        );
        assert_eq!(
            MemoryToolKind::parse("memory_read"),
            Some(MemoryToolKind::Read)
        );
        assert_eq!(MemoryToolKind::parse("memory_forget"), None);
    }

    #[test]
    fn test_parameters_are_object_schemas() {
        for kind in MemoryToolKind::ALL {
            assert_eq!(kind.parameters()["type"], "object", "{}", kind.name());
        }
        let store = MemoryToolKind::Store.parameters();
        assert_eq!(store["required"], json!(["content"]));
        assert_eq!(store["properties"]["namespace"]["enum"][0], "internal");
    }

    #[tokio::test]
    async fn test_search_when_disconnected() {
        let dispatcher = MemoryDispatcher::new(SharedConnection::new());
        let output = tool(MemoryToolKind::Search, &dispatcher)
            .call(json!({"query": "anything"}))
            .await;

        assert_eq!(output["success"], false);
        assert_eq!(output["results"], json!([]));
        assert_eq!(output["error"], "Memory backend not connected");
        assert_eq!(output["errorKind"], "not_connected");
    }

    #[tokio::test]
    async fn test_search_backend_error_keeps_shape() {
        let (backend, dispatcher) = connected_dispatcher().await;
        backend.fail("search", "timeout");

        let output = tool(MemoryToolKind::Search, &dispatcher)
            .call(json!({"query": "anything"}))
            .await;

        assert_eq!(output["results"], json!([]));
        assert_eq!(output["error"], "timeout");
    }

    #[tokio::test]
    async fn test_store_then_read() {
        let (_, dispatcher) = connected_dispatcher().await;

        let stored = tool(MemoryToolKind::Store, &dispatcher)
            .call(json!({"key": "lang", "content": "Prefers Rust", "namespace": "Personal"}))
            .await;
        assert_eq!(stored["success"], true);
        assert_eq!(stored["namespace"], "personal");
        assert_eq!(stored["created"], true);

        let read = tool(MemoryToolKind::Read, &dispatcher)
            .call(json!({"key": "lang", "namespace": "personal"}))
            .await;
        assert_eq!(read["found"], true);
        assert_eq!(read["record"]["content"], "Prefers Rust");
    }

    #[tokio::test]
    async fn test_invalid_schema_output() {
        let (backend, dispatcher) = connected_dispatcher().await;

        let output = tool(MemoryToolKind::Store, &dispatcher)
            .call(json!({"content": "x", "namespace": "drop_all"}))
            .await;

        assert_eq!(output["success"], false);
        assert_eq!(output["error"], "Invalid schema: drop_all");
        assert_eq!(output["errorKind"], "invalid_schema");
        assert_eq!(backend.calls("write"), 0);
    }

    #[tokio::test]
    async fn test_malformed_arguments() {
        let (_, dispatcher) = connected_dispatcher().await;

        let output = tool(MemoryToolKind::Delete, &dispatcher)
            .call(json!({"key": 42}))
            .await;

        assert_eq!(output["success"], false);
        assert_eq!(output["errorKind"], "invalid_input");
        assert_eq!(output["deleted"], false);
    }

    #[tokio::test]
    async fn test_list_and_stats() {
        let (_, dispatcher) = connected_dispatcher().await;
        let store = tool(MemoryToolKind::Store, &dispatcher);
        store.call(json!({"content": "one"})).await;
        store.call(json!({"content": "two", "namespace": "shared"})).await;

        let listed = tool(MemoryToolKind::List, &dispatcher)
            .call(Value::Null)
            .await;
        assert_eq!(listed["count"], 2);

        let stats = tool(MemoryToolKind::Stats, &dispatcher)
            .call(json!({}))
            .await;
        assert_eq!(stats["stats"]["totalEntries"], 2);
        assert_eq!(stats["stats"]["byNamespace"]["shared"], 1);
    }

    #[test]
    fn test_memory_tools_builds_all() {
        let dispatcher = MemoryDispatcher::new(SharedConnection::new());
        let tools = memory_tools(&dispatcher);
        assert_eq!(tools.len(), 6);
        assert_eq!(tools[0].name(), "memory_store");
    }
}
