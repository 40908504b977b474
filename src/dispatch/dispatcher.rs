//! Memory operation dispatcher.
//!
//! Each operation validates its input, reads the current backend handle from
//! the shared slot, and invokes the backend. Validation never depends on the
//! connection state, and the dispatcher never reconnects on its own.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::backends::{
    generate_key, ListOptions, MemoryBackend, MemoryRecord, NewMemory, SearchQuery,
    StatsSnapshot, WriteResult, DEFAULT_SEARCH_LIMIT,
};
use crate::config::{PluginConfig, DEFAULT_NAMESPACE};
use crate::connection::SharedConnection;
use crate::dispatch::namespace::{normalize_namespace, resolve_namespace};
use crate::dispatch::DispatchError;

/// Longest accepted entry key.
pub const MAX_KEY_LEN: usize = 256;

/// Upper bound on search results per call.
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Upper bound on listed entries per call.
pub const MAX_LIST_LIMIT: usize = 1000;

type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Arguments for storing an entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreRequest {
    /// Key to store under. Generated when absent.
    pub key: Option<String>,
    pub content: String,
    pub namespace: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// Arguments for a search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: String,
    pub namespace: Option<String>,
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
    pub tags: Vec<String>,
    pub include_metadata: bool,
}

/// Arguments for reading one entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadRequest {
    pub key: String,
    pub namespace: Option<String>,
}

/// Arguments for deleting one entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeleteRequest {
    pub key: String,
    pub namespace: Option<String>,
}

/// Arguments for listing entries. A missing namespace lists all of them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListRequest {
    pub namespace: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Routes memory operations to the supervised backend.
#[derive(Debug, Clone)]
pub struct MemoryDispatcher {
    shared: SharedConnection,
    default_namespace: String,
    timeout: Option<Duration>,
}

impl MemoryDispatcher {
    /// Create a dispatcher with the built-in default namespace and no timeout.
    pub fn new(shared: SharedConnection) -> Self {
        Self {
            shared,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            timeout: None,
        }
    }

    /// Create a dispatcher configured from plugin config.
    pub fn from_config(shared: SharedConnection, config: &PluginConfig) -> Self {
        let timeout = match config.backend.operation_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Self::new(shared)
            .with_default_namespace(&config.default_namespace)
            .with_timeout(timeout)
    }

    /// Set the namespace used when a request names none.
    ///
    /// Names outside the allow-list are ignored.
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        match normalize_namespace(namespace) {
            Some(ns) => self.default_namespace = ns,
            None => tracing::warn!(
                "Ignoring invalid default namespace '{}', keeping '{}'",
                namespace,
                self.default_namespace
            ),
        }
        self
    }

    /// Bound every backend call. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Namespace used when a request names none.
    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Store an entry.
    pub async fn store(&self, request: StoreRequest) -> DispatchResult<WriteResult> {
        if request.content.trim().is_empty() {
            return Err(DispatchError::invalid_input("content is required"));
        }
        let key = match request.key.as_deref().map(str::trim) {
            None => generate_key(),
            Some("") => return Err(DispatchError::invalid_input("key must not be empty")),
            Some(key) => validate_key(key)?,
        };
        let namespace = resolve_namespace(request.namespace.as_deref(), &self.default_namespace)?;

        let mut entry = NewMemory::new(namespace, key, request.content).tags(request.tags);
        if let Some(metadata) = request.metadata {
            entry = entry.metadata(metadata);
        }

        self.run("store", move |backend| async move { backend.write(&entry).await })
            .await
    }

    /// Search entries.
    ///
    /// Metadata is stripped from results unless `include_metadata` is set.
    pub async fn search(&self, request: SearchRequest) -> DispatchResult<Vec<MemoryRecord>> {
        let text = request.query.trim();
        if text.is_empty() {
            return Err(DispatchError::invalid_input("query is required"));
        }
        let namespace = resolve_namespace(request.namespace.as_deref(), &self.default_namespace)?;
        let limit = clamp_limit(request.limit, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT)?;

        let mut query = SearchQuery::new(text)
            .namespace(namespace)
            .limit(limit)
            .tags(request.tags)
            .include_metadata(request.include_metadata);
        if let Some(min_score) = request.min_score {
            if !(0.0..=1.0).contains(&min_score) {
                return Err(DispatchError::invalid_input(
                    "minScore must be between 0 and 1",
                ));
            }
            query = query.min_score(min_score);
        }

        let include_metadata = query.include_metadata;
        let mut results = self
            .run("search", move |backend| async move { backend.search(&query).await })
            .await?;
        if !include_metadata {
            for record in &mut results {
                record.metadata = None;
            }
        }
        Ok(results)
    }

    /// Read one entry. `Ok(None)` when no such entry exists.
    pub async fn read(&self, request: ReadRequest) -> DispatchResult<Option<MemoryRecord>> {
        let key = required_key(&request.key)?;
        let namespace = resolve_namespace(request.namespace.as_deref(), &self.default_namespace)?;

        self.run("read", move |backend| async move {
            backend.read(&namespace, &key).await
        })
        .await
    }

    /// Delete one entry. Returns whether anything was removed.
    pub async fn delete(&self, request: DeleteRequest) -> DispatchResult<bool> {
        let key = required_key(&request.key)?;
        let namespace = resolve_namespace(request.namespace.as_deref(), &self.default_namespace)?;

        self.run("delete", move |backend| async move {
            backend.delete(&namespace, &key).await
        })
        .await
    }

    /// List entries, most recently updated first.
    pub async fn list(&self, request: ListRequest) -> DispatchResult<Vec<MemoryRecord>> {
        let mut options = ListOptions::all().offset(request.offset.unwrap_or(0));
        if let Some(raw) = request.namespace.as_deref().filter(|ns| !ns.trim().is_empty()) {
            options = options.namespace(resolve_namespace(Some(raw), &self.default_namespace)?);
        }
        if request.limit.is_some() {
            options = options.limit(clamp_limit(request.limit, MAX_LIST_LIMIT, MAX_LIST_LIMIT)?);
        }

        self.run("list", move |backend| async move { backend.list(&options).await })
            .await
    }

    /// Live backend statistics.
    pub async fn stats(&self) -> DispatchResult<StatsSnapshot> {
        self.run("stats", |backend| async move { backend.stats().await })
            .await
    }

    async fn run<T, F, Fut>(&self, op: &'static str, call: F) -> DispatchResult<T>
    where
        F: FnOnce(Arc<dyn MemoryBackend>) -> Fut,
        Fut: Future<Output = crate::error::Result<T>>,
    {
        let backend = self
            .shared
            .connected_handle()
            .ok_or(DispatchError::NotConnected)?;

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call(backend)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("Memory {} timed out after {:?}", op, limit);
                    return Err(DispatchError::Timeout {
                        elapsed_ms: limit.as_millis() as u64,
                    });
                }
            },
            None => call(backend).await,
        };

        result.map_err(|e| {
            tracing::debug!("Memory {} failed: {}", op, e);
            DispatchError::from(e)
        })
    }
}

fn validate_key(key: &str) -> DispatchResult<String> {
    if key.len() > MAX_KEY_LEN {
        return Err(DispatchError::invalid_input(format!(
            "key exceeds {} bytes",
            MAX_KEY_LEN
        )));
    }
    if key.chars().any(char::is_control) {
        return Err(DispatchError::invalid_input(
            "key must not contain control characters",
        ));
    }
    Ok(key.to_string())
}

fn required_key(raw: &str) -> DispatchResult<String> {
    match raw.trim() {
        "" => Err(DispatchError::invalid_input("key is required")),
        key => validate_key(key),
    }
}

fn clamp_limit(limit: Option<usize>, default: usize, max: usize) -> DispatchResult<usize> {
    match limit {
        None => Ok(default),
        Some(0) => Err(DispatchError::invalid_input("limit must be at least 1")),
        Some(n) => Ok(n.min(max)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::testing::ScriptedBackend;
    use crate::connection::ConnectionState;
    use serde_json::json;

    fn connected(backend: Arc<ScriptedBackend>) -> SharedConnection {
        let shared = SharedConnection::new();
        {
            let mut slot = shared.write();
            slot.state = ConnectionState::Connected;
            slot.handle = Some(backend);
            slot.backend = Some("scripted".to_string());
        }
        shared
    }

    async fn live_backend() -> Arc<ScriptedBackend> {
        let backend = ScriptedBackend::new();
        backend.connect().await.unwrap();
        backend
    }

    fn store(content: &str) -> StoreRequest {
        StoreRequest {
            content: content.to_string(),
            ..Default::default()
        }
    }

    fn search(query: &str) -> SearchRequest {
        SearchRequest {
            query: query.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_not_connected_for_every_operation() {
        let dispatcher = MemoryDispatcher::new(SharedConnection::new());

        let err = dispatcher.store(store("hello")).await.unwrap_err();
        assert_eq!(err, DispatchError::NotConnected);
        assert_eq!(err.to_string(), "Memory backend not connected");

        assert_eq!(
            dispatcher.search(search("hello")).await.unwrap_err(),
            DispatchError::NotConnected
        );
        let read = ReadRequest {
            key: "k".to_string(),
            namespace: None,
        };
        assert_eq!(
            dispatcher.read(read).await.unwrap_err(),
            DispatchError::NotConnected
        );
        let delete = DeleteRequest {
            key: "k".to_string(),
            namespace: None,
        };
        assert_eq!(
            dispatcher.delete(delete).await.unwrap_err(),
            DispatchError::NotConnected
        );
        assert_eq!(
            dispatcher.list(ListRequest::default()).await.unwrap_err(),
            DispatchError::NotConnected
        );
        assert_eq!(
            dispatcher.stats().await.unwrap_err(),
            DispatchError::NotConnected
        );
    }

    #[tokio::test]
    async fn test_invalid_namespace_rejected_before_connection_check() {
        let dispatcher = MemoryDispatcher::new(SharedConnection::new());
        let mut request = store("hello");
        request.namespace = Some("drop_all".to_string());

        let err = dispatcher.store(request).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::InvalidSchema {
                namespace: "drop_all".to_string()
            }
        );
        assert_eq!(err.to_string(), "Invalid schema: drop_all");
    }

    #[tokio::test]
    async fn test_invalid_namespace_never_reaches_backend() {
        let backend = live_backend().await;
        let dispatcher = MemoryDispatcher::new(connected(backend.clone()));
        let mut request = search("anything");
        request.namespace = Some("other_tenant".to_string());

        assert!(matches!(
            dispatcher.search(request).await,
            Err(DispatchError::InvalidSchema { .. })
        ));
        assert_eq!(backend.calls("search"), 0);
    }

    #[tokio::test]
    async fn test_missing_required_fields() {
        let dispatcher = MemoryDispatcher::new(SharedConnection::new());

        assert!(matches!(
            dispatcher.store(store("   ")).await,
            Err(DispatchError::InvalidInput { .. })
        ));
        assert!(matches!(
            dispatcher.search(search("")).await,
            Err(DispatchError::InvalidInput { .. })
        ));
        assert!(matches!(
            dispatcher.delete(DeleteRequest::default()).await,
            Err(DispatchError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_generates_key_and_uses_default_namespace() {
        let backend = live_backend().await;
        let dispatcher =
            MemoryDispatcher::new(connected(backend)).with_default_namespace("Shared");

        let result = dispatcher.store(store("remember this")).await.unwrap();
        assert!(result.key.starts_with("mem_"));
        assert_eq!(result.namespace, "shared");
        assert!(result.created);
    }

    #[tokio::test]
    async fn test_namespace_is_normalized() {
        let backend = live_backend().await;
        let dispatcher = MemoryDispatcher::new(connected(backend));
        let mut request = store("hello");
        request.key = Some("greeting".to_string());
        request.namespace = Some("  PERSONAL ".to_string());

        let result = dispatcher.store(request).await.unwrap();
        assert_eq!(result.namespace, "personal");

        let found = dispatcher
            .read(ReadRequest {
                key: "greeting".to_string(),
                namespace: Some("personal".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(found.unwrap().content, "hello");
    }

    #[tokio::test]
    async fn test_backend_error_is_verbatim() {
        let backend = live_backend().await;
        backend.fail("search", "timeout");
        let shared = connected(backend);
        let dispatcher = MemoryDispatcher::new(shared.clone());

        let err = dispatcher.search(search("anything")).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::Backend {
                message: "timeout".to_string()
            }
        );
        assert_eq!(shared.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_search_strips_metadata_unless_requested() {
        let backend = live_backend().await;
        let dispatcher = MemoryDispatcher::new(connected(backend));
        let mut request = store("rust async runtime notes");
        request.metadata = json!({"source": "chat"}).as_object().cloned();
        dispatcher.store(request).await.unwrap();

        let plain = dispatcher.search(search("rust")).await.unwrap();
        assert_eq!(plain.len(), 1);
        assert!(plain[0].metadata.is_none());

        let mut with_meta = search("rust");
        with_meta.include_metadata = true;
        let rich = dispatcher.search(with_meta).await.unwrap();
        assert_eq!(rich[0].metadata.as_ref().unwrap()["source"], "chat");
    }

    #[tokio::test]
    async fn test_delete_and_read_missing() {
        let backend = live_backend().await;
        let dispatcher = MemoryDispatcher::new(connected(backend));
        let mut request = store("to be removed");
        request.key = Some("temp".to_string());
        dispatcher.store(request).await.unwrap();

        let delete = DeleteRequest {
            key: "temp".to_string(),
            namespace: None,
        };
        assert!(dispatcher.delete(delete.clone()).await.unwrap());
        assert!(!dispatcher.delete(delete).await.unwrap());

        let missing = dispatcher
            .read(ReadRequest {
                key: "temp".to_string(),
                namespace: None,
            })
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_across_namespaces() {
        let backend = live_backend().await;
        let dispatcher = MemoryDispatcher::new(connected(backend));
        for ns in ["internal", "project"] {
            let mut request = store("entry");
            request.namespace = Some(ns.to_string());
            dispatcher.store(request).await.unwrap();
        }

        let all = dispatcher.list(ListRequest::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let project = dispatcher
            .list(ListRequest {
                namespace: Some("project".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(project.len(), 1);
        assert_eq!(project[0].namespace, "project");
    }

    #[tokio::test]
    async fn test_limit_validation() {
        let dispatcher = MemoryDispatcher::new(SharedConnection::new());
        let mut request = search("x");
        request.limit = Some(0);
        assert!(matches!(
            dispatcher.search(request).await,
            Err(DispatchError::InvalidInput { .. })
        ));

        assert_eq!(clamp_limit(Some(5000), 10, MAX_SEARCH_LIMIT).unwrap(), 100);
        assert_eq!(clamp_limit(None, 10, MAX_SEARCH_LIMIT).unwrap(), 10);
    }

    #[test]
    fn test_key_validation() {
        assert!(validate_key(&"k".repeat(MAX_KEY_LEN + 1)).is_err());
        assert!(validate_key("bad\nkey").is_err());
        assert_eq!(validate_key("good-key").unwrap(), "good-key");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_state_untouched() {
        let backend = live_backend().await;
        backend.hang("stats");
        let shared = connected(backend);
        let dispatcher =
            MemoryDispatcher::new(shared.clone()).with_timeout(Some(Duration::from_millis(50)));

        let err = dispatcher.stats().await.unwrap_err();
        assert_eq!(err, DispatchError::Timeout { elapsed_ms: 50 });
        assert_eq!(shared.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_from_config() {
        let mut config = PluginConfig::default();
        config.default_namespace = "project".to_string();
        config.backend.operation_timeout_ms = 0;

        let dispatcher = MemoryDispatcher::from_config(SharedConnection::new(), &config);
        assert_eq!(dispatcher.default_namespace(), "project");
        assert!(dispatcher.timeout.is_none());
    }

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: SearchRequest = serde_json::from_value(json!({
            "query": "q",
            "minScore": 0.5,
            "includeMetadata": true
        }))
        .unwrap();
        assert_eq!(request.min_score, Some(0.5));
        assert!(request.include_metadata);
    }
}
