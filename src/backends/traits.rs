//! Memory backend contract for memlink.
//!
//! This module defines the trait every backend implements, the factory that
//! constructs backends from connection parameters, and the value types that
//! flow across that boundary.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::ConnectionParams;
use crate::error::Result;

/// Trait for memory backends that persist and recall entries.
///
/// A backend is a live connection to some datastore. Implementations must be
/// safe to call concurrently: the dispatcher issues operations from many tool
/// calls at once while the supervisor refreshes stats in the background.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// Backend name for logging and status output.
    fn name(&self) -> &'static str;

    /// Establish the connection.
    async fn connect(&self) -> Result<()>;

    /// Release the connection.
    async fn disconnect(&self) -> Result<()>;

    /// Read a single entry by key.
    ///
    /// Returns `Ok(None)` if no entry exists under `key` in `namespace`.
    async fn read(&self, namespace: &str, key: &str) -> Result<Option<MemoryRecord>>;

    /// Write an entry, replacing any existing entry with the same key.
    async fn write(&self, entry: &NewMemory) -> Result<WriteResult>;

    /// Search entries, highest score first.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>>;

    /// List entries, most recently updated first.
    async fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>>;

    /// Delete an entry. Returns whether anything was removed.
    async fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Aggregate statistics over all stored entries.
    async fn stats(&self) -> Result<StatsSnapshot>;
}

/// Asynchronous constructor for backend handles.
///
/// The supervisor calls `create` with merged connection parameters and then
/// `connect` on the returned handle.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Build a backend handle for the given parameters.
    async fn create(&self, params: &ConnectionParams) -> Result<Arc<dyn MemoryBackend>>;
}

static KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a key for an entry stored without one.
///
/// Format: `mem_YYYYMMDDHHMMSS_N` where N is a process-wide counter.
pub fn generate_key() -> String {
    let now = Utc::now();
    let counter = KEY_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("mem_{}_{}", now.format("%Y%m%d%H%M%S"), counter)
}

/// A stored memory entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Key, unique within the namespace.
    pub key: String,
    /// Entry content.
    pub content: String,
    /// Namespace the entry belongs to.
    pub namespace: String,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Arbitrary caller metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    /// When the entry was first written.
    pub created_at: DateTime<Utc>,
    /// When the entry was last written.
    pub updated_at: DateTime<Utc>,
    /// Similarity score, present only on search results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl MemoryRecord {
    /// Build a record from a write request, stamped with the current time.
    pub fn from_new(entry: &NewMemory) -> Self {
        let now = Utc::now();
        Self {
            key: entry.key.clone(),
            content: entry.content.clone(),
            namespace: entry.namespace.clone(),
            tags: entry.tags.clone(),
            metadata: entry.metadata.clone(),
            created_at: now,
            updated_at: now,
            score: None,
        }
    }

    /// Attach a similarity score.
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }
}

/// A write request.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NewMemory {
    pub key: String,
    pub content: String,
    pub namespace: String,
    pub tags: Vec<String>,
    pub metadata: Option<Map<String, Value>>,
}

impl NewMemory {
    /// Create a write request with no tags or metadata.
    pub fn new(
        namespace: impl Into<String>,
        key: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            namespace: namespace.into(),
            tags: Vec::new(),
            metadata: None,
        }
    }

    /// Set the tags.
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Set the metadata.
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Result of writing an entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WriteResult {
    /// Key the entry was stored under.
    pub key: String,
    /// Namespace the entry was stored in.
    pub namespace: String,
    /// False when an existing entry was replaced.
    pub created: bool,
}

/// Search parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    /// Free-text query.
    pub text: String,
    /// Restrict to a namespace. `None` searches all namespaces.
    pub namespace: Option<String>,
    /// Maximum number of results.
    pub limit: usize,
    /// Drop results scoring below this threshold.
    pub min_score: Option<f64>,
    /// Require all of these tags.
    pub tags: Vec<String>,
    /// Whether the caller wants metadata on the results.
    pub include_metadata: bool,
}

/// Default number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

impl SearchQuery {
    /// Create a query with default options.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            namespace: None,
            limit: DEFAULT_SEARCH_LIMIT,
            min_score: None,
            tags: Vec::new(),
            include_metadata: false,
        }
    }

    /// Restrict the query to a namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the result limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the minimum score.
    pub fn min_score(mut self, min_score: f64) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Require tags.
    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Request metadata on results.
    pub fn include_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }
}

/// Listing parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ListOptions {
    /// Restrict to a namespace. `None` lists all namespaces.
    pub namespace: Option<String>,
    /// Maximum number of entries.
    pub limit: Option<usize>,
    /// Number of entries to skip.
    pub offset: usize,
}

impl ListOptions {
    /// List everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to a namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Set the limit.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the offset.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Point-in-time backend statistics.
///
/// Produced by a single `stats()` call and never modified afterwards.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Total number of entries.
    pub total_entries: u64,
    /// Entry count per namespace.
    pub by_namespace: BTreeMap<String, u64>,
    /// Timestamp of the oldest entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Timestamp of the newest entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<DateTime<Utc>>,
}

impl StatsSnapshot {
    /// Compute a snapshot from a set of records.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a MemoryRecord>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.total_entries += 1;
            *snapshot
                .by_namespace
                .entry(record.namespace.clone())
                .or_insert(0) += 1;
            snapshot.oldest_entry = Some(match snapshot.oldest_entry {
                Some(oldest) => oldest.min(record.created_at),
                None => record.created_at,
            });
            snapshot.newest_entry = Some(match snapshot.newest_entry {
                Some(newest) => newest.max(record.created_at),
                None => record.created_at,
            });
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record(namespace: &str, key: &str, age_hours: i64) -> MemoryRecord {
        let mut r = MemoryRecord::from_new(&NewMemory::new(namespace, key, "content"));
        r.created_at = Utc::now() - Duration::hours(age_hours);
        r
    }

    #[test]
    fn test_generate_key_is_unique() {
        let a = generate_key();
        let b = generate_key();
        assert!(a.starts_with("mem_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_stats_from_records_counts_namespaces() {
        let records = vec![
            record("internal", "a", 3),
            record("internal", "b", 1),
            record("shared", "c", 2),
        ];

        let stats = StatsSnapshot::from_records(&records);

        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.by_namespace.get("internal"), Some(&2));
        assert_eq!(stats.by_namespace.get("shared"), Some(&1));
        assert_eq!(stats.oldest_entry, Some(records[0].created_at));
        assert_eq!(stats.newest_entry, Some(records[1].created_at));
    }

    #[test]
    fn test_stats_from_no_records() {
        let stats = StatsSnapshot::from_records(&Vec::<MemoryRecord>::new());
        assert_eq!(stats, StatsSnapshot::default());
        assert!(stats.oldest_entry.is_none());
    }

    #[test]
    fn test_stats_serializes_camel_case() {
        let mut stats = StatsSnapshot {
            total_entries: 42,
            ..Default::default()
        };
        stats.by_namespace.insert("internal".to_string(), 42);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["totalEntries"], 42);
        assert_eq!(json["byNamespace"]["internal"], 42);
        assert!(json.get("oldestEntry").is_none());
    }

    #[test]
    fn test_record_omits_empty_optional_fields() {
        let r = MemoryRecord::from_new(&NewMemory::new("internal", "k", "v"));
        let json = serde_json::to_value(&r).unwrap();
        assert!(json.get("score").is_none());
        assert!(json.get("metadata").is_none());
        assert!(json.get("tags").is_none());
        assert_eq!(json["namespace"], "internal");
    }

    #[test]
    fn test_search_query_builder() {
        let q = SearchQuery::new("deploy steps")
            .namespace("project")
            .limit(3)
            .min_score(0.5)
            .tags(vec!["ops".to_string()])
            .include_metadata(true);

        assert_eq!(q.text, "deploy steps");
        assert_eq!(q.namespace.as_deref(), Some("project"));
        assert_eq!(q.limit, 3);
        assert_eq!(q.min_score, Some(0.5));
        assert!(q.include_metadata);
    }

    #[test]
    fn test_search_query_defaults() {
        let q = SearchQuery::new("x");
        assert_eq!(q.limit, DEFAULT_SEARCH_LIMIT);
        assert!(q.namespace.is_none());
        assert!(!q.include_metadata);
    }
}
