//! In-process memory backend.
//!
//! Entries live in a `HashMap` behind a `tokio::sync::RwLock` and are lost
//! when the backend is dropped. Search uses keyword matching rather than
//! vector similarity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::backends::traits::{
    BackendFactory, ListOptions, MemoryBackend, MemoryRecord, NewMemory, SearchQuery,
    StatsSnapshot, WriteResult,
};
use crate::config::ConnectionParams;
use crate::error::{MemlinkError, Result};

type EntryKey = (String, String);

/// In-memory backend.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<EntryKey, MemoryRecord>>,
    connected: AtomicBool,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `connect` has been called without a matching `disconnect`.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MemlinkError::backend("in-memory backend is not connected"))
        }
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<()> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, namespace: &str, key: &str) -> Result<Option<MemoryRecord>> {
        self.ensure_connected()?;
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn write(&self, entry: &NewMemory) -> Result<WriteResult> {
        self.ensure_connected()?;
        let mut entries = self.entries.write().await;
        Ok(upsert(&mut entries, entry))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>> {
        self.ensure_connected()?;
        let entries = self.entries.read().await;
        Ok(search_records(entries.values(), query))
    }

    async fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>> {
        self.ensure_connected()?;
        let entries = self.entries.read().await;
        Ok(list_records(entries.values(), options))
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        self.ensure_connected()?;
        let mut entries = self.entries.write().await;
        Ok(entries
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        self.ensure_connected()?;
        let entries = self.entries.read().await;
        Ok(StatsSnapshot::from_records(entries.values()))
    }
}

/// Factory for the in-memory backend. Connection parameters are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryBackendFactory;

#[async_trait]
impl BackendFactory for InMemoryBackendFactory {
    async fn create(&self, _params: &ConnectionParams) -> Result<Arc<dyn MemoryBackend>> {
        Ok(Arc::new(InMemoryBackend::new()))
    }
}

/// Insert or replace an entry, keeping the original creation time on replace.
pub(crate) fn upsert(
    entries: &mut HashMap<EntryKey, MemoryRecord>,
    entry: &NewMemory,
) -> WriteResult {
    let id = (entry.namespace.clone(), entry.key.clone());
    let mut record = MemoryRecord::from_new(entry);
    let created = match entries.get(&id) {
        Some(existing) => {
            record.created_at = existing.created_at;
            record.updated_at = Utc::now();
            false
        }
        None => true,
    };
    entries.insert(id, record);
    WriteResult {
        key: entry.key.clone(),
        namespace: entry.namespace.clone(),
        created,
    }
}

/// Score a record against a query.
///
/// The score is the fraction of query words found in the content or tags.
/// An empty query matches everything with score 1.0.
pub(crate) fn keyword_score(record: &MemoryRecord, query: &SearchQuery) -> Option<f64> {
    let text = query.text.to_lowercase();
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Some(1.0);
    }

    let content = record.content.to_lowercase();
    let tags: Vec<String> = record.tags.iter().map(|t| t.to_lowercase()).collect();
    let matching = words
        .iter()
        .filter(|w| content.contains(**w) || tags.iter().any(|t| t == *w))
        .count();

    if matching == 0 {
        return None;
    }
    Some(matching as f64 / words.len() as f64)
}

/// Apply a search query to a set of records.
pub(crate) fn search_records<'a>(
    records: impl IntoIterator<Item = &'a MemoryRecord>,
    query: &SearchQuery,
) -> Vec<MemoryRecord> {
    let mut results: Vec<MemoryRecord> = records
        .into_iter()
        .filter(|r| query.namespace.as_ref().is_none_or(|ns| &r.namespace == ns))
        .filter(|r| query.tags.iter().all(|t| r.tags.contains(t)))
        .filter_map(|r| {
            let score = keyword_score(r, query)?;
            if query.min_score.is_some_and(|min| score < min) {
                return None;
            }
            Some(r.clone().with_score(score))
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    results.truncate(query.limit);
    results
}

/// Apply listing options to a set of records.
pub(crate) fn list_records<'a>(
    records: impl IntoIterator<Item = &'a MemoryRecord>,
    options: &ListOptions,
) -> Vec<MemoryRecord> {
    let mut results: Vec<MemoryRecord> = records
        .into_iter()
        .filter(|r| {
            options
                .namespace
                .as_ref()
                .is_none_or(|ns| &r.namespace == ns)
        })
        .cloned()
        .collect();

    results.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.key.cmp(&b.key))
    });

    let iter = results.into_iter().skip(options.offset);
    match options.limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.connect().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let backend = connected().await;

        let result = backend
            .write(&NewMemory::new("internal", "alpha", "The deploy uses blue/green"))
            .await
            .unwrap();
        assert!(result.created);

        let record = backend.read("internal", "alpha").await.unwrap().unwrap();
        assert_eq!(record.content, "The deploy uses blue/green");
        assert!(record.score.is_none());
    }

    #[tokio::test]
    async fn test_keys_are_scoped_by_namespace() {
        let backend = connected().await;
        backend
            .write(&NewMemory::new("internal", "alpha", "one"))
            .await
            .unwrap();

        assert!(backend.read("shared", "alpha").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_created_at() {
        let backend = connected().await;
        backend
            .write(&NewMemory::new("internal", "alpha", "first"))
            .await
            .unwrap();
        let first = backend.read("internal", "alpha").await.unwrap().unwrap();

        let result = backend
            .write(&NewMemory::new("internal", "alpha", "second"))
            .await
            .unwrap();
        assert!(!result.created);

        let second = backend.read("internal", "alpha").await.unwrap().unwrap();
        assert_eq!(second.content, "second");
        assert_eq!(second.created_at, first.created_at);
    }

    #[tokio::test]
    async fn test_search_ranks_by_matching_words() {
        let backend = connected().await;
        backend
            .write(&NewMemory::new("internal", "a", "rust async runtime notes"))
            .await
            .unwrap();
        backend
            .write(&NewMemory::new("internal", "b", "rust borrow checker"))
            .await
            .unwrap();
        backend
            .write(&NewMemory::new("internal", "c", "python packaging"))
            .await
            .unwrap();

        let results = backend
            .search(&SearchQuery::new("rust async"))
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].key, "a");
        assert_eq!(results[0].score, Some(1.0));
        assert_eq!(results[1].score, Some(0.5));
    }

    #[tokio::test]
    async fn test_search_filters_namespace_and_min_score() {
        let backend = connected().await;
        backend
            .write(&NewMemory::new("internal", "a", "rust async"))
            .await
            .unwrap();
        backend
            .write(&NewMemory::new("shared", "b", "rust"))
            .await
            .unwrap();

        let results = backend
            .search(&SearchQuery::new("rust async").namespace("shared"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "b");

        let results = backend
            .search(&SearchQuery::new("rust async").min_score(0.75))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "a");
    }

    #[tokio::test]
    async fn test_search_matches_tags() {
        let backend = connected().await;
        backend
            .write(&NewMemory::new("internal", "a", "something").tags(vec!["ops".to_string()]))
            .await
            .unwrap();

        let results = backend.search(&SearchQuery::new("ops")).await.unwrap();
        assert_eq!(results.len(), 1);

        let results = backend
            .search(&SearchQuery::new("").tags(vec!["missing".to_string()]))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_list_with_offset_and_limit() {
        let backend = connected().await;
        for key in ["a", "b", "c"] {
            backend
                .write(&NewMemory::new("internal", key, "x"))
                .await
                .unwrap();
        }

        let all = backend.list(&ListOptions::all()).await.unwrap();
        assert_eq!(all.len(), 3);

        let page = backend
            .list(&ListOptions::all().offset(1).limit(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].key, all[1].key);
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = connected().await;
        backend
            .write(&NewMemory::new("internal", "a", "x"))
            .await
            .unwrap();

        assert!(backend.delete("internal", "a").await.unwrap());
        assert!(!backend.delete("internal", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_stats() {
        let backend = connected().await;
        backend
            .write(&NewMemory::new("internal", "a", "x"))
            .await
            .unwrap();
        backend
            .write(&NewMemory::new("shared", "b", "y"))
            .await
            .unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.by_namespace.get("shared"), Some(&1));
    }

    #[tokio::test]
    async fn test_operations_fail_when_disconnected() {
        let backend = InMemoryBackend::new();
        assert!(backend.read("internal", "a").await.is_err());
        assert!(backend.stats().await.is_err());

        backend.connect().await.unwrap();
        assert!(backend.stats().await.is_ok());

        backend.disconnect().await.unwrap();
        assert!(!backend.is_connected());
        assert!(backend.stats().await.is_err());
    }

    #[tokio::test]
    async fn test_factory_creates_fresh_backend() {
        let factory = InMemoryBackendFactory;
        let backend = factory.create(&ConnectionParams::default()).await.unwrap();
        assert_eq!(backend.name(), "memory");
    }
}
