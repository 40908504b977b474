//! Scripted backend for exercising failure paths.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::backends::{
    BackendFactory, InMemoryBackend, ListOptions, MemoryBackend, MemoryRecord, NewMemory,
    SearchQuery, StatsSnapshot, WriteResult,
};
use crate::config::{ConnectionParams, PluginConfig};
use crate::discovery::{BackendResolver, ProviderRegistry};
use crate::error::{MemlinkError, Result};

/// Backend wrapping [`InMemoryBackend`] with per-operation failure injection.
///
/// Operation names: `connect`, `disconnect`, `read`, `write`, `search`,
/// `list`, `delete`, `stats`.
#[derive(Default)]
pub struct ScriptedBackend {
    inner: InMemoryBackend,
    failures: Mutex<HashMap<&'static str, String>>,
    hanging: Mutex<HashSet<&'static str>>,
    stats: Mutex<Option<StatsSnapshot>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make `op` fail with `message` until cleared.
    pub fn fail(&self, op: &'static str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(op, message.to_string());
    }

    /// Clear an injected failure.
    pub fn succeed(&self, op: &'static str) {
        self.failures.lock().unwrap().remove(op);
    }

    /// Make `op` never complete.
    pub fn hang(&self, op: &'static str) {
        self.hanging.lock().unwrap().insert(op);
    }

    /// Report these stats instead of the real ones.
    pub fn set_stats(&self, stats: StatsSnapshot) {
        *self.stats.lock().unwrap() = Some(stats);
    }

    /// Number of times `op` was invoked.
    pub fn calls(&self, op: &'static str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    async fn check(&self, op: &'static str) -> Result<()> {
        *self.calls.lock().unwrap().entry(op).or_default() += 1;
        let hangs = self.hanging.lock().unwrap().contains(op);
        if hangs {
            std::future::pending::<()>().await;
        }
        let failure = self.failures.lock().unwrap().get(op).cloned();
        match failure {
            Some(message) => Err(MemlinkError::backend(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl MemoryBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn connect(&self) -> Result<()> {
        self.check("connect").await?;
        self.inner.connect().await
    }

    async fn disconnect(&self) -> Result<()> {
        self.check("disconnect").await?;
        self.inner.disconnect().await
    }

    async fn read(&self, namespace: &str, key: &str) -> Result<Option<MemoryRecord>> {
        self.check("read").await?;
        self.inner.read(namespace, key).await
    }

    async fn write(&self, entry: &NewMemory) -> Result<WriteResult> {
        self.check("write").await?;
        self.inner.write(entry).await
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<MemoryRecord>> {
        self.check("search").await?;
        self.inner.search(query).await
    }

    async fn list(&self, options: &ListOptions) -> Result<Vec<MemoryRecord>> {
        self.check("list").await?;
        self.inner.list(options).await
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        self.check("delete").await?;
        self.inner.delete(namespace, key).await
    }

    async fn stats(&self) -> Result<StatsSnapshot> {
        self.check("stats").await?;
        let scripted = self.stats.lock().unwrap().clone();
        match scripted {
            Some(stats) => Ok(stats),
            None => self.inner.stats().await,
        }
    }
}

/// Factory handing out one shared [`ScriptedBackend`] and recording the
/// parameters it was called with.
pub struct ScriptedFactory {
    backend: Arc<ScriptedBackend>,
    params: Mutex<Vec<ConnectionParams>>,
    fail_create: Mutex<Option<String>>,
}

impl ScriptedFactory {
    pub fn new(backend: Arc<ScriptedBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            params: Mutex::new(Vec::new()),
            fail_create: Mutex::new(None),
        })
    }

    /// Make `create` fail with `message`.
    pub fn fail_create(&self, message: &str) {
        *self.fail_create.lock().unwrap() = Some(message.to_string());
    }

    /// Parameters passed to every `create` call, in order.
    pub fn seen_params(&self) -> Vec<ConnectionParams> {
        self.params.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendFactory for ScriptedFactory {
    async fn create(&self, params: &ConnectionParams) -> Result<Arc<dyn MemoryBackend>> {
        self.params.lock().unwrap().push(params.clone());
        let failure = self.fail_create.lock().unwrap().clone();
        if let Some(message) = failure {
            return Err(MemlinkError::connection(message));
        }
        Ok(self.backend.clone())
    }
}

/// Resolver whose only candidate, `scripted`, yields `factory`.
pub fn resolver_for(factory: Arc<ScriptedFactory>) -> BackendResolver {
    let mut registry = ProviderRegistry::new();
    registry.register("scripted", move || -> Result<Arc<dyn BackendFactory>> {
        Ok(factory.clone())
    });
    BackendResolver::new(registry)
}

/// Config that resolves only the `scripted` candidate.
pub fn scripted_config() -> PluginConfig {
    let mut config = PluginConfig::default();
    config.backend.candidates = vec!["scripted".to_string()];
    config
}
