//! Connection supervisor.
//!
//! Owns the single backend connection: resolves a factory, builds and
//! connects a handle, keeps a stats snapshot fresh on a background task, and
//! tears everything down on stop. `start` never fails; a resolution or
//! connect failure puts the plugin in degraded mode instead.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::backends::{MemoryBackend, StatsSnapshot};
use crate::config::{ConnectionParams, PluginConfig, MIN_REFRESH_SECS};
use crate::connection::status::{Status, StatusCache};
use crate::connection::{ConnectionSlot, ConnectionState, SharedConnection};
use crate::discovery::BackendResolver;
use crate::dispatch::MemoryDispatcher;
use crate::error::MemlinkError;

/// Supervises one backend connection.
#[derive(Debug)]
pub struct ConnectionSupervisor {
    resolver: BackendResolver,
    shared: SharedConnection,
    /// Serializes start/stop and owns the refresh task.
    lifecycle: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSupervisor {
    /// Create a disconnected supervisor.
    pub fn new(resolver: BackendResolver) -> Self {
        Self {
            resolver,
            shared: SharedConnection::new(),
            lifecycle: Mutex::new(None),
        }
    }

    /// The resolver used by `start`.
    pub fn resolver(&self) -> &BackendResolver {
        &self.resolver
    }

    /// Handle to the shared connection slot.
    pub fn shared(&self) -> SharedConnection {
        self.shared.clone()
    }

    /// Network-free status view over this supervisor's connection.
    pub fn status_cache(&self) -> StatusCache {
        StatusCache::new(self.shared.clone())
    }

    /// Dispatcher routing operations to this supervisor's connection.
    pub fn dispatcher(&self, config: &PluginConfig) -> MemoryDispatcher {
        MemoryDispatcher::from_config(self.shared.clone(), config)
    }

    /// Current status.
    pub fn status(&self) -> Status {
        self.status_cache().status()
    }

    /// Resolve, create and connect a backend.
    ///
    /// If a connection is already held it is torn down first. The returned
    /// status reflects the outcome; failures are recorded, never returned.
    pub async fn start(&self, config: &PluginConfig) -> Status {
        let mut refresh = self.lifecycle.lock().await;

        let held = self.shared.read().handle.is_some();
        if held || refresh.is_some() {
            tracing::info!("Memory backend already started, restarting");
            self.teardown(&mut refresh).await;
        }

        let params = ConnectionParams::resolve(config);
        match self.open(config, &params).await {
            Ok((candidate, handle)) => {
                {
                    let mut slot = self.shared.write();
                    slot.state = ConnectionState::Connected;
                    slot.handle = Some(Arc::clone(&handle));
                    slot.backend = Some(handle.name().to_string());
                    slot.stats = None;
                    slot.last_error = None;
                }
                tracing::info!(
                    "Connected to {} memory backend (candidate '{}', {}@{}:{}/{})",
                    handle.name(),
                    candidate,
                    params.user,
                    params.host,
                    params.port,
                    params.database
                );

                let initial = match config.backend.operation_timeout_ms {
                    0 => handle.stats().await,
                    ms => tokio::time::timeout(Duration::from_millis(ms), handle.stats())
                        .await
                        .unwrap_or_else(|_| {
                            Err(MemlinkError::backend(format!("timed out after {}ms", ms)))
                        }),
                };
                match initial {
                    Ok(stats) => {
                        install_stats(&self.shared, &handle, stats);
                    }
                    Err(e) => tracing::warn!("Initial memory stats fetch failed: {}", e),
                }

                let secs = config.backend.refresh_interval_secs.max(MIN_REFRESH_SECS);
                *refresh = Some(spawn_refresh(
                    self.shared.clone(),
                    Duration::from_secs(secs),
                ));
            }
            Err(message) => {
                tracing::error!(
                    "Memory backend unavailable, running in degraded mode: {}",
                    message
                );
                let mut slot = self.shared.write();
                *slot = ConnectionSlot {
                    state: ConnectionState::Error,
                    last_error: Some(message),
                    ..ConnectionSlot::default()
                };
            }
        }

        self.status()
    }

    /// Cancel the refresh task and release the connection.
    ///
    /// Safe to call repeatedly. Disconnect errors are logged, not returned.
    pub async fn stop(&self) {
        let mut refresh = self.lifecycle.lock().await;
        self.teardown(&mut refresh).await;
    }

    /// Fetch stats now and replace the snapshot.
    ///
    /// Returns whether a new snapshot was installed. Errors are swallowed and
    /// leave the previous snapshot in place.
    pub async fn refresh_now(&self) -> bool {
        refresh_stats(&self.shared).await
    }

    async fn open(
        &self,
        config: &PluginConfig,
        params: &ConnectionParams,
    ) -> std::result::Result<(String, Arc<dyn MemoryBackend>), String> {
        let resolution = self
            .resolver
            .resolve(&config.backend.candidates)
            .map_err(|e| e.to_string())?;

        let connect = async {
            let handle = resolution.factory.create(params).await?;
            handle.connect().await?;
            Ok::<_, MemlinkError>(handle)
        };

        let handle = match config.backend.operation_timeout_ms {
            0 => connect.await,
            ms => tokio::time::timeout(Duration::from_millis(ms), connect)
                .await
                .map_err(|_| format!("connection timed out after {}ms", ms))?,
        }
        .map_err(|e| e.to_string())?;

        Ok((resolution.candidate, handle))
    }

    async fn teardown(&self, refresh: &mut Option<JoinHandle<()>>) {
        if let Some(task) = refresh.take() {
            task.abort();
            // Wait for the abort so no tick lands after the slot is cleared.
            let _ = task.await;
        }

        let handle = {
            let mut slot = self.shared.write();
            std::mem::take(&mut *slot).handle
        };

        if let Some(handle) = handle {
            match handle.disconnect().await {
                Ok(()) => tracing::info!("Disconnected from {} memory backend", handle.name()),
                Err(e) => tracing::warn!("Memory backend disconnect failed: {}", e),
            }
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        if let Some(task) = self.lifecycle.get_mut().take() {
            task.abort();
        }
    }
}

fn spawn_refresh(shared: SharedConnection, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            refresh_stats(&shared).await;
        }
    })
}

async fn refresh_stats(shared: &SharedConnection) -> bool {
    let Some(handle) = shared.connected_handle() else {
        return false;
    };
    match handle.stats().await {
        Ok(stats) => install_stats(shared, &handle, stats),
        Err(e) => {
            tracing::debug!("Memory stats refresh failed: {}", e);
            false
        }
    }
}

/// Install a snapshot if `handle` is still the installed handle.
fn install_stats(
    shared: &SharedConnection,
    handle: &Arc<dyn MemoryBackend>,
    stats: StatsSnapshot,
) -> bool {
    let mut slot = shared.write();
    match &slot.handle {
        Some(current) if Arc::ptr_eq(current, handle) => {
            slot.stats = Some(stats);
            true
        }
        _ => false,
    }
}
