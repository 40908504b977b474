//! Connection lifecycle for memlink.
//!
//! One supervisor owns one backend connection. Its state lives in a shared
//! slot that the dispatcher and the status cache read concurrently:
//!
//! - **supervisor**: resolves, connects, refreshes stats, tears down
//! - **status**: network-free read model for health checks and status output

pub mod status;
pub mod supervisor;

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::backends::{MemoryBackend, StatsSnapshot};

pub use status::{HealthReport, HealthStatus, Status, StatusCache};
pub use supervisor::ConnectionSupervisor;

/// Connection state of the supervised backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection attempt, or stopped.
    #[default]
    Disconnected,
    /// A backend handle is held.
    Connected,
    /// The last start attempt failed.
    Error,
}

impl ConnectionState {
    /// Get the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mutable connection state. Only the supervisor writes it.
#[derive(Default)]
pub(crate) struct ConnectionSlot {
    pub(crate) state: ConnectionState,
    pub(crate) handle: Option<Arc<dyn MemoryBackend>>,
    pub(crate) backend: Option<String>,
    pub(crate) stats: Option<StatsSnapshot>,
    pub(crate) last_error: Option<String>,
}

/// Cloneable reference to the connection slot.
///
/// Guards are never held across an `.await`.
#[derive(Clone, Default)]
pub struct SharedConnection {
    slot: Arc<RwLock<ConnectionSlot>>,
}

impl SharedConnection {
    /// Create an empty, disconnected slot.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, ConnectionSlot> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, ConnectionSlot> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// The backend handle, if and only if the state is `Connected`.
    ///
    /// State and handle are read under the same guard.
    pub fn connected_handle(&self) -> Option<Arc<dyn MemoryBackend>> {
        let slot = self.read();
        match slot.state {
            ConnectionState::Connected => slot.handle.clone(),
            _ => None,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.read().state
    }
}

impl fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.read();
        f.debug_struct("SharedConnection")
            .field("state", &slot.state)
            .field("backend", &slot.backend)
            .field("has_stats", &slot.stats.is_some())
            .field("last_error", &slot.last_error)
            .finish()
    }
}
