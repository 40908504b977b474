//! Network-free status read model.
//!
//! Health checks and status output read the last known state from here and
//! answer immediately, even while a stats refresh is in flight.

use serde::{Deserialize, Serialize};

use crate::backends::StatsSnapshot;
use crate::connection::{ConnectionState, SharedConnection};

/// Point-in-time view of the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// True iff a backend handle is held.
    pub connected: bool,
    /// Connection state.
    pub state: ConnectionState,
    /// Name of the connected backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Last successful stats snapshot.
    pub stats: Option<StatsSnapshot>,
    /// Last connection error.
    pub error: Option<String>,
}

/// Health check verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Disconnected,
}

/// Health check response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub stats: Option<StatsSnapshot>,
    pub error: Option<String>,
}

/// Read-only view over the shared connection slot.
#[derive(Debug, Clone, Default)]
pub struct StatusCache {
    shared: SharedConnection,
}

impl StatusCache {
    /// Create a status cache over a shared slot.
    pub fn new(shared: SharedConnection) -> Self {
        Self { shared }
    }

    /// Current status, read under a single guard.
    pub fn status(&self) -> Status {
        let slot = self.shared.read();
        Status {
            connected: slot.handle.is_some(),
            state: slot.state,
            backend: slot.backend.clone(),
            stats: slot.stats.clone(),
            error: slot.last_error.clone(),
        }
    }

    /// Health report derived from the current status.
    pub fn health(&self) -> HealthReport {
        let status = self.status();
        HealthReport {
            status: if status.connected {
                HealthStatus::Healthy
            } else {
                HealthStatus::Disconnected
            },
            stats: status.stats,
            error: status.error,
        }
    }
}
