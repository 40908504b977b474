//! Degraded-mode dispatch for memlink.
//!
//! Every memory operation exposed to tools and hooks goes through the
//! [`MemoryDispatcher`]. A missing backend, a rejected input, or a backend
//! error comes back as a [`DispatchError`] value instead of a panic, so the
//! plugin stays responsive while the backend is unreachable.

pub mod dispatcher;
pub mod namespace;

use thiserror::Error;

use crate::error::MemlinkError;

pub use dispatcher::{
    DeleteRequest, ListRequest, MemoryDispatcher, ReadRequest, SearchRequest, StoreRequest,
    MAX_KEY_LEN, MAX_LIST_LIMIT, MAX_SEARCH_LIMIT,
};
pub use namespace::{normalize_namespace, resolve_namespace, ALLOWED_NAMESPACES};

/// Structured failure returned by dispatcher operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No backend handle is held.
    #[error("Memory backend not connected")]
    NotConnected,

    /// Namespace outside the allow-list.
    #[error("Invalid schema: {namespace}")]
    InvalidSchema { namespace: String },

    /// Missing or malformed parameter.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// The backend reported an error. Displays the backend's message verbatim.
    #[error("{message}")]
    Backend { message: String },

    /// The backend did not answer in time.
    #[error("Memory backend operation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl DispatchError {
    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected => "not_connected",
            Self::InvalidSchema { .. } => "invalid_schema",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Backend { .. } => "backend",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<MemlinkError> for DispatchError {
    fn from(err: MemlinkError) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}
