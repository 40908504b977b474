//! Memory backends for memlink.
//!
//! This module provides the trait interface that every backend implements
//! and the built-in implementations.
//!
//! Available backends:
//! - **File**: JSON document store, one file per database (default)
//! - **Memory**: In-process store for tests and ephemeral sessions

pub mod file;
pub mod memory;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use file::{FileBackend, FileBackendFactory};
pub use memory::{InMemoryBackend, InMemoryBackendFactory};
pub use traits::{
    generate_key, BackendFactory, ListOptions, MemoryBackend, MemoryRecord, NewMemory,
    SearchQuery, StatsSnapshot, WriteResult, DEFAULT_SEARCH_LIMIT,
};
