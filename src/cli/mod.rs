//! CLI commands for memlink.
//!
//! This module provides CLI commands for memlink, organized into:
//! - **Connection commands**: status, health, backends
//! - **Memory commands**: store, search, read, delete, list, stats

pub mod backends_cmd;
pub mod memory;
pub mod status;

pub use backends_cmd::BackendsCommand;
pub use memory::MemoryCommand;
pub use status::StatusCommand;
