//! Discovery module for memlink.
//!
//! This module handles locating a memory backend from an ordered list of
//! candidate identifiers (file, memory, or any provider registered by the
//! embedding host).
//!
//! Candidate order is configurable via the memlink config file.

pub mod backends;

pub use backends::{
    describe_candidates, BackendProvider, BackendResolver, CandidateInfo, ProviderRegistry,
    Resolution, ResolutionFailure, SkippedCandidate, DIRECT_CANDIDATE,
};
