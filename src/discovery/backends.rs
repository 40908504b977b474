//! Memory backend resolution for memlink.
//!
//! Backends are located by probing an ordered list of candidate identifiers
//! against a registry of providers. The first candidate whose provider
//! yields a factory wins; later candidates are never touched. When every
//! candidate fails, a direct-construction factory is tried last.
//!
//! Built-in candidates:
//! - **file**: JSON document store under the memlink home directory
//! - **memory**: In-process store, lost on restart

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backends::{BackendFactory, FileBackendFactory, InMemoryBackendFactory};
use crate::error::Result;

/// Candidate name reported when the direct-construction path wins.
pub const DIRECT_CANDIDATE: &str = "direct";

/// Something that can hand out a backend factory.
///
/// `load` is the equivalent of locating and loading a backend module: it may
/// fail when the implementation is unavailable in this build or environment.
pub trait BackendProvider: Send + Sync {
    /// Load the provider's factory.
    fn load(&self) -> Result<Arc<dyn BackendFactory>>;
}

impl<F> BackendProvider for F
where
    F: Fn() -> Result<Arc<dyn BackendFactory>> + Send + Sync,
{
    fn load(&self) -> Result<Arc<dyn BackendFactory>> {
        self()
    }
}

/// Normalize a candidate identifier for registry lookup.
fn candidate_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Registry of named backend providers.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn BackendProvider>>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `file` and `memory` providers.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("file", || -> Result<Arc<dyn BackendFactory>> {
            Ok(Arc::new(FileBackendFactory::new()))
        });
        registry.register("memory", || -> Result<Arc<dyn BackendFactory>> {
            Ok(Arc::new(InMemoryBackendFactory))
        });
        registry
    }

    /// Register a provider under a candidate name, replacing any previous one.
    pub fn register(&mut self, name: &str, provider: impl BackendProvider + 'static) {
        self.providers.insert(candidate_key(name), Arc::new(provider));
    }

    /// Look up a provider.
    pub fn get(&self, name: &str) -> Option<Arc<dyn BackendProvider>> {
        self.providers.get(&candidate_key(name)).cloned()
    }

    /// Whether a provider is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(&candidate_key(name))
    }

    /// Registered candidate names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

/// A successfully resolved backend factory.
#[derive(Clone)]
pub struct Resolution {
    /// The candidate that produced the factory, or [`DIRECT_CANDIDATE`].
    pub candidate: String,
    /// The factory to build a handle with.
    pub factory: Arc<dyn BackendFactory>,
}

impl fmt::Debug for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolution")
            .field("candidate", &self.candidate)
            .finish_non_exhaustive()
    }
}

/// Why a single candidate was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCandidate {
    pub candidate: String,
    pub reason: String,
}

/// All resolution strategies were exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    /// Every candidate that was tried, in order, with the reason it failed.
    pub attempted: Vec<SkippedCandidate>,
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempted.is_empty() {
            return write!(f, "no memory backend available: no candidates configured");
        }
        let names: Vec<&str> = self
            .attempted
            .iter()
            .map(|s| s.candidate.as_str())
            .collect();
        write!(
            f,
            "no memory backend available (tried: {})",
            names.join(", ")
        )
    }
}

impl std::error::Error for ResolutionFailure {}

/// Resolves a backend factory from an ordered candidate list.
#[derive(Clone)]
pub struct BackendResolver {
    registry: ProviderRegistry,
    direct: Option<Arc<dyn BackendFactory>>,
}

impl fmt::Debug for BackendResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendResolver")
            .field("registry", &self.registry)
            .field("direct", &self.direct.is_some())
            .finish()
    }
}

impl BackendResolver {
    /// Create a resolver over a registry with no direct-construction path.
    pub fn new(registry: ProviderRegistry) -> Self {
        Self {
            registry,
            direct: None,
        }
    }

    /// Resolver with the built-in providers and a direct path that builds a
    /// file backend in the memlink home directory.
    pub fn with_defaults() -> Self {
        Self::new(ProviderRegistry::with_builtin())
            .with_direct(Arc::new(FileBackendFactory::new()))
    }

    /// Set the factory tried after every candidate failed.
    pub fn with_direct(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.direct = Some(factory);
        self
    }

    /// The provider registry.
    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Whether a direct-construction path is configured.
    pub fn has_direct(&self) -> bool {
        self.direct.is_some()
    }

    /// Resolve a backend factory.
    ///
    /// Candidates are tried in order. Unknown candidates and load errors are
    /// expected and only logged at debug level.
    pub fn resolve(
        &self,
        candidates: &[String],
    ) -> std::result::Result<Resolution, ResolutionFailure> {
        let mut attempted = Vec::new();

        for candidate in candidates {
            let Some(provider) = self.registry.get(candidate) else {
                tracing::debug!("Backend candidate '{}' is not registered, skipping", candidate);
                attempted.push(SkippedCandidate {
                    candidate: candidate.clone(),
                    reason: "not registered".to_string(),
                });
                continue;
            };

            match provider.load() {
                Ok(factory) => {
                    tracing::info!("Resolved memory backend from candidate '{}'", candidate);
                    return Ok(Resolution {
                        candidate: candidate.clone(),
                        factory,
                    });
                }
                Err(e) => {
                    tracing::debug!("Backend candidate '{}' failed to load: {}", candidate, e);
                    attempted.push(SkippedCandidate {
                        candidate: candidate.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(factory) = &self.direct {
            tracing::info!("No backend candidate loaded, using direct construction");
            return Ok(Resolution {
                candidate: DIRECT_CANDIDATE.to_string(),
                factory: Arc::clone(factory),
            });
        }

        Err(ResolutionFailure { attempted })
    }
}

/// Resolution status of a single candidate, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateInfo {
    /// Candidate identifier.
    pub name: String,
    /// Position in the candidate list (0 = highest priority).
    pub priority: usize,
    /// Whether a provider is registered under this name.
    pub registered: bool,
}

/// Describe a candidate list against a registry.
pub fn describe_candidates(
    registry: &ProviderRegistry,
    candidates: &[String],
) -> Vec<CandidateInfo> {
    candidates
        .iter()
        .enumerate()
        .map(|(priority, name)| CandidateInfo {
            name: name.clone(),
            priority,
            registered: registry.contains(name),
        })
        .collect()
}
