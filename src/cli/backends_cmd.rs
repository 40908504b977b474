//! Backends command for memlink.
//!
//! Shows the configured backend candidates, whether each has a registered
//! provider, and which one resolution would pick.

use serde::{Deserialize, Serialize};

use crate::config::PluginConfig;
use crate::discovery::{describe_candidates, BackendResolver, CandidateInfo};

/// Options for the backends command.
#[derive(Debug, Clone, Default)]
pub struct BackendsOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the backends command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendsOutput {
    /// Whether a backend could be resolved.
    pub success: bool,
    /// Configured candidates, in priority order.
    pub candidates: Vec<CandidateDetail>,
    /// The candidate resolution picks.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<String>,
    /// Resolution error, if no candidate loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Detailed candidate information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDetail {
    /// Candidate identifier.
    pub name: String,
    /// Position in the candidate list.
    pub priority: usize,
    /// Whether a provider is registered.
    pub registered: bool,
    /// Whether this is the active candidate.
    pub is_active: bool,
}

impl CandidateDetail {
    fn from_info(info: CandidateInfo, active: Option<&str>) -> Self {
        let is_active = active == Some(info.name.as_str());
        Self {
            name: info.name,
            priority: info.priority,
            registered: info.registered,
            is_active,
        }
    }
}

/// The backends command implementation.
pub struct BackendsCommand {
    resolver: BackendResolver,
    config: PluginConfig,
}

impl BackendsCommand {
    /// Create a new backends command.
    pub fn new(resolver: BackendResolver, config: PluginConfig) -> Self {
        Self { resolver, config }
    }

    /// Run the backends command. Resolves without connecting.
    pub fn run(&self) -> BackendsOutput {
        let candidates = &self.config.backend.candidates;
        let (active, error) = match self.resolver.resolve(candidates) {
            Ok(resolution) => (Some(resolution.candidate), None),
            Err(failure) => (None, Some(failure.to_string())),
        };

        let details = describe_candidates(self.resolver.registry(), candidates)
            .into_iter()
            .map(|info| CandidateDetail::from_info(info, active.as_deref()))
            .collect();

        BackendsOutput {
            success: active.is_some(),
            candidates: details,
            active,
            error,
        }
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &BackendsOutput, options: &BackendsOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &BackendsOutput) -> String {
        let mut lines = Vec::new();

        if output.candidates.is_empty() {
            lines.push("No backend candidates configured.".to_string());
        } else {
            lines.push("Backend candidates:\n".to_string());
            for candidate in &output.candidates {
                let status = if candidate.registered { "+" } else { "-" };
                let marker = if candidate.is_active { " (active)" } else { "" };
                lines.push(format!(
                    "  {}. [{}] {}{}",
                    candidate.priority + 1,
                    status,
                    candidate.name,
                    marker
                ));
            }
            lines.push(String::new());
        }

        match (&output.active, &output.error) {
            (Some(active), _) => lines.push(format!("Active backend: {}", active)),
            (None, Some(error)) => lines.push(format!("No active backend: {}", error)),
            (None, None) => lines.push("No active backend available.".to_string()),
        }

        lines.join("\n") + "\n"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryBackendFactory;
    use crate::discovery::{ProviderRegistry, DIRECT_CANDIDATE};
    use std::sync::Arc;

    fn config(candidates: &[&str]) -> PluginConfig {
        let mut config = PluginConfig::default();
        config.backend.candidates = candidates.iter().map(|s| s.to_string()).collect();
        config
    }

    #[test]
    fn test_builtin_candidates() {
        let cmd = BackendsCommand::new(
            BackendResolver::new(ProviderRegistry::with_builtin()),
            config(&["pgvector", "memory"]),
        );

        let output = cmd.run();

        assert!(output.success);
        assert_eq!(output.active.as_deref(), Some("memory"));
        assert!(!output.candidates[0].registered);
        assert!(output.candidates[1].registered);
        assert!(output.candidates[1].is_active);
    }

    #[test]
    fn test_no_candidate_resolves() {
        let cmd = BackendsCommand::new(
            BackendResolver::new(ProviderRegistry::new()),
            config(&["pgvector"]),
        );

        let output = cmd.run();

        assert!(!output.success);
        assert!(output.active.is_none());
        assert_eq!(
            output.error.as_deref(),
            Some("no memory backend available (tried: pgvector)")
        );
    }

    #[test]
    fn test_direct_fallback_reported() {
        let resolver = BackendResolver::new(ProviderRegistry::new())
            .with_direct(Arc::new(InMemoryBackendFactory));
        let cmd = BackendsCommand::new(resolver, config(&["pgvector"]));

        let output = cmd.run();
        assert_eq!(output.active.as_deref(), Some(DIRECT_CANDIDATE));
        assert!(!output.candidates[0].is_active);
    }

    #[test]
    fn test_format_human_readable() {
        let cmd = BackendsCommand::new(
            BackendResolver::new(ProviderRegistry::with_builtin()),
            config(&["pgvector", "file"]),
        );

        let formatted = cmd.format_output(&cmd.run(), &BackendsOptions::default());

        assert!(formatted.contains("Backend candidates:"));
        assert!(formatted.contains("1. [-] pgvector"));
        assert!(formatted.contains("2. [+] file (active)"));
        assert!(formatted.contains("Active backend: file"));
    }

    #[test]
    fn test_format_output_json() {
        let cmd = BackendsCommand::new(
            BackendResolver::new(ProviderRegistry::with_builtin()),
            config(&["memory"]),
        );
        let options = BackendsOptions {
            json: true,
            ..Default::default()
        };

        let formatted = cmd.format_output(&cmd.run(), &options);
        assert!(formatted.contains("\"success\": true"));
        assert!(formatted.contains("\"active\": \"memory\""));
    }

    #[test]
    fn test_format_output_quiet() {
        let cmd = BackendsCommand::new(
            BackendResolver::new(ProviderRegistry::new()),
            config(&[]),
        );
        let options = BackendsOptions {
            quiet: true,
            ..Default::default()
        };
        assert!(cmd.format_output(&cmd.run(), &options).is_empty());
    }

    #[test]
    fn test_format_no_candidates() {
        let cmd = BackendsCommand::new(
            BackendResolver::new(ProviderRegistry::new()),
            config(&[]),
        );
        let formatted = cmd.format_output(&cmd.run(), &BackendsOptions::default());
        assert!(formatted.contains("No backend candidates configured."));
        assert!(formatted.contains("no candidates configured"));
    }
}
