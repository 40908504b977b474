//! Status and health commands for memlink.
//!
//! Both read the status cache only; neither touches the backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::connection::{ConnectionState, HealthReport, Status, StatusCache};

/// Options for the status command.
#[derive(Debug, Clone, Default)]
pub struct StatusOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// Output format for the status command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    /// Whether a backend connection is held.
    pub connected: bool,
    /// Connection state.
    pub state: ConnectionState,
    /// Connected backend name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    /// Total entries from the last stats snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_entries: Option<u64>,
    /// Per-namespace counts from the last stats snapshot.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub by_namespace: BTreeMap<String, u64>,
    /// Last connection error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Status> for StatusOutput {
    fn from(status: Status) -> Self {
        let (total_entries, by_namespace) = match status.stats {
            Some(stats) => (Some(stats.total_entries), stats.by_namespace),
            None => (None, BTreeMap::new()),
        };
        Self {
            connected: status.connected,
            state: status.state,
            backend: status.backend,
            total_entries,
            by_namespace,
            error: status.error,
        }
    }
}

/// The status command implementation.
pub struct StatusCommand {
    cache: StatusCache,
}

impl StatusCommand {
    /// Create a new status command.
    pub fn new(cache: StatusCache) -> Self {
        Self { cache }
    }

    /// Run the status command.
    pub fn run(&self) -> StatusOutput {
        StatusOutput::from(self.cache.status())
    }

    /// Run the health command.
    pub fn health(&self) -> HealthReport {
        self.cache.health()
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &StatusOutput, options: &StatusOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &StatusOutput) -> String {
        let mut lines = Vec::new();

        if !output.connected {
            lines.push(format!("Memory backend: {}", output.state));
            if let Some(error) = &output.error {
                lines.push(format!("Error: {}", error));
            }
            return lines.join("\n") + "\n";
        }

        match &output.backend {
            Some(name) => lines.push(format!("Memory backend: connected ({})", name)),
            None => lines.push("Memory backend: connected".to_string()),
        }

        match output.total_entries {
            Some(total) => {
                lines.push(format!("Total entries: {}", total));
                for (namespace, count) in &output.by_namespace {
                    lines.push(format!("  {}: {}", namespace, count));
                }
            }
            None => lines.push("Total entries: unknown (stats unavailable)".to_string()),
        }

        lines.join("\n") + "\n"
    }
}

/// Format a health report.
pub fn format_health(report: &HealthReport, options: &StatusOptions) -> String {
    if options.quiet {
        return String::new();
    }
    if options.json {
        return serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    }

    let status = serde_json::to_value(report.status)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut out = format!("Health: {}\n", status);
    if let Some(error) = &report.error {
        out.push_str(&format!("Error: {}\n", error));
    }
    out
}
