//! Memory commands for memlink.
//!
//! `store`, `search`, `read`, `delete`, `list` and `stats` call the
//! corresponding memory tool through a plugin host, so the CLI sees exactly
//! what an agent would, including degraded-mode failures.

use serde_json::Value;

use crate::plugin::{LocalHost, MemoryToolKind};

/// Options for memory commands.
#[derive(Debug, Clone, Default)]
pub struct MemoryOptions {
    /// Output as JSON.
    pub json: bool,
    /// Suppress output.
    pub quiet: bool,
}

/// One memory tool invocation.
pub struct MemoryCommand {
    kind: MemoryToolKind,
    args: Value,
}

impl MemoryCommand {
    /// Create a command for a tool with JSON arguments.
    pub fn new(kind: MemoryToolKind, args: Value) -> Self {
        Self { kind, args }
    }

    /// Run the command against a host.
    pub async fn run(&self, host: &LocalHost) -> Value {
        host.call_tool(self.kind.name(), self.args.clone()).await
    }

    /// Whether the tool reported success.
    pub fn succeeded(output: &Value) -> bool {
        output["success"].as_bool().unwrap_or(false)
    }

    /// Format output based on options.
    pub fn format_output(&self, output: &Value, options: &MemoryOptions) -> String {
        if options.quiet {
            return String::new();
        }

        if options.json {
            serde_json::to_string_pretty(output).unwrap_or_else(|_| "{}".to_string())
        } else {
            self.format_human_readable(output)
        }
    }

    fn format_human_readable(&self, output: &Value) -> String {
        if !Self::succeeded(output) {
            return format!(
                "{} failed: {}\n",
                self.kind.name(),
                output["error"].as_str().unwrap_or("unknown error")
            );
        }

        match self.kind {
            MemoryToolKind::Store => {
                let verb = if output["created"].as_bool().unwrap_or(true) {
                    "Stored"
                } else {
                    "Updated"
                };
                format!(
                    "{} {}/{}\n",
                    verb,
                    str_field(output, "namespace"),
                    str_field(output, "key")
                )
            }
            MemoryToolKind::Search => format_records(&output["results"], "No memories found.", true),
            MemoryToolKind::List => format_records(&output["entries"], "No memories stored.", false),
            MemoryToolKind::Read => {
                if !output["found"].as_bool().unwrap_or(false) {
                    return "Not found.\n".to_string();
                }
                let record = &output["record"];
                let mut out = format!(
                    "{}/{}\n",
                    str_field(record, "namespace"),
                    str_field(record, "key")
                );
                if let Some(tags) = record["tags"].as_array() {
                    let tags: Vec<&str> = tags.iter().filter_map(Value::as_str).collect();
                    out.push_str(&format!("Tags: {}\n", tags.join(", ")));
                }
                out.push_str(&format!("Updated: {}\n\n", str_field(record, "updatedAt")));
                out.push_str(str_field(record, "content"));
                out.push('\n');
                out
            }
            MemoryToolKind::Delete => {
                if output["deleted"].as_bool().unwrap_or(false) {
                    "Deleted.\n".to_string()
                } else {
                    "Nothing to delete.\n".to_string()
                }
            }
            MemoryToolKind::Stats => {
                let stats = &output["stats"];
                let mut lines = vec![format!(
                    "Total entries: {}",
                    stats["totalEntries"].as_u64().unwrap_or(0)
                )];
                if let Some(namespaces) = stats["byNamespace"].as_object() {
                    for (namespace, count) in namespaces {
                        lines.push(format!("  {}: {}", namespace, count));
                    }
                }
                lines.join("\n") + "\n"
            }
        }
    }
}

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    value[field].as_str().unwrap_or("")
}

fn format_records(records: &Value, empty: &str, scored: bool) -> String {
    let records = match records.as_array() {
        Some(records) if !records.is_empty() => records,
        _ => return format!("{}\n", empty),
    };

    let mut lines = vec![format!("Found {} memories:\n", records.len())];
    for record in records {
        let score = match record["score"].as_f64() {
            Some(score) if scored => format!(" ({:.2})", score),
            _ => String::new(),
        };
        lines.push(format!(
            "  [{}] {}{}",
            str_field(record, "namespace"),
            str_field(record, "key"),
            score
        ));
        lines.push(format!("      {}", first_line(str_field(record, "content"))));
    }
    lines.join("\n") + "\n"
}

fn first_line(content: &str) -> &str {
    content.lines().next().unwrap_or("")
}
