//! memlink - memory backend plugin for agent runtimes
//!
//! CLI entry point with global panic handler.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use tracing_subscriber::EnvFilter;

use memlink::cli::backends_cmd::{BackendsCommand, BackendsOptions};
use memlink::cli::memory::{MemoryCommand, MemoryOptions};
use memlink::cli::status::{format_health, StatusCommand, StatusOptions};
use memlink::config::{memlink_home, PluginConfig};
use memlink::connection::HealthStatus;
use memlink::discovery::BackendResolver;
use memlink::error::exit_codes;
use memlink::plugin::{register, LocalHost, MemoryToolKind};

// =============================================================================
// CLI Definition
// =============================================================================

/// memlink - memory backend plugin for agent runtimes
#[derive(Parser)]
#[command(name = "memlink")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the user and project files
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show connection state and entry counts
    Status {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show the health report served by memory.health
    Health {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show backend candidates and which one resolves
    Backends {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Store a memory entry
    Store {
        /// Entry content
        content: String,
        /// Entry key (generated when omitted)
        #[arg(long, short)]
        key: Option<String>,
        /// Namespace
        #[arg(long, short)]
        namespace: Option<String>,
        /// Tag (repeatable)
        #[arg(long = "tag", short)]
        tags: Vec<String>,
        /// Metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Search memory entries
    Search {
        /// Search query
        query: String,
        /// Namespace
        #[arg(long, short)]
        namespace: Option<String>,
        /// Maximum number of results
        #[arg(long, short)]
        limit: Option<usize>,
        /// Minimum score (0 to 1)
        #[arg(long)]
        min_score: Option<f64>,
        /// Required tag (repeatable)
        #[arg(long = "tag", short)]
        tags: Vec<String>,
        /// Include entry metadata
        #[arg(long)]
        include_metadata: bool,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Read one memory entry
    Read {
        /// Entry key
        key: String,
        /// Namespace
        #[arg(long, short)]
        namespace: Option<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Delete one memory entry
    Delete {
        /// Entry key
        key: String,
        /// Namespace
        #[arg(long, short)]
        namespace: Option<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// List memory entries
    List {
        /// Namespace (all namespaces when omitted)
        #[arg(long, short)]
        namespace: Option<String>,
        /// Maximum number of entries
        #[arg(long, short)]
        limit: Option<usize>,
        /// Entries to skip
        #[arg(long)]
        offset: Option<usize>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show live backend statistics
    Stats {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    init_tracing();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("memlink error: failed to start runtime: {}", e);
            return ExitCode::from(exit_codes::FAILURE as u8);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("memlink error: {}", e);
            ExitCode::from(exit_codes::FAILURE as u8)
        }
    }
}

/// Install the stderr subscriber. Filter from `MEMLINK_LOG`, default `warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("MEMLINK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Set up the global panic handler.
///
/// On panic, logs to ~/.memlink/crash.log and exits with code 3.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("memlink panic: {}", info);

        if let Some(home) = memlink_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::CRASH);
    }));
}

/// Run the CLI and return the exit code.
async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => PluginConfig::load_with_file(path),
        None => PluginConfig::load(),
    };
    let resolver = BackendResolver::with_defaults();

    match cli.command {
        Commands::Backends { json, quiet } => {
            let cmd = BackendsCommand::new(resolver, config);
            let output = cmd.run();
            print_formatted(&cmd.format_output(&output, &BackendsOptions { json, quiet }));
            Ok(success_to_exit_code(output.success))
        }
        command => {
            let mut host = LocalHost::new();
            let plugin = register(&mut host, config, resolver);
            host.start_services().await;

            let result = match command {
                Commands::Status { json, quiet } => {
                    let cmd = StatusCommand::new(plugin.status_cache());
                    let output = cmd.run();
                    print_formatted(&cmd.format_output(&output, &StatusOptions { json, quiet }));
                    Ok(success_to_exit_code(output.connected))
                }
                Commands::Health { json, quiet } => {
                    let report = StatusCommand::new(plugin.status_cache()).health();
                    print_formatted(&format_health(&report, &StatusOptions { json, quiet }));
                    Ok(success_to_exit_code(report.status == HealthStatus::Healthy))
                }
                command => match memory_command(command) {
                    Ok((cmd, options)) => {
                        let output = cmd.run(&host).await;
                        print_formatted(&cmd.format_output(&output, &options));
                        Ok(success_to_exit_code(MemoryCommand::succeeded(&output)))
                    }
                    Err(e) => Err(e),
                },
            };

            host.stop_services().await;
            result
        }
    }
}

// =============================================================================
// Command Implementations
// =============================================================================

/// Translate a memory subcommand into tool arguments.
fn memory_command(
    command: Commands,
) -> Result<(MemoryCommand, MemoryOptions), Box<dyn std::error::Error>> {
    let (kind, args, json, quiet) = match command {
        Commands::Store {
            content,
            key,
            namespace,
            tags,
            metadata,
            json,
            quiet,
        } => {
            let metadata = match metadata {
                Some(raw) => Some(serde_json::from_str::<Map<String, Value>>(&raw)?),
                None => None,
            };
            let args = json!({
                "content": content,
                "key": key,
                "namespace": namespace,
                "tags": tags,
                "metadata": metadata,
            });
            (MemoryToolKind::Store, args, json, quiet)
        }
        Commands::Search {
            query,
            namespace,
            limit,
            min_score,
            tags,
            include_metadata,
            json,
            quiet,
        } => {
            let args = json!({
                "query": query,
                "namespace": namespace,
                "limit": limit,
                "minScore": min_score,
                "tags": tags,
                "includeMetadata": include_metadata,
            });
            (MemoryToolKind::Search, args, json, quiet)
        }
        Commands::Read {
            key,
            namespace,
            json,
            quiet,
        } => (
            MemoryToolKind::Read,
            json!({"key": key, "namespace": namespace}),
            json,
            quiet,
        ),
        Commands::Delete {
            key,
            namespace,
            json,
            quiet,
        } => (
            MemoryToolKind::Delete,
            json!({"key": key, "namespace": namespace}),
            json,
            quiet,
        ),
        Commands::List {
            namespace,
            limit,
            offset,
            json,
            quiet,
        } => (
            MemoryToolKind::List,
            json!({"namespace": namespace, "limit": limit, "offset": offset}),
            json,
            quiet,
        ),
        Commands::Stats { json, quiet } => (MemoryToolKind::Stats, Value::Null, json, quiet),
        Commands::Status { .. } | Commands::Health { .. } | Commands::Backends { .. } => {
            return Err("not a memory command".into());
        }
    };

    Ok((MemoryCommand::new(kind, args), MemoryOptions { json, quiet }))
}

fn print_formatted(formatted: &str) {
    if !formatted.is_empty() {
        print!("{}", formatted);
    }
}

/// Convert a success boolean to an exit code.
fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::FAILURE as u8)
    }
}
