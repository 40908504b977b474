//! Configuration loading for memlink.
//!
//! Plugin configuration follows a precedence chain:
//! 1. Environment variables (highest priority)
//! 2. Project config (`.memlink/config.toml`)
//! 3. User config (`~/.memlink/config.toml`)
//! 4. Defaults (lowest priority)
//!
//! Connection parameters are layered differently: explicit config fields
//! override environment-derived values, which override built-in fallbacks.
//!
//! All configuration is optional. The plugin runs with defaults when no
//! config exists.

use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatch::namespace::{normalize_namespace, ALLOWED_NAMESPACES};
use crate::error::{FailOpen, MemlinkError, Result};

/// Candidates probed when the config does not name any.
pub const DEFAULT_CANDIDATES: &[&str] = &["file", "memory"];

/// Namespace used when a call does not specify one.
pub const DEFAULT_NAMESPACE: &str = "internal";

/// Default stats refresh period (5 minutes).
pub const DEFAULT_REFRESH_SECS: u64 = 300;

/// Minimum valid refresh period.
pub const MIN_REFRESH_SECS: u64 = 1;

/// Default per-call backend timeout. Zero disables the timeout.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 30_000;

/// Main plugin configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginConfig {
    /// Backend host.
    pub host: Option<String>,
    /// Backend port.
    pub port: Option<u16>,
    /// Backend database name.
    pub database: Option<String>,
    /// Backend user.
    pub user: Option<String>,
    /// Backend password.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Whether to use TLS for the backend connection.
    pub ssl: Option<bool>,
    /// Namespace used when a call does not specify one.
    #[serde(alias = "defaultNamespace")]
    pub default_namespace: String,
    /// Inject relevant memories into the prompt before an agent starts.
    #[serde(alias = "autoContextInjection")]
    pub auto_context_injection: bool,
    /// Backend resolution and supervision settings.
    pub backend: BackendConfig,
    /// Context injection settings.
    pub context: ContextConfig,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            database: None,
            user: None,
            password: None,
            ssl: None,
            default_namespace: DEFAULT_NAMESPACE.to_string(),
            auto_context_injection: false,
            backend: BackendConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

/// Backend resolution and supervision settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    /// Ordered list of backend candidates to resolve.
    pub candidates: Vec<String>,
    /// Seconds between background stats refreshes.
    pub refresh_interval_secs: u64,
    /// Per-call timeout for backend operations in milliseconds. Zero disables it.
    pub operation_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            candidates: DEFAULT_CANDIDATES.iter().map(|c| c.to_string()).collect(),
            refresh_interval_secs: DEFAULT_REFRESH_SECS,
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
        }
    }
}

impl BackendConfig {
    /// Check if a refresh interval is valid (must be >= 1 second).
    pub fn is_valid_refresh_secs(value: u64) -> bool {
        value >= MIN_REFRESH_SECS
    }
}

/// Context injection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    /// Maximum memories injected per agent start.
    pub max_memories: usize,
    /// Minimum score for a memory to be injected.
    pub min_score: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_memories: 5,
            min_score: 0.3,
        }
    }
}

impl PluginConfig {
    /// Load configuration with full precedence chain from the current directory.
    pub fn load() -> Self {
        match env::current_dir() {
            Ok(cwd) => Self::load_from_cwd(&cwd),
            Err(_) => {
                let mut config = PluginConfig::default();
                if let Some(user_config) = Self::load_user_config() {
                    config = config.merge(user_config);
                }
                config.apply_env_overrides();
                config.validate();
                config
            }
        }
    }

    /// Load configuration with a specific working directory.
    pub fn load_from_cwd(cwd: &Path) -> Self {
        let mut config = PluginConfig::default();

        if let Some(user_config) = Self::load_user_config() {
            config = config.merge(user_config);
        }

        if let Some(project_config) = Self::load_project_config(cwd) {
            config = config.merge(project_config);
        }

        config.apply_env_overrides();
        config.validate();

        config
    }

    /// Load configuration from an explicit file, then apply env overrides.
    ///
    /// Fails open: an unreadable or invalid file yields defaults.
    pub fn load_with_file(path: &Path) -> Self {
        let file_config = Self::load_from_file(path)
            .fail_open_with("loading config file", PluginConfig::default());
        let mut config = PluginConfig::default().merge(file_config);
        config.apply_env_overrides();
        config.validate();
        config
    }

    fn load_user_config() -> Option<PluginConfig> {
        let home = memlink_home()?;
        Self::load_from_file(&home.join("config.toml")).ok()
    }

    fn load_project_config(cwd: &Path) -> Option<PluginConfig> {
        Self::load_from_file(&project_config_path(cwd)).ok()
    }

    /// Load config from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<PluginConfig> {
        let content = fs::read_to_string(path).map_err(|e| MemlinkError::storage(path, e))?;
        toml::from_str(&content).map_err(|e| MemlinkError::config(e.to_string()))
    }

    /// Apply environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("MEMLINK_DEFAULT_NAMESPACE") {
            match normalize_namespace(&val) {
                Some(ns) => self.default_namespace = ns,
                None => tracing::warn!(
                    "Invalid MEMLINK_DEFAULT_NAMESPACE value '{}'. Expected one of {:?}. Using '{}'.",
                    val,
                    ALLOWED_NAMESPACES,
                    self.default_namespace
                ),
            }
        }

        if let Ok(val) = env::var("MEMLINK_AUTO_CONTEXT_INJECTION") {
            match parse_bool(&val) {
                Some(enabled) => self.auto_context_injection = enabled,
                None => tracing::warn!(
                    "Invalid MEMLINK_AUTO_CONTEXT_INJECTION value '{}'. Expected true/false.",
                    val
                ),
            }
        }

        if let Ok(val) = env::var("MEMLINK_REFRESH_SECS") {
            match val.parse::<u64>() {
                Ok(n) if BackendConfig::is_valid_refresh_secs(n) => {
                    self.backend.refresh_interval_secs = n;
                }
                _ => tracing::warn!(
                    "Invalid MEMLINK_REFRESH_SECS value '{}'. Must be an integer >= {}. Using '{}'.",
                    val,
                    MIN_REFRESH_SECS,
                    self.backend.refresh_interval_secs
                ),
            }
        }

        if let Ok(val) = env::var("MEMLINK_OPERATION_TIMEOUT_MS") {
            match val.parse::<u64>() {
                Ok(n) => self.backend.operation_timeout_ms = n,
                Err(_) => tracing::warn!(
                    "Invalid MEMLINK_OPERATION_TIMEOUT_MS value '{}'. Expected an integer.",
                    val
                ),
            }
        }

        if let Ok(val) = env::var("MEMLINK_CANDIDATES") {
            let candidates: Vec<String> = val
                .split(',')
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if candidates.is_empty() {
                tracing::warn!("MEMLINK_CANDIDATES is empty, keeping configured candidates");
            } else {
                self.backend.candidates = candidates;
            }
        }
    }

    /// Replace invalid values with defaults.
    fn validate(&mut self) {
        match normalize_namespace(&self.default_namespace) {
            Some(ns) => self.default_namespace = ns,
            None => {
                tracing::warn!(
                    "Invalid default namespace '{}'. Expected one of {:?}. Using '{}'.",
                    self.default_namespace,
                    ALLOWED_NAMESPACES,
                    DEFAULT_NAMESPACE
                );
                self.default_namespace = DEFAULT_NAMESPACE.to_string();
            }
        }

        if !BackendConfig::is_valid_refresh_secs(self.backend.refresh_interval_secs) {
            tracing::warn!(
                "Invalid refresh interval {}s. Using {}s.",
                self.backend.refresh_interval_secs,
                DEFAULT_REFRESH_SECS
            );
            self.backend.refresh_interval_secs = DEFAULT_REFRESH_SECS;
        }

        if self.backend.candidates.is_empty() {
            self.backend.candidates = BackendConfig::default().candidates;
        }
    }

    /// Merge another config into this one.
    ///
    /// Optional fields are taken from `other` when set. Other fields are
    /// taken from `other` when they differ from the default, so a layer only
    /// needs to specify its customizations.
    fn merge(mut self, other: PluginConfig) -> Self {
        self.host = other.host.or(self.host);
        self.port = other.port.or(self.port);
        self.database = other.database.or(self.database);
        self.user = other.user.or(self.user);
        self.password = other.password.or(self.password);
        self.ssl = other.ssl.or(self.ssl);

        let defaults = PluginConfig::default();
        if other.default_namespace != defaults.default_namespace {
            self.default_namespace = other.default_namespace;
        }
        if other.auto_context_injection != defaults.auto_context_injection {
            self.auto_context_injection = other.auto_context_injection;
        }

        if other.backend.candidates != defaults.backend.candidates {
            self.backend.candidates = other.backend.candidates;
        }
        if other.backend.refresh_interval_secs != defaults.backend.refresh_interval_secs {
            self.backend.refresh_interval_secs = other.backend.refresh_interval_secs;
        }
        if other.backend.operation_timeout_ms != defaults.backend.operation_timeout_ms {
            self.backend.operation_timeout_ms = other.backend.operation_timeout_ms;
        }

        if other.context.max_memories != defaults.context.max_memories {
            self.context.max_memories = other.context.max_memories;
        }
        if other.context.min_score != defaults.context.min_score {
            self.context.min_score = other.context.min_score;
        }

        self
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parameters handed to a backend factory.
///
/// Built by layering explicit config over environment-derived values over
/// built-in fallbacks.
#[derive(Clone, PartialEq)]
pub struct ConnectionParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub ssl: bool,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "memlink".to_string(),
            user: "memlink".to_string(),
            password: None,
            ssl: false,
        }
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("ssl", &self.ssl)
            .finish()
    }
}

impl ConnectionParams {
    /// Resolve parameters from the process environment and `config`.
    pub fn resolve(config: &PluginConfig) -> Self {
        Self::resolve_with(config, |name| env::var(name).ok())
    }

    /// Resolve parameters using a custom environment lookup.
    pub fn resolve_with(config: &PluginConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut params = Self::default();

        if let Some(host) = lookup("MEMLINK_HOST").filter(|v| !v.trim().is_empty()) {
            params.host = host;
        }
        if let Some(port) = lookup("MEMLINK_PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => params.port = p,
                Err(_) => tracing::warn!("Invalid MEMLINK_PORT value '{}', ignoring", port),
            }
        }
        if let Some(database) = lookup("MEMLINK_DATABASE").filter(|v| !v.trim().is_empty()) {
            params.database = database;
        }
        if let Some(user) = lookup("MEMLINK_USER").filter(|v| !v.trim().is_empty()) {
            params.user = user;
        }
        if let Some(password) = lookup("MEMLINK_PASSWORD") {
            params.password = Some(password);
        }
        if let Some(ssl) = lookup("MEMLINK_SSL") {
            match parse_bool(&ssl) {
                Some(enabled) => params.ssl = enabled,
                None => tracing::warn!("Invalid MEMLINK_SSL value '{}', ignoring", ssl),
            }
        }

        if let Some(host) = &config.host {
            params.host = host.clone();
        }
        if let Some(port) = config.port {
            params.port = port;
        }
        if let Some(database) = &config.database {
            params.database = database.clone();
        }
        if let Some(user) = &config.user {
            params.user = user.clone();
        }
        if let Some(password) = &config.password {
            params.password = Some(password.clone());
        }
        if let Some(ssl) = config.ssl {
            params.ssl = ssl;
        }

        params
    }
}

/// Get the memlink home directory.
///
/// Uses `MEMLINK_HOME` if set and non-empty, otherwise `~/.memlink`, and
/// a temp directory when no home directory exists.
pub fn memlink_home() -> Option<PathBuf> {
    if let Ok(home) = env::var("MEMLINK_HOME") {
        if home.is_empty() {
            tracing::warn!("MEMLINK_HOME is empty, using default");
        } else {
            let path = PathBuf::from(&home);
            if path.is_absolute() {
                return Some(path);
            }
            if let Ok(canonical) = path.canonicalize() {
                return Some(canonical);
            }
            tracing::warn!("MEMLINK_HOME is relative and doesn't exist, using as-is");
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        return Some(home.join(".memlink"));
    }

    let fallback = env::temp_dir().join("memlink");
    tracing::warn!(
        "HOME not set, using fallback location: {}",
        fallback.display()
    );
    Some(fallback)
}

/// Path of the project config file for a working directory.
pub fn project_config_path(cwd: &Path) -> PathBuf {
    cwd.join(".memlink").join("config.toml")
}
