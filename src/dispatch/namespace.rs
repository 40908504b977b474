//! Namespace allow-list.
//!
//! Namespaces partition memory entries between tenants. Incoming names are
//! trimmed and lowercased, then checked against a fixed allow-list before
//! any backend call is made.

use crate::dispatch::DispatchError;

/// Namespaces a caller may read from or write to.
pub const ALLOWED_NAMESPACES: &[&str] = &["internal", "shared", "project", "personal", "session"];

/// Normalize a namespace and check it against the allow-list.
///
/// Returns `None` for names outside the allow-list.
pub fn normalize_namespace(raw: &str) -> Option<String> {
    let normalized = raw.trim().to_lowercase();
    ALLOWED_NAMESPACES
        .contains(&normalized.as_str())
        .then_some(normalized)
}

/// Resolve an optional caller-supplied namespace.
///
/// Missing or blank names resolve to `default`. Anything else must be on the
/// allow-list.
pub fn resolve_namespace(
    raw: Option<&str>,
    default: &str,
) -> std::result::Result<String, DispatchError> {
    match raw.map(str::trim).filter(|ns| !ns.is_empty()) {
        None => Ok(default.to_string()),
        Some(ns) => normalize_namespace(ns).ok_or_else(|| DispatchError::InvalidSchema {
            namespace: ns.to_string(),
        }),
    }
}
