// crates/control-path-transport/src/lib.rs
// ============================================================================
// Module: Control Path Transport
// Description: Bounded file and HTTP(S) loading for artifacts and overrides.
// Purpose: Fetch untrusted bytes under strict path and network policy.
// Dependencies: reqwest, url, thiserror, tracing
// ============================================================================

//! ## Overview
//! This crate loads artifact and override bytes from the filesystem or over
//! HTTP(S). File loads enforce path safety (no NUL bytes, no `..` after
//! canonicalization, optional allowed-directory scoping) and byte limits.
//! URL loads accept only `http`/`https`, chase at most five redirects
//! manually, honor per-request timeouts, and support conditional GET via
//! `If-None-Match`.
//!
//! Security posture: paths and remote content are untrusted; every load
//! fails closed on policy violations.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;
pub mod path;

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::ARTIFACT_TIMEOUT_CAP;
pub use http::ARTIFACT_TIMEOUT_DEFAULT;
pub use http::FetchOutcome;
pub use http::FetchRequest;
pub use http::FetchedPayload;
pub use http::MAX_REDIRECTS;
pub use http::OVERRIDE_TIMEOUT_CAP;
pub use http::OVERRIDE_TIMEOUT_DEFAULT;
pub use http::clamp_timeout;
pub use http::fetch_url;
pub use http::is_http_url;
pub use path::ALLOWED_DIRECTORY_ENV;
pub use path::read_file_limited;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Transport errors for file and URL loads.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The path is empty, contains NUL bytes, or fails normalization rules.
    #[error("invalid path: {0}")]
    PathInvalid(String),
    /// The canonical path escapes the configured allowed directory.
    #[error("path out of scope: {0}")]
    PathOutOfScope(String),
    /// The load failed: I/O error, bad scheme, size limit, or bad status.
    #[error("transport failed: {0}")]
    Failed(String),
    /// The request exceeded its timeout.
    #[error("transport timeout: {0}")]
    Timeout(String),
    /// The redirect chain exceeded the hop limit.
    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),
}
