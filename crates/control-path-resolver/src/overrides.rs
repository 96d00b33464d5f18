// crates/control-path-resolver/src/overrides.rs
// ============================================================================
// Module: Override Store
// Description: Emergency flag pins loaded from a JSON file or URL.
// Purpose: Let operators bypass the rule engine per flag name.
// Dependencies: control-path-transport, serde, serde_json
// ============================================================================

//! ## Overview
//! The override file maps flag names to value strings, either directly or
//! through a detailed record (`{value, timestamp?, reason?, operator?}`).
//! Loading normalizes everything to `flag -> string`. URL sources use
//! conditional GET: a known ETag rides along as `If-None-Match` and a `304`
//! keeps the current state while refreshing the load time.
//!
//! # Invariants
//! - Invalid shapes never partially replace an existing state.
//! - Override files larger than 1 MiB are rejected before parsing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use std::time::SystemTime;

use control_path_transport::FetchOutcome;
use control_path_transport::FetchRequest;
use control_path_transport::OVERRIDE_TIMEOUT_CAP;
use control_path_transport::OVERRIDE_TIMEOUT_DEFAULT;
use control_path_transport::TransportError;
use control_path_transport::clamp_timeout;
use control_path_transport::fetch_url;
use control_path_transport::is_http_url;
use control_path_transport::read_file_limited;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum accepted override file size in bytes (1 MiB).
pub const MAX_OVERRIDE_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Override loading errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum OverrideError {
    /// The override document has an invalid shape.
    #[error("invalid override: {0}")]
    Invalid(String),
    /// The underlying file or URL load failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ============================================================================
// SECTION: Source
// ============================================================================

/// Where overrides are loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideSource {
    /// Filesystem path under the artifact path-safety rules.
    File(String),
    /// HTTP(S) URL polled with conditional GET.
    Url(String),
}

impl OverrideSource {
    /// Classifies a location string into a file or URL source.
    #[must_use]
    pub fn from_location(location: &str) -> Self {
        if is_http_url(location) {
            Self::Url(location.to_string())
        } else {
            Self::File(location.to_string())
        }
    }

    /// Returns true for HTTP(S) sources, the only pollable kind.
    #[must_use]
    pub const fn is_url(&self) -> bool {
        matches!(self, Self::Url(_))
    }
}

// ============================================================================
// SECTION: State
// ============================================================================

/// Normalized override state plus conditional-GET metadata.
///
/// # Invariants
/// - `values` maps flag names to the exact value strings from the document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideState {
    /// Flag name to pinned value string.
    pub values: BTreeMap<String, String>,
    /// Last entity tag reported by the URL source.
    pub etag: Option<String>,
    /// When the state was last loaded or revalidated.
    pub loaded_at: Option<SystemTime>,
}

/// Result of one override load attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverrideLoad {
    /// The URL source reported the document unchanged (HTTP 304).
    Unchanged,
    /// A fresh state was loaded.
    Loaded(OverrideState),
}

// ============================================================================
// SECTION: Document Shape
// ============================================================================

/// Top-level override document.
#[derive(Debug, Deserialize)]
struct OverrideDocument {
    /// Document version string; required but not interpreted.
    #[serde(rename = "version")]
    _version: String,
    /// Flag name to override entry.
    overrides: BTreeMap<String, OverrideEntry>,
}

/// One override entry: a bare string or a detailed record.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OverrideEntry {
    /// Bare value string.
    Value(String),
    /// Detailed record carrying audit metadata.
    Detailed {
        /// Pinned value string.
        value: String,
        /// Optional pin timestamp, not interpreted.
        #[serde(default)]
        #[allow(dead_code, reason = "deserialized for document shape but intentionally not interpreted")]
        timestamp: Option<String>,
        /// Optional operator-facing reason, not interpreted.
        #[serde(default)]
        #[allow(dead_code, reason = "deserialized for document shape but intentionally not interpreted")]
        reason: Option<String>,
        /// Optional operator identity, not interpreted.
        #[serde(default)]
        #[allow(dead_code, reason = "deserialized for document shape but intentionally not interpreted")]
        operator: Option<String>,
    },
}

impl OverrideEntry {
    /// Returns the pinned value string.
    fn into_value(self) -> String {
        match self {
            Self::Value(value)
            | Self::Detailed {
                value, ..
            } => value,
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads overrides from a source, honoring a previously seen ETag.
///
/// # Errors
///
/// Returns [`OverrideError::Invalid`] for malformed documents and
/// [`OverrideError::Transport`] for file or URL failures.
pub fn load_override_state(
    source: &OverrideSource,
    timeout: Option<Duration>,
    allowed_directory: Option<&Path>,
    previous_etag: Option<&str>,
) -> Result<OverrideLoad, OverrideError> {
    match source {
        OverrideSource::File(path) => {
            let bytes = read_file_limited(path, MAX_OVERRIDE_BYTES, allowed_directory)?;
            let values = parse_overrides(&bytes)?;
            Ok(OverrideLoad::Loaded(OverrideState {
                values,
                etag: None,
                loaded_at: Some(SystemTime::now()),
            }))
        }
        OverrideSource::Url(url) => {
            let request = FetchRequest {
                url,
                timeout: clamp_timeout(timeout, OVERRIDE_TIMEOUT_DEFAULT, OVERRIDE_TIMEOUT_CAP),
                max_bytes: MAX_OVERRIDE_BYTES,
                etag: previous_etag,
                expected_content_types: &[],
            };
            match fetch_url(&request)? {
                FetchOutcome::NotModified => Ok(OverrideLoad::Unchanged),
                FetchOutcome::Fetched(payload) => {
                    let values = parse_overrides(&payload.bytes)?;
                    Ok(OverrideLoad::Loaded(OverrideState {
                        values,
                        etag: payload.etag,
                        loaded_at: Some(SystemTime::now()),
                    }))
                }
            }
        }
    }
}

/// Parses and normalizes an override document.
fn parse_overrides(bytes: &[u8]) -> Result<BTreeMap<String, String>, OverrideError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| OverrideError::Invalid("override document must be UTF-8".to_string()))?;
    let document: OverrideDocument = serde_json::from_str(text)
        .map_err(|err| OverrideError::Invalid(format!("override document shape: {err}")))?;
    Ok(document
        .overrides
        .into_iter()
        .map(|(flag, entry)| (flag, entry.into_value()))
        .collect())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
