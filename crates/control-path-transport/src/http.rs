// crates/control-path-transport/src/http.rs
// ============================================================================
// Module: HTTP Loading
// Description: Bounded GET with manual redirects and conditional GET.
// Purpose: Fetch artifact and override bytes under network policy.
// Dependencies: reqwest, url, tracing
// ============================================================================

//! ## Overview
//! URL loads accept only `http://` and `https://`. Redirects are chased
//! manually, at most five hops, each hop honoring the request timeout; a
//! 3xx without `Location` and unparseable redirect targets fail. When the
//! caller holds an ETag the request carries `If-None-Match`, and a `304`
//! reports [`FetchOutcome::NotModified`]. Unexpected content types are
//! logged and tolerated; response bodies are capped at the caller's limit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::ETAG;
use reqwest::header::IF_NONE_MATCH;
use reqwest::header::LOCATION;
use reqwest::redirect::Policy;
use tracing::warn;
use url::Url;

use crate::TransportError;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum number of redirect hops followed per fetch.
pub const MAX_REDIRECTS: u32 = 5;

/// Default timeout for artifact URL loads.
pub const ARTIFACT_TIMEOUT_DEFAULT: Duration = Duration::from_secs(30);

/// Upper bound on artifact URL load timeouts.
pub const ARTIFACT_TIMEOUT_CAP: Duration = Duration::from_secs(5 * 60);

/// Default timeout for override URL loads.
pub const OVERRIDE_TIMEOUT_DEFAULT: Duration = Duration::from_secs(10);

/// Upper bound on override URL load timeouts.
pub const OVERRIDE_TIMEOUT_CAP: Duration = Duration::from_secs(60);

/// Clamps a requested timeout into `[default, cap]` semantics.
///
/// `None` yields the default; explicit values are capped.
#[must_use]
pub fn clamp_timeout(requested: Option<Duration>, default: Duration, cap: Duration) -> Duration {
    requested.map_or(default, |timeout| timeout.min(cap))
}

/// Returns true when the string parses as an `http`/`https` URL.
#[must_use]
pub fn is_http_url(candidate: &str) -> bool {
    Url::parse(candidate).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

// ============================================================================
// SECTION: Fetch Types
// ============================================================================

/// One bounded GET request.
///
/// # Invariants
/// - `expected_content_types` empty disables the content-type warning.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    /// Target URL; only `http`/`https` schemes are accepted.
    pub url: &'a str,
    /// Per-hop request timeout.
    pub timeout: Duration,
    /// Maximum accepted response size in bytes.
    pub max_bytes: usize,
    /// Known entity tag for conditional GET.
    pub etag: Option<&'a str>,
    /// Content types that do not trigger a warning.
    pub expected_content_types: &'a [&'a str],
}

/// Outcome of a conditional fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server reported the entity unchanged (HTTP 304).
    NotModified,
    /// Fresh bytes were fetched.
    Fetched(FetchedPayload),
}

/// Fetched response bytes plus caching metadata.
///
/// # Invariants
/// - `bytes.len()` never exceeds the request's byte limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPayload {
    /// Response body bytes.
    pub bytes: Vec<u8>,
    /// Entity tag reported by the final response, when any.
    pub etag: Option<String>,
}

// ============================================================================
// SECTION: Fetch
// ============================================================================

/// Performs a bounded GET with manual redirect handling.
///
/// # Errors
///
/// Returns [`TransportError::Failed`] for scheme, status, size, and redirect
/// shape violations, [`TransportError::Timeout`] when a hop times out, and
/// [`TransportError::TooManyRedirects`] past the hop limit.
pub fn fetch_url(request: &FetchRequest<'_>) -> Result<FetchOutcome, TransportError> {
    let mut current = parse_http_url(request.url)?;
    let client = Client::builder()
        .timeout(request.timeout)
        .redirect(Policy::none())
        .build()
        .map_err(|err| TransportError::Failed(format!("http client build failed: {err}")))?;

    for _hop in 0..=MAX_REDIRECTS {
        let mut builder = client.get(current.as_str());
        if let Some(etag) = request.etag {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        let mut response = builder.send().map_err(|err| {
            if err.is_timeout() {
                TransportError::Timeout(format!("request to {current} timed out"))
            } else {
                TransportError::Failed(format!("request to {current} failed: {err}"))
            }
        })?;
        let status = response.status();
        if status.is_redirection() {
            current = redirect_target(&current, &response)?;
            continue;
        }
        if status == StatusCode::NOT_MODIFIED && request.etag.is_some() {
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(TransportError::Failed(format!(
                "unexpected status {status} from {current}"
            )));
        }
        warn_on_content_type(&response, request.expected_content_types);
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = read_response_limited(&mut response, request.max_bytes)?;
        return Ok(FetchOutcome::Fetched(FetchedPayload {
            bytes,
            etag,
        }));
    }
    Err(TransportError::TooManyRedirects(MAX_REDIRECTS))
}

/// Parses and scheme-checks a URL.
fn parse_http_url(candidate: &str) -> Result<Url, TransportError> {
    let url = Url::parse(candidate)
        .map_err(|err| TransportError::Failed(format!("invalid url `{candidate}`: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(TransportError::Failed(format!("unsupported url scheme `{other}`"))),
    }
}

/// Resolves a redirect's `Location` header against the current URL.
fn redirect_target(current: &Url, response: &Response) -> Result<Url, TransportError> {
    let location = response
        .headers()
        .get(LOCATION)
        .ok_or_else(|| TransportError::Failed("redirect without Location header".to_string()))?;
    let location = location
        .to_str()
        .map_err(|_| TransportError::Failed("redirect Location is not valid text".to_string()))?;
    let target = current
        .join(location)
        .map_err(|err| TransportError::Failed(format!("invalid redirect url: {err}")))?;
    match target.scheme() {
        "http" | "https" => Ok(target),
        other => Err(TransportError::Failed(format!(
            "redirect to unsupported url scheme `{other}`"
        ))),
    }
}

/// Logs a warning when the response content type is unexpected.
fn warn_on_content_type(response: &Response, expected: &[&str]) {
    if expected.is_empty() {
        return;
    }
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_ascii_lowercase());
    let Some(content_type) = content_type else {
        return;
    };
    if !expected.iter().any(|candidate| *candidate == content_type) {
        warn!(content_type = %content_type, "unexpected content type; continuing");
    }
}

/// Reads the response body while enforcing a byte limit.
fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, TransportError> {
    let max_bytes_u64 = u64::try_from(max_bytes)
        .map_err(|_| TransportError::Failed("byte limit exceeds u64".to_string()))?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(TransportError::Failed(format!("response exceeds {max_bytes} bytes")));
    }
    let mut buffer = Vec::new();
    let limit = max_bytes_u64.saturating_add(1);
    let mut handle = response.take(limit);
    handle
        .read_to_end(&mut buffer)
        .map_err(|err| TransportError::Failed(format!("failed to read response: {err}")))?;
    if buffer.len() > max_bytes {
        return Err(TransportError::Failed(format!("response exceeds {max_bytes} bytes")));
    }
    Ok(buffer)
}
