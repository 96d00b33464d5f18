// crates/control-path-resolver/src/resolver.rs
// ============================================================================
// Module: Resolver Facade
// Description: Typed flag resolution over shared artifact/override state.
// Purpose: Own the mutable evaluation state and the polling lifecycle.
// Dependencies: control-path-core, control-path-transport, crate::{cache, coerce, details, overrides}
// ============================================================================

//! ## Overview
//! The resolver loads artifacts from files or URLs, swaps them atomically,
//! applies operator overrides ahead of the rule engine, and serves the four
//! typed resolutions through one shared pipeline. A background poller
//! refreshes overrides from HTTP(S) sources with conditional GET; its
//! failures are logged and the last good state keeps serving.
//!
//! # Invariants
//! - `resolve_*` never returns an error; anomalies collapse into envelopes.
//! - Failed loads leave the previous artifact and override state intact.
//! - Every artifact or override replacement purges the evaluation cache.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::panic::AssertUnwindSafe;
use std::panic::catch_unwind;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::SystemTime;

use control_path_core::Artifact;
use control_path_core::ArtifactError;
use control_path_core::ArtifactSummary;
use control_path_core::Clock;
use control_path_core::DecodeOptions;
use control_path_core::FlagDirectory;
use control_path_core::KeyMaterial;
use control_path_core::MAX_ARTIFACT_BYTES;
use control_path_core::SubjectView;
use control_path_core::SystemClock;
use control_path_core::decode_artifact;
use control_path_core::evaluate_flag;
use control_path_transport::ARTIFACT_TIMEOUT_CAP;
use control_path_transport::ARTIFACT_TIMEOUT_DEFAULT;
use control_path_transport::FetchOutcome;
use control_path_transport::FetchRequest;
use control_path_transport::TransportError;
use control_path_transport::clamp_timeout;
use control_path_transport::fetch_url;
use control_path_transport::is_http_url;
use control_path_transport::read_file_limited;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing::warn;

use crate::cache::CacheKey;
use crate::cache::EvaluationCache;
use crate::cache::CACHE_TTL_DEFAULT;
use crate::cache::ValueKind;
use crate::cache::canonical_context;
use crate::coerce::coerce_boolean;
use crate::coerce::coerce_number;
use crate::coerce::coerce_object;
use crate::coerce::coerce_string;
use crate::details::ErrorCode;
use crate::details::ResolutionDetails;
use crate::overrides::OverrideError;
use crate::overrides::OverrideLoad;
use crate::overrides::OverrideSource;
use crate::overrides::OverrideState;
use crate::overrides::load_override_state;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Content types that artifact fetches accept without a warning.
const ARTIFACT_CONTENT_TYPES: [&str; 2] = ["application/octet-stream", "application/x-msgpack"];

/// Default interval between override polls.
const POLL_INTERVAL_DEFAULT: Duration = Duration::from_secs(3);

/// Resolver configuration.
///
/// # Invariants
/// - Timeouts are clamped to the transport caps at request time.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Disables the evaluation cache when false.
    pub cache_enabled: bool,
    /// Time-to-live for cached resolutions.
    pub cache_ttl: Duration,
    /// Interval between override polls.
    pub poll_interval: Duration,
    /// Where overrides are loaded from, when configured.
    pub override_source: Option<OverrideSource>,
    /// Override fetch timeout; clamped to the override cap.
    pub override_timeout: Option<Duration>,
    /// Artifact fetch timeout; clamped to the artifact cap.
    pub artifact_timeout: Option<Duration>,
    /// Directory constraining file loads, unless overridden per call.
    pub allowed_directory: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: CACHE_TTL_DEFAULT,
            poll_interval: POLL_INTERVAL_DEFAULT,
            override_source: None,
            override_timeout: None,
            artifact_timeout: None,
            allowed_directory: None,
        }
    }
}

/// Per-load options for artifact acceptance.
///
/// # Invariants
/// - `allowed_directory` here takes precedence over the resolver's.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Verification key material for signed artifacts.
    pub public_key: Option<KeyMaterial>,
    /// Reject artifacts without a signature.
    pub require_signature: bool,
    /// Directory constraining this file load.
    pub allowed_directory: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors surfaced by explicit load operations.
///
/// # Invariants
/// - A failed load leaves resolver state untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Artifact decode or signature rejection.
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    /// File or URL transport failure.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Override document rejection.
    #[error(transparent)]
    Override(#[from] OverrideError),
}

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// Artifact plus its derived flag directory.
#[derive(Debug)]
struct LoadedArtifact {
    /// Validated artifact.
    artifact: Artifact,
    /// Flag name to index directory.
    directory: FlagDirectory,
}

/// State replaced wholesale under the resolver's write lock.
#[derive(Debug, Default)]
struct SharedState {
    /// Current artifact, when one is loaded.
    artifact: Option<Arc<LoadedArtifact>>,
    /// Current override state, when one is loaded.
    overrides: Option<Arc<OverrideState>>,
}

/// Raw pipeline outcome before type coercion.
enum RawResolution {
    /// No artifact is loaded.
    NotReady,
    /// The flag name is absent from the artifact.
    NotFound,
    /// No rule fired for the flag.
    Unmatched,
    /// An override pinned the flag to a value string.
    Override(String),
    /// A rule produced a raw value.
    Matched(Value),
    /// Evaluation failed unexpectedly.
    Failed(String),
}

// ============================================================================
// SECTION: Poller Plumbing
// ============================================================================

/// Stop flag shared with the poller thread.
#[derive(Default)]
struct PollSignal {
    /// True once a stop was requested.
    stopped: Mutex<bool>,
    /// Wakes the poller out of its interval wait.
    changed: Condvar,
}

impl PollSignal {
    /// Requests the poller to stop and wakes it.
    fn request_stop(&self) {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        *stopped = true;
        drop(stopped);
        self.changed.notify_all();
    }

    /// Waits one interval; returns true when a stop was requested.
    fn wait_for_stop(&self, interval: Duration) -> bool {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let (stopped, _timeout) = self
            .changed
            .wait_timeout(stopped, interval)
            .unwrap_or_else(PoisonError::into_inner);
        *stopped
    }
}

/// Running poller thread plus its stop signal.
struct PollerHandle {
    /// Stop flag shared with the thread.
    signal: Arc<PollSignal>,
    /// Thread handle joined on stop.
    handle: JoinHandle<()>,
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Typed, cached, override-aware flag resolver.
///
/// # Invariants
/// - Internal state is shared with the poller thread via `Arc`.
pub struct Resolver {
    /// Shared state and configuration.
    inner: Arc<ResolverInner>,
}

/// Shared interior of the resolver.
struct ResolverInner {
    /// Resolver configuration.
    config: ResolverConfig,
    /// Injected time source for temporal built-ins.
    clock: Arc<dyn Clock>,
    /// Current artifact and override state.
    state: RwLock<SharedState>,
    /// TTL-bounded resolution cache.
    cache: EvaluationCache,
    /// Poller thread handle when polling is active.
    poller: Mutex<Option<PollerHandle>>,
}

impl Resolver {
    /// Creates a resolver with the system clock.
    #[must_use]
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a resolver with an injected clock.
    #[must_use]
    pub fn with_clock(config: ResolverConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = EvaluationCache::new(config.cache_ttl, config.cache_enabled);
        Self {
            inner: Arc::new(ResolverInner {
                config,
                clock,
                state: RwLock::new(SharedState::default()),
                cache,
                poller: Mutex::new(None),
            }),
        }
    }

    // ------------------------------------------------------------------
    // State management
    // ------------------------------------------------------------------

    /// Loads an artifact from a file path or HTTP(S) URL and swaps it in.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] on transport, decode, or signature failure;
    /// the previous artifact keeps serving in that case.
    pub fn load_artifact(
        &self,
        location: &str,
        options: &LoadOptions,
    ) -> Result<ArtifactSummary, LoadError> {
        let bytes = self.fetch_artifact_bytes(location, options)?;
        let decode_options = DecodeOptions {
            public_key: options.public_key.clone(),
            require_signature: options.require_signature,
        };
        let artifact = decode_artifact(&bytes, &decode_options)?;
        let directory = FlagDirectory::from_artifact(&artifact);
        let summary = artifact.summary();
        {
            let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
            state.artifact = Some(Arc::new(LoadedArtifact {
                artifact,
                directory,
            }));
        }
        self.inner.cache.clear();
        debug!(flags = summary.flag_count, environment = %summary.environment, "artifact loaded");
        Ok(summary)
    }

    /// Reloads the artifact and clears the evaluation cache.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] exactly as [`Resolver::load_artifact`] does.
    pub fn reload_artifact(
        &self,
        location: &str,
        options: &LoadOptions,
    ) -> Result<ArtifactSummary, LoadError> {
        let summary = self.load_artifact(location, options)?;
        self.inner.cache.clear();
        Ok(summary)
    }

    /// Loads overrides once from the configured source.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError`] on transport or shape failure; the previous
    /// override state keeps serving in that case.
    pub fn load_overrides(&self) -> Result<(), LoadError> {
        self.inner.refresh_overrides()
    }

    /// Drops every cached resolution.
    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    /// Returns true once an artifact is loaded.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        state.artifact.is_some()
    }

    /// Returns a snapshot of the current override state.
    #[must_use]
    pub fn current_overrides(&self) -> Option<OverrideState> {
        let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
        state.overrides.as_ref().map(|overrides| (**overrides).clone())
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    /// Starts the override poller; idempotent, no-op for non-URL sources.
    pub fn start_polling(&self) {
        let Some(source) = &self.inner.config.override_source else {
            return;
        };
        if !source.is_url() {
            return;
        }
        let mut poller = self.inner.poller.lock().unwrap_or_else(PoisonError::into_inner);
        if poller.is_some() {
            return;
        }
        let signal = Arc::new(PollSignal::default());
        let inner = Arc::clone(&self.inner);
        let thread_signal = Arc::clone(&signal);
        let handle = std::thread::spawn(move || poll_loop(&inner, &thread_signal));
        *poller = Some(PollerHandle {
            signal,
            handle,
        });
    }

    /// Stops the override poller; idempotent.
    pub fn stop_polling(&self) {
        let taken = {
            let mut poller = self.inner.poller.lock().unwrap_or_else(PoisonError::into_inner);
            poller.take()
        };
        let Some(poller) = taken else {
            return;
        };
        poller.signal.request_stop();
        let _ = poller.handle.join();
    }

    // ------------------------------------------------------------------
    // Typed resolution
    // ------------------------------------------------------------------

    /// Resolves a flag to a boolean.
    #[must_use]
    pub fn resolve_boolean(
        &self,
        flag: &str,
        default: bool,
        context: &Value,
    ) -> ResolutionDetails<bool> {
        let key = CacheKey::new(ValueKind::Boolean, flag, canonical_context(context));
        if let Some(hit) = self.inner.cache.get(&key) {
            return typed_boolean(hit, default);
        }
        match self.inner.evaluate_raw(flag, context) {
            RawResolution::NotReady | RawResolution::Unmatched => {
                ResolutionDetails::from_default(default)
            }
            RawResolution::NotFound => {
                ResolutionDetails::from_default(default).with_error_code(ErrorCode::FlagNotFound)
            }
            RawResolution::Failed(message) => {
                ResolutionDetails::error(default, ErrorCode::General, message)
            }
            RawResolution::Override(text) => {
                self.finish_boolean(key, &Value::String(text), default)
            }
            RawResolution::Matched(value) => self.finish_boolean(key, &value, default),
        }
    }

    /// Resolves a flag to a string, reporting a variant when shaped so.
    #[must_use]
    pub fn resolve_string(
        &self,
        flag: &str,
        default: &str,
        context: &Value,
    ) -> ResolutionDetails<String> {
        let key = CacheKey::new(ValueKind::String, flag, canonical_context(context));
        if let Some(hit) = self.inner.cache.get(&key) {
            return typed_string(hit, default);
        }
        match self.inner.evaluate_raw(flag, context) {
            RawResolution::NotReady | RawResolution::Unmatched => {
                ResolutionDetails::from_default(default.to_string())
            }
            RawResolution::NotFound => ResolutionDetails::from_default(default.to_string())
                .with_error_code(ErrorCode::FlagNotFound),
            RawResolution::Failed(message) => {
                ResolutionDetails::error(default.to_string(), ErrorCode::General, message)
            }
            RawResolution::Override(text) => {
                self.finish_string(key, &Value::String(text), default)
            }
            RawResolution::Matched(value) => self.finish_string(key, &value, default),
        }
    }

    /// Resolves a flag to a number.
    #[must_use]
    pub fn resolve_number(
        &self,
        flag: &str,
        default: f64,
        context: &Value,
    ) -> ResolutionDetails<f64> {
        let key = CacheKey::new(ValueKind::Number, flag, canonical_context(context));
        if let Some(hit) = self.inner.cache.get(&key) {
            return typed_number(hit, default);
        }
        match self.inner.evaluate_raw(flag, context) {
            RawResolution::NotReady | RawResolution::Unmatched => {
                ResolutionDetails::from_default(default)
            }
            RawResolution::NotFound => {
                ResolutionDetails::from_default(default).with_error_code(ErrorCode::FlagNotFound)
            }
            RawResolution::Failed(message) => {
                ResolutionDetails::error(default, ErrorCode::General, message)
            }
            RawResolution::Override(text) => self.finish_number(key, &Value::String(text), default),
            RawResolution::Matched(value) => self.finish_number(key, &value, default),
        }
    }

    /// Resolves a flag to a structured value.
    #[must_use]
    pub fn resolve_object(
        &self,
        flag: &str,
        default: &Value,
        context: &Value,
    ) -> ResolutionDetails<Value> {
        let key = CacheKey::new(ValueKind::Object, flag, canonical_context(context));
        if let Some(hit) = self.inner.cache.get(&key) {
            return hit;
        }
        match self.inner.evaluate_raw(flag, context) {
            RawResolution::NotReady | RawResolution::Unmatched => {
                ResolutionDetails::from_default(default.clone())
            }
            RawResolution::NotFound => ResolutionDetails::from_default(default.clone())
                .with_error_code(ErrorCode::FlagNotFound),
            RawResolution::Failed(message) => {
                ResolutionDetails::error(default.clone(), ErrorCode::General, message)
            }
            RawResolution::Override(text) => {
                self.finish_object(key, &Value::String(text), default)
            }
            RawResolution::Matched(value) => self.finish_object(key, &value, default),
        }
    }

    // ------------------------------------------------------------------
    // Coercion finishers
    // ------------------------------------------------------------------

    /// Coerces, caches, and returns a boolean resolution.
    fn finish_boolean(
        &self,
        key: CacheKey,
        raw: &Value,
        default: bool,
    ) -> ResolutionDetails<bool> {
        let details = ResolutionDetails::targeting(Value::Bool(coerce_boolean(raw)));
        self.inner.cache.insert(key, details.clone());
        typed_boolean(details, default)
    }

    /// Coerces, caches, and returns a string resolution.
    fn finish_string(
        &self,
        key: CacheKey,
        raw: &Value,
        default: &str,
    ) -> ResolutionDetails<String> {
        let (text, variant) = coerce_string(raw);
        let details = ResolutionDetails::targeting(Value::String(text)).with_variant(variant);
        self.inner.cache.insert(key, details.clone());
        typed_string(details, default)
    }

    /// Coerces, caches, and returns a number resolution.
    fn finish_number(&self, key: CacheKey, raw: &Value, default: f64) -> ResolutionDetails<f64> {
        let details = coerce_number(raw).map_or_else(
            || {
                ResolutionDetails::from_default(Value::from(default))
                    .with_error_code(ErrorCode::TypeMismatch)
            },
            |number| ResolutionDetails::targeting(Value::from(number)),
        );
        self.inner.cache.insert(key, details.clone());
        typed_number(details, default)
    }

    /// Coerces, caches, and returns a structured resolution.
    fn finish_object(
        &self,
        key: CacheKey,
        raw: &Value,
        default: &Value,
    ) -> ResolutionDetails<Value> {
        let details = coerce_object(raw).map_or_else(
            || {
                ResolutionDetails::from_default(default.clone())
                    .with_error_code(ErrorCode::TypeMismatch)
            },
            ResolutionDetails::targeting,
        );
        self.inner.cache.insert(key, details.clone());
        details
    }

    /// Reads artifact bytes from a file path or URL.
    fn fetch_artifact_bytes(
        &self,
        location: &str,
        options: &LoadOptions,
    ) -> Result<Vec<u8>, LoadError> {
        if is_http_url(location) {
            let request = FetchRequest {
                url: location,
                timeout: clamp_timeout(
                    self.inner.config.artifact_timeout,
                    ARTIFACT_TIMEOUT_DEFAULT,
                    ARTIFACT_TIMEOUT_CAP,
                ),
                max_bytes: MAX_ARTIFACT_BYTES,
                etag: None,
                expected_content_types: &ARTIFACT_CONTENT_TYPES,
            };
            return match fetch_url(&request)? {
                FetchOutcome::Fetched(payload) => Ok(payload.bytes),
                FetchOutcome::NotModified => Err(TransportError::Failed(
                    "unexpected 304 for unconditional artifact fetch".to_string(),
                )
                .into()),
            };
        }
        let allowed = options
            .allowed_directory
            .as_deref()
            .or(self.inner.config.allowed_directory.as_deref());
        Ok(read_file_limited(location, MAX_ARTIFACT_BYTES, allowed)?)
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

// ============================================================================
// SECTION: Pipeline Interior
// ============================================================================

impl ResolverInner {
    /// Runs the shared pipeline up to the raw value.
    fn evaluate_raw(&self, flag: &str, context: &Value) -> RawResolution {
        let (artifact, overrides) = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            (state.artifact.clone(), state.overrides.clone())
        };
        let Some(loaded) = artifact else {
            return RawResolution::NotReady;
        };
        if let Some(overrides) = overrides
            && let Some(value) = overrides.values.get(flag)
        {
            return RawResolution::Override(value.clone());
        }
        let view = SubjectView::from_host(context);
        let Some(index) = loaded.directory.index_of(flag) else {
            return RawResolution::NotFound;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            evaluate_flag(&loaded.artifact, index, &view, self.clock.as_ref())
        }));
        match outcome {
            Ok(Some(value)) => RawResolution::Matched(value),
            Ok(None) => RawResolution::Unmatched,
            Err(_) => RawResolution::Failed("flag evaluation failed unexpectedly".to_string()),
        }
    }

    /// Refreshes overrides from the configured source.
    fn refresh_overrides(&self) -> Result<(), LoadError> {
        let Some(source) = &self.config.override_source else {
            return Ok(());
        };
        let previous_etag = {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            state.overrides.as_ref().and_then(|overrides| overrides.etag.clone())
        };
        let load = load_override_state(
            source,
            self.config.override_timeout,
            self.config.allowed_directory.as_deref(),
            previous_etag.as_deref(),
        )?;
        match load {
            OverrideLoad::Unchanged => {
                let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
                if let Some(current) = &state.overrides {
                    let mut refreshed = (**current).clone();
                    refreshed.loaded_at = Some(SystemTime::now());
                    state.overrides = Some(Arc::new(refreshed));
                }
            }
            OverrideLoad::Loaded(fresh) => {
                {
                    let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
                    state.overrides = Some(Arc::new(fresh));
                }
                self.cache.clear();
                debug!("override state replaced; evaluation cache purged");
            }
        }
        Ok(())
    }
}

/// Poller body: wait, check the stop flag, refresh, repeat.
fn poll_loop(inner: &Arc<ResolverInner>, signal: &PollSignal) {
    loop {
        if signal.wait_for_stop(inner.config.poll_interval) {
            break;
        }
        if let Err(err) = inner.refresh_overrides() {
            warn!(error = %err, "override poll failed; serving last known state");
        }
    }
}

// ============================================================================
// SECTION: Cached Envelope Conversion
// ============================================================================

/// Converts a cached envelope into a boolean envelope.
fn typed_boolean(details: ResolutionDetails<Value>, default: bool) -> ResolutionDetails<bool> {
    ResolutionDetails {
        value: details.value.as_bool().unwrap_or(default),
        reason: details.reason,
        error_code: details.error_code,
        error_message: details.error_message,
        variant: details.variant,
    }
}

/// Converts a cached envelope into a string envelope.
fn typed_string(details: ResolutionDetails<Value>, default: &str) -> ResolutionDetails<String> {
    ResolutionDetails {
        value: details.value.as_str().map_or_else(|| default.to_string(), str::to_string),
        reason: details.reason,
        error_code: details.error_code,
        error_message: details.error_message,
        variant: details.variant,
    }
}

/// Converts a cached envelope into a number envelope.
fn typed_number(details: ResolutionDetails<Value>, default: f64) -> ResolutionDetails<f64> {
    ResolutionDetails {
        value: details.value.as_f64().unwrap_or(default),
        reason: details.reason,
        error_code: details.error_code,
        error_message: details.error_message,
        variant: details.variant,
    }
}
