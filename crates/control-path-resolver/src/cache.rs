// crates/control-path-resolver/src/cache.rs
// ============================================================================
// Module: Evaluation Cache
// Description: TTL-bounded cache keyed by flag, type, and context.
// Purpose: Short-circuit repeated resolutions under concurrent access.
// Dependencies: crate::details, serde_json
// ============================================================================

//! ## Overview
//! The cache keys on the requested value kind, the flag name, and a
//! canonicalized context rendering (prototype-polluting keys stripped,
//! remaining keys sorted). Entries expire after a configurable TTL and the
//! whole cache purges whenever the artifact or override state changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;
use std::time::Instant;

use serde_json::Value;

use crate::details::ResolutionDetails;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default time-to-live for cached resolutions.
pub(crate) const CACHE_TTL_DEFAULT: Duration = Duration::from_secs(5 * 60);

/// Context keys stripped during canonicalization.
const STRIPPED_KEYS: [&str; 3] = ["__proto__", "constructor", "prototype"];

// ============================================================================
// SECTION: Cache Key
// ============================================================================

/// Requested target type, part of the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum ValueKind {
    /// Boolean resolution.
    Boolean,
    /// String resolution.
    String,
    /// Number resolution.
    Number,
    /// Structured-value resolution.
    Object,
}

/// Cache key: requested kind, flag name, canonical context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    /// Requested target type.
    kind: ValueKind,
    /// Flag name.
    flag: String,
    /// Canonicalized context rendering.
    context: String,
}

impl CacheKey {
    /// Builds a cache key from its parts.
    pub(crate) fn new(kind: ValueKind, flag: &str, context: String) -> Self {
        Self {
            kind,
            flag: flag.to_string(),
            context,
        }
    }
}

/// Canonicalizes a host context for cache keying.
///
/// Prototype-polluting keys are stripped at every depth and object keys are
/// rendered in sorted order.
pub(crate) fn canonical_context(context: &Value) -> String {
    serde_json::to_string(&canonicalize(context)).unwrap_or_default()
}

/// Rebuilds a value with stripped and sorted object keys.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let sorted: BTreeMap<&String, &Value> = fields
                .iter()
                .filter(|(key, _)| !STRIPPED_KEYS.contains(&key.as_str()))
                .collect();
            let mut object = serde_json::Map::with_capacity(sorted.len());
            for (key, entry) in sorted {
                object.insert(key.clone(), canonicalize(entry));
            }
            Value::Object(object)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        scalar => scalar.clone(),
    }
}

// ============================================================================
// SECTION: Cache
// ============================================================================

/// One cached resolution with its insertion time.
#[derive(Debug, Clone)]
struct CacheEntry {
    /// Cached resolution envelope.
    details: ResolutionDetails<Value>,
    /// Insertion instant used for TTL expiry.
    inserted_at: Instant,
}

/// TTL-bounded concurrent resolution cache.
///
/// # Invariants
/// - Readers never observe partially written entries.
/// - Expired entries are never returned.
#[derive(Debug)]
pub(crate) struct EvaluationCache {
    /// Cached entries guarded for concurrent readers and writers.
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    /// Entry time-to-live.
    ttl: Duration,
    /// Whether lookups and inserts are active.
    enabled: bool,
}

impl EvaluationCache {
    /// Creates a cache with the given TTL and enablement.
    pub(crate) fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            enabled,
        }
    }

    /// Returns a live cached resolution.
    pub(crate) fn get(&self, key: &CacheKey) -> Option<ResolutionDetails<Value>> {
        if !self.enabled {
            return None;
        }
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        (entry.inserted_at.elapsed() <= self.ttl).then(|| entry.details.clone())
    }

    /// Inserts a resolution, replacing any previous entry.
    pub(crate) fn insert(&self, key: CacheKey, details: ResolutionDetails<Value>) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key, CacheEntry {
            details,
            inserted_at: Instant::now(),
        });
    }

    /// Drops every cached entry.
    pub(crate) fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.clear();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
