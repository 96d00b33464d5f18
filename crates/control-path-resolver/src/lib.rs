// crates/control-path-resolver/src/lib.rs
// ============================================================================
// Module: Control Path Resolver
// Description: Typed, cached, override-aware flag resolution facade.
// Purpose: Convert raw evaluations into typed resolution details.
// Dependencies: control-path-core, control-path-transport, serde, tracing
// ============================================================================

//! ## Overview
//! The resolver owns the mutable state of the evaluation core: the current
//! artifact and its flag directory, the override state with its ETag, and
//! the TTL-bounded evaluation cache. The four typed `resolve_*` operations
//! share one pipeline (cache, readiness, override, subject mapping, name
//! lookup, interpretation, coercion) and never return an error: every
//! anomaly collapses into a [`ResolutionDetails`] envelope carrying the
//! caller's default.
//!
//! # Invariants
//! - `resolve_*` never panics and never propagates an error.
//! - Artifact and override state swap atomically; the cache purges on every
//!   replacement.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod cache;
mod coerce;
pub mod details;
pub mod overrides;
pub mod resolver;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use details::ErrorCode;
pub use details::Reason;
pub use details::ResolutionDetails;
pub use overrides::MAX_OVERRIDE_BYTES;
pub use overrides::OverrideError;
pub use overrides::OverrideSource;
pub use overrides::OverrideState;
pub use resolver::LoadError;
pub use resolver::LoadOptions;
pub use resolver::Resolver;
pub use resolver::ResolverConfig;
