// crates/control-path-core/src/lib.rs
// ============================================================================
// Module: Control Path Core
// Description: Artifact model, codec, and deterministic rule evaluation.
// Purpose: Provide the evaluation core consumed by the resolver facade.
// Dependencies: serde, serde_json, rmpv, ed25519-dalek, time, semver
// ============================================================================

//! ## Overview
//! This crate holds the validated artifact model, the MessagePack codec that
//! accepts untrusted artifact bytes, Ed25519 signature verification, the
//! expression and rule interpreters, named segment resolution, and the
//! subject/context mapping used to feed evaluations.
//!
//! Invariants:
//! - Artifacts are validated on decode; evaluation assumes in-bounds indices
//!   but still fails closed when handed hand-built artifacts.
//! - Evaluation is total: no interpreter path panics or errors; malformed
//!   inputs collapse to `false` or `null` values.
//! - The core never reads wall-clock time directly; temporal built-ins go
//!   through the [`Clock`] capability so hosts and tests inject time.
//!
//! Security posture: artifact bytes, subjects, and contexts are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::artifact::Artifact;
pub use crate::core::artifact::ArtifactSummary;
pub use crate::core::artifact::BinaryOp;
pub use crate::core::artifact::Expression;
pub use crate::core::artifact::FlagDirectory;
pub use crate::core::artifact::LogicalOp;
pub use crate::core::artifact::MAX_ARTIFACT_BYTES;
pub use crate::core::artifact::MAX_FLAGS;
pub use crate::core::artifact::MAX_STRINGS;
pub use crate::core::artifact::MAX_STRING_CHARS;
pub use crate::core::artifact::Rule;
pub use crate::core::artifact::Segment;
pub use crate::core::artifact::Variation;
pub use crate::core::codec::ArtifactError;
pub use crate::core::codec::DecodeOptions;
pub use crate::core::codec::decode_artifact;
pub use crate::core::signature::KeyMaterial;
pub use crate::core::signature::SignatureError;
pub use crate::core::signature::parse_verifying_key;
pub use crate::core::subject::SubjectView;
pub use crate::core::time::Clock;
pub use crate::core::time::FixedClock;
pub use crate::core::time::SystemClock;
pub use crate::runtime::bucket::bucket_for;
pub use crate::runtime::bucket::stable_hash64;
pub use crate::runtime::expr::Evaluator;
pub use crate::runtime::expr::truthy;
pub use crate::runtime::expr::values_equal;
pub use crate::runtime::rules::evaluate_flag;
