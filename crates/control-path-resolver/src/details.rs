// crates/control-path-resolver/src/details.rs
// ============================================================================
// Module: Resolution Details
// Description: Typed return envelope for flag resolution.
// Purpose: Carry value, reason, and error metadata without exceptions.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every typed resolution returns a [`ResolutionDetails`] envelope. The
//! reason records how the value was derived; error codes classify
//! anomalies that collapsed into the caller's default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Reason
// ============================================================================

/// How a resolution value was derived.
///
/// # Invariants
/// - Variants are stable for serialization and host matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// The caller's default was returned.
    Default,
    /// A rule or override produced the value.
    TargetingMatch,
    /// An evaluation error collapsed into the default.
    Error,
}

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable error classification for resolution anomalies.
///
/// # Invariants
/// - Variants are stable for serialization and host matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The flag name is not present in the artifact.
    FlagNotFound,
    /// The raw value could not be coerced to the requested type.
    TypeMismatch,
    /// A value failed to parse where parsing was required.
    ParseError,
    /// The resolver has no artifact loaded yet.
    ProviderNotReady,
    /// An unclassified evaluation failure.
    General,
}

// ============================================================================
// SECTION: Resolution Details
// ============================================================================

/// Typed resolution envelope.
///
/// # Invariants
/// - `error_code` is only present for `Default` and `Error` reasons.
/// - `variant` is only set by string resolutions whose value names a
///   variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDetails<T> {
    /// Resolved or defaulted value.
    pub value: T,
    /// How the value was derived.
    pub reason: Reason,
    /// Error classification when the default was substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    /// Human-readable error description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Variation name when the value matched the variant shape.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

impl<T> ResolutionDetails<T> {
    /// Builds a `DEFAULT` envelope without an error code.
    #[must_use]
    pub const fn from_default(value: T) -> Self {
        Self {
            value,
            reason: Reason::Default,
            error_code: None,
            error_message: None,
            variant: None,
        }
    }

    /// Builds a `TARGETING_MATCH` envelope.
    #[must_use]
    pub const fn targeting(value: T) -> Self {
        Self {
            value,
            reason: Reason::TargetingMatch,
            error_code: None,
            error_message: None,
            variant: None,
        }
    }

    /// Builds an `ERROR` envelope carrying the caller's default.
    #[must_use]
    pub fn error(value: T, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            value,
            reason: Reason::Error,
            error_code: Some(code),
            error_message: Some(message.into()),
            variant: None,
        }
    }

    /// Attaches an error code to the envelope.
    #[must_use]
    pub fn with_error_code(mut self, code: ErrorCode) -> Self {
        self.error_code = Some(code);
        self
    }

    /// Attaches a variant name to the envelope.
    #[must_use]
    pub fn with_variant(mut self, variant: Option<String>) -> Self {
        self.variant = variant;
        self
    }
}
