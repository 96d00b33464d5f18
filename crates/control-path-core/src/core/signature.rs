// crates/control-path-core/src/core/signature.rs
// ============================================================================
// Module: Artifact Signatures
// Description: Ed25519 key parsing and detached signature verification.
// Purpose: Enforce artifact authenticity when a verification key is set.
// Dependencies: ed25519-dalek, base64, hex
// ============================================================================

//! ## Overview
//! Key material arrives as raw bytes or text. Text is tried as base64 first
//! and as hex second; whichever yields 32 bytes wins. Verification uses
//! `verify_strict` over the detached message produced by the codec (the
//! decoded artifact map re-encoded without its `sig` entry).
//!
//! # Invariants
//! - A verification failure is never recoverable as success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::Signature;
use ed25519_dalek::VerifyingKey;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Length of an Ed25519 public key in bytes.
const PUBLIC_KEY_BYTES: usize = 32;

/// Signature subsystem errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// A signature was required but the artifact carries none.
    #[error("signature required: artifact carries no `sig` field")]
    Required,
    /// The signature did not verify against the configured key.
    #[error("signature invalid: verification failed")]
    Invalid,
    /// The supplied key material could not be parsed into a 32-byte key.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

// ============================================================================
// SECTION: Key Material
// ============================================================================

/// Verification key material as supplied by the caller.
///
/// # Invariants
/// - `Text` is attempted as base64 first, then hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// Raw key bytes, expected to be exactly 32 bytes.
    Raw(Vec<u8>),
    /// Base64- or hex-encoded key text.
    Text(String),
}

/// Parses key material into a verifying key.
///
/// # Errors
///
/// Returns [`SignatureError::InvalidKey`] when no decoding yields a valid
/// 32-byte Ed25519 public key.
pub fn parse_verifying_key(material: &KeyMaterial) -> Result<VerifyingKey, SignatureError> {
    let bytes = match material {
        KeyMaterial::Raw(bytes) => bytes.clone(),
        KeyMaterial::Text(text) => decode_key_text(text)?,
    };
    let bytes: [u8; PUBLIC_KEY_BYTES] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| SignatureError::InvalidKey("key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| SignatureError::InvalidKey("key is not a valid Ed25519 point".to_string()))
}

/// Decodes textual key material, trying base64 before hex.
fn decode_key_text(text: &str) -> Result<Vec<u8>, SignatureError> {
    let trimmed = text.trim();
    if let Ok(decoded) = BASE64.decode(trimmed)
        && decoded.len() == PUBLIC_KEY_BYTES
    {
        return Ok(decoded);
    }
    if let Ok(decoded) = hex::decode(trimmed)
        && decoded.len() == PUBLIC_KEY_BYTES
    {
        return Ok(decoded);
    }
    Err(SignatureError::InvalidKey(
        "key text is neither 32-byte base64 nor 32-byte hex".to_string(),
    ))
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies a detached signature over the unsigned artifact message.
///
/// # Errors
///
/// Returns [`SignatureError::Invalid`] when the signature bytes are
/// malformed or verification fails.
pub fn verify_detached(
    key: &VerifyingKey,
    message: &[u8],
    signature: &[u8],
) -> Result<(), SignatureError> {
    let signature = Signature::try_from(signature).map_err(|_| SignatureError::Invalid)?;
    key.verify_strict(message, &signature).map_err(|_| SignatureError::Invalid)
}
