// crates/control-path-core/tests/helpers/mod.rs
// ============================================================================
// Module: Artifact Fixture Builder
// Description: Shared MessagePack artifact construction for tests.
// Purpose: Assemble wire-format artifacts and signed variants.
// Dependencies: rmpv, ed25519-dalek
// ============================================================================

//! Builders for wire-format artifacts used across the core test suites.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test helpers are shared across suites that use different subsets."
)]

use ed25519_dalek::Signer;
use ed25519_dalek::SigningKey;
use rmpv::Value as Mp;

/// Builds the standard top-level artifact map in wire order.
pub fn artifact_map(strs: &[&str], flags: Vec<Mp>, flag_names: &[u16]) -> Vec<(Mp, Mp)> {
    vec![
        (Mp::from("v"), Mp::from("1.0")),
        (Mp::from("env"), Mp::from("test")),
        (Mp::from("strs"), Mp::Array(strs.iter().map(|s| Mp::from(*s)).collect())),
        (Mp::from("flags"), Mp::Array(flags)),
        (
            Mp::from("flagNames"),
            Mp::Array(flag_names.iter().map(|i| Mp::from(u64::from(*i))).collect()),
        ),
    ]
}

/// Appends a segments entry to an artifact map.
pub fn with_segments(mut pairs: Vec<(Mp, Mp)>, segments: Vec<Mp>) -> Vec<(Mp, Mp)> {
    pairs.push((Mp::from("segments"), Mp::Array(segments)));
    pairs
}

/// Encodes a top-level map into artifact bytes.
pub fn encode_map(pairs: Vec<(Mp, Mp)>) -> Vec<u8> {
    let mut bytes = Vec::new();
    rmpv::encode::write_value(&mut bytes, &Mp::Map(pairs)).expect("encode artifact map");
    bytes
}

/// Builds and encodes an artifact in one step.
pub fn encode_artifact(strs: &[&str], flags: Vec<Mp>, flag_names: &[u16]) -> Vec<u8> {
    encode_map(artifact_map(strs, flags, flag_names))
}

/// Signs an artifact map and appends the `sig` entry.
pub fn sign_map(mut pairs: Vec<(Mp, Mp)>, key: &SigningKey) -> Vec<(Mp, Mp)> {
    let message = encode_map(pairs.clone());
    let signature = key.sign(&message);
    pairs.push((Mp::from("sig"), Mp::Binary(signature.to_bytes().to_vec())));
    pairs
}

/// Deterministic signing key for signature tests.
pub fn test_signing_key(seed: u8) -> SigningKey {
    SigningKey::from_bytes(&[seed; 32])
}

// ----------------------------------------------------------------------
// Rule constructors
// ----------------------------------------------------------------------

/// `[0, value]` serve rule without a guard.
pub fn serve(value: Mp) -> Mp {
    Mp::Array(vec![Mp::from(0_u64), value])
}

/// `[0, guard, value]` guarded serve rule.
pub fn serve_when(guard: Mp, value: Mp) -> Mp {
    Mp::Array(vec![Mp::from(0_u64), guard, value])
}

/// `[1, [[valueIndex, weight], ...]]` variations rule.
pub fn variations(entries: &[(u16, u8)]) -> Mp {
    let entries = entries
        .iter()
        .map(|(value_index, weight)| {
            Mp::Array(vec![Mp::from(u64::from(*value_index)), Mp::from(u64::from(*weight))])
        })
        .collect();
    Mp::Array(vec![Mp::from(1_u64), Mp::Array(entries)])
}

/// `[2, [valueIndex, percent]]` rollout rule.
pub fn rollout(value_index: u16, percent: u8) -> Mp {
    Mp::Array(vec![
        Mp::from(2_u64),
        Mp::Array(vec![Mp::from(u64::from(value_index)), Mp::from(u64::from(percent))]),
    ])
}

// ----------------------------------------------------------------------
// Expression constructors
// ----------------------------------------------------------------------

/// `[0, op, left, right]` binary expression.
pub fn binary(op: u64, left: Mp, right: Mp) -> Mp {
    Mp::Array(vec![Mp::from(0_u64), Mp::from(op), left, right])
}

/// `[1, op, left, right]` logical expression.
pub fn logical(op: u64, left: Mp, right: Mp) -> Mp {
    Mp::Array(vec![Mp::from(1_u64), Mp::from(op), left, right])
}

/// `[1, 2, operand]` logical NOT.
pub fn negate(operand: Mp) -> Mp {
    Mp::Array(vec![Mp::from(1_u64), Mp::from(2_u64), operand])
}

/// `[2, pathIndex]` property expression.
pub fn prop(path_index: u16) -> Mp {
    Mp::Array(vec![Mp::from(2_u64), Mp::from(u64::from(path_index))])
}

/// `[3, value]` literal expression.
pub fn lit(value: Mp) -> Mp {
    Mp::Array(vec![Mp::from(3_u64), value])
}

/// `[4, code, [args...]]` function expression.
pub fn func(code: u64, args: Vec<Mp>) -> Mp {
    Mp::Array(vec![Mp::from(4_u64), Mp::from(code), Mp::Array(args)])
}

/// `[nameIndex, expression]` segment entry.
pub fn segment(name_index: u16, expression: Mp) -> Mp {
    Mp::Array(vec![Mp::from(u64::from(name_index)), expression])
}
