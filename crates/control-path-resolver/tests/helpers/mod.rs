// crates/control-path-resolver/tests/helpers/mod.rs
// ============================================================================
// Module: Resolver Test Fixtures
// Description: Artifact encoding and temp-file plumbing for facade tests.
// Purpose: Build small wire artifacts the resolver can load from disk.
// Dependencies: rmpv, tempfile
// ============================================================================

//! Fixture builders for resolver facade tests.

#![allow(
    dead_code,
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test helpers are shared across suites that use different subsets."
)]

use std::fs;
use std::path::PathBuf;

use rmpv::Value as Mp;
use tempfile::TempDir;

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

/// Writes bytes into a fresh temp dir, returning the dir and file path.
pub fn write_temp(name: &str, bytes: &[u8]) -> (TempDir, String) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path: PathBuf = dir.path().join(name);
    fs::write(&path, bytes).expect("write fixture");
    (dir, path.to_string_lossy().into_owned())
}

// ----------------------------------------------------------------------
// Rule and expression constructors
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

/// `[0, 0, left, right]` equality expression.
pub fn eq(left: Mp, right: Mp) -> Mp {
    Mp::Array(vec![Mp::from(0_u64), Mp::from(0_u64), left, right])
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

/// Admin-gated artifact: `new_dashboard` serves ON to admins, else OFF.
pub fn admin_dashboard_bytes() -> Vec<u8> {
    let strs = ["new_dashboard", "user.role", "ON", "OFF"];
    let guard = eq(prop(1), lit(Mp::from("admin")));
    let rules = Mp::Array(vec![serve_when(guard, Mp::from(2_u64)), serve(Mp::from(3_u64))]);
    encode_artifact(&strs, vec![rules], &[0])
}
