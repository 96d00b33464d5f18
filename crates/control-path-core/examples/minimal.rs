// crates/control-path-core/examples/minimal.rs
// ============================================================================
// Module: Control Path Minimal Example
// Description: Minimal end-to-end evaluation over an in-memory artifact.
// Purpose: Demonstrate decode, name lookup, and deterministic evaluation.
// Dependencies: control-path-core, rmpv, serde_json
// ============================================================================

//! ## Overview
//! Builds a tiny artifact in memory, decodes it through the codec, and
//! evaluates a guarded flag for two subjects. The example is silent and
//! asserts its outcomes, making it suitable for quick verification.

use control_path_core::DecodeOptions;
use control_path_core::FixedClock;
use control_path_core::FlagDirectory;
use control_path_core::SubjectView;
use control_path_core::decode_artifact;
use control_path_core::evaluate_flag;
use rmpv::Value as Mp;
use serde_json::json;
use time::macros::datetime;

/// Error type for example preconditions.
#[derive(Debug)]
struct ExampleError(&'static str);

impl std::fmt::Display for ExampleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for ExampleError {}

/// Encodes the example artifact: `new_dashboard` serves ON to admins.
fn example_bytes() -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    // [0, [0, 0, [2, 1], [3, "admin"]], 2] -- serve strs[2] when user.role == "admin".
    let guard = Mp::Array(vec![
        Mp::from(0_u64),
        Mp::from(0_u64),
        Mp::Array(vec![Mp::from(2_u64), Mp::from(1_u64)]),
        Mp::Array(vec![Mp::from(3_u64), Mp::from("admin")]),
    ]);
    let rules = Mp::Array(vec![
        Mp::Array(vec![Mp::from(0_u64), guard, Mp::from(2_u64)]),
        Mp::Array(vec![Mp::from(0_u64), Mp::from(3_u64)]),
    ]);
    let map = Mp::Map(vec![
        (Mp::from("v"), Mp::from("1.0")),
        (Mp::from("env"), Mp::from("example")),
        (
            Mp::from("strs"),
            Mp::Array(vec![
                Mp::from("new_dashboard"),
                Mp::from("user.role"),
                Mp::from("ON"),
                Mp::from("OFF"),
            ]),
        ),
        (Mp::from("flags"), Mp::Array(vec![rules])),
        (Mp::from("flagNames"), Mp::Array(vec![Mp::from(0_u64)])),
    ]);
    let mut bytes = Vec::new();
    rmpv::encode::write_value(&mut bytes, &map)?;
    Ok(bytes)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bytes = example_bytes()?;
    let artifact = decode_artifact(&bytes, &DecodeOptions::default())?;
    let directory = FlagDirectory::from_artifact(&artifact);
    let index =
        directory.index_of("new_dashboard").ok_or(ExampleError("flag must be present"))?;
    let clock = FixedClock::new(datetime!(2025-06-15 12:00:00 UTC));

    let admin = SubjectView::from_host(&json!({"id": "u1", "role": "admin"}));
    let value = evaluate_flag(&artifact, index, &admin, &clock)
        .ok_or(ExampleError("admin evaluation must serve a value"))?;
    assert_eq!(value, json!("ON"));

    let viewer = SubjectView::from_host(&json!({"id": "u2", "role": "viewer"}));
    let value = evaluate_flag(&artifact, index, &viewer, &clock)
        .ok_or(ExampleError("viewer evaluation must serve a value"))?;
    assert_eq!(value, json!("OFF"));
    Ok(())
}
