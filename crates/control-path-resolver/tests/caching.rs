// crates/control-path-resolver/tests/caching.rs
// ============================================================================
// Module: Caching Tests
// Description: TTL cache correctness through the facade.
// Purpose: Pin cache hits, invalidation on reload, and canonical keys.
// Dependencies: control-path-resolver, rmpv, tempfile
// ============================================================================

//! Evaluation cache behavior through the resolver facade.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_docs_in_private_items,
    reason = "Test-only panic-based assertions are permitted."
)]

mod helpers;

use std::fs;

use control_path_resolver::LoadOptions;
use control_path_resolver::Resolver;
use control_path_resolver::ResolverConfig;
use helpers::encode_artifact;
use helpers::serve;
use helpers::write_temp;
use rmpv::Value as Mp;
use serde_json::json;

/// Artifact with one unguarded serve rule.
fn serving(value: &str) -> Vec<u8> {
    encode_artifact(&["banner", value], vec![Mp::Array(vec![serve(Mp::from(1_u64))])], &[0])
}

#[test]
fn repeated_resolutions_return_identical_details() {
    let (_dir, path) = write_temp("artifact.bin", &serving("WELCOME"));
    let resolver = Resolver::new(ResolverConfig::default());
    resolver.load_artifact(&path, &LoadOptions::default()).unwrap();
    let context = json!({"id": "u1", "role": "viewer"});
    let first = resolver.resolve_string("banner", "none", &context);
    for _ in 0..5 {
        assert_eq!(resolver.resolve_string("banner", "none", &context), first);
    }
}

#[test]
fn cached_results_survive_on_disk_changes_until_reload() {
    let (dir, path) = write_temp("artifact.bin", &serving("OLD"));
    let resolver = Resolver::new(ResolverConfig::default());
    resolver.load_artifact(&path, &LoadOptions::default()).unwrap();
    let context = json!({"id": "u1"});
    assert_eq!(resolver.resolve_string("banner", "none", &context).value, "OLD");

    // Rewriting the file alone must not change served values.
    fs::write(dir.path().join("artifact.bin"), serving("NEW")).unwrap();
    assert_eq!(resolver.resolve_string("banner", "none", &context).value, "OLD");

    // Reload swaps the artifact and purges the cache.
    resolver.reload_artifact(&path, &LoadOptions::default()).unwrap();
    assert_eq!(resolver.resolve_string("banner", "none", &context).value, "NEW");
}

#[test]
fn clear_cache_forces_fresh_evaluation_state() {
    let (_dir, path) = write_temp("artifact.bin", &serving("STEADY"));
    let resolver = Resolver::new(ResolverConfig::default());
    resolver.load_artifact(&path, &LoadOptions::default()).unwrap();
    let context = json!({"id": "u1"});
    let before = resolver.resolve_string("banner", "none", &context);
    resolver.clear_cache();
    assert_eq!(resolver.resolve_string("banner", "none", &context), before);
}

#[test]
fn canonically_equal_contexts_share_a_cache_entry() {
    let (_dir, path) = write_temp("artifact.bin", &serving("SHARED"));
    let resolver = Resolver::new(ResolverConfig::default());
    resolver.load_artifact(&path, &LoadOptions::default()).unwrap();
    // Same fields in different order, plus stripped prototype keys.
    let a = json!({"id": "u1", "role": "viewer"});
    let b = json!({"role": "viewer", "id": "u1", "__proto__": {"evil": true}});
    assert_eq!(
        resolver.resolve_string("banner", "none", &a),
        resolver.resolve_string("banner", "none", &b)
    );
}

#[test]
fn disabled_cache_still_resolves_consistently() {
    let (_dir, path) = write_temp("artifact.bin", &serving("PLAIN"));
    let config = ResolverConfig {
        cache_enabled: false,
        ..ResolverConfig::default()
    };
    let resolver = Resolver::new(config);
    resolver.load_artifact(&path, &LoadOptions::default()).unwrap();
    let context = json!({"id": "u1"});
    let first = resolver.resolve_string("banner", "none", &context);
    assert_eq!(resolver.resolve_string("banner", "none", &context), first);
    assert_eq!(first.value, "PLAIN");
}
