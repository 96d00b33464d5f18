// crates/control-path-core/src/runtime/bucket.rs
// ============================================================================
// Module: Deterministic Bucketing
// Description: Stable 64-bit hashing for variation and rollout buckets.
// Purpose: Land a given subject in the same bucket across runs and hosts.
// Dependencies: xxhash-rust
// ============================================================================

//! ## Overview
//! Bucketing uses xxHash64 with seed 0 over the raw subject-id bytes. The
//! hash is part of the observable contract: `VARIATIONS`, `ROLLOUT`, and the
//! `HASH` built-in all reduce it modulo their bucket count, so changing the
//! algorithm or seed would silently re-bucket every subject.

// ============================================================================
// SECTION: Imports
// ============================================================================

use xxhash_rust::xxh64::xxh64;

// ============================================================================
// SECTION: Hashing
// ============================================================================

/// Fixed seed for the bucketing hash.
const BUCKET_SEED: u64 = 0;

/// Returns the stable 64-bit hash of an identifier.
#[must_use]
pub fn stable_hash64(id: &str) -> u64 {
    xxh64(id.as_bytes(), BUCKET_SEED)
}

/// Returns the bucket for an identifier in `[0, modulus)`.
///
/// An empty identifier always lands in bucket 0. A zero modulus yields 0
/// rather than dividing.
#[must_use]
pub fn bucket_for(id: &str, modulus: u64) -> u64 {
    if id.is_empty() || modulus == 0 {
        return 0;
    }
    stable_hash64(id) % modulus
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only panic-based assertions are permitted."
    )]

    use super::bucket_for;
    use super::stable_hash64;

    #[test]
    fn hash_is_stable_across_calls() {
        assert_eq!(stable_hash64("u1"), stable_hash64("u1"));
        assert_ne!(stable_hash64("u1"), stable_hash64("u2"));
    }

    #[test]
    fn empty_id_lands_in_bucket_zero() {
        assert_eq!(bucket_for("", 100), 0);
    }

    #[test]
    fn zero_modulus_yields_zero() {
        assert_eq!(bucket_for("u1", 0), 0);
    }

    #[test]
    fn buckets_stay_in_range() {
        for id in ["a", "b", "c", "user-42", "x@example.com"] {
            assert!(bucket_for(id, 100) < 100);
        }
    }
}
