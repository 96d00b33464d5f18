// crates/control-path-core/src/runtime/rules.rs
// ============================================================================
// Module: Rule Interpreter
// Description: Ordered rule traversal with deterministic selection.
// Purpose: Derive a flag's raw value from its rule list.
// Dependencies: crate::core, crate::runtime::{bucket, expr}
// ============================================================================

//! ## Overview
//! Rules are walked in artifact order. A rule fires only when its guard (if
//! any) evaluates truthy. `SERVE` yields its payload, `VARIATIONS` picks a
//! weighted entry from the subject bucket, and `ROLLOUT` gates its value on
//! a percentage bucket. A flag whose rules all decline yields no value.
//!
//! # Invariants
//! - Selection depends only on the artifact, the subject view, and the
//!   injected clock; repeated evaluation is bit-identical.
//! - Out-of-range indices in hand-built artifacts fail closed per entry.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::artifact::Artifact;
use crate::core::artifact::Rule;
use crate::core::artifact::Variation;
use crate::core::subject::SubjectView;
use crate::core::time::Clock;
use crate::runtime::bucket::bucket_for;
use crate::runtime::expr::Evaluator;
use crate::runtime::expr::truthy;

// ============================================================================
// SECTION: Flag Evaluation
// ============================================================================

/// Rollout buckets span `[0, 100)`.
const ROLLOUT_BUCKETS: u64 = 100;

/// Evaluates a flag by index, returning its raw value when a rule fires.
///
/// Out-of-range flag indices and rule lists that never fire yield `None`.
#[must_use]
pub fn evaluate_flag(
    artifact: &Artifact,
    flag_index: usize,
    view: &SubjectView,
    clock: &dyn Clock,
) -> Option<Value> {
    let rules = artifact.flags.get(flag_index)?;
    let mut evaluator = Evaluator::new(artifact, view, clock);
    for rule in rules {
        if let Some(value) = apply_rule(artifact, rule, view, &mut evaluator) {
            return Some(value);
        }
    }
    None
}

/// Applies one rule; `None` means the rule declined.
fn apply_rule(
    artifact: &Artifact,
    rule: &Rule,
    view: &SubjectView,
    evaluator: &mut Evaluator<'_>,
) -> Option<Value> {
    let guard = match rule {
        Rule::Serve {
            guard, ..
        }
        | Rule::Variations {
            guard, ..
        }
        | Rule::Rollout {
            guard, ..
        } => guard.as_ref(),
    };
    if let Some(guard) = guard
        && !truthy(&evaluator.eval(guard))
    {
        return None;
    }
    match rule {
        Rule::Serve {
            value, ..
        } => Some(serve_value(artifact, value)),
        Rule::Variations {
            entries, ..
        } => pick_variation(artifact, entries, view),
        Rule::Rollout {
            value_index,
            percent,
            ..
        } => apply_rollout(artifact, *value_index, *percent, view),
    }
}

// ============================================================================
// SECTION: Serve
// ============================================================================

/// Resolves a serve payload, dereferencing in-range integer indices.
fn serve_value(artifact: &Artifact, value: &Value) -> Value {
    if let Some(index) = value.as_u64().and_then(|raw| u16::try_from(raw).ok())
        && let Some(text) = artifact.string_at(index)
    {
        return Value::String(text.to_string());
    }
    value.clone()
}

// ============================================================================
// SECTION: Variations
// ============================================================================

/// Picks a weighted variation for the subject bucket.
fn pick_variation(
    artifact: &Artifact,
    entries: &[Variation],
    view: &SubjectView,
) -> Option<Value> {
    let first = entries.first()?;
    let total: u64 = entries.iter().map(|entry| u64::from(entry.weight)).sum();
    if total == 0 {
        return deref_variation(artifact, first);
    }
    let bucket = bucket_for(&view.bucket_id(), total);
    let mut cumulative = 0_u64;
    let mut chosen = entries.len();
    for (position, entry) in entries.iter().enumerate() {
        cumulative += u64::from(entry.weight);
        if cumulative > bucket {
            chosen = position;
            break;
        }
    }
    for entry in entries.iter().skip(chosen) {
        if let Some(value) = deref_variation(artifact, entry) {
            return Some(value);
        }
    }
    // Fall back to the last entry that still dereferences.
    entries.iter().rev().find_map(|entry| deref_variation(artifact, entry))
}

/// Dereferences a variation entry's value index.
fn deref_variation(artifact: &Artifact, entry: &Variation) -> Option<Value> {
    artifact.string_at(entry.value_index).map(|text| Value::String(text.to_string()))
}

// ============================================================================
// SECTION: Rollout
// ============================================================================

/// Applies a percent gate to the subject bucket.
fn apply_rollout(
    artifact: &Artifact,
    value_index: u16,
    percent: u8,
    view: &SubjectView,
) -> Option<Value> {
    if percent == 0 {
        return None;
    }
    let value = artifact.string_at(value_index).map(|text| Value::String(text.to_string()))?;
    if percent >= 100 {
        return Some(value);
    }
    let bucket = bucket_for(&view.bucket_id(), ROLLOUT_BUCKETS);
    (bucket < u64::from(percent)).then_some(value)
}
