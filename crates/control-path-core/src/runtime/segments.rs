// crates/control-path-core/src/runtime/segments.rs
// ============================================================================
// Module: Segment Resolver
// Description: Named predicate lookup and cycle-safe evaluation.
// Purpose: Back the IN_SEGMENT built-in with total semantics.
// Dependencies: crate::core::artifact, crate::runtime::expr
// ============================================================================

//! ## Overview
//! A segment is a named predicate over the subject and context. Resolution
//! looks the name up against the artifact's segment table; unknown names and
//! re-entry into a segment that is already being evaluated both yield
//! `false`, keeping evaluation total in the presence of cycles.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::runtime::expr::Evaluator;
use crate::runtime::expr::truthy;

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Evaluates the named segment against the evaluator's subject view.
///
/// Unknown segment names and cyclic references yield `false`.
pub(crate) fn resolve(evaluator: &mut Evaluator<'_>, name: &str) -> bool {
    let artifact = evaluator.artifact();
    let Some(segment) = artifact
        .segments
        .iter()
        .find(|segment| artifact.string_at(segment.name_index) == Some(name))
    else {
        return false;
    };
    if evaluator.segment_in_progress(segment.name_index) {
        return false;
    }
    evaluator.enter_segment(segment.name_index);
    let outcome = evaluator.eval(&segment.expression);
    evaluator.exit_segment();
    truthy(&outcome)
}
