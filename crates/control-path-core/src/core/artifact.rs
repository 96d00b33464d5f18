// crates/control-path-core/src/core/artifact.rs
// ============================================================================
// Module: Artifact Model
// Description: Validated in-memory form of a compiled rule artifact.
// Purpose: Provide the sum types the codec produces and the runtime consumes.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! An [`Artifact`] is the validated in-memory form of the compiled flag
//! rules: a string table, one ordered rule list per flag, flag-name indices,
//! and optional named segments. Rules and expressions are closed sum types;
//! the interpreter dispatches on them with a single `match` per node.
//!
//! # Invariants
//! - Codec-produced artifacts satisfy the size gates and index bounds in
//!   [`crate::core::codec`]; hand-built artifacts may not, and the runtime
//!   fails closed on out-of-bounds indices.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

// ============================================================================
// SECTION: Size Limits
// ============================================================================

/// Maximum accepted encoded artifact size in bytes (10 MiB).
pub const MAX_ARTIFACT_BYTES: usize = 10 * 1024 * 1024;

/// Maximum number of entries in the string table.
pub const MAX_STRINGS: usize = 100_000;

/// Maximum length of a single string-table entry, in characters.
pub const MAX_STRING_CHARS: usize = 10_000;

/// Maximum number of flags in an artifact.
pub const MAX_FLAGS: usize = 100_000;

/// Length of an Ed25519 signature in bytes.
pub const SIGNATURE_BYTES: usize = 64;

// ============================================================================
// SECTION: Artifact
// ============================================================================

/// Validated in-memory artifact.
///
/// # Invariants
/// - `flag_names.len() == flags.len()` for codec-produced artifacts.
/// - All textual constants are referenced through `string_table` indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    /// Artifact format version identifier (for example `"1.0"`).
    pub version: String,
    /// Deployment environment identifier.
    pub environment: String,
    /// Ordered string table; all indices in rules resolve against it.
    pub string_table: Vec<String>,
    /// Ordered rule lists; the flag at position `i` is defined by `flags[i]`.
    pub flags: Vec<Vec<Rule>>,
    /// String-table indices naming each flag; same length as `flags`.
    pub flag_names: Vec<u16>,
    /// Named segment predicates, in artifact order.
    pub segments: Vec<Segment>,
    /// Raw Ed25519 signature bytes when the artifact was signed.
    pub signature: Option<Vec<u8>>,
}

impl Artifact {
    /// Resolves a string-table index to its entry.
    #[must_use]
    pub fn string_at(&self, index: u16) -> Option<&str> {
        self.string_table.get(usize::from(index)).map(String::as_str)
    }

    /// Returns a display summary of the artifact contents.
    #[must_use]
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            version: self.version.clone(),
            environment: self.environment.clone(),
            flag_count: self.flags.len(),
            segment_count: self.segments.len(),
            string_count: self.string_table.len(),
            signed: self.signature.is_some(),
        }
    }
}

/// Display summary of an artifact, used by hosts and the CLI.
///
/// # Invariants
/// - Counts reflect the validated artifact at the time of the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    /// Artifact format version identifier.
    pub version: String,
    /// Deployment environment identifier.
    pub environment: String,
    /// Number of flags.
    pub flag_count: usize,
    /// Number of named segments.
    pub segment_count: usize,
    /// Number of string-table entries.
    pub string_count: usize,
    /// Whether the artifact carried a signature.
    pub signed: bool,
}

/// Named segment predicate.
///
/// # Invariants
/// - `name_index` is a valid string-table index for codec-produced artifacts.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// String-table index of the segment name.
    pub name_index: u16,
    /// Predicate evaluated against the subject and context.
    pub expression: Expression,
}

// ============================================================================
// SECTION: Flag Directory
// ============================================================================

/// Derived `flag name -> flag index` lookup built from an artifact.
///
/// # Invariants
/// - Indices point into the artifact the directory was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagDirectory {
    /// Flag name to flag index mapping.
    entries: BTreeMap<String, usize>,
}

impl FlagDirectory {
    /// Builds the directory by resolving every flag-name index.
    ///
    /// Unresolvable name indices are skipped; the codec rejects them before
    /// an artifact reaches this point.
    #[must_use]
    pub fn from_artifact(artifact: &Artifact) -> Self {
        let mut entries = BTreeMap::new();
        for (index, name_index) in artifact.flag_names.iter().enumerate() {
            if let Some(name) = artifact.string_at(*name_index) {
                entries.insert(name.to_string(), index);
            }
        }
        Self {
            entries,
        }
    }

    /// Returns the flag index for a name.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.get(name).copied()
    }

    /// Returns the number of named flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no flags are named.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// One ordered decision step within a flag.
///
/// # Invariants
/// - The optional guard must evaluate truthy for the rule to fire.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// Serve a fixed value: a string-table index or a literal scalar.
    Serve {
        /// Optional guard expression.
        guard: Option<Expression>,
        /// Served payload; integers in string-table range dereference.
        value: Value,
    },
    /// Deterministic weighted split across variations.
    Variations {
        /// Optional guard expression.
        guard: Option<Expression>,
        /// Weighted entries walked in cumulative order.
        entries: Vec<Variation>,
    },
    /// Percent-gated value keyed on the subject bucket.
    Rollout {
        /// Optional guard expression.
        guard: Option<Expression>,
        /// String-table index of the served value.
        value_index: u16,
        /// Rollout percentage in `0..=100`.
        percent: u8,
    },
}

/// Weighted entry in a `Variations` rule.
///
/// # Invariants
/// - `weight` contributes to the cumulative bucket walk in entry order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Variation {
    /// String-table index of the variation value.
    pub value_index: u16,
    /// Weight of this entry.
    pub weight: u8,
}

// ============================================================================
// SECTION: Expressions
// ============================================================================

/// Comparison operators for binary expressions.
///
/// # Invariants
/// - Discriminants match the wire encoding and are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// Loose equality with scalar coercion.
    Eq,
    /// Negated loose equality.
    Ne,
    /// Numeric greater-than.
    Gt,
    /// Numeric less-than.
    Lt,
    /// Numeric greater-or-equal.
    Gte,
    /// Numeric less-or-equal.
    Lte,
}

/// Connectives for logical expressions.
///
/// # Invariants
/// - Discriminants match the wire encoding and are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    /// Short-circuit conjunction.
    And,
    /// Short-circuit disjunction.
    Or,
    /// Truthiness negation; has no right operand.
    Not,
}

/// Tagged expression tree evaluated to a scalar or boolean.
///
/// # Invariants
/// - Trees are finite; the codec never produces cycles.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Binary comparison of two sub-expressions.
    Binary {
        /// Comparison operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// Logical connective; `Not` carries no right operand.
    Logical {
        /// Connective.
        op: LogicalOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand, absent for `Not`.
        right: Option<Box<Expression>>,
    },
    /// Property path into the subject/context, by string-table index.
    Property {
        /// String-table index of the dot-separated path.
        path_index: u16,
    },
    /// Literal scalar or list value.
    Literal {
        /// Literal value as decoded.
        value: Value,
    },
    /// Built-in function call.
    Func {
        /// Function code from the catalog.
        code: u8,
        /// Argument expressions, evaluated eagerly in order.
        args: Vec<Expression>,
    },
}
