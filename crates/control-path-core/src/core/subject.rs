// crates/control-path-core/src/core/subject.rs
// ============================================================================
// Module: Subject Mapping
// Description: Host evaluation context to subject/context translation.
// Purpose: Build the interpreter's input records from a flat host record.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Hosts hand the resolver a flat record. Typed identity fields (`id`,
//! `email`, `role`) land in the subject and typed ambient fields
//! (`environment`, `device`, `app_version`) land in the context when they
//! are strings. `user.`- and `context.`-prefixed keys route explicitly;
//! everything else lands in the subject verbatim. Non-object input,
//! including arrays, yields empty records.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Field Routing
// ============================================================================

/// Typed fields extracted into the subject when their values are strings.
const SUBJECT_FIELDS: [&str; 3] = ["id", "email", "role"];

/// Typed fields extracted into the context when their values are strings.
const CONTEXT_FIELDS: [&str; 3] = ["environment", "device", "app_version"];

// ============================================================================
// SECTION: Subject View
// ============================================================================

/// Immutable subject and context records for a single evaluation.
///
/// # Invariants
/// - Both records are snapshots; evaluation never mutates them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubjectView {
    /// Identity-bearing record (`id`, attributes, free-form fields).
    pub subject: Map<String, Value>,
    /// Ambient record (`environment`, `device`, free-form fields).
    pub context: Map<String, Value>,
}

impl SubjectView {
    /// Builds the subject and context records from a host-provided record.
    #[must_use]
    pub fn from_host(input: &Value) -> Self {
        let Value::Object(fields) = input else {
            return Self::default();
        };
        let mut view = Self::default();
        for (key, value) in fields {
            route_field(&mut view, key, value);
        }
        view
    }

    /// Returns the subject identifier used for bucketing.
    ///
    /// Numbers are rendered to their decimal form; any other type counts as
    /// an absent id.
    #[must_use]
    pub fn bucket_id(&self) -> String {
        match self.subject.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => String::new(),
        }
    }
}

/// Routes one host field into the subject or context record.
fn route_field(view: &mut SubjectView, key: &str, value: &Value) {
    if SUBJECT_FIELDS.contains(&key) && value.is_string() {
        view.subject.insert(key.to_string(), value.clone());
        return;
    }
    if CONTEXT_FIELDS.contains(&key) && value.is_string() {
        view.context.insert(key.to_string(), value.clone());
        return;
    }
    if let Some(tail) = key.strip_prefix("user.")
        && !tail.is_empty()
    {
        view.subject.insert(tail.to_string(), value.clone());
        return;
    }
    if let Some(tail) = key.strip_prefix("context.")
        && !tail.is_empty()
    {
        view.context.insert(tail.to_string(), value.clone());
        return;
    }
    view.subject.insert(key.to_string(), value.clone());
}
