// crates/control-path-resolver/src/coerce.rs
// ============================================================================
// Module: Type Coercion
// Description: Raw evaluation values to requested target types.
// Purpose: Mirror the host-language coercion tables exactly.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Raw rule values and override strings are coerced to the caller's
//! requested type. Booleans honor the canonical `{TRUE, ON, 1, YES}` /
//! `{FALSE, OFF, 0}` token sets after trimming and uppercasing, then fall
//! back to truthiness. Strings stringify scalars and detect variant-shaped
//! names. Numbers follow `Number(v)` semantics where an unparseable value
//! is a type mismatch. Objects pass composites through and JSON-parse
//! strings.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Boolean
// ============================================================================

/// Tokens coercing to `true` after trim and uppercase.
const TRUE_TOKENS: [&str; 4] = ["TRUE", "ON", "1", "YES"];

/// Tokens coercing to `false` after trim and uppercase.
const FALSE_TOKENS: [&str; 3] = ["FALSE", "OFF", "0"];

/// Coerces a raw value to a boolean.
pub(crate) fn coerce_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => {
            let token = text.trim().to_uppercase();
            if TRUE_TOKENS.contains(&token.as_str()) {
                return true;
            }
            if FALSE_TOKENS.contains(&token.as_str()) {
                return false;
            }
            !text.is_empty()
        }
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}

// ============================================================================
// SECTION: String
// ============================================================================

/// Longest value still treated as a variant name.
const MAX_VARIANT_CHARS: usize = 50;

/// Coerces a raw value to a string, detecting variant-shaped names.
///
/// Returns the rendered string and, when it matches `^[A-Z_][A-Z0-9_]*$`
/// within the length bound, the same string as the variant.
pub(crate) fn coerce_string(value: &Value) -> (String, Option<String>) {
    let rendered = render_string(value);
    let variant = is_variant_name(&rendered).then(|| rendered.clone());
    (rendered, variant)
}

/// Renders a value the way the host language's `String(v)` would.
fn render_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        composite => serde_json::to_string(composite).unwrap_or_default(),
    }
}

/// Returns true when a string has the variant-name shape.
fn is_variant_name(candidate: &str) -> bool {
    if candidate.is_empty() || candidate.chars().count() > MAX_VARIANT_CHARS {
        return false;
    }
    let mut chars = candidate.chars();
    let leading_ok = chars.next().is_some_and(|c| c.is_ascii_uppercase() || c == '_');
    leading_ok && chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

// ============================================================================
// SECTION: Number
// ============================================================================

/// Coerces a raw value to a number; `None` marks a type mismatch.
pub(crate) fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Some(0.0);
            }
            trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        Value::Array(_) | Value::Object(_) => None,
    }
}

// ============================================================================
// SECTION: Object
// ============================================================================

/// Coerces a raw value to a structured value; `None` marks a type mismatch.
///
/// Composites pass through unchanged; strings must parse as JSON.
pub(crate) fn coerce_object(value: &Value) -> Option<Value> {
    match value {
        Value::Object(_) | Value::Array(_) => Some(value.clone()),
        Value::String(text) => serde_json::from_str(text).ok(),
        Value::Bool(_) | Value::Number(_) | Value::Null => None,
    }
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

    use serde_json::json;

    use super::coerce_boolean;
    use super::coerce_number;
    use super::coerce_object;
    use super::coerce_string;

    #[test]
    fn boolean_tokens_are_case_insensitive_and_trimmed() {
        assert!(coerce_boolean(&json!("on")));
        assert!(coerce_boolean(&json!("  YES ")));
        assert!(coerce_boolean(&json!("TRUE")));
        assert!(!coerce_boolean(&json!("off")));
        assert!(!coerce_boolean(&json!(" FALSE")));
        assert!(!coerce_boolean(&json!("0")));
    }

    #[test]
    fn unrecognized_strings_fall_back_to_truthiness() {
        assert!(coerce_boolean(&json!("no")));
        assert!(coerce_boolean(&json!("anything")));
        assert!(!coerce_boolean(&json!("")));
    }

    #[test]
    fn scalar_booleans_and_numbers_coerce_directly() {
        assert!(coerce_boolean(&json!(true)));
        assert!(coerce_boolean(&json!(2)));
        assert!(!coerce_boolean(&json!(0)));
        assert!(!coerce_boolean(&json!(null)));
    }

    #[test]
    fn variant_names_are_detected() {
        let (value, variant) = coerce_string(&json!("DARK_MODE"));
        assert_eq!(value, "DARK_MODE");
        assert_eq!(variant.as_deref(), Some("DARK_MODE"));
    }

    #[test]
    fn lowercase_and_long_strings_are_not_variants() {
        let (_, variant) = coerce_string(&json!("dark"));
        assert!(variant.is_none());
        let long = "A".repeat(51);
        let (_, variant) = coerce_string(&json!(long));
        assert!(variant.is_none());
    }

    #[test]
    fn string_rendering_matches_host_semantics() {
        assert_eq!(coerce_string(&json!(true)).0, "true");
        assert_eq!(coerce_string(&json!(1.5)).0, "1.5");
        assert_eq!(coerce_string(&json!(null)).0, "null");
    }

    #[test]
    fn numbers_parse_with_host_semantics() {
        assert_eq!(coerce_number(&json!("42")), Some(42.0));
        assert_eq!(coerce_number(&json!(" ")), Some(0.0));
        assert_eq!(coerce_number(&json!(true)), Some(1.0));
        assert_eq!(coerce_number(&json!(null)), Some(0.0));
        assert_eq!(coerce_number(&json!("not-a-number")), None);
        assert_eq!(coerce_number(&json!([1])), None);
    }

    #[test]
    fn objects_pass_through_and_strings_parse() {
        assert_eq!(coerce_object(&json!({"a": 1})), Some(json!({"a": 1})));
        assert_eq!(coerce_object(&json!("{\"a\":1}")), Some(json!({"a": 1})));
        assert_eq!(coerce_object(&json!("not json")), None);
        assert_eq!(coerce_object(&json!(3)), None);
    }
}
