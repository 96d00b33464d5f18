// crates/control-path-core/src/core/codec.rs
// ============================================================================
// Module: Artifact Codec
// Description: MessagePack decoding and validation of artifact bytes.
// Purpose: Accept untrusted artifact buffers safely and fail closed.
// Dependencies: crate::core::{artifact, signature}, rmpv, serde_json
// ============================================================================

//! ## Overview
//! The codec decodes a MessagePack buffer into a validated [`Artifact`].
//! Every size gate, shape rule, and index bound is checked during decode and
//! the first failing rule is reported. The decoded top-level map is kept in
//! its wire order so the signature message (the map re-encoded without the
//! `sig` entry) reproduces what the signer saw.
//!
//! # Invariants
//! - No artifact value escapes this module without passing every gate.
//! - Signature verification failures are never recoverable as success.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rmpv::Value as MpValue;
use serde_json::Number;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::core::artifact::Artifact;
use crate::core::artifact::BinaryOp;
use crate::core::artifact::Expression;
use crate::core::artifact::LogicalOp;
use crate::core::artifact::MAX_ARTIFACT_BYTES;
use crate::core::artifact::MAX_FLAGS;
use crate::core::artifact::MAX_STRINGS;
use crate::core::artifact::MAX_STRING_CHARS;
use crate::core::artifact::Rule;
use crate::core::artifact::SIGNATURE_BYTES;
use crate::core::artifact::Segment;
use crate::core::artifact::Variation;
use crate::core::signature::KeyMaterial;
use crate::core::signature::SignatureError;
use crate::core::signature::parse_verifying_key;
use crate::core::signature::verify_detached;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Artifact decode and validation errors.
///
/// # Invariants
/// - `Invalid` carries the first failing rule in its message.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// Structural, size, or reference violation during decode.
    #[error("invalid artifact: {0}")]
    Invalid(String),
    /// Signature subsystem rejection.
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Shorthand constructor for [`ArtifactError::Invalid`].
fn invalid(rule: impl Into<String>) -> ArtifactError {
    ArtifactError::Invalid(rule.into())
}

// ============================================================================
// SECTION: Decode Options
// ============================================================================

/// Caller-supplied options controlling artifact acceptance.
///
/// # Invariants
/// - `require_signature` with an unsigned artifact always rejects.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Verification key material; when set, present signatures must verify.
    pub public_key: Option<KeyMaterial>,
    /// Reject artifacts that carry no signature.
    pub require_signature: bool,
}

// ============================================================================
// SECTION: Decode Entry Point
// ============================================================================

/// Decodes and validates an artifact buffer.
///
/// # Errors
///
/// Returns [`ArtifactError::Invalid`] on the first failing structural, size,
/// or reference rule, and [`ArtifactError::Signature`] for signature-policy
/// rejections.
pub fn decode_artifact(bytes: &[u8], options: &DecodeOptions) -> Result<Artifact, ArtifactError> {
    if bytes.len() > MAX_ARTIFACT_BYTES {
        return Err(invalid("artifact exceeds the 10 MiB size limit"));
    }
    let mut reader: &[u8] = bytes;
    let root = rmpv::decode::read_value(&mut reader)
        .map_err(|err| invalid(format!("artifact is not valid MessagePack: {err}")))?;
    if !reader.is_empty() {
        return Err(invalid("artifact has trailing bytes after the top-level map"));
    }
    let MpValue::Map(pairs) = &root else {
        return Err(invalid("artifact top level must be a map"));
    };

    let version = required_string(pairs, "v")?;
    let environment = required_string(pairs, "env")?;
    let string_table = decode_string_table(pairs)?;
    let raw_flags = decode_raw_flags(pairs)?;
    let flag_names = decode_flag_names(pairs, raw_flags.len(), string_table.len())?;
    let flags = decode_flags(&raw_flags, string_table.len())?;
    let segments = decode_segments(pairs, string_table.len())?;
    let signature = decode_signature(pairs)?;

    if options.require_signature && signature.is_none() {
        return Err(SignatureError::Required.into());
    }
    if let Some(material) = &options.public_key {
        let key = parse_verifying_key(material)?;
        if let Some(sig) = &signature {
            let message = unsigned_message(pairs)?;
            verify_detached(&key, &message, sig)?;
        }
    }

    Ok(Artifact {
        version,
        environment,
        string_table,
        flags,
        flag_names,
        segments,
        signature,
    })
}

// ============================================================================
// SECTION: Field Extraction
// ============================================================================

/// Returns the first map entry with the given string key.
fn map_field<'a>(pairs: &'a [(MpValue, MpValue)], key: &str) -> Option<&'a MpValue> {
    pairs.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v)
}

/// Extracts a required string field.
fn required_string(pairs: &[(MpValue, MpValue)], key: &str) -> Result<String, ArtifactError> {
    let value = map_field(pairs, key).ok_or_else(|| invalid(format!("missing field `{key}`")))?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| invalid(format!("field `{key}` must be a string")))
}

/// Decodes and gates the string table.
fn decode_string_table(pairs: &[(MpValue, MpValue)]) -> Result<Vec<String>, ArtifactError> {
    let value = map_field(pairs, "strs").ok_or_else(|| invalid("missing field `strs`"))?;
    let MpValue::Array(items) = value else {
        return Err(invalid("field `strs` must be an array of strings"));
    };
    if items.len() > MAX_STRINGS {
        return Err(invalid(format!("string table exceeds {MAX_STRINGS} entries")));
    }
    let mut table = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(invalid(format!("string table entry {index} must be a string")));
        };
        if text.chars().count() > MAX_STRING_CHARS {
            return Err(invalid(format!(
                "string table entry {index} exceeds {MAX_STRING_CHARS} characters"
            )));
        }
        table.push(text.to_string());
    }
    Ok(table)
}

/// Extracts the raw rule-list arrays before rule decoding.
fn decode_raw_flags(pairs: &[(MpValue, MpValue)]) -> Result<Vec<Vec<MpValue>>, ArtifactError> {
    let value = map_field(pairs, "flags").ok_or_else(|| invalid("missing field `flags`"))?;
    let MpValue::Array(items) = value else {
        return Err(invalid("field `flags` must be an array of arrays"));
    };
    if items.len() > MAX_FLAGS {
        return Err(invalid(format!("flag list exceeds {MAX_FLAGS} entries")));
    }
    let mut flags = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let MpValue::Array(rules) = item else {
            return Err(invalid(format!("flag {index} must be an array of rules")));
        };
        flags.push(rules.clone());
    }
    Ok(flags)
}

/// Decodes and bounds-checks the flag-name index list.
fn decode_flag_names(
    pairs: &[(MpValue, MpValue)],
    flag_count: usize,
    string_count: usize,
) -> Result<Vec<u16>, ArtifactError> {
    let value = map_field(pairs, "flagNames").ok_or_else(|| invalid("missing field `flagNames`"))?;
    let MpValue::Array(items) = value else {
        return Err(invalid("field `flagNames` must be an array of non-negative integers"));
    };
    if items.len() != flag_count {
        return Err(invalid(format!(
            "flagNames length {} does not match flags length {flag_count}",
            items.len()
        )));
    }
    let mut names = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let name_index = string_index(item, string_count)
            .ok_or_else(|| invalid(format!("flagNames[{index}] is not a valid string index")))?;
        names.push(name_index);
    }
    Ok(names)
}

/// Decodes optional named segments.
fn decode_segments(
    pairs: &[(MpValue, MpValue)],
    string_count: usize,
) -> Result<Vec<Segment>, ArtifactError> {
    let Some(value) = map_field(pairs, "segments") else {
        return Ok(Vec::new());
    };
    let MpValue::Array(items) = value else {
        return Err(invalid("field `segments` must be an array"));
    };
    let mut segments = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let MpValue::Array(entry) = item else {
            return Err(invalid(format!("segment {index} must be a [nameIndex, expression] pair")));
        };
        if entry.len() != 2 {
            return Err(invalid(format!("segment {index} must be a [nameIndex, expression] pair")));
        }
        let name_index = string_index(&entry[0], string_count)
            .ok_or_else(|| invalid(format!("segment {index} name is not a valid string index")))?;
        let expression = decode_expression(&entry[1], string_count)?;
        segments.push(Segment {
            name_index,
            expression,
        });
    }
    Ok(segments)
}

/// Decodes the optional raw signature bytes.
fn decode_signature(pairs: &[(MpValue, MpValue)]) -> Result<Option<Vec<u8>>, ArtifactError> {
    let Some(value) = map_field(pairs, "sig") else {
        return Ok(None);
    };
    let MpValue::Binary(bytes) = value else {
        return Err(invalid("field `sig` must be raw bytes"));
    };
    if bytes.len() != SIGNATURE_BYTES {
        return Err(invalid(format!("field `sig` must be {SIGNATURE_BYTES} bytes")));
    }
    Ok(Some(bytes.clone()))
}

/// Re-encodes the decoded map without the `sig` entry, preserving order.
fn unsigned_message(pairs: &[(MpValue, MpValue)]) -> Result<Vec<u8>, ArtifactError> {
    let retained: Vec<(MpValue, MpValue)> =
        pairs.iter().filter(|(k, _)| k.as_str() != Some("sig")).cloned().collect();
    let unsigned = MpValue::Map(retained);
    let mut message = Vec::new();
    rmpv::encode::write_value(&mut message, &unsigned)
        .map_err(|_| invalid("artifact re-encoding for signature verification failed"))?;
    Ok(message)
}

// ============================================================================
// SECTION: Rule Decoding
// ============================================================================

/// Rule kind tag for `SERVE`.
const RULE_SERVE: u64 = 0;
/// Rule kind tag for `VARIATIONS`.
const RULE_VARIATIONS: u64 = 1;
/// Rule kind tag for `ROLLOUT`.
const RULE_ROLLOUT: u64 = 2;

/// Decodes every rule list against the string-table bounds.
fn decode_flags(
    raw_flags: &[Vec<MpValue>],
    string_count: usize,
) -> Result<Vec<Vec<Rule>>, ArtifactError> {
    let mut flags = Vec::with_capacity(raw_flags.len());
    for (flag_index, raw_rules) in raw_flags.iter().enumerate() {
        let mut rules = Vec::with_capacity(raw_rules.len());
        for (rule_index, raw_rule) in raw_rules.iter().enumerate() {
            let rule = decode_rule(raw_rule, string_count).map_err(|err| match err {
                ArtifactError::Invalid(rule) => {
                    invalid(format!("flag {flag_index} rule {rule_index}: {rule}"))
                }
                other => other,
            })?;
            rules.push(rule);
        }
        flags.push(rules);
    }
    Ok(flags)
}

/// Decodes a single `[kind, payload]` or `[kind, guard, payload]` rule.
fn decode_rule(raw: &MpValue, string_count: usize) -> Result<Rule, ArtifactError> {
    let MpValue::Array(parts) = raw else {
        return Err(invalid("rule must be an array"));
    };
    let (kind, guard, payload) = match parts.as_slice() {
        [kind, payload] => (kind, None, payload),
        [kind, guard, payload] => (kind, Some(decode_expression(guard, string_count)?), payload),
        _ => return Err(invalid("rule must have 2 or 3 elements")),
    };
    let Some(kind) = kind.as_u64() else {
        return Err(invalid("rule kind must be a non-negative integer"));
    };
    match kind {
        RULE_SERVE => Ok(Rule::Serve {
            guard,
            value: literal_value(payload)?,
        }),
        RULE_VARIATIONS => Ok(Rule::Variations {
            guard,
            entries: decode_variations(payload, string_count)?,
        }),
        RULE_ROLLOUT => {
            let (value_index, percent) = decode_rollout(payload, string_count)?;
            Ok(Rule::Rollout {
                guard,
                value_index,
                percent,
            })
        }
        other => Err(invalid(format!("unknown rule kind {other}"))),
    }
}

/// Decodes a `VARIATIONS` payload of `[valueIndex, weight]` pairs.
fn decode_variations(
    payload: &MpValue,
    string_count: usize,
) -> Result<Vec<Variation>, ArtifactError> {
    let MpValue::Array(items) = payload else {
        return Err(invalid("variations payload must be an array"));
    };
    let mut entries = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let MpValue::Array(pair) = item else {
            return Err(invalid(format!("variation {index} must be a [valueIndex, weight] pair")));
        };
        if pair.len() != 2 {
            return Err(invalid(format!("variation {index} must be a [valueIndex, weight] pair")));
        }
        let value_index = string_index(&pair[0], string_count)
            .ok_or_else(|| invalid(format!("variation {index} value is not a valid string index")))?;
        let weight = pair[1]
            .as_u64()
            .and_then(|w| u8::try_from(w).ok())
            .ok_or_else(|| invalid(format!("variation {index} weight must fit in 8 bits")))?;
        entries.push(Variation {
            value_index,
            weight,
        });
    }
    Ok(entries)
}

/// Decodes a `ROLLOUT` payload of `[valueIndex, percent]`.
fn decode_rollout(payload: &MpValue, string_count: usize) -> Result<(u16, u8), ArtifactError> {
    let MpValue::Array(pair) = payload else {
        return Err(invalid("rollout payload must be a [valueIndex, percent] pair"));
    };
    if pair.len() != 2 {
        return Err(invalid("rollout payload must be a [valueIndex, percent] pair"));
    }
    let value_index = string_index(&pair[0], string_count)
        .ok_or_else(|| invalid("rollout value is not a valid string index"))?;
    let percent = pair[1]
        .as_u64()
        .and_then(|p| u8::try_from(p).ok())
        .filter(|p| *p <= 100)
        .ok_or_else(|| invalid("rollout percent must be between 0 and 100"))?;
    Ok((value_index, percent))
}

// ============================================================================
// SECTION: Expression Decoding
// ============================================================================

/// Expression tag for binary comparisons.
const EXPR_BINARY: u64 = 0;
/// Expression tag for logical connectives.
const EXPR_LOGICAL: u64 = 1;
/// Expression tag for property paths.
const EXPR_PROPERTY: u64 = 2;
/// Expression tag for literals.
const EXPR_LITERAL: u64 = 3;
/// Expression tag for built-in function calls.
const EXPR_FUNC: u64 = 4;

/// Decodes a tagged expression array.
fn decode_expression(raw: &MpValue, string_count: usize) -> Result<Expression, ArtifactError> {
    let MpValue::Array(parts) = raw else {
        return Err(invalid("expression must be an array"));
    };
    let Some(tag) = parts.first().and_then(MpValue::as_u64) else {
        return Err(invalid("expression tag must be a non-negative integer"));
    };
    match tag {
        EXPR_BINARY => decode_binary(parts, string_count),
        EXPR_LOGICAL => decode_logical(parts, string_count),
        EXPR_PROPERTY => {
            if parts.len() != 2 {
                return Err(invalid("property expression must be [2, pathIndex]"));
            }
            let path_index = string_index(&parts[1], string_count)
                .ok_or_else(|| invalid("property path is not a valid string index"))?;
            Ok(Expression::Property {
                path_index,
            })
        }
        EXPR_LITERAL => {
            if parts.len() != 2 {
                return Err(invalid("literal expression must be [3, value]"));
            }
            Ok(Expression::Literal {
                value: literal_value(&parts[1])?,
            })
        }
        EXPR_FUNC => decode_func(parts, string_count),
        other => Err(invalid(format!("unknown expression tag {other}"))),
    }
}

/// Decodes a `[0, op, left, right]` binary expression.
fn decode_binary(parts: &[MpValue], string_count: usize) -> Result<Expression, ArtifactError> {
    if parts.len() != 4 {
        return Err(invalid("binary expression must be [0, op, left, right]"));
    }
    let op = match parts[1].as_u64() {
        Some(0) => BinaryOp::Eq,
        Some(1) => BinaryOp::Ne,
        Some(2) => BinaryOp::Gt,
        Some(3) => BinaryOp::Lt,
        Some(4) => BinaryOp::Gte,
        Some(5) => BinaryOp::Lte,
        _ => return Err(invalid("unknown binary operator")),
    };
    Ok(Expression::Binary {
        op,
        left: Box::new(decode_expression(&parts[2], string_count)?),
        right: Box::new(decode_expression(&parts[3], string_count)?),
    })
}

/// Decodes a `[1, op, left(, right)]` logical expression.
fn decode_logical(parts: &[MpValue], string_count: usize) -> Result<Expression, ArtifactError> {
    let op = match parts.get(1).and_then(MpValue::as_u64) {
        Some(0) => LogicalOp::And,
        Some(1) => LogicalOp::Or,
        Some(2) => LogicalOp::Not,
        _ => return Err(invalid("unknown logical operator")),
    };
    match (op, parts.len()) {
        (LogicalOp::Not, 3) => Ok(Expression::Logical {
            op,
            left: Box::new(decode_expression(&parts[2], string_count)?),
            right: None,
        }),
        (LogicalOp::And | LogicalOp::Or, 4) => Ok(Expression::Logical {
            op,
            left: Box::new(decode_expression(&parts[2], string_count)?),
            right: Some(Box::new(decode_expression(&parts[3], string_count)?)),
        }),
        _ => Err(invalid("logical expression has wrong arity")),
    }
}

/// Decodes a `[4, code, [args...]]` function expression.
fn decode_func(parts: &[MpValue], string_count: usize) -> Result<Expression, ArtifactError> {
    if parts.len() != 3 {
        return Err(invalid("function expression must be [4, code, [args]]"));
    }
    let code = parts[1]
        .as_u64()
        .and_then(|c| u8::try_from(c).ok())
        .ok_or_else(|| invalid("function code must fit in 8 bits"))?;
    let MpValue::Array(raw_args) = &parts[2] else {
        return Err(invalid("function arguments must be an array"));
    };
    let mut args = Vec::with_capacity(raw_args.len());
    for raw_arg in raw_args {
        args.push(decode_expression(raw_arg, string_count)?);
    }
    Ok(Expression::Func {
        code,
        args,
    })
}

// ============================================================================
// SECTION: Scalar Helpers
// ============================================================================

/// Reads a 16-bit string-table index that is in bounds.
fn string_index(value: &MpValue, string_count: usize) -> Option<u16> {
    let index = value.as_u64().and_then(|i| u16::try_from(i).ok())?;
    (usize::from(index) < string_count).then_some(index)
}

/// Converts a MessagePack scalar or list into a JSON literal value.
fn literal_value(value: &MpValue) -> Result<JsonValue, ArtifactError> {
    match value {
        MpValue::Nil => Ok(JsonValue::Null),
        MpValue::Boolean(flag) => Ok(JsonValue::Bool(*flag)),
        MpValue::Integer(number) => {
            if let Some(unsigned) = number.as_u64() {
                Ok(JsonValue::Number(Number::from(unsigned)))
            } else if let Some(signed) = number.as_i64() {
                Ok(JsonValue::Number(Number::from(signed)))
            } else {
                Err(invalid("literal integer is out of range"))
            }
        }
        MpValue::F32(float) => float_literal(f64::from(*float)),
        MpValue::F64(float) => float_literal(*float),
        MpValue::String(text) => text
            .as_str()
            .map(|s| JsonValue::String(s.to_string()))
            .ok_or_else(|| invalid("literal string must be valid UTF-8")),
        MpValue::Array(items) => {
            let mut list = Vec::with_capacity(items.len());
            for item in items {
                list.push(literal_value(item)?);
            }
            Ok(JsonValue::Array(list))
        }
        MpValue::Map(pairs) => {
            let mut object = serde_json::Map::with_capacity(pairs.len());
            for (key, entry) in pairs {
                let Some(key) = key.as_str() else {
                    return Err(invalid("literal map keys must be strings"));
                };
                object.insert(key.to_string(), literal_value(entry)?);
            }
            Ok(JsonValue::Object(object))
        }
        MpValue::Binary(_) | MpValue::Ext(..) => {
            Err(invalid("literal values may not be binary or extension types"))
        }
    }
}

/// Converts a float into a JSON number, rejecting non-finite values.
fn float_literal(float: f64) -> Result<JsonValue, ArtifactError> {
    Number::from_f64(float)
        .map(JsonValue::Number)
        .ok_or_else(|| invalid("literal float must be finite"))
}
