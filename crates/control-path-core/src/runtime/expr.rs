// crates/control-path-core/src/runtime/expr.rs
// ============================================================================
// Module: Expression Interpreter
// Description: Tagged-tree VM over subject/context records.
// Purpose: Evaluate guard and segment expressions to scalar values.
// Dependencies: crate::core, crate::runtime::{bucket, segments}, time, semver, regex
// ============================================================================

//! ## Overview
//! The VM walks a closed [`Expression`] tree and produces a JSON value.
//! Truthiness follows JavaScript rules (`false`, `0`, `""`, `null` are
//! falsy). Property paths are prototype-safe: any path mentioning
//! `__proto__`, `constructor`, or `prototype` yields `null` before any
//! traversal happens. Built-in functions fail closed; wrong arity, wrong
//! argument types, and unknown codes all evaluate to `false`.
//!
//! # Invariants
//! - Evaluation is total: no panic, no error, no host-prototype access.
//! - Repeated evaluation of the same tree over the same view and clock
//!   instant yields identical values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use semver::Version;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;
use time::OffsetDateTime;
use time::Weekday;
use time::format_description::well_known::Rfc3339;

use crate::core::artifact::Artifact;
use crate::core::artifact::BinaryOp;
use crate::core::artifact::Expression;
use crate::core::artifact::LogicalOp;
use crate::core::subject::SubjectView;
use crate::core::time::Clock;
use crate::runtime::bucket::stable_hash64;
use crate::runtime::segments;

// ============================================================================
// SECTION: Function Catalog
// ============================================================================

/// `STARTS_WITH(string, prefix)`.
const FUNC_STARTS_WITH: u8 = 0;
/// `ENDS_WITH(string, suffix)`.
const FUNC_ENDS_WITH: u8 = 1;
/// `CONTAINS(string|list, sub|elem)`.
const FUNC_CONTAINS: u8 = 2;
/// `IN(value, list)`.
const FUNC_IN: u8 = 3;
/// `MATCHES(string, pattern)`.
const FUNC_MATCHES: u8 = 4;
/// `UPPER(string)`.
const FUNC_UPPER: u8 = 5;
/// `LOWER(string)`.
const FUNC_LOWER: u8 = 6;
/// `LENGTH(string|list)`.
const FUNC_LENGTH: u8 = 7;
/// `INTERSECTS(list, list)`.
const FUNC_INTERSECTS: u8 = 8;
/// `SEMVER_EQ(a, b)`.
const FUNC_SEMVER_EQ: u8 = 9;
/// `SEMVER_GT(a, b)`.
const FUNC_SEMVER_GT: u8 = 10;
/// `SEMVER_GTE(a, b)`.
const FUNC_SEMVER_GTE: u8 = 11;
/// `SEMVER_LT(a, b)`.
const FUNC_SEMVER_LT: u8 = 12;
/// `SEMVER_LTE(a, b)`.
const FUNC_SEMVER_LTE: u8 = 13;
/// `HASH(id, buckets)`.
const FUNC_HASH: u8 = 14;
/// `COALESCE(args...)`.
const FUNC_COALESCE: u8 = 15;
/// `IS_BETWEEN(start, end)`.
const FUNC_IS_BETWEEN: u8 = 16;
/// `IS_AFTER(instant)`.
const FUNC_IS_AFTER: u8 = 17;
/// `IS_BEFORE(instant)`.
const FUNC_IS_BEFORE: u8 = 18;
/// `DAY_OF_WEEK()`.
const FUNC_DAY_OF_WEEK: u8 = 19;
/// `HOUR_OF_DAY()`.
const FUNC_HOUR_OF_DAY: u8 = 20;
/// `DAY_OF_MONTH()`.
const FUNC_DAY_OF_MONTH: u8 = 21;
/// `MONTH()`.
const FUNC_MONTH: u8 = 22;
/// `CURRENT_TIMESTAMP()`.
const FUNC_CURRENT_TIMESTAMP: u8 = 23;
/// `IN_SEGMENT(_, name)`.
const FUNC_IN_SEGMENT: u8 = 24;

/// Path segments that must never be traversed.
const FORBIDDEN_SEGMENTS: [&str; 3] = ["__proto__", "constructor", "prototype"];

// ============================================================================
// SECTION: Evaluator
// ============================================================================

/// Expression VM bound to one artifact, subject view, and clock.
///
/// # Invariants
/// - The artifact, view, and clock are immutable for the evaluator's life.
/// - `active_segments` tracks in-progress segment evaluations for cycle
///   short-circuiting.
pub struct Evaluator<'a> {
    /// Artifact supplying the string table and segments.
    artifact: &'a Artifact,
    /// Subject and context records under evaluation.
    view: &'a SubjectView,
    /// Injected time source for temporal built-ins.
    clock: &'a dyn Clock,
    /// Name indices of segments currently being evaluated.
    active_segments: Vec<u16>,
}

impl<'a> Evaluator<'a> {
    /// Creates an evaluator over the given artifact and records.
    #[must_use]
    pub fn new(artifact: &'a Artifact, view: &'a SubjectView, clock: &'a dyn Clock) -> Self {
        Self {
            artifact,
            view,
            clock,
            active_segments: Vec::new(),
        }
    }

    /// Returns the artifact this evaluator runs against.
    #[must_use]
    pub(crate) const fn artifact(&self) -> &'a Artifact {
        self.artifact
    }

    /// Returns true when the named segment is already being evaluated.
    pub(crate) fn segment_in_progress(&self, name_index: u16) -> bool {
        self.active_segments.contains(&name_index)
    }

    /// Marks a segment as in progress.
    pub(crate) fn enter_segment(&mut self, name_index: u16) {
        self.active_segments.push(name_index);
    }

    /// Clears the most recent in-progress segment marker.
    pub(crate) fn exit_segment(&mut self) {
        self.active_segments.pop();
    }

    /// Evaluates an expression to a value.
    pub fn eval(&mut self, expr: &Expression) -> Value {
        match expr {
            Expression::Literal {
                value,
            } => value.clone(),
            Expression::Property {
                path_index,
            } => self.eval_property(*path_index),
            Expression::Binary {
                op,
                left,
                right,
            } => self.eval_binary(*op, left, right),
            Expression::Logical {
                op,
                left,
                right,
            } => self.eval_logical(*op, left, right.as_deref()),
            Expression::Func {
                code,
                args,
            } => self.eval_func(*code, args),
        }
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    /// Resolves a property path against the subject and context records.
    fn eval_property(&self, path_index: u16) -> Value {
        let Some(path) = self.artifact.string_at(path_index) else {
            return Value::Null;
        };
        if path.is_empty() {
            return Value::Null;
        }
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|part| FORBIDDEN_SEGMENTS.contains(part)) {
            return Value::Null;
        }
        match parts.as_slice() {
            ["user"] => Value::Object(self.view.subject.clone()),
            ["context"] => Value::Object(self.view.context.clone()),
            ["user", rest @ ..] => traverse(&self.view.subject, rest).unwrap_or(Value::Null),
            ["context", rest @ ..] => traverse(&self.view.context, rest).unwrap_or(Value::Null),
            _ => match traverse(&self.view.subject, &parts) {
                Some(value) => value,
                None => traverse(&self.view.context, &parts).unwrap_or(Value::Null),
            },
        }
    }

    // ------------------------------------------------------------------
    // Binary and logical operators
    // ------------------------------------------------------------------

    /// Evaluates a binary comparison.
    fn eval_binary(&mut self, op: BinaryOp, left: &Expression, right: &Expression) -> Value {
        let left = self.eval(left);
        let right = self.eval(right);
        let result = match op {
            BinaryOp::Eq => values_equal(&left, &right),
            BinaryOp::Ne => !values_equal(&left, &right),
            BinaryOp::Gt | BinaryOp::Lt | BinaryOp::Gte | BinaryOp::Lte => {
                match (as_number(&left), as_number(&right)) {
                    (Some(l), Some(r)) => match op {
                        BinaryOp::Gt => l > r,
                        BinaryOp::Lt => l < r,
                        BinaryOp::Gte => l >= r,
                        BinaryOp::Lte => l <= r,
                        BinaryOp::Eq | BinaryOp::Ne => false,
                    },
                    _ => false,
                }
            }
        };
        Value::Bool(result)
    }

    /// Evaluates a short-circuit logical connective.
    fn eval_logical(
        &mut self,
        op: LogicalOp,
        left: &Expression,
        right: Option<&Expression>,
    ) -> Value {
        match op {
            LogicalOp::And => {
                let left = self.eval(left);
                if !truthy(&left) {
                    return left;
                }
                right.map_or(Value::Null, |expr| self.eval(expr))
            }
            LogicalOp::Or => {
                let left = self.eval(left);
                if truthy(&left) {
                    return left;
                }
                right.map_or(Value::Null, |expr| self.eval(expr))
            }
            LogicalOp::Not => {
                let left = self.eval(left);
                Value::Bool(!truthy(&left))
            }
        }
    }

    // ------------------------------------------------------------------
    // Built-in functions
    // ------------------------------------------------------------------

    /// Dispatches a built-in function call; failures collapse to `false`.
    fn eval_func(&mut self, code: u8, arg_exprs: &[Expression]) -> Value {
        let args: Vec<Value> = arg_exprs.iter().map(|arg| self.eval(arg)).collect();
        match (code, args.as_slice()) {
            (FUNC_STARTS_WITH, [subject, prefix]) => {
                self.string_pair(subject, prefix, |s, p| Value::Bool(s.starts_with(p)))
            }
            (FUNC_ENDS_WITH, [subject, suffix]) => {
                self.string_pair(subject, suffix, |s, p| Value::Bool(s.ends_with(p)))
            }
            (FUNC_CONTAINS, [Value::Array(list), element]) => {
                Value::Bool(list_contains(list, element))
            }
            (FUNC_CONTAINS, [subject, needle]) => {
                self.string_pair(subject, needle, |s, n| Value::Bool(s.contains(n)))
            }
            (FUNC_IN, [element, Value::Array(list)]) => Value::Bool(list_contains(list, element)),
            (FUNC_MATCHES, [subject, pattern]) => self.string_pair(subject, pattern, |s, p| {
                Value::Bool(Regex::new(p).is_ok_and(|re| re.is_match(s)))
            }),
            (FUNC_UPPER, [subject]) => self
                .string_arg(subject)
                .map_or(Value::Bool(false), |s| Value::String(s.to_uppercase())),
            (FUNC_LOWER, [subject]) => self
                .string_arg(subject)
                .map_or(Value::Bool(false), |s| Value::String(s.to_lowercase())),
            (FUNC_LENGTH, [Value::Array(list)]) => json_usize(list.len()),
            (FUNC_LENGTH, [subject]) => self
                .string_arg(subject)
                .map_or(Value::Bool(false), |s| json_usize(s.chars().count())),
            (FUNC_INTERSECTS, [Value::Array(left), Value::Array(right)]) => {
                Value::Bool(left.iter().any(|item| list_contains(right, item)))
            }
            (
                FUNC_SEMVER_EQ | FUNC_SEMVER_GT | FUNC_SEMVER_GTE | FUNC_SEMVER_LT
                | FUNC_SEMVER_LTE,
                [left, right],
            ) => self.eval_semver(code, left, right),
            (FUNC_HASH, [id, buckets]) => self.eval_hash(id, buckets),
            (FUNC_COALESCE, [first, rest @ ..]) => rest
                .iter()
                .fold(first.clone(), |acc, next| if acc.is_null() { next.clone() } else { acc }),
            (FUNC_IS_BETWEEN, [start, end]) => self.string_pair(start, end, |s, e| {
                match (parse_instant(s), parse_instant(e)) {
                    (Some(start), Some(end)) => {
                        let now = self.clock.now_utc();
                        Value::Bool(now >= start && now <= end)
                    }
                    _ => Value::Bool(false),
                }
            }),
            (FUNC_IS_AFTER, [instant]) => self.temporal_compare(instant, |now, t| now > t),
            (FUNC_IS_BEFORE, [instant]) => self.temporal_compare(instant, |now, t| now < t),
            (FUNC_DAY_OF_WEEK, []) => Value::String(weekday_name(self.clock.now_utc().weekday())),
            (FUNC_HOUR_OF_DAY, []) => json_u8(self.clock.now_utc().hour()),
            (FUNC_DAY_OF_MONTH, []) => json_u8(self.clock.now_utc().day()),
            (FUNC_MONTH, []) => json_u8(u8::from(self.clock.now_utc().month())),
            (FUNC_CURRENT_TIMESTAMP, []) => self
                .clock
                .now_utc()
                .format(&Rfc3339)
                .map_or(Value::Bool(false), Value::String),
            (FUNC_IN_SEGMENT, [_, name]) => {
                let Some(name) = self.string_arg(name) else {
                    return Value::Bool(false);
                };
                let resolved = segments::resolve(self, &name);
                Value::Bool(resolved)
            }
            _ => Value::Bool(false),
        }
    }

    /// Evaluates a semver comparison; malformed versions yield `false`.
    fn eval_semver(&self, code: u8, left: &Value, right: &Value) -> Value {
        let (Some(left), Some(right)) = (self.string_arg(left), self.string_arg(right)) else {
            return Value::Bool(false);
        };
        let (Ok(left), Ok(right)) = (Version::parse(&left), Version::parse(&right)) else {
            return Value::Bool(false);
        };
        let result = match code {
            FUNC_SEMVER_EQ => left == right,
            FUNC_SEMVER_GT => left > right,
            FUNC_SEMVER_GTE => left >= right,
            FUNC_SEMVER_LT => left < right,
            FUNC_SEMVER_LTE => left <= right,
            _ => false,
        };
        Value::Bool(result)
    }

    /// Evaluates `HASH(id, buckets)` into a bucket number.
    fn eval_hash(&self, id: &Value, buckets: &Value) -> Value {
        let Some(id) = self.string_arg(id) else {
            return Value::Bool(false);
        };
        let Some(buckets) = as_number(buckets).filter(|b| b.fract() == 0.0 && *b >= 1.0) else {
            return Value::Bool(false);
        };
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "Bucket count is validated as a positive integer above."
        )]
        let modulus = buckets as u64;
        Value::Number(Number::from(stable_hash64(&id) % modulus))
    }

    /// Compares the current instant against a parsed timestamp argument.
    fn temporal_compare(
        &self,
        instant: &Value,
        compare: impl Fn(OffsetDateTime, OffsetDateTime) -> bool,
    ) -> Value {
        let Some(text) = self.string_arg(instant) else {
            return Value::Bool(false);
        };
        parse_instant(&text)
            .map_or(Value::Bool(false), |parsed| {
                Value::Bool(compare(self.clock.now_utc(), parsed))
            })
    }

    /// Applies a closure over two dereferenced string arguments.
    fn string_pair(
        &self,
        left: &Value,
        right: &Value,
        apply: impl Fn(&str, &str) -> Value,
    ) -> Value {
        match (self.string_arg(left), self.string_arg(right)) {
            (Some(left), Some(right)) => apply(&left, &right),
            _ => Value::Bool(false),
        }
    }

    /// Dereferences a string-typed argument.
    ///
    /// Integer literals that are valid string-table indices resolve through
    /// the table; any other non-string value fails the argument.
    fn string_arg(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => number
                .as_u64()
                .and_then(|index| u16::try_from(index).ok())
                .and_then(|index| self.artifact.string_at(index))
                .map(str::to_string),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Value Semantics
// ============================================================================

/// Returns JavaScript-style truthiness for a value.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Loose scalar equality with numeric and boolean string coercion.
#[must_use]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => l == r,
            _ => false,
        },
        (Value::String(text), Value::Number(number))
        | (Value::Number(number), Value::String(text)) => match text.trim().parse::<f64>() {
            Ok(parsed) => number.as_f64().is_some_and(|n| n == parsed),
            Err(_) => false,
        },
        (Value::String(text), Value::Bool(flag)) | (Value::Bool(flag), Value::String(text)) => {
            (text == "true" && *flag) || (text == "false" && !*flag)
        }
        _ => left == right,
    }
}

/// Coerces a value to a number for ordering comparisons.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Returns true when a list contains an element under loose equality.
fn list_contains(list: &[Value], element: &Value) -> bool {
    list.iter().any(|item| values_equal(item, element))
}

/// Traverses a record along path segments.
///
/// `None` means the final segment was absent (undefined); `Some(Null)` means
/// traversal stopped at a null, missing, or non-object intermediate.
fn traverse(record: &Map<String, Value>, parts: &[&str]) -> Option<Value> {
    let first = parts.first()?;
    let mut current = match record.get(*first) {
        Some(value) => value,
        None if parts.len() == 1 => return None,
        None => return Some(Value::Null),
    };
    for (position, part) in parts.iter().enumerate().skip(1) {
        let Value::Object(object) = current else {
            return Some(Value::Null);
        };
        match object.get(*part) {
            Some(value) => current = value,
            None if position == parts.len() - 1 => return None,
            None => return Some(Value::Null),
        }
    }
    Some(current.clone())
}

/// Parses an RFC 3339 timestamp.
fn parse_instant(text: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(text, &Rfc3339).ok()
}

/// Renders a weekday in the catalog's uppercase form.
fn weekday_name(weekday: Weekday) -> String {
    let name = match weekday {
        Weekday::Sunday => "SUNDAY",
        Weekday::Monday => "MONDAY",
        Weekday::Tuesday => "TUESDAY",
        Weekday::Wednesday => "WEDNESDAY",
        Weekday::Thursday => "THURSDAY",
        Weekday::Friday => "FRIDAY",
        Weekday::Saturday => "SATURDAY",
    };
    name.to_string()
}

/// Builds a JSON number from a list or string length.
fn json_usize(length: usize) -> Value {
    Value::Number(Number::from(length))
}

/// Builds a JSON number from a small calendar component.
fn json_u8(component: u8) -> Value {
    Value::Number(Number::from(component))
}
