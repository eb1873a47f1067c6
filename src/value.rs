//! Value comparison primitives shared by the query and aggregation layers

use std::cmp::Ordering;

use serde_json::{Map, Number, Value};

use crate::error::QueryError;

/// Human-readable kind name for a value, used in error messages
pub(crate) fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Deep structural equality with numeric-string coercion.
///
/// Scalars of the same kind compare exactly (numbers numerically across
/// integer/float representations). Null only equals Null. Arrays compare
/// pairwise in order, objects by key cardinality and per-key equality. A
/// number and a string are equal when the number's canonical string form
/// equals the string; any other kind pairing is unequal.
pub fn is_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => number_eq(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Null, _) | (_, Value::Null) => a.is_null() && b.is_null(),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(left, right)| is_equal(left, right))
        }
        (Value::Object(x), Value::Object(y)) => is_equal_object(x, y),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            n.to_string() == *s
        }
        _ => false,
    }
}

/// Structural equality of two objects: same key cardinality and every key of
/// `a` present in `b` with an [`is_equal`] value.
pub fn is_equal_object(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| is_equal(value, other)))
}

fn number_eq(a: &Number, b: &Number) -> bool {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn number_cmp(a: &Number, b: &Number) -> Ordering {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => {
            let x = a.as_f64().unwrap_or(0.0);
            let y = b.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
    }
}

/// Relational comparison with strict and lenient coercion policies.
///
/// Numbers compare numerically and strings lexicographically. Null compares
/// as the number 0 against a number and as the empty string against a string,
/// in both modes. Any other kind pairing fails with
/// [`QueryError::TypeMismatch`] in strict mode. In lenient mode a number and
/// a string are compared by parsing the string as a number; when the string
/// does not parse, both operands fall back to lexicographic comparison of
/// their string forms, as does every remaining kind pairing.
pub fn compare(a: &Value, b: &Value, strict: bool) -> Result<Ordering, QueryError> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => Ok(number_cmp(x, y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Null, Value::Null) => Ok(Ordering::Equal),
        (Value::Null, Value::Number(n)) => Ok(number_cmp(&Number::from(0), n)),
        (Value::Number(n), Value::Null) => Ok(number_cmp(n, &Number::from(0))),
        (Value::Null, Value::String(s)) => Ok("".cmp(s.as_str())),
        (Value::String(s), Value::Null) => Ok(s.as_str().cmp("")),
        (Value::Null, other) => Ok(String::new().cmp(&text_form(other))),
        (other, Value::Null) => Ok(text_form(other).cmp(&String::new())),
        _ if strict => Err(QueryError::TypeMismatch(format!(
            "cannot compare {} with {}",
            kind_name(a),
            kind_name(b)
        ))),
        (Value::Number(n), Value::String(s)) => Ok(match s.parse::<f64>() {
            Ok(parsed) => n
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&parsed)
                .unwrap_or(Ordering::Equal),
            Err(_) => n.to_string().cmp(s),
        }),
        (Value::String(s), Value::Number(n)) => Ok(match s.parse::<f64>() {
            Ok(parsed) => parsed
                .partial_cmp(&n.as_f64().unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
            Err(_) => s.cmp(&n.to_string()),
        }),
        _ => Ok(text_form(a).cmp(&text_form(b))),
    }
}

/// True for every value except `false`, null and the number 0
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}

/// String form of a value: strings verbatim, numbers and booleans rendered,
/// null empty, containers as JSON text
pub(crate) fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Maps a relational operator name onto an [`Ordering`]
pub(crate) fn ordering_matches(op: &str, ordering: Ordering) -> bool {
    matches!(
        (op, ordering),
        ("$gt", Ordering::Greater)
            | ("$gte", Ordering::Greater | Ordering::Equal)
            | ("$lt", Ordering::Less)
            | ("$lte", Ordering::Less | Ordering::Equal)
    )
}
