//! Query document matching (MongoDB-style predicates over a single record)

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::expr::{ExprContext, OperandEvaluator};
use crate::path;
use crate::value::{
    compare, is_equal, is_equal_object, is_truthy, kind_name, ordering_matches, text_form,
};

/// Declarative predicate over JSON records.
///
/// A `Matcher` holds a query document supplied once at construction and
/// evaluates it against records with [`Matcher::test`]. The document is
/// validated lazily, node by node, during evaluation. Configuration setters
/// may be called any time before `test`; evaluation itself never mutates the
/// matcher or its inputs, so a configured matcher can be shared read-only
/// across threads.
pub struct Matcher {
    query: Value,
    undefined_equals_null: bool,
    strict_mode: bool,
    operand_evaluator: Option<OperandEvaluator>,
}

impl Matcher {
    /// Create a matcher for a query document
    pub fn new(query: Value) -> Self {
        Self {
            query,
            undefined_equals_null: false,
            strict_mode: false,
            operand_evaluator: None,
        }
    }

    /// Treat unresolved field paths as null instead of failing with
    /// [`QueryError::UnknownVariable`]
    pub fn set_undefined_equals_null(&mut self, enabled: bool) {
        self.undefined_equals_null = enabled;
    }

    /// Disallow implicit cross-kind coercion in comparisons
    pub fn set_strict_mode(&mut self, enabled: bool) {
        self.strict_mode = enabled;
    }

    /// Install a transform applied to every aggregation-expression node
    /// before interpretation, enabling external operators. Returning the
    /// node unchanged keeps the builtin behavior; returning anything else
    /// makes that value the node's result.
    pub fn set_operand_evaluator<F>(&mut self, evaluator: F)
    where
        F: Fn(&Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.operand_evaluator = Some(Arc::new(evaluator));
    }

    /// Resolve a field path against a record with this matcher's
    /// undefined-equals-null setting. Exposed for custom operand evaluators.
    pub fn resolve_path(&self, path: &str, record: &Value) -> Result<Value, QueryError> {
        path::resolve(path, record, self.undefined_equals_null)
    }

    /// Evaluate the query document against a record.
    ///
    /// The record must be an object: anything else fails with
    /// [`QueryError::TypeMismatch`] in strict mode and never matches in
    /// lenient mode.
    pub fn test(&self, record: &Value) -> Result<bool, QueryError> {
        if !record.is_object() {
            if self.strict_mode {
                return Err(QueryError::TypeMismatch(format!(
                    "record must be an object, got {}",
                    kind_name(record)
                )));
            }
            return Ok(false);
        }
        let matched = self.eval_document(&self.query, record)?;
        tracing::trace!(matched, "query document evaluated");
        Ok(matched)
    }

    fn eval_document(&self, doc: &Value, record: &Value) -> Result<bool, QueryError> {
        let entries = doc.as_object().ok_or_else(|| {
            QueryError::InvalidQuery(format!(
                "query document must be an object, got {}",
                kind_name(doc)
            ))
        })?;

        // Sibling keys are an implicit AND, evaluated in insertion order.
        // Boolean combination never short-circuits; errors abort immediately.
        let mut matched = true;
        for (key, operand) in entries {
            matched &= self.eval_entry(key, operand, record)?;
        }
        Ok(matched)
    }

    fn eval_entry(&self, key: &str, operand: &Value, record: &Value) -> Result<bool, QueryError> {
        match key {
            "$and" | "$or" | "$nor" => {
                let branches = operand
                    .as_array()
                    .ok_or_else(|| QueryError::InvalidQuery(format!("{} requires an array", key)))?;
                let mut all = true;
                let mut any = false;
                for branch in branches {
                    let matched = self.eval_document(branch, record)?;
                    all &= matched;
                    any |= matched;
                }
                Ok(match key {
                    "$and" => all,
                    "$or" => any,
                    _ => !any,
                })
            }
            "$expr" => {
                let value = self.expr_context().eval(operand, record)?;
                Ok(is_truthy(&value))
            }
            _ if key.starts_with('$') => Err(QueryError::InvalidQuery(format!(
                "Unknown operator: {}",
                key
            ))),
            _ => {
                let value = path::resolve(key, record, self.undefined_equals_null)?;
                self.eval_field(key, &value, operand)
            }
        }
    }

    fn expr_context(&self) -> ExprContext<'_> {
        ExprContext {
            undefined_equals_null: self.undefined_equals_null,
            operand_evaluator: self.operand_evaluator.as_ref(),
        }
    }

    /// Evaluate a field expression against a resolved value. Literals,
    /// arrays, null and objects whose first key is not a query operator
    /// canonicalize to `{$eq: expr}`; otherwise every `{operator: operand}`
    /// entry must hold, in insertion order, with no short-circuit.
    fn eval_field(&self, field: &str, value: &Value, expr: &Value) -> Result<bool, QueryError> {
        let operators = match expr.as_object() {
            Some(map) if map.keys().next().is_some_and(|key| is_query_operator(key)) => map,
            _ => return self.eval_operator("$eq", field, value, expr, None),
        };

        let mut matched = true;
        for (op, operand) in operators {
            matched &= self.eval_operator(op, field, value, operand, Some(operators))?;
        }
        Ok(matched)
    }

    fn eval_operator(
        &self,
        op: &str,
        field: &str,
        value: &Value,
        operand: &Value,
        siblings: Option<&Map<String, Value>>,
    ) -> Result<bool, QueryError> {
        match op {
            "$eq" => self.eval_eq(value, operand),
            "$ne" => self.eval_ne(value, operand),
            "$gt" | "$gte" | "$lt" | "$lte" => {
                let ordering = compare(value, operand, self.strict_mode)?;
                Ok(ordering_matches(op, ordering))
            }
            "$in" => self.membership("$in", value, operand),
            "$nin" => Ok(!self.membership("$nin", value, operand)?),
            "$regex" => self.eval_regex(value, operand, siblings),
            // Consumed as a modifier of $regex; standing alone always holds
            "$options" => Ok(true),
            "$not" => Ok(!self.eval_field(field, value, operand)?),
            _ => Err(QueryError::InvalidQuery(format!(
                "Unknown operator: {}",
                op
            ))),
        }
    }

    fn eval_eq(&self, value: &Value, operand: &Value) -> Result<bool, QueryError> {
        match (value, operand) {
            (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_)) => Ok(is_equal(value, operand)),
            (Value::Null, _) | (_, Value::Null) => Ok(value.is_null() && operand.is_null()),
            (Value::Array(_), Value::Array(_)) => Ok(is_equal(value, operand)),
            // An array field equals a scalar when the scalar is a member
            (Value::Array(items), _) => Ok(items.iter().any(|item| is_equal(item, operand))),
            (Value::Object(left), Value::Object(right)) => Ok(is_equal_object(left, right)),
            (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
                if self.strict_mode {
                    Err(mismatch_error("$eq", value, operand))
                } else {
                    Ok(n.to_string() == *s)
                }
            }
            _ if self.strict_mode => Err(mismatch_error("$eq", value, operand)),
            _ => Ok(false),
        }
    }

    fn eval_ne(&self, value: &Value, operand: &Value) -> Result<bool, QueryError> {
        match (value, operand) {
            (Value::Null, Value::Null)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
            | (Value::Array(_), Value::Array(_))
            | (Value::Object(_), Value::Object(_)) => Ok(!is_equal(value, operand)),
            (Value::Null, _) | (_, Value::Null) => Ok(true),
            (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
                if self.strict_mode {
                    Err(mismatch_error("$ne", value, operand))
                } else {
                    Ok(n.to_string() != *s)
                }
            }
            _ if self.strict_mode => Err(mismatch_error("$ne", value, operand)),
            // Differing kinds with no coercion never compare equal
            _ => Ok(true),
        }
    }

    fn membership(&self, op: &str, value: &Value, operand: &Value) -> Result<bool, QueryError> {
        match operand.as_array() {
            Some(candidates) => Ok(candidates.iter().any(|candidate| is_equal(candidate, value))),
            None if self.strict_mode => Err(QueryError::TypeMismatch(format!(
                "{} requires an array, got {}",
                op,
                kind_name(operand)
            ))),
            None => Ok(false),
        }
    }

    fn eval_regex(
        &self,
        value: &Value,
        operand: &Value,
        siblings: Option<&Map<String, Value>>,
    ) -> Result<bool, QueryError> {
        let pattern = operand
            .as_str()
            .ok_or_else(|| QueryError::InvalidQuery("$regex requires a string".into()))?;

        let options = match siblings.and_then(|map| map.get("$options")) {
            Some(Value::String(flags)) => flags
                .chars()
                .filter(|flag| "imsx".contains(*flag))
                .collect::<String>(),
            Some(other) => {
                return Err(QueryError::InvalidQuery(format!(
                    "$options requires a string, got {}",
                    kind_name(other)
                )))
            }
            None => String::new(),
        };

        let full_pattern = if options.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{}){}", options, pattern)
        };
        let re = regex::Regex::new(&full_pattern)
            .map_err(|e| QueryError::InvalidQuery(format!("invalid $regex pattern: {}", e)))?;
        Ok(re.is_match(&text_form(value)))
    }
}

fn is_query_operator(key: &str) -> bool {
    matches!(
        key,
        "$eq" | "$ne"
            | "$gt"
            | "$gte"
            | "$lt"
            | "$lte"
            | "$in"
            | "$nin"
            | "$regex"
            | "$options"
            | "$not"
    )
}

fn mismatch_error(op: &str, left: &Value, right: &Value) -> QueryError {
    QueryError::TypeMismatch(format!(
        "{} cannot compare {} with {}",
        op,
        kind_name(left),
        kind_name(right)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equality_query() {
        let matcher = Matcher::new(json!({ "name": "Alice" }));

        assert!(matcher.test(&json!({ "name": "Alice", "age": 30 })).unwrap());
        assert!(!matcher.test(&json!({ "name": "Bob", "age": 25 })).unwrap());
    }

    #[test]
    fn test_comparison_operators() {
        let matcher = Matcher::new(json!({
            "age": { "$gte": 18, "$lt": 65 }
        }));

        assert!(matcher.test(&json!({ "age": 30 })).unwrap());
        assert!(!matcher.test(&json!({ "age": 15 })).unwrap());
        assert!(!matcher.test(&json!({ "age": 70 })).unwrap());
    }

    #[test]
    fn test_in_operator() {
        let matcher = Matcher::new(json!({
            "status": { "$in": ["active", "pending"] }
        }));

        assert!(matcher.test(&json!({ "status": "active" })).unwrap());
        assert!(!matcher.test(&json!({ "status": "inactive" })).unwrap());
    }

    #[test]
    fn test_nin_operator() {
        let matcher = Matcher::new(json!({
            "status": { "$nin": ["archived", "deleted"] }
        }));

        assert!(matcher.test(&json!({ "status": "active" })).unwrap());
        assert!(!matcher.test(&json!({ "status": "deleted" })).unwrap());
    }

    #[test]
    fn test_and_operator() {
        let matcher = Matcher::new(json!({
            "$and": [
                { "age": { "$gte": 18 } },
                { "active": true }
            ]
        }));

        assert!(matcher.test(&json!({ "age": 25, "active": true })).unwrap());
        assert!(!matcher.test(&json!({ "age": 25, "active": false })).unwrap());
    }

    #[test]
    fn test_or_operator() {
        let matcher = Matcher::new(json!({
            "$or": [
                { "role": "admin" },
                { "age": { "$gte": 21 } }
            ]
        }));

        assert!(matcher.test(&json!({ "role": "admin", "age": 18 })).unwrap());
        assert!(matcher.test(&json!({ "role": "user", "age": 25 })).unwrap());
        assert!(!matcher.test(&json!({ "role": "user", "age": 18 })).unwrap());
    }

    #[test]
    fn test_nor_operator() {
        let matcher = Matcher::new(json!({
            "$nor": [
                { "role": "admin" },
                { "banned": true }
            ]
        }));

        assert!(matcher.test(&json!({ "role": "user", "banned": false })).unwrap());
        assert!(!matcher.test(&json!({ "role": "admin", "banned": false })).unwrap());
    }

    #[test]
    fn test_empty_logical_operands() {
        assert!(Matcher::new(json!({ "$and": [] })).test(&json!({})).unwrap());
        assert!(!Matcher::new(json!({ "$or": [] })).test(&json!({})).unwrap());
        assert!(Matcher::new(json!({ "$nor": [] })).test(&json!({})).unwrap());
    }

    #[test]
    fn test_empty_document_matches_everything() {
        let matcher = Matcher::new(json!({}));
        assert!(matcher.test(&json!({ "anything": 1 })).unwrap());
    }

    #[test]
    fn test_nested_field() {
        let matcher = Matcher::new(json!({ "address.city": "NYC" }));

        let record = json!({
            "name": "Alice",
            "address": { "city": "NYC", "zip": "10001" }
        });
        assert!(matcher.test(&record).unwrap());
    }

    #[test]
    fn test_object_shorthand_is_structural_equality() {
        let matcher = Matcher::new(json!({ "address": { "city": "NYC", "zip": "10001" } }));

        assert!(matcher
            .test(&json!({ "address": { "zip": "10001", "city": "NYC" } }))
            .unwrap());
        assert!(!matcher
            .test(&json!({ "address": { "city": "NYC" } }))
            .unwrap());
    }

    #[test]
    fn test_array_field_matches_member_scalar() {
        let matcher = Matcher::new(json!({ "tags": "rust" }));

        assert!(matcher.test(&json!({ "tags": ["dev", "rust"] })).unwrap());
        assert!(!matcher.test(&json!({ "tags": ["dev"] })).unwrap());
    }

    #[test]
    fn test_not_operator_reenters_field_dispatch() {
        let matcher = Matcher::new(json!({ "status": { "$not": { "$in": ["a", "b"] } } }));

        assert!(matcher.test(&json!({ "status": "c" })).unwrap());
        assert!(!matcher.test(&json!({ "status": "a" })).unwrap());

        let literal = Matcher::new(json!({ "status": { "$not": "a" } }));
        assert!(literal.test(&json!({ "status": "b" })).unwrap());
    }

    #[test]
    fn test_regex_with_options() {
        let matcher = Matcher::new(json!({ "name": { "$regex": "^ali", "$options": "i" } }));

        assert!(matcher.test(&json!({ "name": "Alice" })).unwrap());
        assert!(!matcher.test(&json!({ "name": "Bob" })).unwrap());

        let plain = Matcher::new(json!({ "name": { "$regex": "^ali" } }));
        assert!(!plain.test(&json!({ "name": "Alice" })).unwrap());
    }

    #[test]
    fn test_options_alone_always_holds() {
        let matcher = Matcher::new(json!({ "name": { "$options": "i" } }));
        assert!(matcher.test(&json!({ "name": "Alice" })).unwrap());
    }

    #[test]
    fn test_invalid_regex_pattern_fails() {
        let matcher = Matcher::new(json!({ "name": { "$regex": "(" } }));
        assert!(matches!(
            matcher.test(&json!({ "name": "x" })),
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_unknown_top_level_operator_fails() {
        let matcher = Matcher::new(json!({ "$where": "x" }));
        assert!(matches!(
            matcher.test(&json!({})),
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_unknown_field_operator_after_recognized_one_fails() {
        let matcher = Matcher::new(json!({ "age": { "$gt": 1, "$bogus": 2 } }));
        assert!(matches!(
            matcher.test(&json!({ "age": 5 })),
            Err(QueryError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_missing_field_is_unknown_variable() {
        let matcher = Matcher::new(json!({ "missing": 1 }));
        assert!(matches!(
            matcher.test(&json!({ "present": 1 })),
            Err(QueryError::UnknownVariable(_))
        ));

        let mut lenient = Matcher::new(json!({ "missing": null }));
        lenient.set_undefined_equals_null(true);
        assert!(lenient.test(&json!({ "present": 1 })).unwrap());
    }

    #[test]
    fn test_strict_mode_rejects_coercion() {
        let mut matcher = Matcher::new(json!({ "myInt": "137" }));
        assert!(matcher.test(&json!({ "myInt": 137 })).unwrap());

        matcher.set_strict_mode(true);
        assert!(matches!(
            matcher.test(&json!({ "myInt": 137 })),
            Err(QueryError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_non_object_record() {
        let matcher = Matcher::new(json!({ "a": 1 }));
        assert!(!matcher.test(&json!(null)).unwrap());
        assert!(!matcher.test(&json!([1, 2])).unwrap());
        assert!(!matcher.test(&json!(42)).unwrap());

        let mut strict = Matcher::new(json!({ "a": 1 }));
        strict.set_strict_mode(true);
        assert!(matches!(
            strict.test(&json!(null)),
            Err(QueryError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_ne_operator() {
        let matcher = Matcher::new(json!({ "status": { "$ne": "archived" } }));
        assert!(matcher.test(&json!({ "status": "active" })).unwrap());
        assert!(!matcher.test(&json!({ "status": "archived" })).unwrap());

        // Kind mismatch without coercion holds unconditionally
        let mixed = Matcher::new(json!({ "status": { "$ne": true } }));
        assert!(mixed.test(&json!({ "status": "active" })).unwrap());

        let coerced = Matcher::new(json!({ "count": { "$ne": "5" } }));
        assert!(!coerced.test(&json!({ "count": 5 })).unwrap());
    }
}
