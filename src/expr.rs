//! Aggregation expression evaluation (the `$expr` sub-language)
//!
//! Expressions are plain JSON values evaluated recursively: `$`-prefixed
//! strings resolve as field references, arrays evaluate element-wise, and
//! one-key objects whose key is a known operator dispatch to that operator.
//! Everything else is a literal.

use std::sync::Arc;

use serde_json::{Number, Value};

use crate::error::QueryError;
use crate::path;
use crate::value::{compare, is_equal, is_truthy, kind_name, ordering_matches};

/// User-supplied transform applied to every expression node before the
/// builtin rules. Returning the node unchanged keeps the builtin behavior;
/// returning anything else makes that value the node's result. This is the
/// extension point for external operators (string concatenation, table
/// lookups) without touching the core.
pub type OperandEvaluator = Arc<dyn Fn(&Value, &Value) -> Value + Send + Sync>;

/// Evaluation context for one expression tree, borrowing the session config
pub(crate) struct ExprContext<'a> {
    pub undefined_equals_null: bool,
    pub operand_evaluator: Option<&'a OperandEvaluator>,
}

impl ExprContext<'_> {
    /// Recursively evaluate an aggregation expression into a single value
    pub fn eval(&self, node: &Value, record: &Value) -> Result<Value, QueryError> {
        if let Some(hook) = self.operand_evaluator {
            let replaced = hook(node, record);
            if replaced != *node {
                return Ok(replaced);
            }
        }

        match node {
            Value::String(s) => match s.strip_prefix('$') {
                Some(field) => path::resolve(field, record, self.undefined_equals_null),
                None => Ok(node.clone()),
            },
            Value::Array(items) => {
                let values: Result<Vec<_>, _> =
                    items.iter().map(|item| self.eval(item, record)).collect();
                Ok(Value::Array(values?))
            }
            Value::Object(map) => match map.iter().next() {
                Some((op, operand)) if map.len() == 1 && op.starts_with('$') => {
                    self.eval_operator(op, operand, record)
                }
                // Any other object is a literal
                _ => Ok(node.clone()),
            },
            _ => Ok(node.clone()),
        }
    }

    fn eval_operator(&self, op: &str, operand: &Value, record: &Value) -> Result<Value, QueryError> {
        match op {
            "$add" | "$multiply" => self.eval_nary_arithmetic(op, operand, record),
            "$subtract" | "$divide" | "$mod" => self.eval_binary_arithmetic(op, operand, record),
            "$eq" | "$ne" | "$gt" | "$gte" | "$lt" | "$lte" => {
                self.eval_comparison(op, operand, record)
            }
            "$cond" => self.eval_cond(operand, record),
            "$not" => self.eval_not(operand, record),
            "$in" => self.eval_in(operand, record),
            "$and" | "$or" => self.eval_boolean(op, operand, record),
            "$ifNull" => self.eval_if_null(operand, record),
            _ => Err(QueryError::InvalidQuery(format!(
                "Unknown expression operator: {}",
                op
            ))),
        }
    }

    fn operand_list<'v>(&self, op: &str, operand: &'v Value) -> Result<&'v Vec<Value>, QueryError> {
        operand
            .as_array()
            .ok_or_else(|| QueryError::InvalidQuery(format!("{} requires an array", op)))
    }

    fn binary_operands<'v>(
        &self,
        op: &str,
        operand: &'v Value,
    ) -> Result<(&'v Value, &'v Value), QueryError> {
        let items = self.operand_list(op, operand)?;
        match items.as_slice() {
            [left, right] => Ok((left, right)),
            _ => Err(QueryError::InvalidQuery(format!(
                "{} requires exactly 2 arguments",
                op
            ))),
        }
    }

    fn eval_numbers(
        &self,
        op: &str,
        items: &[Value],
        record: &Value,
    ) -> Result<Vec<Number>, QueryError> {
        let mut numbers = Vec::with_capacity(items.len());
        for item in items {
            match self.eval(item, record)? {
                Value::Number(n) => numbers.push(n),
                other => {
                    return Err(QueryError::InvalidQuery(format!(
                        "{} requires numeric operands, got {}",
                        op,
                        kind_name(&other)
                    )))
                }
            }
        }
        Ok(numbers)
    }

    fn eval_nary_arithmetic(
        &self,
        op: &str,
        operand: &Value,
        record: &Value,
    ) -> Result<Value, QueryError> {
        let items = self.operand_list(op, operand)?;
        let numbers = self.eval_numbers(op, items, record)?;

        // Integer arithmetic is preserved while every operand is an integer
        if op == "$add" {
            if let Some(total) = integer_fold(&numbers, 0, i64::checked_add) {
                return Ok(Value::from(total));
            }
            finite_number(numbers.iter().map(|n| n.as_f64().unwrap_or(0.0)).sum())
        } else {
            if let Some(total) = integer_fold(&numbers, 1, i64::checked_mul) {
                return Ok(Value::from(total));
            }
            finite_number(numbers.iter().map(|n| n.as_f64().unwrap_or(0.0)).product())
        }
    }

    fn eval_binary_arithmetic(
        &self,
        op: &str,
        operand: &Value,
        record: &Value,
    ) -> Result<Value, QueryError> {
        let (left, right) = self.binary_operands(op, operand)?;
        let numbers = self.eval_numbers(op, &[left.clone(), right.clone()], record)?;
        let (left, right) = (&numbers[0], &numbers[1]);

        if matches!(op, "$divide" | "$mod") && right.as_f64() == Some(0.0) {
            return Err(QueryError::InvalidQuery(format!("{} by zero", op)));
        }

        if let (Some(x), Some(y)) = (left.as_i64(), right.as_i64()) {
            match op {
                "$subtract" => {
                    if let Some(difference) = x.checked_sub(y) {
                        return Ok(Value::from(difference));
                    }
                }
                "$divide" => {
                    if let (Some(0), Some(quotient)) = (x.checked_rem(y), x.checked_div(y)) {
                        return Ok(Value::from(quotient));
                    }
                }
                _ => {
                    if let Some(remainder) = x.checked_rem(y) {
                        return Ok(Value::from(remainder));
                    }
                }
            }
        }

        let x = left.as_f64().unwrap_or(0.0);
        let y = right.as_f64().unwrap_or(0.0);
        match op {
            "$subtract" => finite_number(x - y),
            "$divide" => finite_number(x / y),
            _ => finite_number(x % y),
        }
    }

    fn eval_comparison(&self, op: &str, operand: &Value, record: &Value) -> Result<Value, QueryError> {
        let (left, right) = self.binary_operands(op, operand)?;
        let left = self.eval(left, record)?;
        let right = self.eval(right, record)?;
        let matched = match op {
            "$eq" => is_equal(&left, &right),
            "$ne" => !is_equal(&left, &right),
            // Aggregation comparisons coerce regardless of strict mode
            _ => ordering_matches(op, compare(&left, &right, false)?),
        };
        Ok(Value::Bool(matched))
    }

    fn eval_cond(&self, operand: &Value, record: &Value) -> Result<Value, QueryError> {
        let spec = operand
            .as_object()
            .ok_or_else(|| QueryError::InvalidQuery("$cond requires an object".into()))?;
        let condition = spec
            .get("if")
            .ok_or_else(|| QueryError::InvalidQuery("$cond requires if".into()))?;
        let then_branch = spec
            .get("then")
            .ok_or_else(|| QueryError::InvalidQuery("$cond requires then".into()))?;
        let else_branch = spec
            .get("else")
            .ok_or_else(|| QueryError::InvalidQuery("$cond requires else".into()))?;
        if spec.len() != 3 {
            return Err(QueryError::InvalidQuery(
                "$cond accepts only if, then and else".into(),
            ));
        }

        // Only the selected branch is evaluated
        if is_truthy(&self.eval(condition, record)?) {
            self.eval(then_branch, record)
        } else {
            self.eval(else_branch, record)
        }
    }

    fn eval_not(&self, operand: &Value, record: &Value) -> Result<Value, QueryError> {
        let items = self.operand_list("$not", operand)?;
        match items.as_slice() {
            [inner] => {
                let value = self.eval(inner, record)?;
                Ok(Value::Bool(!is_truthy(&value)))
            }
            _ => Err(QueryError::InvalidQuery(
                "$not requires exactly 1 argument".into(),
            )),
        }
    }

    fn eval_in(&self, operand: &Value, record: &Value) -> Result<Value, QueryError> {
        let (needle, haystack) = self.binary_operands("$in", operand)?;
        let needle = self.eval(needle, record)?;
        match self.eval(haystack, record)? {
            Value::Array(values) => Ok(Value::Bool(
                values.iter().any(|value| is_equal(value, &needle)),
            )),
            other => Err(QueryError::InvalidQuery(format!(
                "$in requires an array as its second argument, got {}",
                kind_name(&other)
            ))),
        }
    }

    fn eval_boolean(&self, op: &str, operand: &Value, record: &Value) -> Result<Value, QueryError> {
        let items = self.operand_list(op, operand)?;
        let mut all = true;
        let mut any = false;
        // Every branch is always evaluated; errors abort immediately
        for item in items {
            let truthy = is_truthy(&self.eval(item, record)?);
            all &= truthy;
            any |= truthy;
        }
        Ok(Value::Bool(if op == "$and" { all } else { any }))
    }

    fn eval_if_null(&self, operand: &Value, record: &Value) -> Result<Value, QueryError> {
        let (value, replacement) = self.binary_operands("$ifNull", operand)?;
        let value = self.eval(value, record)?;
        if value.is_null() {
            self.eval(replacement, record)
        } else {
            Ok(value)
        }
    }
}

fn integer_fold(numbers: &[Number], init: i64, op: fn(i64, i64) -> Option<i64>) -> Option<i64> {
    numbers.iter().try_fold(init, |acc, n| op(acc, n.as_i64()?))
}

fn finite_number(value: f64) -> Result<Value, QueryError> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| QueryError::InvalidQuery("arithmetic produced a non-finite number".into()))
}
