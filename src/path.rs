//! Field path parsing and resolution against a record
//!
//! Supports:
//! - `address.city` — dot-separated descent through objects
//! - `items[0]`, `grid[1][2]` — trailing array indexes on a segment
//! - `a\.b` — a backslash escapes a literal dot (or backslash) in a name

use serde_json::Value;

use crate::error::QueryError;

/// One traversal step of a parsed field path
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Descend into an object key
    Key(String),
    /// Descend into an array index
    Index(usize),
}

/// Resolve a field path against a record.
///
/// Traversal stops early with `Ok(Value::Null)` as soon as the
/// currently-resolved value is null, even if segments remain. A missing key,
/// an out-of-range index or a kind mismatch leaves the path unresolved:
/// `Ok(Value::Null)` when `undefined_equals_null` is set, otherwise
/// [`QueryError::UnknownVariable`]. Malformed paths fail with
/// [`QueryError::InvalidQuery`].
pub fn resolve(
    path: &str,
    record: &Value,
    undefined_equals_null: bool,
) -> Result<Value, QueryError> {
    let steps = parse(path)?;
    let mut current = record;

    for step in &steps {
        if current.is_null() {
            return Ok(Value::Null);
        }
        let next = match (step, current) {
            (Step::Key(key), Value::Object(map)) => map.get(key),
            (Step::Index(index), Value::Array(items)) => items.get(*index),
            _ => None,
        };
        current = match next {
            Some(value) => value,
            None if undefined_equals_null => return Ok(Value::Null),
            None => return Err(QueryError::UnknownVariable(path.to_string())),
        };
    }

    Ok(current.clone())
}

fn parse(path: &str) -> Result<Vec<Step>, QueryError> {
    let mut parser = Parser::new(path);
    parser.parse_steps()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn advance(&mut self, n: usize) {
        self.pos += n;
    }

    fn parse_steps(&mut self) -> Result<Vec<Step>, QueryError> {
        let mut steps = Vec::new();
        self.parse_segment(&mut steps)?;
        while self.peek() == Some('.') {
            self.advance(1);
            self.parse_segment(&mut steps)?;
        }
        Ok(steps)
    }

    fn parse_segment(&mut self, steps: &mut Vec<Step>) -> Result<(), QueryError> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            match c {
                '.' | '[' => break,
                '\\' => {
                    self.advance(1);
                    match self.peek() {
                        Some(escaped) => {
                            name.push(escaped);
                            self.advance(escaped.len_utf8());
                        }
                        None => {
                            return Err(QueryError::InvalidQuery(format!(
                                "dangling escape in path '{}'",
                                self.input
                            )))
                        }
                    }
                }
                _ => {
                    name.push(c);
                    self.advance(c.len_utf8());
                }
            }
        }
        if name.is_empty() {
            return Err(QueryError::InvalidQuery(format!(
                "empty field name in path '{}'",
                self.input
            )));
        }
        steps.push(Step::Key(name));

        while self.peek() == Some('[') {
            self.advance(1);
            let index = self.parse_index()?;
            steps.push(Step::Index(index));
        }

        // A segment ends at a dot or at the end of the path
        match self.peek() {
            None | Some('.') => Ok(()),
            Some(c) => Err(QueryError::InvalidQuery(format!(
                "unexpected '{}' in path '{}'",
                c, self.input
            ))),
        }
    }

    fn parse_index(&mut self) -> Result<usize, QueryError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance(1);
        }
        if self.pos == start {
            return Err(QueryError::InvalidQuery(format!(
                "expected array index in path '{}'",
                self.input
            )));
        }
        let index = self.input[start..self.pos].parse().map_err(|_| {
            QueryError::InvalidQuery(format!("invalid array index in path '{}'", self.input))
        })?;
        match self.peek() {
            Some(']') => {
                self.advance(1);
                Ok(index)
            }
            _ => Err(QueryError::InvalidQuery(format!(
                "unterminated index in path '{}'",
                self.input
            ))),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_top_level_field() {
        let record = json!({ "name": "Alice" });
        assert_eq!(resolve("name", &record, false).unwrap(), json!("Alice"));
    }

    #[test]
    fn test_resolve_nested_field() {
        let record = json!({ "address": { "city": "NYC", "zip": "10001" } });
        assert_eq!(resolve("address.city", &record, false).unwrap(), json!("NYC"));
    }

    #[test]
    fn test_resolve_array_index() {
        let record = json!({ "items": [{ "sku": "a" }, { "sku": "b" }] });
        assert_eq!(resolve("items[1].sku", &record, false).unwrap(), json!("b"));
    }

    #[test]
    fn test_resolve_chained_indexes() {
        let record = json!({ "grid": [[1, 2], [3, 4]] });
        assert_eq!(resolve("grid[1][0]", &record, false).unwrap(), json!(3));
    }

    #[test]
    fn test_resolve_escaped_dot() {
        let record = json!({ "a.b": 7 });
        assert_eq!(resolve("a\\.b", &record, false).unwrap(), json!(7));
    }

    #[test]
    fn test_missing_key_is_unknown_variable() {
        let record = json!({ "a": 1 });
        assert!(matches!(
            resolve("b", &record, false),
            Err(QueryError::UnknownVariable(path)) if path == "b"
        ));
    }

    #[test]
    fn test_missing_key_resolves_null_when_configured() {
        let record = json!({ "a": 1 });
        assert_eq!(resolve("b.c", &record, true).unwrap(), json!(null));
    }

    #[test]
    fn test_out_of_range_index_is_unresolved() {
        let record = json!({ "items": [1] });
        assert!(matches!(
            resolve("items[3]", &record, false),
            Err(QueryError::UnknownVariable(_))
        ));
    }

    #[test]
    fn test_kind_mismatch_is_unresolved() {
        let record = json!({ "a": 42 });
        assert!(matches!(
            resolve("a.b", &record, false),
            Err(QueryError::UnknownVariable(_))
        ));
        assert!(matches!(
            resolve("a[0]", &record, false),
            Err(QueryError::UnknownVariable(_))
        ));
    }

    // Traversal stops at null: the remaining segments are not treated as
    // unresolved even without undefined_equals_null.
    #[test]
    fn test_null_stops_traversal_early() {
        let record = json!({ "a": null });
        assert_eq!(resolve("a.b.c", &record, false).unwrap(), json!(null));
    }

    #[test]
    fn test_malformed_paths_are_invalid_query() {
        let record = json!({ "a": 1 });
        for path in ["", "a.", ".a", "a..b", "a[", "a[x]", "a[1", "a[0]b", "[0]", "a\\"] {
            assert!(
                matches!(resolve(path, &record, false), Err(QueryError::InvalidQuery(_))),
                "path {:?} should be invalid",
                path
            );
        }
    }
}
