#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! # docmatch
//!
//! Declarative MongoDB-style predicate engine for JSON records.
//!
//! A query document — a nested [`serde_json::Value`] — is tested against a
//! single in-memory record. Supported:
//! - field paths with dots, array indexes and escaped dots
//!   (`"address.city"`, `"items[0].sku"`, `"a\\.b"`)
//! - comparison operators `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`,
//!   `$in`, `$nin`
//! - `$regex` with `$options` flags, and `$not`
//! - logical `$and`, `$or`, `$nor` plus the implicit AND across sibling keys
//! - `$expr` computed comparisons (`$add`, `$subtract`, `$multiply`,
//!   `$divide`, `$mod`, `$cond`, `$in`, `$not`, `$and`, `$or`, `$ifNull`)
//! - strict / lenient coercion modes and an operand hook for external
//!   operators
//!
//! Evaluation is synchronous and pure: the engine never mutates its inputs
//! and never caches results across calls.
//!
//! # Example
//!
//! ```rust
//! use docmatch::Matcher;
//! use serde_json::json;
//!
//! let matcher = Matcher::new(json!({
//!     "age": { "$gte": 18 },
//!     "$expr": { "$gt": [{ "$add": ["$score", "$bonus"] }, 100] }
//! }));
//! let record = json!({ "age": 30, "score": 80, "bonus": 25 });
//! assert!(matcher.test(&record).unwrap());
//! ```

pub mod error;
pub mod expr;
pub mod matcher;
pub mod path;
pub mod value;

pub use error::QueryError;
pub use expr::OperandEvaluator;
pub use matcher::Matcher;
pub use path::resolve;
pub use value::{compare, is_equal, is_equal_object};
