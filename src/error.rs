//! Error types for query evaluation

/// Errors raised while evaluating a query document against a record
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Malformed query or expression structure: unknown operator, wrong
    /// arity, non-array operand where an array is required, empty field
    /// name, invalid regex pattern, zero divisor
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A field path did not resolve in the record and the matcher is not
    /// configured to treat unresolved paths as null
    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    /// Incompatible value kinds in a comparison under strict mode, or a
    /// non-object record under strict mode
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
}
