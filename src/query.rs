use crate::types::RowValues;

/// A SQL string and its bound parameters bundled together.
///
/// Returned by named binding so statement text and positional params stay aligned:
/// ```rust
/// use tx_sequence::prelude::*;
///
/// let qp = QueryAndParams::new(
///     "UPDATE users SET age = $1 WHERE id = $2",
///     vec![RowValues::Int(10), RowValues::Int(1)],
/// );
/// # let _ = qp;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAndParams {
    /// The SQL query string
    pub query: String,
    /// The parameters to be bound to the query
    pub params: Vec<RowValues>,
}

impl QueryAndParams {
    /// Create a new `QueryAndParams` with the given query string and parameters
    pub fn new(query: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            query: query.into(),
            params,
        }
    }

    /// Create a new `QueryAndParams` with no parameters
    pub fn new_without_params(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            params: Vec::new(),
        }
    }
}
