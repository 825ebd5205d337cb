//! Named-parameter binding.
//!
//! Rewrites `:name` markers into positional placeholders for the target backend and
//! collects the matching values, expanding list bindings for `IN (...)` clauses:
//!
//! ```rust
//! use tx_sequence::prelude::*;
//!
//! let params = NamedParams::new()
//!     .bind("age", RowValues::Int(30))
//!     .bind_list("ids", vec![RowValues::Int(1), RowValues::Int(4)]);
//! let qp = bind_named(
//!     "UPDATE users SET age = :age WHERE id IN (:ids)",
//!     &params,
//!     PlaceholderStyle::Postgres,
//! )?;
//! assert_eq!(qp.query, "UPDATE users SET age = $1 WHERE id IN ($2, $3)");
//! # Ok::<(), SqlMiddlewareDbError>(())
//! ```

use std::collections::HashMap;

use crate::error::SqlMiddlewareDbError;
use crate::query::QueryAndParams;
use crate::translation::{CodeScanner, PlaceholderStyle};
use crate::types::RowValues;

#[derive(Debug, Clone, PartialEq)]
enum Binding {
    Scalar(RowValues),
    List(Vec<RowValues>),
}

/// Values addressed by name for [`bind_named`].
#[derive(Debug, Clone, Default)]
pub struct NamedParams {
    values: HashMap<String, Binding>,
}

impl NamedParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a single value; later bindings of the same name replace earlier ones.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl Into<RowValues>) -> Self {
        self.values.insert(name.into(), Binding::Scalar(value.into()));
        self
    }

    /// Bind a list that expands to one placeholder per element.
    #[must_use]
    pub fn bind_list(mut self, name: impl Into<String>, values: Vec<RowValues>) -> Self {
        self.values.insert(name.into(), Binding::List(values));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, RowValues)> for NamedParams {
    fn from_iter<I: IntoIterator<Item = (String, RowValues)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(name, value)| (name, Binding::Scalar(value)))
                .collect(),
        }
    }
}

/// Rewrite `:name` markers in `sql` into positional placeholders.
///
/// A scalar used more than once keeps a single position. `::` casts, quoted text and
/// comments are skipped.
///
/// # Errors
/// Returns `SqlMiddlewareDbError::ParameterError` when a marker has no binding or a
/// list binding is empty.
pub fn bind_named(
    sql: &str,
    params: &NamedParams,
    style: PlaceholderStyle,
) -> Result<QueryAndParams, SqlMiddlewareDbError> {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut positional: Vec<RowValues> = Vec::new();
    let mut scalar_positions: HashMap<&str, usize> = HashMap::new();
    let mut copied = 0;
    let mut scanner = CodeScanner::new(sql);

    while let Some(idx) = scanner.next() {
        if bytes[idx] != b':' {
            continue;
        }
        // `::type` casts and the second colon of one
        if bytes.get(idx + 1) == Some(&b':') {
            scanner.skip_to(idx + 2);
            continue;
        }
        if idx > 0 && bytes[idx - 1] == b':' {
            continue;
        }
        let name_end = scan_name(bytes, idx + 1);
        if name_end == idx + 1 {
            continue;
        }
        let name = &sql[idx + 1..name_end];
        let binding = params.values.get(name).ok_or_else(|| {
            SqlMiddlewareDbError::ParameterError(format!("no value bound for :{name}"))
        })?;

        out.push_str(&sql[copied..idx]);
        match binding {
            Binding::Scalar(value) => {
                let position = match scalar_positions.get(name) {
                    Some(position) => *position,
                    None => {
                        positional.push(value.clone());
                        scalar_positions.insert(name, positional.len());
                        positional.len()
                    }
                };
                push_placeholder(&mut out, style, position);
            }
            Binding::List(values) => {
                if values.is_empty() {
                    return Err(SqlMiddlewareDbError::ParameterError(format!(
                        "list bound to :{name} is empty"
                    )));
                }
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    positional.push(value.clone());
                    push_placeholder(&mut out, style, positional.len());
                }
            }
        }
        copied = name_end;
        scanner.skip_to(name_end);
    }

    out.push_str(&sql[copied..]);
    Ok(QueryAndParams::new(out, positional))
}

fn scan_name(bytes: &[u8], start: usize) -> usize {
    let mut idx = start;
    if bytes.get(idx).is_some_and(u8::is_ascii_digit) {
        return start;
    }
    while idx < bytes.len() && (bytes[idx].is_ascii_alphanumeric() || bytes[idx] == b'_') {
        idx += 1;
    }
    idx
}

fn push_placeholder(out: &mut String, style: PlaceholderStyle, position: usize) {
    let sigil = match style {
        PlaceholderStyle::Postgres => '$',
        PlaceholderStyle::Sqlite => '?',
    };
    out.push(sigil);
    out.push_str(&position.to_string());
}
