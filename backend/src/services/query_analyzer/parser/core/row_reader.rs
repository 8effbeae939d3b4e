//! Row extraction for query-result dumps
//!
//! Dumps arrive either as a bare JSON array, as the REST response envelope
//! (`{"results": [...]}`), and with each row optionally wrapped under its
//! keyspace name, which is what `SELECT * FROM system:<keyspace>` returns.

use crate::services::query_analyzer::parser::error::{ParseError, ParseResult};
use serde_json::Value;

pub struct RowReader;

impl RowReader {
    /// Rows of a dump, each unwrapped from `{"<wrapper>": {...}}` when present
    pub fn read_rows(text: &str, wrapper: &str) -> ParseResult<Vec<Value>> {
        let value: Value = serde_json::from_str(text)?;

        let rows = match value {
            Value::Array(rows) => rows,
            Value::Object(mut envelope) => match envelope.remove("results") {
                Some(Value::Array(rows)) => rows,
                _ => {
                    return Err(ParseError::UnexpectedShape(
                        "expected a JSON array of rows".to_string(),
                    ));
                },
            },
            _ => {
                return Err(ParseError::UnexpectedShape(
                    "expected a JSON array of rows".to_string(),
                ));
            },
        };

        Ok(rows.into_iter().map(|row| Self::unwrap_row(row, wrapper)).collect())
    }

    fn unwrap_row(row: Value, wrapper: &str) -> Value {
        match row {
            Value::Object(mut obj) if obj.len() == 1 && obj.get(wrapper).is_some_and(Value::is_object) => {
                obj.remove(wrapper).unwrap_or(Value::Null)
            },
            other => other,
        }
    }
}
