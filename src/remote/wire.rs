//! Pipeline wire format of the remote SQL endpoint.
//!
//! Arguments and result cells travel as tagged values
//! (`{"type":"integer","value":"5"}`); integers are decimal strings so that
//! 64-bit values survive JSON number handling on the other side.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::RemoteError;

/// A native SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    /// Base64 payload, passed through undecoded.
    Blob(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Tagged value as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireValue {
    Null,
    Integer { value: JsonValue },
    Float { value: JsonValue },
    Text { value: String },
    Blob { base64: String },
}

impl From<&SqlValue> for WireValue {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => WireValue::Null,
            SqlValue::Integer(i) => WireValue::Integer {
                value: JsonValue::String(i.to_string()),
            },
            SqlValue::Float(f) => WireValue::Float {
                value: serde_json::Number::from_f64(*f)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null),
            },
            SqlValue::Text(s) => WireValue::Text { value: s.clone() },
            SqlValue::Blob(b) => WireValue::Blob { base64: b.clone() },
        }
    }
}

impl TryFrom<WireValue> for SqlValue {
    type Error = RemoteError;

    fn try_from(value: WireValue) -> Result<Self, Self::Error> {
        match value {
            WireValue::Null => Ok(SqlValue::Null),
            WireValue::Integer { value } => match &value {
                JsonValue::String(s) => s
                    .parse::<i64>()
                    .map(SqlValue::Integer)
                    .map_err(|e| RemoteError::statement(format!("bad integer cell {s:?}: {e}"))),
                JsonValue::Number(n) => n
                    .as_i64()
                    .map(SqlValue::Integer)
                    .ok_or_else(|| RemoteError::statement(format!("bad integer cell {n}"))),
                other => Err(RemoteError::statement(format!("bad integer cell {other}"))),
            },
            WireValue::Float { value } => match &value {
                JsonValue::Number(n) => Ok(SqlValue::Float(n.as_f64().unwrap_or(0.0))),
                JsonValue::String(s) => s
                    .parse::<f64>()
                    .map(SqlValue::Float)
                    .map_err(|e| RemoteError::statement(format!("bad float cell {s:?}: {e}"))),
                JsonValue::Null => Ok(SqlValue::Null),
                other => Err(RemoteError::statement(format!("bad float cell {other}"))),
            },
            WireValue::Text { value } => Ok(SqlValue::Text(value)),
            WireValue::Blob { base64 } => Ok(SqlValue::Blob(base64)),
        }
    }
}

/// One SQL statement with positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlValue>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(sql: impl Into<String>, args: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    pub fn is_query(&self) -> bool {
        self.sql
            .trim_start()
            .get(..6)
            .map(|head| head.eq_ignore_ascii_case("select"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
pub struct WireStatement {
    pub sql: String,
    pub args: Vec<WireValue>,
}

impl From<&Statement> for WireStatement {
    fn from(stmt: &Statement) -> Self {
        Self {
            sql: stmt.sql.clone(),
            args: stmt.args.iter().map(WireValue::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamRequest {
    Execute { stmt: WireStatement },
    Close,
}

#[derive(Debug, Serialize)]
pub struct PipelineRequest {
    pub requests: Vec<StreamRequest>,
}

impl PipelineRequest {
    /// Executes `statements` in order, then closes the stream.
    pub fn execute_and_close(statements: &[Statement]) -> Self {
        let mut requests: Vec<StreamRequest> = statements
            .iter()
            .map(|s| StreamRequest::Execute { stmt: s.into() })
            .collect();
        requests.push(StreamRequest::Close);
        Self { requests }
    }
}

#[derive(Debug, Deserialize)]
pub struct PipelineResponse {
    #[serde(default)]
    pub baton: Option<String>,
    pub results: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: WireError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamResponse {
    Execute { result: WireResultSet },
    Close,
}

#[derive(Debug, Deserialize)]
pub struct WireError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireColumn {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub decltype: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireResultSet {
    #[serde(default)]
    pub cols: Vec<WireColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<WireValue>>,
    #[serde(default)]
    pub affected_row_count: u64,
}

/// A decoded row, addressed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: HashMap<String, SqlValue>,
}

impl Row {
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, SqlValue)>,
        K: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            SqlValue::Integer(i) => Some(*i),
            SqlValue::Float(f) => Some(*f as i64),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            SqlValue::Integer(i) => Some(*i as f64),
            SqlValue::Float(f) => Some(*f),
            SqlValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            SqlValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// SQLite stores booleans as `0`/`1`.
    pub fn get_bool(&self, column: &str) -> bool {
        self.get_i64(column).map(|v| v == 1).unwrap_or(false)
    }
}

/// Decoded result of one executed statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub affected_row_count: u64,
}

impl TryFrom<WireResultSet> for ResultSet {
    type Error = RemoteError;

    fn try_from(wire: WireResultSet) -> Result<Self, Self::Error> {
        let columns: Vec<String> = wire
            .cols
            .into_iter()
            .enumerate()
            .map(|(i, c)| c.name.unwrap_or_else(|| format!("col{i}")))
            .collect();

        let mut rows = Vec::with_capacity(wire.rows.len());
        for cells in wire.rows {
            let mut pairs = Vec::with_capacity(cells.len());
            for (name, cell) in columns.iter().zip(cells) {
                pairs.push((name.clone(), SqlValue::try_from(cell)?));
            }
            rows.push(Row::from_pairs(pairs));
        }

        Ok(Self {
            columns,
            rows,
            affected_row_count: wire.affected_row_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arguments_are_tagged() {
        let stmt = Statement::with_args(
            "INSERT INTO t VALUES (?, ?, ?, ?)",
            vec![5i64.into(), 1.5f64.into(), "x".into(), SqlValue::Null],
        );
        let request = PipelineRequest::execute_and_close(&[stmt]);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"requests": [
                {"type": "execute", "stmt": {"sql": "INSERT INTO t VALUES (?, ?, ?, ?)", "args": [
                    {"type": "integer", "value": "5"},
                    {"type": "float", "value": 1.5},
                    {"type": "text", "value": "x"},
                    {"type": "null"}
                ]}},
                {"type": "close"}
            ]})
        );
    }

    #[test]
    fn response_rows_are_decoded_by_column() {
        let body = json!({
            "baton": null,
            "results": [
                {"type": "ok", "response": {"type": "execute", "result": {
                    "cols": [{"name": "book_path", "decltype": "TEXT"}, {"name": "scroll_percent"}, {"name": "is_completed"}],
                    "rows": [[
                        {"type": "text", "value": "a.html"},
                        {"type": "float", "value": "42.5"},
                        {"type": "integer", "value": "1"}
                    ]],
                    "affected_row_count": 0
                }}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        });
        let response: PipelineResponse = serde_json::from_value(body).unwrap();
        let StreamResult::Ok { response: StreamResponse::Execute { result } } =
            response.results.into_iter().next().unwrap()
        else {
            panic!("expected execute result");
        };
        let set = ResultSet::try_from(result).unwrap();
        let row = &set.rows[0];
        assert_eq!(row.get_str("book_path"), Some("a.html"));
        assert_eq!(row.get_f64("scroll_percent"), Some(42.5));
        assert!(row.get_bool("is_completed"));
    }

    #[test]
    fn statement_errors_deserialize() {
        let body = json!({"results": [{"type": "error", "error": {"message": "no such table"}}]});
        let response: PipelineResponse = serde_json::from_value(body).unwrap();
        assert!(matches!(
            &response.results[0],
            StreamResult::Error { error } if error.message == "no such table"
        ));
    }

    #[test]
    fn select_detection_ignores_case_and_whitespace() {
        assert!(Statement::new("  select * from x").is_query());
        assert!(!Statement::new("INSERT INTO x VALUES (1)").is_query());
        assert!(!Statement::new("SEL").is_query());
    }
}
