//! In-process SQLite stand-in for the remote endpoint.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params_from_iter, Connection};

use crate::error::RemoteError;
use crate::remote::transport::PipelineTransport;
use crate::remote::wire::{ResultSet, Row, SqlValue, Statement};

pub struct SqliteTransport {
    conn: Mutex<Connection>,
    online: AtomicBool,
    mutations: AtomicUsize,
    requests: AtomicUsize,
}

impl SqliteTransport {
    pub fn new() -> Self {
        Self {
            conn: Mutex::new(Connection::open_in_memory().unwrap()),
            online: AtomicBool::new(true),
            mutations: AtomicUsize::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Rows changed by INSERT, UPDATE and DELETE statements so far.
    pub fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn count_rows(&self, table: &str) -> i64 {
        let conn = self.conn.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    /// Runs SQL directly, as if another device had written it.
    pub fn execute_raw(&self, sql: &str) {
        self.conn.lock().unwrap().execute_batch(sql).unwrap();
    }

    fn run(conn: &Connection, stmt: &Statement) -> rusqlite::Result<(ResultSet, usize)> {
        let params = params_from_iter(stmt.args.iter().map(to_sqlite));
        if !stmt.is_query() {
            let changed = conn.execute(&stmt.sql, params)?;
            let head = stmt.sql.trim_start().to_ascii_uppercase();
            let is_dml = ["INSERT", "UPDATE", "DELETE"]
                .iter()
                .any(|verb| head.starts_with(verb));
            let changed = if is_dml { changed } else { 0 };
            return Ok((
                ResultSet {
                    affected_row_count: changed as u64,
                    ..ResultSet::default()
                },
                changed,
            ));
        }

        let mut prepared = conn.prepare(&stmt.sql)?;
        let columns: Vec<String> = prepared
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let mut rows = prepared.query(params)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut pairs = Vec::with_capacity(columns.len());
            for (i, name) in columns.iter().enumerate() {
                pairs.push((name.clone(), from_sqlite(row.get_ref(i)?)));
            }
            out.push(Row::from_pairs(pairs));
        }
        Ok((
            ResultSet {
                columns,
                rows: out,
                affected_row_count: 0,
            },
            0,
        ))
    }
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.as_bytes().to_vec()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(String::from_utf8_lossy(b).into_owned()),
    }
}

#[async_trait]
impl PipelineTransport for SqliteTransport {
    async fn execute(&self, statements: Vec<Statement>) -> Result<Vec<ResultSet>, RemoteError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("offline"));
        }
        self.requests.fetch_add(1, Ordering::SeqCst);

        let conn = self.conn.lock().unwrap();
        let mut sets = Vec::with_capacity(statements.len());
        for stmt in &statements {
            let (set, changed) =
                Self::run(&conn, stmt).map_err(|e| RemoteError::statement(e.to_string()))?;
            self.mutations.fetch_add(changed, Ordering::SeqCst);
            sets.push(set);
        }
        Ok(sets)
    }
}
