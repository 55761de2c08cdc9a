//! Typed operations on the remote shadow copy.
//!
//! Every method is a single request. Failures are logged and reported as
//! `None`/`false`, which callers read as "sync unavailable now".

use std::sync::Arc;

use log::{debug, warn};
use serde_json::Value as JsonValue;

use crate::local_db_model::{
    Bookmark, Comment, CorrelationKey, Highlight, HighlightColor, ReadingProgress,
};
use crate::remote::transport::PipelineTransport;
use crate::remote::wire::{ResultSet, Row, SqlValue, Statement};

pub const PROGRESS_TABLE: &str = "book_progress";
pub const HIGHLIGHTS_TABLE: &str = "book_highlights";
pub const COMMENTS_TABLE: &str = "book_comments";
pub const BOOKMARKS_TABLE: &str = "book_bookmarks";
pub const SETTINGS_TABLE: &str = "book_settings";

const SCHEMA: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS book_progress (
        book_path TEXT PRIMARY KEY,
        scroll_percent REAL NOT NULL DEFAULT 0,
        is_completed INTEGER NOT NULL DEFAULT 0,
        last_read_at INTEGER,
        total_read_time_ms INTEGER NOT NULL DEFAULT 0,
        updated_at INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS book_highlights (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_path TEXT NOT NULL,
        book_title TEXT,
        text TEXT NOT NULL,
        color TEXT NOT NULL DEFAULT 'yellow',
        element_selector TEXT,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS book_comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_path TEXT NOT NULL,
        book_title TEXT,
        text TEXT NOT NULL,
        element_selector TEXT,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS book_bookmarks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        book_path TEXT NOT NULL,
        book_title TEXT,
        scroll_percent REAL NOT NULL DEFAULT 0,
        note TEXT,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS book_settings (
        key TEXT PRIMARY KEY,
        value TEXT,
        updated_at INTEGER NOT NULL DEFAULT 0
    )",
];

/// Scroll position follows the newer update; completion is sticky and the
/// two counters only grow.
const UPSERT_PROGRESS: &str = "INSERT INTO book_progress (book_path, scroll_percent, is_completed, last_read_at, total_read_time_ms, updated_at)
VALUES (?, ?, ?, ?, ?, ?)
ON CONFLICT(book_path) DO UPDATE SET
  scroll_percent = CASE WHEN excluded.updated_at > book_progress.updated_at THEN excluded.scroll_percent ELSE book_progress.scroll_percent END,
  is_completed = CASE WHEN excluded.is_completed = 1 THEN 1 ELSE book_progress.is_completed END,
  last_read_at = MAX(excluded.last_read_at, book_progress.last_read_at),
  total_read_time_ms = MAX(excluded.total_read_time_ms, book_progress.total_read_time_ms),
  updated_at = MAX(excluded.updated_at, book_progress.updated_at)";

const UPSERT_SETTING: &str = "INSERT INTO book_settings (key, value, updated_at) VALUES (?, ?, ?)
ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at";

/// A progress row as stored remotely.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProgress {
    pub progress: ReadingProgress,
    /// Time of the last push that reached the remote store.
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSetting {
    pub key: String,
    pub value: JsonValue,
    pub updated_at: i64,
}

#[derive(Clone)]
pub struct RemoteClient {
    transport: Arc<dyn PipelineTransport>,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient").finish_non_exhaustive()
    }
}

impl RemoteClient {
    pub fn new(transport: Arc<dyn PipelineTransport>) -> Self {
        Self { transport }
    }

    /// Runs a batch; `None` on any failure.
    pub async fn execute(&self, statements: Vec<Statement>) -> Option<Vec<ResultSet>> {
        let count = statements.len();
        match self.transport.execute(statements).await {
            Ok(sets) => {
                debug!("[sync] executed {count} statement(s)");
                Some(sets)
            }
            Err(e) => {
                warn!("[sync] remote unreachable: {e}");
                None
            }
        }
    }

    /// Runs one statement and returns its result set.
    pub async fn query(&self, statement: Statement) -> Option<ResultSet> {
        self.execute(vec![statement]).await?.into_iter().next()
    }

    async fn mutate(&self, statement: Statement) -> bool {
        self.query(statement).await.is_some()
    }

    async fn select_all(&self, table: &str) -> Option<Vec<Row>> {
        let sql = match table {
            PROGRESS_TABLE | SETTINGS_TABLE => format!("SELECT * FROM {table}"),
            _ => format!("SELECT * FROM {table} ORDER BY created_at DESC"),
        };
        self.query(Statement::new(sql)).await.map(|set| set.rows)
    }

    async fn delete_by_key(&self, table: &str, key: &CorrelationKey) -> bool {
        self.mutate(Statement::with_args(
            format!("DELETE FROM {table} WHERE created_at = ? AND book_path = ?"),
            vec![key.created_at.into(), key.book_path.as_str().into()],
        ))
        .await
    }

    /// Creates the five remote tables when missing.
    pub async fn ensure_schema(&self) -> bool {
        let statements = SCHEMA.iter().map(|sql| Statement::new(*sql)).collect();
        self.execute(statements).await.is_some()
    }

    // ==================== PROGRESS ====================

    /// Upserts `progress`, stamping the row with `updated_at`.
    pub async fn push_progress(&self, progress: &ReadingProgress, updated_at: i64) -> bool {
        let last_read_at = if progress.last_read_at > 0 {
            progress.last_read_at
        } else {
            updated_at
        };
        self.mutate(Statement::with_args(
            UPSERT_PROGRESS,
            vec![
                progress.book_path.as_str().into(),
                progress.scroll_percent.into(),
                progress.is_completed.into(),
                last_read_at.into(),
                progress.total_read_time_ms.into(),
                updated_at.into(),
            ],
        ))
        .await
    }

    pub async fn pull_all_progress(&self) -> Option<Vec<RemoteProgress>> {
        let rows = self.select_all(PROGRESS_TABLE).await?;
        Some(
            rows.iter()
                .filter_map(|row| {
                    let book_path = row.get_str("book_path")?.to_string();
                    Some(RemoteProgress {
                        progress: ReadingProgress {
                            book_path,
                            scroll_percent: row.get_f64("scroll_percent").unwrap_or(0.0),
                            scroll_top: 0.0,
                            last_read_at: row.get_i64("last_read_at").unwrap_or(0),
                            is_completed: row.get_bool("is_completed"),
                            total_read_time_ms: row.get_i64("total_read_time_ms").unwrap_or(0),
                        },
                        updated_at: row.get_i64("updated_at").unwrap_or(0),
                    })
                })
                .collect(),
        )
    }

    // ==================== HIGHLIGHTS ====================

    pub async fn push_highlight(&self, highlight: &Highlight) -> bool {
        self.mutate(Statement::with_args(
            "INSERT INTO book_highlights (book_path, book_title, text, color, element_selector, created_at) VALUES (?, ?, ?, ?, ?, ?)",
            vec![
                highlight.book_path.as_str().into(),
                highlight.book_title.as_str().into(),
                highlight.text.as_str().into(),
                highlight.color.as_str().into(),
                highlight.element_selector.as_str().into(),
                highlight.created_at.into(),
            ],
        ))
        .await
    }

    /// Newest first. Remote ids are not carried over.
    pub async fn pull_all_highlights(&self) -> Option<Vec<Highlight>> {
        let rows = self.select_all(HIGHLIGHTS_TABLE).await?;
        Some(
            rows.iter()
                .filter_map(|row| {
                    Some(Highlight {
                        id: 0,
                        book_path: row.get_str("book_path")?.to_string(),
                        book_title: text_or_empty(row, "book_title"),
                        text: text_or_empty(row, "text"),
                        color: HighlightColor::parse_lossy(row.get_str("color").unwrap_or_default()),
                        element_selector: text_or_empty(row, "element_selector"),
                        created_at: row.get_i64("created_at")?,
                    })
                })
                .collect(),
        )
    }

    pub async fn delete_highlight(&self, key: &CorrelationKey) -> bool {
        self.delete_by_key(HIGHLIGHTS_TABLE, key).await
    }

    // ==================== COMMENTS ====================

    pub async fn push_comment(&self, comment: &Comment) -> bool {
        self.mutate(Statement::with_args(
            "INSERT INTO book_comments (book_path, book_title, text, element_selector, created_at) VALUES (?, ?, ?, ?, ?)",
            vec![
                comment.book_path.as_str().into(),
                comment.book_title.as_str().into(),
                comment.text.as_str().into(),
                comment.element_selector.as_str().into(),
                comment.created_at.into(),
            ],
        ))
        .await
    }

    pub async fn pull_all_comments(&self) -> Option<Vec<Comment>> {
        let rows = self.select_all(COMMENTS_TABLE).await?;
        Some(
            rows.iter()
                .filter_map(|row| {
                    Some(Comment {
                        id: 0,
                        book_path: row.get_str("book_path")?.to_string(),
                        book_title: text_or_empty(row, "book_title"),
                        text: text_or_empty(row, "text"),
                        element_selector: text_or_empty(row, "element_selector"),
                        created_at: row.get_i64("created_at")?,
                    })
                })
                .collect(),
        )
    }

    pub async fn delete_comment(&self, key: &CorrelationKey) -> bool {
        self.delete_by_key(COMMENTS_TABLE, key).await
    }

    // ==================== BOOKMARKS ====================

    pub async fn push_bookmark(&self, bookmark: &Bookmark) -> bool {
        self.mutate(Statement::with_args(
            "INSERT INTO book_bookmarks (book_path, book_title, scroll_percent, note, created_at) VALUES (?, ?, ?, ?, ?)",
            vec![
                bookmark.book_path.as_str().into(),
                bookmark.book_title.as_str().into(),
                bookmark.scroll_percent.into(),
                bookmark.note.as_str().into(),
                bookmark.created_at.into(),
            ],
        ))
        .await
    }

    pub async fn pull_all_bookmarks(&self) -> Option<Vec<Bookmark>> {
        let rows = self.select_all(BOOKMARKS_TABLE).await?;
        Some(
            rows.iter()
                .filter_map(|row| {
                    Some(Bookmark {
                        id: 0,
                        book_path: row.get_str("book_path")?.to_string(),
                        book_title: text_or_empty(row, "book_title"),
                        scroll_percent: row.get_f64("scroll_percent").unwrap_or(0.0),
                        note: text_or_empty(row, "note"),
                        created_at: row.get_i64("created_at")?,
                    })
                })
                .collect(),
        )
    }

    pub async fn delete_bookmark(&self, key: &CorrelationKey) -> bool {
        self.delete_by_key(BOOKMARKS_TABLE, key).await
    }

    // ==================== SETTINGS ====================

    /// Plain last-write upsert; the value is stored JSON-encoded.
    pub async fn push_setting(&self, key: &str, value: &JsonValue, updated_at: i64) -> bool {
        self.mutate(Statement::with_args(
            UPSERT_SETTING,
            vec![
                key.into(),
                SqlValue::Text(value.to_string()),
                updated_at.into(),
            ],
        ))
        .await
    }

    /// Values that are not valid JSON come back as plain strings.
    pub async fn pull_all_settings(&self) -> Option<Vec<RemoteSetting>> {
        let rows = self.select_all(SETTINGS_TABLE).await?;
        Some(
            rows.iter()
                .filter_map(|row| {
                    let key = row.get_str("key")?.to_string();
                    let value = match row.get("value") {
                        Some(SqlValue::Text(raw)) => serde_json::from_str(raw)
                            .unwrap_or_else(|_| JsonValue::String(raw.clone())),
                        Some(SqlValue::Integer(i)) => JsonValue::from(*i),
                        Some(SqlValue::Float(f)) => JsonValue::from(*f),
                        _ => JsonValue::Null,
                    };
                    Some(RemoteSetting {
                        key,
                        value,
                        updated_at: row.get_i64("updated_at").unwrap_or(0),
                    })
                })
                .collect(),
        )
    }
}

fn text_or_empty(row: &Row, column: &str) -> String {
    row.get_str(column).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::SqliteTransport;
    use serde_json::json;

    fn progress(book: &str, percent: f64, completed: bool, last_read_at: i64, total: i64) -> ReadingProgress {
        ReadingProgress {
            book_path: book.to_string(),
            scroll_percent: percent,
            scroll_top: 0.0,
            last_read_at,
            is_completed: completed,
            total_read_time_ms: total,
        }
    }

    async fn client() -> (RemoteClient, Arc<SqliteTransport>) {
        let transport = Arc::new(SqliteTransport::new());
        let client = RemoteClient::new(transport.clone());
        assert!(client.ensure_schema().await);
        (client, transport)
    }

    #[tokio::test]
    async fn progress_upsert_applies_merge_policy() {
        let (client, _) = client().await;
        assert!(client.push_progress(&progress("b", 60.0, true, 500, 9000), 200).await);
        // Older push: scroll is kept, counters keep the max, completion stays.
        assert!(client.push_progress(&progress("b", 10.0, false, 100, 100), 150).await);

        let rows = client.pull_all_progress().await.unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.progress.scroll_percent, 60.0);
        assert!(row.progress.is_completed);
        assert_eq!(row.progress.last_read_at, 500);
        assert_eq!(row.progress.total_read_time_ms, 9000);
        assert_eq!(row.updated_at, 200);

        // Newer push moves the scroll position.
        assert!(client.push_progress(&progress("b", 75.0, false, 600, 100), 300).await);
        let row = &client.pull_all_progress().await.unwrap()[0];
        assert_eq!(row.progress.scroll_percent, 75.0);
        assert!(row.progress.is_completed);
        assert_eq!(row.updated_at, 300);
    }

    #[tokio::test]
    async fn annotations_round_trip_and_delete_by_correlation_key() {
        let (client, transport) = client().await;
        let highlight = Highlight {
            id: 9,
            book_path: "books/a.html".into(),
            book_title: "A".into(),
            text: "quoted".into(),
            color: HighlightColor::Green,
            element_selector: "p:nth-of-type(3)".into(),
            created_at: 1_700,
        };
        assert!(client.push_highlight(&highlight).await);

        let pulled = client.pull_all_highlights().await.unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].color, HighlightColor::Green);
        assert_eq!(pulled[0].id, 0);
        assert_eq!(pulled[0].element_selector, "p:nth-of-type(3)");

        let key = CorrelationKey::new(1_700, "books/a.html");
        assert!(client.delete_highlight(&key).await);
        assert_eq!(transport.count_rows(HIGHLIGHTS_TABLE), 0);
    }

    #[tokio::test]
    async fn settings_are_json_encoded() {
        let (client, transport) = client().await;
        assert!(client.push_setting("fontSize", &json!(18), 1).await);
        assert!(client.push_setting("theme", &json!("sepia"), 1).await);
        transport.execute_raw("INSERT INTO book_settings (key, value, updated_at) VALUES ('legacy', 'plain', 0)");

        let mut settings = client.pull_all_settings().await.unwrap();
        settings.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(settings[0].value, json!(18));
        assert_eq!(settings[1].value, json!("plain"));
        assert_eq!(settings[2].value, json!("sepia"));
    }

    #[tokio::test]
    async fn offline_transport_degrades_to_none() {
        let (client, transport) = client().await;
        transport.set_online(false);
        assert!(client.pull_all_bookmarks().await.is_none());
        assert!(!client.push_setting("zoom", &json!(1.2), 1).await);
    }
}
