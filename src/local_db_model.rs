//! Record definitions for the six Local Store collections.
//!
//! Every record serializes with the camelCase field names used by the export
//! file, so a snapshot written by [`crate::local_db_state::LocalStore::export_all`]
//! can be read back by any client speaking the same format.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Schema version written into every export and required by every import.
pub const SCHEMA_VERSION: u32 = 1;

/// Upper bound of [`ReadingProgress::scroll_percent`].
pub const MAX_SCROLL_PERCENT: f64 = 100.0;

/// Where a write came from.
///
/// User writes are propagated to the remote store. Writes replayed from a
/// full sync are not, otherwise every pulled record would be pushed straight
/// back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    SyncReplay,
}

impl Origin {
    pub fn propagates(self) -> bool {
        matches!(self, Origin::User)
    }
}

/// Reading position and totals for one book.
///
/// Keyed by `book_path`. Created on first open, merged on every update,
/// never deleted except by a full clear.
///
/// # Invariants
///
/// - `scroll_percent` stays within `0..=100`
/// - `is_completed` never goes back to `false` through normal writes
/// - `last_read_at` and `total_read_time_ms` never decrease
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingProgress {
    pub book_path: String,
    #[serde(default)]
    pub scroll_percent: f64,
    #[serde(default)]
    pub scroll_top: f64,
    #[serde(default)]
    pub last_read_at: i64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub total_read_time_ms: i64,
}

/// A partial progress update. `None` fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_top: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_read_time_ms: Option<i64>,
}

impl ProgressPatch {
    pub fn scroll(percent: f64) -> Self {
        Self {
            scroll_percent: Some(percent),
            ..Self::default()
        }
    }

    pub fn completed() -> Self {
        Self {
            is_completed: Some(true),
            ..Self::default()
        }
    }

    pub fn read_time(total_ms: i64) -> Self {
        Self {
            total_read_time_ms: Some(total_ms),
            ..Self::default()
        }
    }

    pub fn with_scroll_top(mut self, scroll_top: f64) -> Self {
        self.scroll_top = Some(scroll_top);
        self
    }

    pub fn with_last_read_at(mut self, at: i64) -> Self {
        self.last_read_at = Some(at);
        self
    }

    /// Full replacement patch carrying every field of `record`.
    pub fn from_record(record: &ReadingProgress) -> Self {
        Self {
            scroll_percent: Some(record.scroll_percent),
            scroll_top: Some(record.scroll_top),
            last_read_at: Some(record.last_read_at),
            is_completed: Some(record.is_completed),
            total_read_time_ms: Some(record.total_read_time_ms),
        }
    }
}

impl ReadingProgress {
    /// Read-modify-write merge of `patch` over `existing`.
    ///
    /// A first write starts from percent 0, time 0, not completed and
    /// `last_read_at = now`. Completion is OR-ed, the two cumulative
    /// counters take the max.
    pub fn merge(
        book_path: &str,
        existing: Option<&ReadingProgress>,
        patch: &ProgressPatch,
        now_ms: i64,
    ) -> ReadingProgress {
        let scroll_percent = patch
            .scroll_percent
            .or_else(|| existing.map(|e| e.scroll_percent))
            .unwrap_or(0.0);
        let scroll_top = patch
            .scroll_top
            .or_else(|| existing.map(|e| e.scroll_top))
            .unwrap_or(0.0);
        let last_read_at = patch.last_read_at.unwrap_or(now_ms);
        let total_read_time_ms = patch.total_read_time_ms.unwrap_or(0);
        let was_completed = existing.map(|e| e.is_completed).unwrap_or(false);

        ReadingProgress {
            book_path: book_path.to_string(),
            scroll_percent: clamp_percent(scroll_percent),
            scroll_top: if scroll_top.is_finite() { scroll_top.max(0.0) } else { 0.0 },
            last_read_at: existing
                .map(|e| e.last_read_at.max(last_read_at))
                .unwrap_or(last_read_at),
            is_completed: was_completed || patch.is_completed.unwrap_or(false),
            total_read_time_ms: existing
                .map(|e| e.total_read_time_ms.max(total_read_time_ms))
                .unwrap_or(total_read_time_ms.max(0)),
        }
    }
}

pub fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, MAX_SCROLL_PERCENT)
}

/// Natural key correlating a local annotation with its remote shadow row.
///
/// Local ids are auto-incremented per device and never shared, so the pair
/// `(created_at, book_path)` identifies a record across devices. Two
/// annotations on the same book created in the same millisecond collide;
/// that case is accepted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationKey {
    pub created_at: i64,
    pub book_path: String,
}

impl CorrelationKey {
    pub fn new(created_at: i64, book_path: impl Into<String>) -> Self {
        Self {
            created_at,
            book_path: book_path.into(),
        }
    }
}

/// Records that take part in additive (append-only) sync.
pub trait Correlated {
    fn correlation_key(&self) -> CorrelationKey;
}

/// The five highlight colors offered by the reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightColor {
    #[default]
    Yellow,
    Green,
    Blue,
    Pink,
    Orange,
}

impl HighlightColor {
    pub fn as_str(&self) -> &'static str {
        match self {
            HighlightColor::Yellow => "yellow",
            HighlightColor::Green => "green",
            HighlightColor::Blue => "blue",
            HighlightColor::Pink => "pink",
            HighlightColor::Orange => "orange",
        }
    }

    /// Unknown names fall back to yellow.
    pub fn parse_lossy(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "green" => HighlightColor::Green,
            "blue" => HighlightColor::Blue,
            "pink" => HighlightColor::Pink,
            "orange" => HighlightColor::Orange,
            _ => HighlightColor::Yellow,
        }
    }
}

impl<'de> Deserialize<'de> for HighlightColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(HighlightColor::parse_lossy(&name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    #[serde(default)]
    pub id: u64,
    pub book_path: String,
    #[serde(default)]
    pub book_title: String,
    #[serde(default)]
    pub scroll_percent: f64,
    #[serde(default)]
    pub note: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBookmark {
    pub book_path: String,
    #[serde(default)]
    pub book_title: String,
    #[serde(default)]
    pub scroll_percent: f64,
    #[serde(default)]
    pub note: String,
    /// Defaults to now when absent.
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Highlight {
    #[serde(default)]
    pub id: u64,
    pub book_path: String,
    #[serde(default)]
    pub book_title: String,
    pub text: String,
    #[serde(default)]
    pub color: HighlightColor,
    /// Structural locator of the highlighted element inside the book document.
    #[serde(default)]
    pub element_selector: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewHighlight {
    pub book_path: String,
    #[serde(default)]
    pub book_title: String,
    pub text: String,
    #[serde(default)]
    pub color: HighlightColor,
    #[serde(default)]
    pub element_selector: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub id: u64,
    pub book_path: String,
    #[serde(default)]
    pub book_title: String,
    pub text: String,
    #[serde(default)]
    pub element_selector: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub book_path: String,
    #[serde(default)]
    pub book_title: String,
    pub text: String,
    #[serde(default)]
    pub element_selector: String,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl Correlated for Bookmark {
    fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.created_at, self.book_path.clone())
    }
}

impl Correlated for Highlight {
    fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.created_at, self.book_path.clone())
    }
}

impl Correlated for Comment {
    fn correlation_key(&self) -> CorrelationKey {
        CorrelationKey::new(self.created_at, self.book_path.clone())
    }
}

impl From<&Bookmark> for NewBookmark {
    fn from(b: &Bookmark) -> Self {
        Self {
            book_path: b.book_path.clone(),
            book_title: b.book_title.clone(),
            scroll_percent: b.scroll_percent,
            note: b.note.clone(),
            created_at: Some(b.created_at),
        }
    }
}

impl From<&Highlight> for NewHighlight {
    fn from(h: &Highlight) -> Self {
        Self {
            book_path: h.book_path.clone(),
            book_title: h.book_title.clone(),
            text: h.text.clone(),
            color: h.color,
            element_selector: h.element_selector.clone(),
            created_at: Some(h.created_at),
        }
    }
}

impl From<&Comment> for NewComment {
    fn from(c: &Comment) -> Self {
        Self {
            book_path: c.book_path.clone(),
            book_title: c.book_title.clone(),
            text: c.text.clone(),
            element_selector: c.element_selector.clone(),
            created_at: Some(c.created_at),
        }
    }
}

/// Activity for one calendar day (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    pub date: String,
    /// Books opened that day, without duplicates, in first-open order.
    #[serde(default)]
    pub books_opened: Vec<String>,
    #[serde(default)]
    pub minutes_read: i64,
    /// Reserved.
    #[serde(default)]
    pub scroll_distance: f64,
}

impl DailyStat {
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            books_opened: Vec::new(),
            minutes_read: 0,
            scroll_distance: 0.0,
        }
    }

    pub fn has_activity(&self) -> bool {
        !self.books_opened.is_empty() || self.minutes_read > 0
    }

    /// Adds `book_path` unless already present. Returns whether it was added.
    pub fn record_open(&mut self, book_path: &str) -> bool {
        if self.books_opened.iter().any(|b| b == book_path) {
            return false;
        }
        self.books_opened.push(book_path.to_string());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: JsonValue,
}

/// Versioned, full export of the Local Store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    #[serde(rename = "exportedAt")]
    pub exported_at: i64,
    #[serde(default)]
    pub reading_progress: Vec<ReadingProgress>,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
    #[serde(default)]
    pub highlights: Vec<Highlight>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub daily_stats: Vec<DailyStat>,
    #[serde(default)]
    pub settings: Vec<Setting>,
}
