//! Message protocol between the library and the embedded book document.
//!
//! Inbound [`ReaderEvent`]s each map to one Local Store write. Outbound
//! [`ReaderDirective`]s restore presentation and saved state when a book
//! is opened.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::local_db_model::{
    Comment, Highlight, HighlightColor, NewBookmark, NewComment, NewHighlight, Origin,
    ProgressPatch,
};
use crate::local_db_state::LocalStore;

/// Setting holding the path of the book currently open.
pub const CURRENT_BOOK_KEY: &str = "currentBook";

const MS_PER_MINUTE: i64 = 60_000;

/// Events posted by the book document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReaderEvent {
    #[serde(rename_all = "camelCase")]
    ScrollUpdate {
        scroll_percent: f64,
        #[serde(default)]
        scroll_top: f64,
    },
    #[serde(rename_all = "camelCase")]
    HighlightCreated {
        text: String,
        #[serde(default)]
        color: Option<HighlightColor>,
        #[serde(default)]
        element_selector: Option<String>,
    },
    HighlightRemoved {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    CommentCreated {
        text: String,
        #[serde(default)]
        element_selector: Option<String>,
        #[serde(default)]
        selected_text: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BookmarkCreated {
        #[serde(default)]
        note: String,
        #[serde(default)]
        scroll_percent: Option<f64>,
    },
    ReadingComplete,
    ContentLoaded {
        #[serde(default)]
        title: Option<String>,
    },
    ScrollDirection {
        direction: String,
    },
}

/// Messages sent to the book document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReaderDirective {
    SetTheme {
        theme: String,
    },
    #[serde(rename_all = "camelCase")]
    SetFont {
        font_size: f64,
        font_family: String,
    },
    SetZoom {
        zoom: f64,
    },
    #[serde(rename_all = "camelCase")]
    RestorePosition {
        scroll_percent: f64,
        scroll_top: f64,
    },
    RestoreHighlights {
        highlights: Vec<Highlight>,
    },
    RestoreComments {
        comments: Vec<Comment>,
    },
}

/// What applying an event did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventOutcome {
    Stored,
    /// The book was marked completed.
    Completed,
    TitleLoaded(String),
    NoChange,
}

/// Presentation settings with the reader's defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ReaderPreferences {
    pub theme: String,
    pub font_size: f64,
    pub font_family: String,
    pub zoom: f64,
}

impl Default for ReaderPreferences {
    fn default() -> Self {
        Self {
            theme: "dark".to_string(),
            font_size: 18.0,
            font_family: "Tajawal".to_string(),
            zoom: 1.0,
        }
    }
}

impl ReaderPreferences {
    pub fn load(store: &LocalStore) -> Self {
        let defaults = Self::default();
        Self {
            theme: store
                .get_setting("theme")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or(defaults.theme),
            font_size: store
                .get_setting("fontSize")
                .and_then(|v| v.as_f64())
                .unwrap_or(defaults.font_size),
            font_family: store
                .get_setting("fontFamily")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or(defaults.font_family),
            zoom: store
                .get_setting("zoom")
                .and_then(|v| v.as_f64())
                .unwrap_or(defaults.zoom),
        }
    }

    pub fn directives(&self) -> Vec<ReaderDirective> {
        vec![
            ReaderDirective::SetTheme {
                theme: self.theme.clone(),
            },
            ReaderDirective::SetFont {
                font_size: self.font_size,
                font_family: self.font_family.clone(),
            },
            ReaderDirective::SetZoom { zoom: self.zoom },
        ]
    }
}

/// Directives sent once the book document has loaded.
pub fn directives_for_open(store: &LocalStore, book_path: &str) -> Vec<ReaderDirective> {
    let mut directives = ReaderPreferences::load(store).directives();

    if let Some(progress) = store.get_progress(book_path) {
        if progress.scroll_percent > 0.0 {
            directives.push(ReaderDirective::RestorePosition {
                scroll_percent: progress.scroll_percent,
                scroll_top: progress.scroll_top,
            });
        }
    }

    let highlights = store.get_highlights(Some(book_path));
    if !highlights.is_empty() {
        directives.push(ReaderDirective::RestoreHighlights { highlights });
    }
    let comments = store.get_comments(Some(book_path));
    if !comments.is_empty() {
        directives.push(ReaderDirective::RestoreComments { comments });
    }
    directives
}

/// State of the book being read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReaderSession {
    pub book_path: String,
    #[serde(default)]
    pub book_title: String,
    #[serde(default)]
    pub highlight_color: HighlightColor,
    #[serde(default)]
    pub scroll_percent: f64,
    /// When the reading timer started; `None` when not timing.
    #[serde(default)]
    pub reading_started_at: Option<i64>,
    /// Stored reading time when the timer started.
    #[serde(default)]
    pub base_read_time_ms: i64,
}

impl ReaderSession {
    pub fn new(book_path: impl Into<String>, book_title: impl Into<String>) -> Self {
        Self {
            book_path: book_path.into(),
            book_title: book_title.into(),
            highlight_color: HighlightColor::default(),
            scroll_percent: 0.0,
            reading_started_at: None,
            base_read_time_ms: 0,
        }
    }

    /// Records the book as current, logs it as opened today and starts the
    /// reading timer.
    pub fn open(
        store: &LocalStore,
        book_path: &str,
        book_title: &str,
        now_ms: i64,
    ) -> Self {
        store.set_setting(CURRENT_BOOK_KEY, json!(book_path), Origin::User);
        store.log_book_opened(book_path);

        let existing = store.get_progress(book_path);
        Self {
            scroll_percent: existing.as_ref().map(|p| p.scroll_percent).unwrap_or(0.0),
            reading_started_at: Some(now_ms),
            base_read_time_ms: existing.map(|p| p.total_read_time_ms).unwrap_or(0),
            ..Self::new(book_path, book_title)
        }
    }

    /// Applies one inbound event.
    pub fn apply(&mut self, store: &LocalStore, event: ReaderEvent, now_ms: i64) -> EventOutcome {
        match event {
            ReaderEvent::ScrollUpdate {
                scroll_percent,
                scroll_top,
            } => {
                self.scroll_percent = scroll_percent;
                let patch = ProgressPatch::scroll(scroll_percent)
                    .with_scroll_top(scroll_top)
                    .with_last_read_at(now_ms);
                stored(store.save_progress(&self.book_path, &patch, Origin::User).is_some())
            }
            ReaderEvent::HighlightCreated {
                text,
                color,
                element_selector,
            } => {
                let highlight = NewHighlight {
                    book_path: self.book_path.clone(),
                    book_title: self.book_title.clone(),
                    text,
                    color: color.unwrap_or(self.highlight_color),
                    element_selector: element_selector.unwrap_or_default(),
                    created_at: Some(now_ms),
                };
                stored(store.add_highlight(highlight, Origin::User).is_some())
            }
            ReaderEvent::HighlightRemoved { text } => {
                let target = store
                    .get_highlights(Some(&self.book_path))
                    .into_iter()
                    .find(|h| h.text == text);
                match target {
                    Some(h) => stored(store.delete_highlight(h.id, Origin::User)),
                    None => EventOutcome::NoChange,
                }
            }
            ReaderEvent::CommentCreated {
                text,
                element_selector,
                ..
            } => {
                let comment = NewComment {
                    book_path: self.book_path.clone(),
                    book_title: self.book_title.clone(),
                    text,
                    element_selector: element_selector.unwrap_or_default(),
                    created_at: Some(now_ms),
                };
                stored(store.add_comment(comment, Origin::User).is_some())
            }
            ReaderEvent::BookmarkCreated {
                note,
                scroll_percent,
            } => {
                let bookmark = NewBookmark {
                    book_path: self.book_path.clone(),
                    book_title: self.book_title.clone(),
                    scroll_percent: scroll_percent.unwrap_or(self.scroll_percent),
                    note,
                    created_at: Some(now_ms),
                };
                stored(store.add_bookmark(bookmark, Origin::User).is_some())
            }
            ReaderEvent::ReadingComplete => {
                let patch = ProgressPatch::completed().with_last_read_at(now_ms);
                match store.save_progress(&self.book_path, &patch, Origin::User) {
                    Some(_) => EventOutcome::Completed,
                    None => EventOutcome::NoChange,
                }
            }
            ReaderEvent::ContentLoaded { title: Some(title) } => {
                self.book_title = title.clone();
                EventOutcome::TitleLoaded(title)
            }
            ReaderEvent::ContentLoaded { title: None } | ReaderEvent::ScrollDirection { .. } => {
                EventOutcome::NoChange
            }
        }
    }

    fn elapsed_ms(&self, now_ms: i64) -> i64 {
        self.reading_started_at
            .map(|start| (now_ms - start).max(0))
            .unwrap_or(0)
    }

    /// Periodic timer tick: folds the time read so far into the book's total.
    pub fn tick(&self, store: &LocalStore, now_ms: i64) {
        if self.reading_started_at.is_none() {
            return;
        }
        let total = self.base_read_time_ms + self.elapsed_ms(now_ms);
        store.save_progress(
            &self.book_path,
            &ProgressPatch::read_time(total).with_last_read_at(now_ms),
            Origin::User,
        );
    }

    /// Saves the final position, logs the minutes read and clears the
    /// current book.
    pub fn close(mut self, store: &LocalStore, now_ms: i64) {
        if self.scroll_percent > 0.0 {
            let patch = ProgressPatch::scroll(self.scroll_percent).with_last_read_at(now_ms);
            store.save_progress(&self.book_path, &patch, Origin::User);
        }
        if self.reading_started_at.is_some() {
            self.tick(store, now_ms);
            let minutes = ((self.elapsed_ms(now_ms) + MS_PER_MINUTE / 2) / MS_PER_MINUTE).max(1);
            store.log_reading_time(minutes);
            self.reading_started_at = None;
        }
        store.set_setting(CURRENT_BOOK_KEY, JsonValue::Null, Origin::User);
    }
}

fn stored(ok: bool) -> EventOutcome {
    if ok {
        EventOutcome::Stored
    } else {
        EventOutcome::NoChange
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use tempfile::TempDir;

    fn store() -> (TempDir, LocalStore) {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::open(&StoreConfig {
            path: dir.path().join("reader").to_string_lossy().into_owned(),
            ..StoreConfig::default()
        })
        .unwrap();
        (dir, store)
    }

    fn event(json: &str) -> ReaderEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn events_parse_from_document_messages() {
        assert_eq!(
            event(r#"{"type":"SCROLL_UPDATE","scrollPercent":12.5,"scrollTop":300}"#),
            ReaderEvent::ScrollUpdate {
                scroll_percent: 12.5,
                scroll_top: 300.0
            }
        );
        assert_eq!(event(r#"{"type":"READING_COMPLETE"}"#), ReaderEvent::ReadingComplete);
        assert!(matches!(
            event(r#"{"type":"COMMENT_CREATED","text":"hm","elementSelector":"p","selectedText":"x"}"#),
            ReaderEvent::CommentCreated { element_selector: Some(s), .. } if s == "p"
        ));
    }

    #[test]
    fn directives_serialize_with_document_field_names() {
        let value = serde_json::to_value(ReaderDirective::SetFont {
            font_size: 20.0,
            font_family: "Amiri".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"type": "SET_FONT", "fontSize": 20.0, "fontFamily": "Amiri"}));
    }

    #[test]
    fn open_marks_current_book_and_logs_the_day() {
        let (_dir, store) = store();
        let session = ReaderSession::open(&store, "books/a.html", "A", 1_000);
        assert_eq!(store.get_setting(CURRENT_BOOK_KEY), Some(json!("books/a.html")));
        let today = store.get_daily_stats(None).unwrap();
        assert_eq!(today.books_opened, vec!["books/a.html".to_string()]);
        assert_eq!(session.reading_started_at, Some(1_000));
    }

    #[test]
    fn each_event_is_one_store_write() {
        let (_dir, store) = store();
        let mut session = ReaderSession::new("books/a.html", "A");
        session.highlight_color = HighlightColor::Pink;

        let outcome = session.apply(
            &store,
            event(r#"{"type":"SCROLL_UPDATE","scrollPercent":40,"scrollTop":800}"#),
            5_000,
        );
        assert_eq!(outcome, EventOutcome::Stored);
        let progress = store.get_progress("books/a.html").unwrap();
        assert_eq!((progress.scroll_percent, progress.scroll_top), (40.0, 800.0));
        assert_eq!(progress.last_read_at, 5_000);

        session.apply(&store, event(r#"{"type":"HIGHLIGHT_CREATED","text":"line"}"#), 6_000);
        let highlights = store.get_highlights(Some("books/a.html"));
        assert_eq!(highlights[0].color, HighlightColor::Pink);
        assert_eq!(highlights[0].book_title, "A");

        session.apply(&store, event(r#"{"type":"BOOKMARK_CREATED"}"#), 7_000);
        assert_eq!(store.get_bookmarks(None)[0].scroll_percent, 40.0);

        assert_eq!(
            session.apply(&store, event(r#"{"type":"SCROLL_DIRECTION","direction":"down"}"#), 0),
            EventOutcome::NoChange
        );
        assert_eq!(
            session.apply(&store, event(r#"{"type":"READING_COMPLETE"}"#), 0),
            EventOutcome::Completed
        );
        assert!(store.get_progress("books/a.html").unwrap().is_completed);
    }

    #[test]
    fn writes_are_stamped_with_the_session_clock() {
        let (_dir, store) = store();
        let mut session = ReaderSession::open(&store, "a", "A", 1_000);
        session.apply(&store, event(r#"{"type":"HIGHLIGHT_CREATED","text":"h"}"#), 2_000);
        session.apply(&store, event(r#"{"type":"COMMENT_CREATED","text":"c"}"#), 3_000);
        session.apply(&store, event(r#"{"type":"BOOKMARK_CREATED","note":"b"}"#), 4_000);
        assert_eq!(store.get_highlights(Some("a"))[0].created_at, 2_000);
        assert_eq!(store.get_comments(Some("a"))[0].created_at, 3_000);
        assert_eq!(store.get_bookmarks(Some("a"))[0].created_at, 4_000);

        session.tick(&store, 61_000);
        let progress = store.get_progress("a").unwrap();
        assert_eq!((progress.total_read_time_ms, progress.last_read_at), (60_000, 61_000));

        session.apply(&store, event(r#"{"type":"READING_COMPLETE"}"#), 70_000);
        assert_eq!(store.get_progress("a").unwrap().last_read_at, 70_000);
    }

    #[test]
    fn highlight_removed_deletes_first_match_in_the_book() {
        let (_dir, store) = store();
        let mut session = ReaderSession::new("a", "A");
        let mut other = ReaderSession::new("b", "B");
        other.apply(&store, event(r#"{"type":"HIGHLIGHT_CREATED","text":"same"}"#), 1);
        session.apply(&store, event(r#"{"type":"HIGHLIGHT_CREATED","text":"same"}"#), 2);
        session.apply(&store, event(r#"{"type":"HIGHLIGHT_CREATED","text":"same"}"#), 3);

        let outcome = session.apply(&store, event(r#"{"type":"HIGHLIGHT_REMOVED","text":"same"}"#), 0);
        assert_eq!(outcome, EventOutcome::Stored);
        assert_eq!(store.get_highlights(Some("a")).len(), 1);
        assert_eq!(store.get_highlights(Some("b")).len(), 1);

        let outcome = session.apply(&store, event(r#"{"type":"HIGHLIGHT_REMOVED","text":"absent"}"#), 0);
        assert_eq!(outcome, EventOutcome::NoChange);
    }

    #[test]
    fn open_directives_restore_saved_state() {
        let (_dir, store) = store();
        store.set_setting("theme", json!("sepia"), Origin::User);
        let mut session = ReaderSession::new("a", "A");
        session.apply(&store, event(r#"{"type":"SCROLL_UPDATE","scrollPercent":25}"#), 1);
        session.apply(&store, event(r#"{"type":"COMMENT_CREATED","text":"note"}"#), 2);

        let directives = directives_for_open(&store, "a");
        assert_eq!(directives[0], ReaderDirective::SetTheme { theme: "sepia".into() });
        assert!(matches!(directives[1], ReaderDirective::SetFont { font_size, .. } if font_size == 18.0));
        assert!(directives.contains(&ReaderDirective::RestorePosition {
            scroll_percent: 25.0,
            scroll_top: 0.0
        }));
        assert!(matches!(directives.last(), Some(ReaderDirective::RestoreComments { comments }) if comments.len() == 1));
        assert_eq!(directives.len(), 5);

        assert_eq!(directives_for_open(&store, "unread").len(), 3);
    }

    #[test]
    fn close_accumulates_time_and_clears_current_book() {
        let (_dir, store) = store();
        store.save_progress("a", &ProgressPatch::read_time(60_000), Origin::User);
        let mut session = ReaderSession::open(&store, "a", "A", 0);
        session.apply(&store, event(r#"{"type":"SCROLL_UPDATE","scrollPercent":55}"#), 10);
        session.tick(&store, 60_000);
        assert_eq!(store.get_progress("a").unwrap().total_read_time_ms, 120_000);

        session.close(&store, 150_000);
        let progress = store.get_progress("a").unwrap();
        assert_eq!(progress.total_read_time_ms, 210_000);
        assert_eq!(progress.scroll_percent, 55.0);
        assert_eq!(store.get_daily_stats(None).unwrap().minutes_read, 3);
        assert_eq!(store.get_setting(CURRENT_BOOK_KEY), None);
    }
}
