//! Notifications emitted by the Local Store after a committed user write.

use serde_json::Value as JsonValue;

use crate::local_db_model::{Bookmark, Comment, CorrelationKey, Highlight, ReadingProgress};

/// A committed local mutation that the remote store should mirror.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Progress(ReadingProgress),
    HighlightAdded(Highlight),
    HighlightDeleted(CorrelationKey),
    CommentAdded(Comment),
    CommentDeleted(CorrelationKey),
    BookmarkAdded(Bookmark),
    BookmarkDeleted(CorrelationKey),
    SettingChanged { key: String, value: JsonValue },
}

impl Change {
    pub fn kind(&self) -> &'static str {
        match self {
            Change::Progress(_) => "progress",
            Change::HighlightAdded(_) => "highlight_added",
            Change::HighlightDeleted(_) => "highlight_deleted",
            Change::CommentAdded(_) => "comment_added",
            Change::CommentDeleted(_) => "comment_deleted",
            Change::BookmarkAdded(_) => "bookmark_added",
            Change::BookmarkDeleted(_) => "bookmark_deleted",
            Change::SettingChanged { .. } => "setting_changed",
        }
    }
}

/// Receiver of [`Change`]s.
///
/// Called synchronously right after the write transaction commits, so
/// implementations must not block; they hand the work off to a task.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: Change);
}
