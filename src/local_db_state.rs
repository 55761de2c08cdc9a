//! LMDB-backed Local Store.
//!
//! One environment holds one named database per collection plus a `meta`
//! database for auto-increment sequences. Every operation runs in its own
//! transaction, so each is atomic with respect to its collection.
//!
//! Public collection methods never fail: storage errors are logged and the
//! call resolves to `None`, an empty list, `false`, or nothing. The one
//! exception is [`LocalStore::import_all`], which reports snapshots it
//! refuses to restore.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use lmdb::{Cursor, Database, DatabaseFlags, Environment, RwTransaction, Transaction, WriteFlags};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::change_feed::{Change, ChangeListener};
use crate::config::StoreConfig;
use crate::daily_stats::{self, today_key};
use crate::error::{Result, StoreError};
use crate::local_db_model::{
    Bookmark, Comment, Correlated, DailyStat, Highlight, NewBookmark, NewComment, NewHighlight,
    Origin, ProgressPatch, ReadingProgress, Setting, Snapshot, SCHEMA_VERSION,
};
use crate::now_ms;

/// Named collections of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Progress,
    Bookmarks,
    Highlights,
    Comments,
    DailyStats,
    Settings,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::Progress,
        Collection::Bookmarks,
        Collection::Highlights,
        Collection::Comments,
        Collection::DailyStats,
        Collection::Settings,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Progress => "reading_progress",
            Collection::Bookmarks => "bookmarks",
            Collection::Highlights => "highlights",
            Collection::Comments => "comments",
            Collection::DailyStats => "daily_stats",
            Collection::Settings => "settings",
        }
    }
}

const META_DB: &str = "meta";
const META_SEQ_PREFIX: &str = "seq:";

#[derive(Debug, Clone, Copy)]
struct Databases {
    progress: Database,
    bookmarks: Database,
    highlights: Database,
    comments: Database,
    daily_stats: Database,
    settings: Database,
    meta: Database,
}

impl Databases {
    fn get(&self, collection: Collection) -> Database {
        match collection {
            Collection::Progress => self.progress,
            Collection::Bookmarks => self.bookmarks,
            Collection::Highlights => self.highlights,
            Collection::Comments => self.comments,
            Collection::DailyStats => self.daily_stats,
            Collection::Settings => self.settings,
        }
    }
}

/// Auto-increment collections whose records are correlated by `(createdAt, bookPath)`.
trait Annotation: Serialize + DeserializeOwned + Correlated + Clone {
    const COLLECTION: Collection;
    fn set_id(&mut self, id: u64);
    fn book_path(&self) -> &str;
}

impl Annotation for Bookmark {
    const COLLECTION: Collection = Collection::Bookmarks;
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn book_path(&self) -> &str {
        &self.book_path
    }
}

impl Annotation for Highlight {
    const COLLECTION: Collection = Collection::Highlights;
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn book_path(&self) -> &str {
        &self.book_path
    }
}

impl Annotation for Comment {
    const COLLECTION: Collection = Collection::Comments;
    fn set_id(&mut self, id: u64) {
        self.id = id;
    }
    fn book_path(&self) -> &str {
        &self.book_path
    }
}

fn id_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn get_json<T: DeserializeOwned, Txn: Transaction>(
    txn: &Txn,
    db: Database,
    key: &[u8],
) -> Result<Option<T>> {
    match txn.get(db, &key) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
        Err(lmdb::Error::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn put_json<T: Serialize>(txn: &mut RwTransaction<'_>, db: Database, key: &[u8], value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    txn.put(db, &key, &bytes, WriteFlags::empty())?;
    Ok(())
}

fn scan_json<T: DeserializeOwned, Txn: Transaction>(txn: &Txn, db: Database) -> Result<Vec<T>> {
    let mut cursor = txn.open_ro_cursor(db)?;
    let mut items = Vec::new();
    for (_key, value) in cursor.iter() {
        items.push(serde_json::from_slice(value)?);
    }
    Ok(items)
}

fn next_sequence(txn: &mut RwTransaction<'_>, meta: Database, collection: Collection) -> Result<u64> {
    let key = format!("{META_SEQ_PREFIX}{}", collection.name());
    let current = match txn.get(meta, &key) {
        Ok(bytes) if bytes.len() == 8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            u64::from_be_bytes(raw)
        }
        Ok(_) => return Err(StoreError::Lmdb(lmdb::Error::Corrupted)),
        Err(lmdb::Error::NotFound) => 0,
        Err(e) => return Err(e.into()),
    };
    let next = current + 1;
    txn.put(meta, &key, &next.to_be_bytes(), WriteFlags::empty())?;
    Ok(next)
}

/// Every record must name its book (or date, or key) before anything is cleared.
fn validate_snapshot(snapshot: &Snapshot) -> Result<()> {
    let unnamed_book = snapshot
        .reading_progress
        .iter()
        .map(|p| p.book_path.as_str())
        .chain(snapshot.bookmarks.iter().map(|b| b.book_path.as_str()))
        .chain(snapshot.highlights.iter().map(|h| h.book_path.as_str()))
        .chain(snapshot.comments.iter().map(|c| c.book_path.as_str()))
        .any(|path| path.trim().is_empty());
    if unnamed_book {
        return Err(StoreError::invalid_snapshot("record without bookPath"));
    }
    if let Some(stat) = snapshot
        .daily_stats
        .iter()
        .find(|s| daily_stats::parse_date_key(&s.date).is_none())
    {
        return Err(StoreError::invalid_snapshot(format!(
            "daily stat with malformed date {:?}",
            stat.date
        )));
    }
    if snapshot.settings.iter().any(|s| s.key.is_empty()) {
        return Err(StoreError::invalid_snapshot("setting without key"));
    }
    Ok(())
}

/// Logs a swallowed failure and falls back to the type's default.
fn or_default<T: Default>(operation: &str, result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!("{operation} failed: {e}");
            T::default()
        }
    }
}

/// The single source of truth for reading data on this device.
pub struct LocalStore {
    env: Environment,
    dbs: Databases,
    path: PathBuf,
    listener: RwLock<Option<Arc<dyn ChangeListener>>>,
    writes: AtomicU64,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("path", &self.path)
            .field("writes", &self.writes.load(Ordering::Relaxed))
            .finish()
    }
}

impl LocalStore {
    /// Opens (or creates) the environment at `<config.path>.lmdb`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let path = PathBuf::from(format!("{}.lmdb", config.path));
        std::fs::create_dir_all(&path)?;

        info!("Opening local store at {}", path.display());
        let env = Environment::new()
            .set_max_dbs(8)
            .set_map_size(config.map_size_bytes)
            .open(&path)?;

        let dbs = Databases {
            progress: env.create_db(Some(Collection::Progress.name()), DatabaseFlags::empty())?,
            bookmarks: env.create_db(Some(Collection::Bookmarks.name()), DatabaseFlags::empty())?,
            highlights: env.create_db(Some(Collection::Highlights.name()), DatabaseFlags::empty())?,
            comments: env.create_db(Some(Collection::Comments.name()), DatabaseFlags::empty())?,
            daily_stats: env.create_db(Some(Collection::DailyStats.name()), DatabaseFlags::empty())?,
            settings: env.create_db(Some(Collection::Settings.name()), DatabaseFlags::empty())?,
            meta: env.create_db(Some(META_DB), DatabaseFlags::empty())?,
        };

        Ok(Self {
            env,
            dbs,
            path,
            listener: RwLock::new(None),
            writes: AtomicU64::new(0),
        })
    }

    /// Opens a store named `name` with default sizing.
    pub fn init(name: impl Into<String>) -> Result<Self> {
        Self::open(&StoreConfig {
            path: name.into(),
            ..StoreConfig::default()
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Installs the receiver of user-originated changes.
    pub fn set_listener(&self, listener: Arc<dyn ChangeListener>) {
        match self.listener.write() {
            Ok(mut slot) => *slot = Some(listener),
            Err(_) => warn!("Change listener lock poisoned; listener not installed"),
        }
    }

    pub fn clear_listener(&self) {
        if let Ok(mut slot) = self.listener.write() {
            *slot = None;
        }
    }

    /// Number of write transactions committed since open.
    pub fn committed_writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn emit(&self, origin: Origin, change: impl FnOnce() -> Change) {
        if !origin.propagates() {
            return;
        }
        let listener = match self.listener.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(listener) = listener {
            listener.on_change(change());
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut RwTransaction<'_>, &Databases) -> Result<R>) -> Result<R> {
        let mut txn = self.env.begin_rw_txn()?;
        let out = f(&mut txn, &self.dbs)?;
        txn.commit()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(out)
    }

    fn read_one<T: DeserializeOwned>(&self, collection: Collection, key: &[u8]) -> Result<Option<T>> {
        let txn = self.env.begin_ro_txn()?;
        get_json(&txn, self.dbs.get(collection), key)
    }

    fn read_all<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        let txn = self.env.begin_ro_txn()?;
        scan_json(&txn, self.dbs.get(collection))
    }

    // ==================== READING PROGRESS ====================

    pub fn try_get_progress(&self, book_path: &str) -> Result<Option<ReadingProgress>> {
        self.read_one(Collection::Progress, book_path.as_bytes())
    }

    pub fn get_progress(&self, book_path: &str) -> Option<ReadingProgress> {
        or_default("get_progress", self.try_get_progress(book_path))
    }

    /// Read-modify-write merge of `patch` into the record for `book_path`.
    ///
    /// Returns the stored record.
    pub fn try_save_progress(
        &self,
        book_path: &str,
        patch: &ProgressPatch,
        origin: Origin,
    ) -> Result<ReadingProgress> {
        let now = now_ms();
        let merged = self.write(|txn, dbs| {
            let existing: Option<ReadingProgress> = get_json(&*txn, dbs.progress, book_path.as_bytes())?;
            let merged = ReadingProgress::merge(book_path, existing.as_ref(), patch, now);
            put_json(txn, dbs.progress, book_path.as_bytes(), &merged)?;
            Ok(merged)
        })?;
        debug!("Saved progress for {book_path}: {:.1}%", merged.scroll_percent);
        self.emit(origin, || Change::Progress(merged.clone()));
        Ok(merged)
    }

    pub fn save_progress(
        &self,
        book_path: &str,
        patch: &ProgressPatch,
        origin: Origin,
    ) -> Option<ReadingProgress> {
        or_default(
            "save_progress",
            self.try_save_progress(book_path, patch, origin).map(Some),
        )
    }

    pub fn get_all_progress(&self) -> Vec<ReadingProgress> {
        or_default("get_all_progress", self.read_all(Collection::Progress))
    }

    pub fn mark_completed(&self, book_path: &str) -> Option<ReadingProgress> {
        self.save_progress(book_path, &ProgressPatch::completed(), Origin::User)
    }

    pub fn get_completed_books(&self) -> Vec<ReadingProgress> {
        self.get_all_progress()
            .into_iter()
            .filter(|p| p.is_completed)
            .collect()
    }

    pub fn get_in_progress_books(&self) -> Vec<ReadingProgress> {
        self.get_all_progress()
            .into_iter()
            .filter(|p| !p.is_completed)
            .collect()
    }

    // ==================== ANNOTATIONS (shared) ====================

    fn insert_annotation<T: Annotation>(&self, mut record: T) -> Result<T> {
        self.write(|txn, dbs| {
            let id = next_sequence(txn, dbs.meta, T::COLLECTION)?;
            record.set_id(id);
            put_json(txn, dbs.get(T::COLLECTION), &id_key(id), &record)?;
            Ok(record)
        })
    }

    fn list_annotations<T: Annotation>(&self, book_path: Option<&str>) -> Result<Vec<T>> {
        let all: Vec<T> = self.read_all(T::COLLECTION)?;
        Ok(match book_path {
            Some(book) => all.into_iter().filter(|r| r.book_path() == book).collect(),
            None => all,
        })
    }

    /// Fetches the record first so the caller can correlate the deletion remotely.
    fn remove_annotation<T: Annotation>(&self, id: u64) -> Result<Option<T>> {
        self.write(|txn, dbs| {
            let db = dbs.get(T::COLLECTION);
            let key = id_key(id);
            let existing: Option<T> = get_json(&*txn, db, &key)?;
            if existing.is_some() {
                txn.del(db, &key, None)?;
            }
            Ok(existing)
        })
    }

    // ==================== BOOKMARKS ====================

    pub fn add_bookmark(&self, bookmark: NewBookmark, origin: Origin) -> Option<u64> {
        let record = Bookmark {
            id: 0,
            book_path: bookmark.book_path,
            book_title: bookmark.book_title,
            scroll_percent: crate::local_db_model::clamp_percent(bookmark.scroll_percent),
            note: bookmark.note,
            created_at: bookmark.created_at.unwrap_or_else(now_ms),
        };
        let stored = or_default("add_bookmark", self.insert_annotation(record).map(Some))?;
        let id = stored.id;
        self.emit(origin, || Change::BookmarkAdded(stored));
        Some(id)
    }

    pub fn get_bookmark(&self, id: u64) -> Option<Bookmark> {
        or_default("get_bookmark", self.read_one(Collection::Bookmarks, &id_key(id)))
    }

    pub fn get_bookmarks(&self, book_path: Option<&str>) -> Vec<Bookmark> {
        or_default("get_bookmarks", self.list_annotations(book_path))
    }

    /// Returns whether a bookmark was removed.
    pub fn delete_bookmark(&self, id: u64, origin: Origin) -> bool {
        match or_default("delete_bookmark", self.remove_annotation::<Bookmark>(id)) {
            Some(removed) => {
                self.emit(origin, || Change::BookmarkDeleted(removed.correlation_key()));
                true
            }
            None => false,
        }
    }

    // ==================== HIGHLIGHTS ====================

    pub fn add_highlight(&self, highlight: NewHighlight, origin: Origin) -> Option<u64> {
        let record = Highlight {
            id: 0,
            book_path: highlight.book_path,
            book_title: highlight.book_title,
            text: highlight.text,
            color: highlight.color,
            element_selector: highlight.element_selector,
            created_at: highlight.created_at.unwrap_or_else(now_ms),
        };
        let stored = or_default("add_highlight", self.insert_annotation(record).map(Some))?;
        let id = stored.id;
        self.emit(origin, || Change::HighlightAdded(stored));
        Some(id)
    }

    pub fn get_highlight(&self, id: u64) -> Option<Highlight> {
        or_default("get_highlight", self.read_one(Collection::Highlights, &id_key(id)))
    }

    pub fn get_highlights(&self, book_path: Option<&str>) -> Vec<Highlight> {
        or_default("get_highlights", self.list_annotations(book_path))
    }

    pub fn delete_highlight(&self, id: u64, origin: Origin) -> bool {
        match or_default("delete_highlight", self.remove_annotation::<Highlight>(id)) {
            Some(removed) => {
                self.emit(origin, || Change::HighlightDeleted(removed.correlation_key()));
                true
            }
            None => false,
        }
    }

    // ==================== COMMENTS ====================

    pub fn add_comment(&self, comment: NewComment, origin: Origin) -> Option<u64> {
        let record = Comment {
            id: 0,
            book_path: comment.book_path,
            book_title: comment.book_title,
            text: comment.text,
            element_selector: comment.element_selector,
            created_at: comment.created_at.unwrap_or_else(now_ms),
        };
        let stored = or_default("add_comment", self.insert_annotation(record).map(Some))?;
        let id = stored.id;
        self.emit(origin, || Change::CommentAdded(stored));
        Some(id)
    }

    pub fn get_comment(&self, id: u64) -> Option<Comment> {
        or_default("get_comment", self.read_one(Collection::Comments, &id_key(id)))
    }

    pub fn get_comments(&self, book_path: Option<&str>) -> Vec<Comment> {
        or_default("get_comments", self.list_annotations(book_path))
    }

    pub fn delete_comment(&self, id: u64, origin: Origin) -> bool {
        match or_default("delete_comment", self.remove_annotation::<Comment>(id)) {
            Some(removed) => {
                self.emit(origin, || Change::CommentDeleted(removed.correlation_key()));
                true
            }
            None => false,
        }
    }

    // ==================== DAILY STATS ====================

    /// Stats for `date` (`YYYY-MM-DD`), or today when `None`.
    pub fn get_daily_stats(&self, date: Option<&str>) -> Option<DailyStat> {
        let key = date.map(str::to_string).unwrap_or_else(today_key);
        or_default("get_daily_stats", self.read_one(Collection::DailyStats, key.as_bytes()))
    }

    fn update_day(&self, date: &str, update: impl FnOnce(&mut DailyStat)) -> Result<DailyStat> {
        self.write(|txn, dbs| {
            let mut stat: DailyStat = get_json(&*txn, dbs.daily_stats, date.as_bytes())?
                .unwrap_or_else(|| DailyStat::empty(date));
            update(&mut stat);
            put_json(txn, dbs.daily_stats, date.as_bytes(), &stat)?;
            Ok(stat)
        })
    }

    pub fn log_book_opened_on(&self, date: &str, book_path: &str) {
        or_default(
            "log_book_opened",
            self.update_day(date, |stat| {
                stat.record_open(book_path);
            })
            .map(|_| ()),
        )
    }

    pub fn log_book_opened(&self, book_path: &str) {
        self.log_book_opened_on(&today_key(), book_path)
    }

    pub fn log_reading_time_on(&self, date: &str, minutes: i64) {
        or_default(
            "log_reading_time",
            self.update_day(date, |stat| stat.minutes_read += minutes.max(0))
                .map(|_| ()),
        )
    }

    pub fn log_reading_time(&self, minutes: i64) {
        self.log_reading_time_on(&today_key(), minutes)
    }

    /// All stats whose date lies in `start..=end`, ordered by date.
    pub fn get_stats_range(&self, start: &str, end: &str) -> Vec<DailyStat> {
        self.all_daily_stats()
            .into_iter()
            .filter(|s| daily_stats::in_range(&s.date, start, end))
            .collect()
    }

    fn all_daily_stats(&self) -> Vec<DailyStat> {
        or_default("get_all_daily_stats", self.read_all(Collection::DailyStats))
    }

    fn stats_by_date(&self) -> HashMap<String, DailyStat> {
        self.all_daily_stats()
            .into_iter()
            .map(|s| (s.date.clone(), s))
            .collect()
    }

    pub fn get_streak_on(&self, today: chrono::NaiveDate) -> u32 {
        daily_stats::current_streak(&self.stats_by_date(), today)
    }

    pub fn get_streak(&self) -> u32 {
        self.get_streak_on(daily_stats::today())
    }

    pub fn get_best_streak_on(&self, today: chrono::NaiveDate) -> u32 {
        daily_stats::best_streak(&self.stats_by_date(), today)
    }

    pub fn get_best_streak(&self) -> u32 {
        self.get_best_streak_on(daily_stats::today())
    }

    // ==================== SETTINGS ====================

    /// A stored JSON `null` reads as absent.
    pub fn get_setting(&self, key: &str) -> Option<JsonValue> {
        let setting: Option<Setting> =
            or_default("get_setting", self.read_one(Collection::Settings, key.as_bytes()));
        setting.map(|s| s.value).filter(|v| !v.is_null())
    }

    pub fn set_setting(&self, key: &str, value: JsonValue, origin: Origin) -> bool {
        let setting = Setting {
            key: key.to_string(),
            value,
        };
        let stored = self.write(|txn, dbs| put_json(txn, dbs.settings, key.as_bytes(), &setting));
        match stored {
            Ok(()) => {
                self.emit(origin, || Change::SettingChanged {
                    key: setting.key,
                    value: setting.value,
                });
                true
            }
            Err(e) => {
                warn!("set_setting failed: {e}");
                false
            }
        }
    }

    pub fn get_all_settings(&self) -> Vec<Setting> {
        or_default("get_all_settings", self.read_all(Collection::Settings))
    }

    // ==================== EXPORT / IMPORT ====================

    pub fn try_export_all(&self) -> Result<Snapshot> {
        let txn = self.env.begin_ro_txn()?;
        Ok(Snapshot {
            version: SCHEMA_VERSION,
            exported_at: now_ms(),
            reading_progress: scan_json(&txn, self.dbs.progress)?,
            bookmarks: scan_json(&txn, self.dbs.bookmarks)?,
            highlights: scan_json(&txn, self.dbs.highlights)?,
            comments: scan_json(&txn, self.dbs.comments)?,
            daily_stats: scan_json(&txn, self.dbs.daily_stats)?,
            settings: scan_json(&txn, self.dbs.settings)?,
        })
    }

    /// Consistent snapshot of all six collections, or `None` on failure.
    pub fn export_all(&self) -> Option<Snapshot> {
        or_default("export_all", self.try_export_all().map(Some))
    }

    pub fn export_json(&self) -> Option<String> {
        let snapshot = self.export_all()?;
        or_default(
            "export_json",
            serde_json::to_string_pretty(&snapshot)
                .map(Some)
                .map_err(StoreError::from),
        )
    }

    /// Destructive restore: every collection is emptied, then refilled.
    ///
    /// Fails with [`StoreError::VersionMismatch`] before touching anything
    /// when the snapshot was written by another schema version, and with
    /// [`StoreError::InvalidSnapshot`] when a record lacks its key. Annotation
    /// ids are reassigned. Nothing is propagated remotely.
    pub fn import_all(&self, snapshot: &Snapshot) -> Result<()> {
        if snapshot.version != SCHEMA_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found: Some(u64::from(snapshot.version)),
            });
        }
        validate_snapshot(snapshot)?;

        let now = now_ms();
        self.write(|txn, dbs| {
            for collection in Collection::ALL {
                txn.clear_db(dbs.get(collection))?;
            }

            for item in &snapshot.reading_progress {
                let record = ReadingProgress::merge(
                    &item.book_path,
                    None,
                    &ProgressPatch::from_record(item),
                    now,
                );
                put_json(txn, dbs.progress, record.book_path.as_bytes(), &record)?;
            }
            for item in &snapshot.bookmarks {
                let mut record = item.clone();
                let id = next_sequence(txn, dbs.meta, Collection::Bookmarks)?;
                record.set_id(id);
                put_json(txn, dbs.bookmarks, &id_key(id), &record)?;
            }
            for item in &snapshot.highlights {
                let mut record = item.clone();
                let id = next_sequence(txn, dbs.meta, Collection::Highlights)?;
                record.set_id(id);
                put_json(txn, dbs.highlights, &id_key(id), &record)?;
            }
            for item in &snapshot.comments {
                let mut record = item.clone();
                let id = next_sequence(txn, dbs.meta, Collection::Comments)?;
                record.set_id(id);
                put_json(txn, dbs.comments, &id_key(id), &record)?;
            }
            for item in &snapshot.daily_stats {
                put_json(txn, dbs.daily_stats, item.date.as_bytes(), item)?;
            }
            for item in &snapshot.settings {
                put_json(txn, dbs.settings, item.key.as_bytes(), item)?;
            }
            Ok(())
        })?;

        info!(
            "Import completed: {} progress, {} bookmarks, {} highlights, {} comments",
            snapshot.reading_progress.len(),
            snapshot.bookmarks.len(),
            snapshot.highlights.len(),
            snapshot.comments.len()
        );
        Ok(())
    }

    /// Parses an export file and restores it.
    ///
    /// The version tag is checked on the raw document so that files of a
    /// different schema report a mismatch rather than a parse error.
    pub fn import_json(&self, json: &str) -> Result<()> {
        let raw: JsonValue = serde_json::from_str(json)?;
        let found = raw.get("version").and_then(JsonValue::as_u64);
        if found != Some(u64::from(SCHEMA_VERSION)) {
            return Err(StoreError::VersionMismatch {
                expected: SCHEMA_VERSION,
                found,
            });
        }
        let snapshot: Snapshot = serde_json::from_value(raw)?;
        self.import_all(&snapshot)
    }

    pub fn try_clear_all(&self) -> Result<()> {
        self.write(|txn, dbs| {
            for collection in Collection::ALL {
                txn.clear_db(dbs.get(collection))?;
            }
            Ok(())
        })?;
        info!("All data cleared successfully");
        Ok(())
    }

    /// Empties every collection. Id sequences keep counting.
    pub fn clear_all(&self) -> bool {
        match self.try_clear_all() {
            Ok(()) => true,
            Err(e) => {
                warn!("clear_all failed: {e}");
                false
            }
        }
    }
}
