//! # Reader Sync Core
//!
//! Offline-first persistence and synchronization for a static book reader,
//! built for FFI integration with a host application. Reading progress,
//! annotations, daily statistics and settings live in a local LMDB
//! environment; an optional remote SQL endpoint keeps a shadow copy that
//! several devices converge on.
//!
//! ## Features
//!
//! - **Local Store**: six LMDB collections, each operation its own transaction
//! - **Change propagation**: user writes are pushed to the remote (progress debounced per book)
//! - **Full sync**: pull-merge-push over every collection, safe to re-run
//! - **Offline cache**: cache-first asset serving with background revalidation
//! - **Document channel**: typed messages between the library and the open book
//!
//! ## Quick Start
//!
//! ```no_run
//! use reader_sync_core::{create_library, open_book, free_response};
//! use std::ffi::CString;
//!
//! let config = CString::new(r#"{"store":{"path":"my_library"}}"#).unwrap();
//! let library = create_library(config.as_ptr());
//!
//! let book = CString::new(r#"{"bookPath":"books/intro.html","bookTitle":"Intro"}"#).unwrap();
//! let response = open_book(library, book.as_ptr());
//! free_response(response);
//! ```
//!
//! ## FFI Functions
//!
//! Every function returning `*const c_char` returns an [`AppResponse`] as
//! JSON. Release it with [`free_response`].
//!
//! - [`create_library`] - Open the store and start sync
//! - [`open_book`] - Start a reading session, get restore directives
//! - [`dispatch_reader_event`] - Apply one event from the book document
//! - [`session_tick`] - Save the reading time accumulated so far
//! - [`close_book`] - End a reading session
//! - [`export_library`] / [`import_library`] - Versioned snapshots
//! - [`run_full_sync`] - Bidirectional sync now
//! - [`set_online`] - Report connectivity changes
//! - [`close_library`] - Flush pushes and release everything

pub mod app_response;
pub mod change_feed;
pub mod channel;
pub mod config;
pub mod daily_stats;
pub mod error;
pub mod library;
pub mod local_db_model;
pub mod local_db_state;
#[cfg(test)]
mod mock_http;
pub mod offline_cache;
pub mod remote;
pub mod sync;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde_json::json;

pub use crate::app_response::AppResponse;
pub use crate::channel::{EventOutcome, ReaderDirective, ReaderEvent, ReaderSession};
pub use crate::config::Config;
pub use crate::error::{CacheError, RemoteError, StoreError};
pub use crate::library::ReaderLibrary;
pub use crate::local_db_state::LocalStore;

/// Current wall-clock time in epoch milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Opens a library from a JSON configuration.
///
/// # Parameters
///
/// * `config_json` - Null-terminated JSON [`Config`], or null to read the
///   `READER_*` environment variables
///
/// # Returns
///
/// Returns a pointer to the [`ReaderLibrary`] on success, or a null pointer on
/// failure. Release it with [`close_library`].
///
/// # Safety
///
/// `config_json` must be null or point to a valid null-terminated string.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use reader_sync_core::create_library;
///
/// let config = CString::new(r#"{"store":{"path":"library"},"sync":{"endpoint":"https://db.example.com"}}"#).unwrap();
/// let library = create_library(config.as_ptr());
/// assert!(!library.is_null());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_library(config_json: *const c_char) -> *mut ReaderLibrary {
    let config = if config_json.is_null() {
        Config::from_env()
    } else {
        let raw = match unsafe { CStr::from_ptr(config_json).to_str() } {
            Ok(s) => s,
            Err(e) => {
                warn!("Invalid UTF-8 in config_json: {e}");
                return std::ptr::null_mut();
            }
        };
        match Config::from_json(raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("Invalid library configuration: {e}");
                return std::ptr::null_mut();
            }
        }
    };

    match ReaderLibrary::open(config) {
        Ok(library) => {
            info!("Library created");
            Box::into_raw(Box::new(library))
        }
        Err(e) => {
            warn!("Failed to open library: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Starts a reading session.
///
/// Marks the book as current, logs it as opened today and returns the
/// session plus the directives the document needs to restore its state.
///
/// # Parameters
///
/// * `library` - Pointer returned by [`create_library`]
/// * `book_json` - `{"bookPath": "...", "bookTitle": "..."}`
///
/// # Returns
///
/// `Ok` carrying `{"session": {...}, "directives": [...]}`. Pass the session
/// back to [`dispatch_reader_event`] and [`close_book`].
///
/// # Safety
///
/// Both pointers must be valid.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn open_book(library: *mut ReaderLibrary, book_json: *const c_char) -> *const c_char {
    let library = match unsafe { library.as_ref() } {
        Some(l) => l,
        None => {
            let error = AppResponse::BadRequest("Null library pointer passed to open_book".to_string());
            return response_to_c_string(&error);
        }
    };

    let book: ReaderSession = match parse_json_arg(book_json, "book_json") {
        Ok(book) => book,
        Err(error_ptr) => return error_ptr,
    };

    let (session, directives) = library.open_book(&book.book_path, &book.book_title);
    to_ok_response(&json!({ "session": session, "directives": directives }))
}

/// Applies one event posted by the book document.
///
/// # Parameters
///
/// * `library` - Pointer returned by [`create_library`]
/// * `session_json` - Session as returned by [`open_book`] or a previous dispatch
/// * `event_json` - A [`ReaderEvent`], e.g. `{"type":"SCROLL_UPDATE","scrollPercent":42}`
///
/// # Returns
///
/// `Ok` carrying `{"outcome": ..., "session": {...}}` with the updated session.
///
/// # Safety
///
/// All pointers must be valid.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use reader_sync_core::{create_library, dispatch_reader_event};
///
/// let library = create_library(std::ptr::null());
/// let session = CString::new(r#"{"bookPath":"books/intro.html"}"#).unwrap();
/// let event = CString::new(r#"{"type":"HIGHLIGHT_CREATED","text":"a line","color":"green"}"#).unwrap();
/// let result = dispatch_reader_event(library, session.as_ptr(), event.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn dispatch_reader_event(
    library: *mut ReaderLibrary,
    session_json: *const c_char,
    event_json: *const c_char,
) -> *const c_char {
    let library = match unsafe { library.as_ref() } {
        Some(l) => l,
        None => {
            let error = AppResponse::BadRequest("Null library pointer passed to dispatch_reader_event".to_string());
            return response_to_c_string(&error);
        }
    };

    let mut session: ReaderSession = match parse_json_arg(session_json, "session_json") {
        Ok(session) => session,
        Err(error_ptr) => return error_ptr,
    };
    let event: ReaderEvent = match parse_json_arg(event_json, "event_json") {
        Ok(event) => event,
        Err(error_ptr) => return error_ptr,
    };

    let outcome = library.dispatch(&mut session, event);
    to_ok_response(&json!({ "outcome": outcome, "session": session }))
}

/// Folds the time read so far into the book's stored total. Hosts call this
/// on a timer (every 60 seconds) while a book is open.
///
/// # Parameters
///
/// * `library` - Pointer returned by [`create_library`]
/// * `session_json` - Session as returned by [`open_book`] or a previous dispatch
///
/// # Returns
///
/// `Ok` with a confirmation message. The session itself is unchanged.
///
/// # Safety
///
/// Both pointers must be valid.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn session_tick(library: *mut ReaderLibrary, session_json: *const c_char) -> *const c_char {
    let library = match unsafe { library.as_ref() } {
        Some(l) => l,
        None => {
            let error = AppResponse::BadRequest("Null library pointer passed to session_tick".to_string());
            return response_to_c_string(&error);
        }
    };

    let session: ReaderSession = match parse_json_arg(session_json, "session_json") {
        Ok(session) => session,
        Err(error_ptr) => return error_ptr,
    };

    library.tick(&session);
    response_to_c_string(&AppResponse::success("Reading time saved"))
}

/// Ends a reading session: saves the final position, logs reading time and
/// clears the current book.
///
/// # Safety
///
/// Both pointers must be valid.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_book(library: *mut ReaderLibrary, session_json: *const c_char) -> *const c_char {
    let library = match unsafe { library.as_ref() } {
        Some(l) => l,
        None => {
            let error = AppResponse::BadRequest("Null library pointer passed to close_book".to_string());
            return response_to_c_string(&error);
        }
    };

    let session: ReaderSession = match parse_json_arg(session_json, "session_json") {
        Ok(session) => session,
        Err(error_ptr) => return error_ptr,
    };

    library.close_book(session);
    response_to_c_string(&AppResponse::success("Book closed"))
}

/// Exports every collection as a versioned snapshot.
///
/// # Returns
///
/// `Ok` carrying the snapshot JSON, or `DatabaseError` if it could not be read.
///
/// # Safety
///
/// The library pointer must be valid.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn export_library(library: *mut ReaderLibrary) -> *const c_char {
    let library = match unsafe { library.as_ref() } {
        Some(l) => l,
        None => {
            let error = AppResponse::BadRequest("Null library pointer passed to export_library".to_string());
            return response_to_c_string(&error);
        }
    };

    match library.store().try_export_all() {
        Ok(snapshot) => to_ok_response(&snapshot),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Replaces the whole Local Store with a snapshot.
///
/// A snapshot with a different version is rejected with `VersionMismatch`
/// and the store is left untouched.
///
/// # Safety
///
/// Both pointers must be valid.
///
/// # Examples
///
/// ```no_run
/// use std::ffi::CString;
/// use reader_sync_core::{create_library, import_library};
///
/// let library = create_library(std::ptr::null());
/// let snapshot = CString::new(r#"{"version":1,"exportedAt":0}"#).unwrap();
/// let result = import_library(library, snapshot.as_ptr());
/// ```
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn import_library(library: *mut ReaderLibrary, json_ptr: *const c_char) -> *const c_char {
    let library = match unsafe { library.as_ref() } {
        Some(l) => l,
        None => {
            let error = AppResponse::BadRequest("Null library pointer passed to import_library".to_string());
            return response_to_c_string(&error);
        }
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(json) => json,
        Err(error_ptr) => return error_ptr,
    };

    match library.import_json(&json_str) {
        Ok(()) => response_to_c_string(&AppResponse::success("Library imported")),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

/// Runs a full bidirectional sync and waits for it.
///
/// # Returns
///
/// `Ok` carrying the per-stage report, or `BadRequest` when no remote is
/// configured.
///
/// # Safety
///
/// The library pointer must be valid.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn run_full_sync(library: *mut ReaderLibrary) -> *const c_char {
    let library = match unsafe { library.as_ref() } {
        Some(l) => l,
        None => {
            let error = AppResponse::BadRequest("Null library pointer passed to run_full_sync".to_string());
            return response_to_c_string(&error);
        }
    };

    match library.full_sync() {
        Some(report) => to_ok_response(&report),
        None => response_to_c_string(&AppResponse::BadRequest("Remote sync is not configured".to_string())),
    }
}

/// Reports a connectivity change. Going back online starts a full sync in
/// the background.
///
/// # Safety
///
/// The library pointer must be valid.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn set_online(library: *mut ReaderLibrary, online: bool) -> *const c_char {
    let library = match unsafe { library.as_ref() } {
        Some(l) => l,
        None => {
            let error = AppResponse::BadRequest("Null library pointer passed to set_online".to_string());
            return response_to_c_string(&error);
        }
    };

    let syncing = library.set_online(online);
    to_ok_response(&json!({ "online": online, "syncStarted": syncing }))
}

/// Closes the library and frees it.
///
/// Pending pushes are sent before the runtime shuts down. The pointer must
/// not be used afterwards.
///
/// # Safety
///
/// `library` must come from [`create_library`] and not have been closed.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_library(library: *mut ReaderLibrary) -> *const c_char {
    if library.is_null() {
        let error = AppResponse::BadRequest("Null library pointer passed to close_library".to_string());
        return response_to_c_string(&error);
    }

    let library = unsafe { Box::from_raw(library) };
    library.close();
    response_to_c_string(&AppResponse::success("Library closed successfully"))
}

/// Releases a string returned by any function of this library.
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by this library, freed once.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn free_response(ptr: *const c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr as *mut c_char) });
}

fn to_ok_response<T: serde::Serialize>(value: &T) -> *const c_char {
    match serde_json::to_string(value) {
        Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
        Err(e) => response_to_c_string(&AppResponse::from(e)),
    }
}

fn parse_json_arg<T: serde::de::DeserializeOwned>(
    ptr: *const c_char,
    field_name: &str,
) -> Result<T, *const c_char> {
    let raw = c_ptr_to_string(ptr, field_name)?;
    serde_json::from_str(&raw).map_err(|e| {
        let error = AppResponse::SerializationError(format!("Invalid {field_name}: {e}"));
        response_to_c_string(&error)
    })
}

/// Converts an [`AppResponse`] to a C-compatible string.
///
/// Returns a null pointer if serialization fails.
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String.
///
/// # Returns
///
/// * `Ok(String)` - The converted string
/// * `Err(*const c_char)` - A `BadRequest` response for null pointers or invalid UTF-8
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
