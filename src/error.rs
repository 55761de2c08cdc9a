//! Error types shared by the store, the remote client and the asset cache.

use thiserror::Error;

/// Result type alias for Local Store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the LMDB-backed Local Store.
///
/// Collection operations swallow these (logging them) and resolve to safe
/// defaults. Callers only see [`StoreError::VersionMismatch`] and
/// [`StoreError::InvalidSnapshot`] from an import, plus whatever `open` reports.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("LMDB error: {0}")]
    Lmdb(#[from] lmdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Import snapshot was produced by a different schema version.
    #[error("Snapshot version mismatch: expected {expected}, found {found:?}")]
    VersionMismatch { expected: u32, found: Option<u64> },

    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

impl StoreError {
    pub fn invalid_snapshot(message: impl Into<String>) -> Self {
        Self::InvalidSnapshot(message.into())
    }

    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }
}

/// Errors raised by the remote pipeline transport.
///
/// The typed remote client never lets these escape; they are logged and
/// turned into `None`/`false` ("sync unavailable now").
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A single statement in the pipeline was rejected by the server.
    #[error("Statement error: {0}")]
    Statement(String),

    /// No transport configured or the transport refused to run.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised while fetching assets for the offline cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CacheError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }
}
