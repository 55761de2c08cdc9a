use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Error as SerdeError;

use crate::error::StoreError;

/// JSON envelope returned across the host boundary.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub enum AppResponse {
    DatabaseError(String),
    SerializationError(String),
    NotFound(String),
    ValidationError(String),
    BadRequest(String),
    VersionMismatch(String),
    Ok(String),
}

impl Display for AppResponse {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AppResponse::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppResponse::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppResponse::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppResponse::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppResponse::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            AppResponse::VersionMismatch(msg) => write!(f, "Version mismatch: {}", msg),
            AppResponse::Ok(msg) => write!(f, "Ok: {}", msg),
        }
    }
}

impl From<StoreError> for AppResponse {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Lmdb(lmdb::Error::NotFound) =>
                AppResponse::NotFound("Record not found".to_string()),
            StoreError::Lmdb(lmdb::Error::Corrupted) =>
                AppResponse::DatabaseError("Database is corrupted".to_string()),
            StoreError::Lmdb(e) => AppResponse::DatabaseError(format!("LMDB error: {}", e)),
            StoreError::Io(e) => AppResponse::DatabaseError(format!("IO error: {}", e)),
            StoreError::Serialization(e) =>
                AppResponse::SerializationError(format!("JSON serialization error: {}", e)),
            err @ StoreError::VersionMismatch { .. } => AppResponse::VersionMismatch(err.to_string()),
            StoreError::InvalidSnapshot(msg) => AppResponse::ValidationError(msg),
        }
    }
}

impl From<SerdeError> for AppResponse {
    fn from(err: SerdeError) -> Self {
        AppResponse::SerializationError(format!("JSON serialization error: {}", err))
    }
}

impl AppResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        AppResponse::Ok(msg.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AppResponse::Ok(_))
    }
}
