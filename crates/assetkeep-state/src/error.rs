//! Error types for assetkeep-state

use thiserror::Error;

/// Errors that can occur while connecting to or preparing the database
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the storage traits.
///
/// Backends map their native failures onto these variants so callers can
/// tell "absent" from "raced" from "unreachable" without knowing the backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("build not found: {build_id}")]
    BuildNotFound { build_id: String },

    #[error("asset not found: {asset_id}")]
    AssetNotFound { asset_id: String },

    #[error("build already exists: {build_id}")]
    DuplicateBuild { build_id: String },

    /// A conditional write lost a race with a concurrent writer.
    #[error("write conflict on {entity} {key}")]
    Conflict { entity: String, key: String },

    /// A stored row could not be mapped back onto a record type.
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),

    /// The backend is unreachable or failed in a way the caller cannot fix.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StateError> for StorageError {
    fn from(err: StateError) -> Self {
        StorageError::Backend(err.to_string())
    }
}
