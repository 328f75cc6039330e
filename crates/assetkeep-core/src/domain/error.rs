//! Domain-level error taxonomy for the asset keeper.

use assetkeep_state::StorageError;

/// Asset keeper domain errors.
///
/// Policy evaluation itself never fails; these come from input validation
/// and from the entity store.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// A referenced build or asset is absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed asset type, empty locator, or empty upload.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A conditional write kept losing races after internal retries.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The entity store is unreachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StorageError> for AssetError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::BuildNotFound { .. } | StorageError::AssetNotFound { .. } => {
                AssetError::NotFound(err.to_string())
            }
            StorageError::DuplicateBuild { .. } => AssetError::InvalidArgument(err.to_string()),
            StorageError::Conflict { .. } => AssetError::Conflict(err.to_string()),
            StorageError::InvalidRecord(_) | StorageError::Backend(_) => {
                AssetError::Unavailable(err.to_string())
            }
        }
    }
}

/// Result type for asset keeper domain operations.
pub type Result<T> = std::result::Result<T, AssetError>;
