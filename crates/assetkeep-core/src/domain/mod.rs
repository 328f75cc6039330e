//! Domain models for the asset keeper.
//!
//! Entity records live in `assetkeep-state`; this module adds the upload
//! request shape and the error taxonomy surfaced to callers.

pub mod error;
pub mod upload;

pub use error::{AssetError, Result};
pub use upload::{AssetUpload, ValidatedUpload};
