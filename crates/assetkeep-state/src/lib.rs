//! Assetkeep-State: Entity Persistence for the Asset Keeper
//!
//! This crate provides the persistence layer for the asset retention engine.
//! It handles all I/O with SurrealDB and exposes backend-agnostic traits for
//! builds, assets, crashes and bugs.
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: Data integrity and per-record compare-and-set updates.
//!
//! ## Key Components
//!
//! - `EntityStore`: Umbrella trait over `BuildStore`, `AssetStore`, `BugLedger`
//! - `SurrealEntityStore`: SurrealDB implementation
//! - `fakes::MemoryEntityStore`: In-memory implementation with fault injection

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{
    connect, connect_cloud, connect_from_env, connect_url, CloudConfig, StoreLocation,
};
pub use schema::{AssetRow, BugRow, BuildRow, CrashRow};
pub use storage_traits::{
    AssetFilter, AssetId, AssetRecord, AssetStore, AssetType, BugLedger, BugRecord, BugStatus,
    BuildFilter, BuildId, BuildRecord, BuildStore, CrashRecord, EntityStore, NewAsset,
    StorageResult,
};
pub use surreal_store::SurrealEntityStore;

/// Result type for assetkeep-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
