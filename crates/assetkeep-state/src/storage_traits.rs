//! Storage trait definitions for the asset keeper
//!
//! These traits define the entity store the retention engine reads from:
//! - `BuildStore`: Build records (the owners of assets)
//! - `AssetStore`: Asset records, filtered scans, conditional deprecation
//! - `BugLedger`: Crash → Bug read model used for bug-tied liveness
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Identifier of an uploaded build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BuildId(pub String);

impl BuildId {
    pub fn new(id: impl Into<String>) -> Self {
        BuildId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BuildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a single stored asset.
///
/// Generated as a UUIDv7, so lexical order follows creation order within
/// one process. The liveness policy relies on this for tie-breaking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl AssetId {
    /// Generate a new time-ordered AssetId
    pub fn generate() -> Self {
        AssetId(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

/// A compiled kernel artifact set produced by one build manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub build_id: BuildId,
    /// Tenant scope of the build.
    pub namespace: String,
    /// The manager (fleet) that produced the build.
    pub manager: String,
    /// Reference to the kernel config blob.
    pub kernel_config_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Removed builds no longer accept assets.
    pub removed: bool,
}

impl BuildRecord {
    pub fn new(
        build_id: impl Into<String>,
        namespace: impl Into<String>,
        manager: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            build_id: BuildId::new(build_id),
            namespace: namespace.into(),
            manager: manager.into(),
            kernel_config_ref: None,
            created_at,
            removed: false,
        }
    }

    pub fn accepts_assets(&self) -> bool {
        !self.removed
    }
}

/// Filter for [`BuildStore::list_builds`]. `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildFilter {
    pub namespace: Option<String>,
    pub manager: Option<String>,
}

impl BuildFilter {
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            manager: None,
        }
    }

    pub fn manager(namespace: impl Into<String>, manager: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            manager: Some(manager.into()),
        }
    }

    pub fn matches(&self, build: &BuildRecord) -> bool {
        self.namespace
            .as_ref()
            .map(|ns| build.namespace == *ns)
            .unwrap_or(true)
            && self
                .manager
                .as_ref()
                .map(|m| build.manager == *m)
                .unwrap_or(true)
    }
}

/// Build persistence.
///
/// Builds are created on upload and immutable afterwards.
#[async_trait]
pub trait BuildStore: Send + Sync {
    /// Insert a new build. Fails with `DuplicateBuild` if the ID is taken.
    async fn put_build(&self, build: BuildRecord) -> StorageResult<()>;

    /// Fetch a build. Returns `StorageError::BuildNotFound` if absent.
    async fn get_build(&self, build_id: &BuildId) -> StorageResult<BuildRecord>;

    /// List builds matching the filter, oldest first.
    async fn list_builds(&self, filter: &BuildFilter) -> StorageResult<Vec<BuildRecord>>;
}

// ---------------------------------------------------------------------------
// Assets
// ---------------------------------------------------------------------------

/// Kind of stored artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// Unstripped kernel binary (vmlinux).
    KernelObject,
    /// Bootable kernel image (bzImage).
    KernelImage,
    /// Bootable VM disk image.
    BootableDisk,
    /// Non-bootable disk image.
    NonBootableDisk,
    /// Rendered HTML coverage report.
    HtmlCoverageReport,
}

impl AssetType {
    pub const ALL: [AssetType; 5] = [
        AssetType::KernelObject,
        AssetType::KernelImage,
        AssetType::BootableDisk,
        AssetType::NonBootableDisk,
        AssetType::HtmlCoverageReport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::KernelObject => "kernel_object",
            AssetType::KernelImage => "kernel_image",
            AssetType::BootableDisk => "bootable_disk",
            AssetType::NonBootableDisk => "non_bootable_disk",
            AssetType::HtmlCoverageReport => "html_coverage_report",
        }
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AssetType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StorageError::InvalidRecord(format!("unknown asset type: {s}")))
    }
}

/// Input for [`AssetStore::create_asset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAsset {
    pub build_id: BuildId,
    pub asset_type: AssetType,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
}

/// A stored artifact attached to exactly one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub asset_id: AssetId,
    pub build_id: BuildId,
    pub asset_type: AssetType,
    /// Opaque download locator. Not globally unique.
    pub download_url: String,
    pub created_at: DateTime<Utc>,
    /// Monotonic: once set, never cleared.
    pub deprecated: bool,
    pub deprecated_at: Option<DateTime<Utc>>,
}

impl AssetRecord {
    pub fn from_new(new: NewAsset) -> Self {
        Self {
            asset_id: AssetId::generate(),
            build_id: new.build_id,
            asset_type: new.asset_type,
            download_url: new.download_url,
            created_at: new.created_at,
            deprecated: false,
            deprecated_at: None,
        }
    }
}

/// Filter for [`AssetStore::scan_assets`]. `None` fields match everything.
///
/// The creation-time range is half-open: `created_from <= t < created_until`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetFilter {
    pub build_id: Option<BuildId>,
    pub asset_type: Option<AssetType>,
    pub deprecated: Option<bool>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_until: Option<DateTime<Utc>>,
}

impl AssetFilter {
    /// All assets that have not been deprecated yet.
    pub fn live() -> Self {
        Self {
            deprecated: Some(false),
            ..Self::default()
        }
    }

    pub fn with_build(mut self, build_id: BuildId) -> Self {
        self.build_id = Some(build_id);
        self
    }

    pub fn with_type(mut self, asset_type: AssetType) -> Self {
        self.asset_type = Some(asset_type);
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_until = Some(until);
        self
    }

    pub fn matches(&self, asset: &AssetRecord) -> bool {
        if let Some(build_id) = &self.build_id {
            if asset.build_id != *build_id {
                return false;
            }
        }
        if let Some(asset_type) = self.asset_type {
            if asset.asset_type != asset_type {
                return false;
            }
        }
        if let Some(deprecated) = self.deprecated {
            if asset.deprecated != deprecated {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if asset.created_at < from {
                return false;
            }
        }
        if let Some(until) = self.created_until {
            if asset.created_at >= until {
                return false;
            }
        }
        true
    }
}

/// Asset persistence.
///
/// Guarantees:
/// - `create_asset` always creates a new record; there is no implicit replace.
/// - `mark_deprecated` is a compare-and-set: it only flips `deprecated` from
///   `false` to `true` and never the other way.
/// - `scan_assets` returns records ordered by `(created_at, asset_id)`.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Create a new asset record and return it.
    async fn create_asset(&self, asset: NewAsset) -> StorageResult<AssetRecord>;

    /// Fetch an asset. Returns `StorageError::AssetNotFound` if absent.
    async fn get_asset(&self, asset_id: &AssetId) -> StorageResult<AssetRecord>;

    /// Scan assets matching the filter.
    async fn scan_assets(&self, filter: &AssetFilter) -> StorageResult<Vec<AssetRecord>>;

    /// Conditionally deprecate an asset.
    ///
    /// Returns `Ok(true)` if this call flipped the flag, `Ok(false)` if the
    /// asset was already deprecated, and `StorageError::Conflict` if the
    /// backend could not commit because of a concurrent writer.
    async fn mark_deprecated(&self, asset_id: &AssetId, at: DateTime<Utc>) -> StorageResult<bool>;
}

// ---------------------------------------------------------------------------
// Crashes and bugs
// ---------------------------------------------------------------------------

/// Lifecycle state of a bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BugStatus {
    Open,
    Fixed,
    Invalid,
    Dup,
}

impl BugStatus {
    /// Every status except `Open` is terminal.
    pub fn is_closed(&self) -> bool {
        !matches!(self, BugStatus::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BugStatus::Open => "open",
            BugStatus::Fixed => "fixed",
            BugStatus::Invalid => "invalid",
            BugStatus::Dup => "dup",
        }
    }
}

impl FromStr for BugStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "open" => Ok(BugStatus::Open),
            "fixed" => Ok(BugStatus::Fixed),
            "invalid" => Ok(BugStatus::Invalid),
            "dup" => Ok(BugStatus::Dup),
            other => Err(StorageError::InvalidRecord(format!(
                "unknown bug status: {other}"
            ))),
        }
    }
}

/// A bug, as far as retention cares about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugRecord {
    pub bug_id: String,
    pub namespace: String,
    pub title: String,
    pub status: BugStatus,
    /// When `status` last changed. For closed bugs this is the close time.
    pub status_changed_at: DateTime<Utc>,
}

impl BugRecord {
    pub fn open(
        bug_id: impl Into<String>,
        namespace: impl Into<String>,
        title: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            bug_id: bug_id.into(),
            namespace: namespace.into(),
            title: title.into(),
            status: BugStatus::Open,
            status_changed_at: at,
        }
    }
}

/// A crash observed on a build and filed under a bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashRecord {
    pub crash_id: String,
    pub build_id: BuildId,
    pub bug_id: String,
    /// Reference to the console log blob.
    pub log_ref: Option<String>,
    pub reported_at: DateTime<Utc>,
}

/// Crash and bug read model.
///
/// Status transitions happen outside the retention engine; the write
/// methods exist for the ingestion plumbing and for tests.
#[async_trait]
pub trait BugLedger: Send + Sync {
    /// Record a crash against a build.
    async fn record_crash(&self, crash: CrashRecord) -> StorageResult<()>;

    /// Insert or replace a bug by `bug_id`.
    async fn put_bug(&self, bug: BugRecord) -> StorageResult<()>;

    /// Distinct bugs referenced by crashes of the given build.
    async fn bugs_for_build(&self, build_id: &BuildId) -> StorageResult<Vec<BugRecord>>;
}

/// Everything the retention engine needs from one backend.
pub trait EntityStore: BuildStore + AssetStore + BugLedger {}

impl<T> EntityStore for T where T: BuildStore + AssetStore + BugLedger {}
