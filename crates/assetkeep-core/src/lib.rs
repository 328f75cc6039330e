//! Assetkeep Core: asset liveness and deprecation
//!
//! Decides, at any point in time, which stored build artifacts are still
//! needed, and periodically marks the rest deprecated.
//!
//! ## Key Components
//!
//! - `policy`: per-type liveness rules (bug-tied, per-week dedup)
//! - `NeededSetAggregator`: applies the policy over every live asset
//! - `DeprecationJob`: commits not-needed verdicts with per-asset CAS writes
//! - `AssetIngestor`: attaches uploads to builds
//! - `CoverLinkProjection`: latest coverage report per manager
//! - `AssetKeeper`: facade over all of the above

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod cover_link;
pub mod deprecation;
pub mod domain;
pub mod ingestion;
pub mod obs;
pub mod policy;
pub mod service;
pub mod telemetry;

pub use aggregator::{AssetVerdict, Evaluation, NeededSetAggregator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, RetentionConfig};
pub use cover_link::CoverLinkProjection;
pub use deprecation::{DeprecationJob, DeprecationReport, MAX_DEPRECATION_ATTEMPTS};
pub use domain::{AssetError, AssetUpload, Result, ValidatedUpload};
pub use ingestion::AssetIngestor;
pub use policy::{AssetContext, Liveness, RetentionPolicy, WeekBucket};
pub use service::AssetKeeper;
pub use telemetry::init_tracing;
