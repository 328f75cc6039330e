//! Liveness policy: is an asset still needed at time T?
//!
//! Each asset type maps to exactly one [`RetentionPolicy`]. Evaluation is a
//! pure function of the asset, its context (owning build, referencing bugs,
//! the canonical asset of its week bucket) and the evaluation time.

pub mod bug_tied;
pub mod per_week;

use assetkeep_state::{AssetId, AssetRecord, AssetType, BugRecord, BuildRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RetentionConfig;

pub use per_week::{canonical_by_bucket, WeekBucket};

/// Retention strategy family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    /// Kept while a referencing bug is open or recently closed.
    BugTied,
    /// Latest upload of each ISO week kept forever, others after an embargo.
    PerWeekDedup,
}

impl RetentionPolicy {
    pub fn for_type(asset_type: AssetType) -> Self {
        match asset_type {
            AssetType::KernelObject
            | AssetType::KernelImage
            | AssetType::BootableDisk
            | AssetType::NonBootableDisk => RetentionPolicy::BugTied,
            AssetType::HtmlCoverageReport => RetentionPolicy::PerWeekDedup,
        }
    }
}

/// Why an asset is, or is not, needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Bug-tied asset still inside the fresh-asset grace.
    Fresh,
    /// A crash on the owning build is filed under an open bug.
    OpenBug,
    /// The latest closed bug closed less than the embargo ago.
    ClosingEmbargo,
    /// Latest asset of its week bucket.
    Canonical,
    /// Superseded, but uploaded less than the supersession embargo ago.
    SupersessionEmbargo,
    /// No rule keeps it.
    Expired,
}

impl Liveness {
    pub fn is_needed(&self) -> bool {
        !matches!(self, Liveness::Expired)
    }
}

/// Read-side context an asset is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct AssetContext<'a> {
    pub build: &'a BuildRecord,
    /// Distinct bugs referenced by crashes of the owning build.
    pub bugs: &'a [BugRecord],
    /// Canonical asset of the asset's week bucket, if it has one.
    pub bucket_canonical: Option<&'a AssetId>,
}

/// Evaluate one asset at `now`.
///
/// A deprecated asset is never needed, whatever its context says.
pub fn evaluate(
    asset: &AssetRecord,
    ctx: &AssetContext<'_>,
    now: DateTime<Utc>,
    cfg: &RetentionConfig,
) -> Liveness {
    if asset.deprecated {
        return Liveness::Expired;
    }
    match RetentionPolicy::for_type(asset.asset_type) {
        RetentionPolicy::BugTied => bug_tied::evaluate(asset, ctx.bugs, now, cfg),
        RetentionPolicy::PerWeekDedup => {
            per_week::evaluate(asset, ctx.bucket_canonical, now, cfg)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetkeep_state::{BuildId, NewAsset};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn every_type_has_a_policy() {
        let bug_tied = AssetType::ALL
            .iter()
            .filter(|t| RetentionPolicy::for_type(**t) == RetentionPolicy::BugTied)
            .count();
        assert_eq!(bug_tied, 4);
        assert_eq!(
            RetentionPolicy::for_type(AssetType::HtmlCoverageReport),
            RetentionPolicy::PerWeekDedup
        );
    }

    #[test]
    fn deprecated_asset_is_never_needed() {
        let build = BuildRecord::new("b1", "upstream", "ci-qemu", t0());
        let mut asset = AssetRecord::from_new(NewAsset {
            build_id: BuildId::new("b1"),
            asset_type: AssetType::HtmlCoverageReport,
            download_url: "http://x/cover.html".to_string(),
            created_at: t0(),
        });
        asset.deprecated = true;
        let ctx = AssetContext {
            build: &build,
            bugs: &[],
            bucket_canonical: Some(&asset.asset_id),
        };
        let verdict = evaluate(&asset, &ctx, t0() + Duration::days(1), &RetentionConfig::default());
        assert_eq!(verdict, Liveness::Expired);
        assert!(!verdict.is_needed());
    }
}
