//! Per-week deduplication for coverage reports.
//!
//! Reports are grouped into buckets by the ISO calendar week (Monday to
//! Sunday, UTC) of their upload time. The latest report of each bucket is
//! canonical and kept forever; any other report is kept until the
//! supersession embargo has passed since its own upload.

use std::cmp::Ordering;
use std::collections::HashMap;

use assetkeep_state::{AssetId, AssetRecord, AssetType, BuildRecord};
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use super::Liveness;
use crate::config::RetentionConfig;

/// Grouping key for per-week deduplication.
///
/// Reports of different managers, namespaces or types never supersede one
/// another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WeekBucket {
    pub namespace: String,
    pub manager: String,
    pub asset_type: AssetType,
    pub iso_year: i32,
    pub iso_week: u32,
}

impl WeekBucket {
    pub fn of(asset: &AssetRecord, build: &BuildRecord) -> Self {
        let week = asset.created_at.iso_week();
        Self {
            namespace: build.namespace.clone(),
            manager: build.manager.clone(),
            asset_type: asset.asset_type,
            iso_year: week.year(),
            iso_week: week.week(),
        }
    }
}

/// Half-open `[monday 00:00, next monday 00:00)` range containing `at`.
pub fn week_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let days_since_monday = i64::from(at.weekday().num_days_from_monday());
    let since_midnight = Duration::seconds(i64::from(at.num_seconds_from_midnight()))
        + Duration::nanoseconds(i64::from(at.nanosecond()));
    let start = at - Duration::days(days_since_monday) - since_midnight;
    (start, start + Duration::weeks(1))
}

/// Total order used to pick the canonical asset: later upload wins, equal
/// upload times fall back to the greater asset id.
pub fn supersedes(a: &AssetRecord, b: &AssetRecord) -> bool {
    canonical_order(a, b) == Ordering::Greater
}

fn canonical_order(a: &AssetRecord, b: &AssetRecord) -> Ordering {
    a.created_at
        .cmp(&b.created_at)
        .then_with(|| a.asset_id.cmp(&b.asset_id))
}

/// Pick the canonical asset of every bucket among `assets`.
///
/// Assets whose owning build is not found by `build_of` are skipped.
pub fn canonical_by_bucket<'a, I, F>(assets: I, build_of: F) -> HashMap<WeekBucket, AssetId>
where
    I: IntoIterator<Item = &'a AssetRecord>,
    F: Fn(&AssetRecord) -> Option<&'a BuildRecord>,
{
    let mut best: HashMap<WeekBucket, &'a AssetRecord> = HashMap::new();
    for asset in assets {
        let Some(build) = build_of(asset) else {
            continue;
        };
        best.entry(WeekBucket::of(asset, build))
            .and_modify(|current| {
                if supersedes(asset, *current) {
                    *current = asset;
                }
            })
            .or_insert(asset);
    }
    best.into_iter()
        .map(|(bucket, asset)| (bucket, asset.asset_id.clone()))
        .collect()
}

pub fn evaluate(
    asset: &AssetRecord,
    canonical: Option<&AssetId>,
    now: DateTime<Utc>,
    cfg: &RetentionConfig,
) -> Liveness {
    // An asset with no recorded canonical is alone in its bucket.
    match canonical {
        None => return Liveness::Canonical,
        Some(id) if *id == asset.asset_id => return Liveness::Canonical,
        Some(_) => {}
    }
    if now - asset.created_at < cfg.supersession_embargo() {
        Liveness::SupersessionEmbargo
    } else {
        Liveness::Expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetkeep_state::{BuildId, NewAsset};
    use chrono::TimeZone;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn report(build: &str, created_at: DateTime<Utc>) -> AssetRecord {
        AssetRecord::from_new(NewAsset {
            build_id: BuildId::new(build),
            asset_type: AssetType::HtmlCoverageReport,
            download_url: format!("http://x/{build}/{}.html", created_at.timestamp()),
            created_at,
        })
    }

    fn build(id: &str, manager: &str) -> BuildRecord {
        BuildRecord::new(id, "upstream", manager, day(0))
    }

    #[test]
    fn iso_weeks_start_on_monday() {
        let b = build("b1", "ci-qemu");
        let week = |d: i64| WeekBucket::of(&report("b1", day(d)), &b);

        // Sat 2000-01-01 and Sun 2000-01-02 belong to 1999-W52.
        assert_eq!(week(0).iso_year, 1999);
        assert_eq!(week(0).iso_week, 52);
        assert_eq!(week(0), week(1));
        // Tue 2000-01-04 and Thu 2000-01-06 share W01.
        assert_eq!(week(3), week(5));
        assert_ne!(week(1), week(3));
        assert_ne!(week(9), week(16));
    }

    #[test]
    fn week_bounds_cover_monday_to_monday() {
        let at = Utc.with_ymd_and_hms(2000, 1, 6, 17, 45, 3).unwrap();
        let (start, end) = week_bounds(at);
        assert_eq!(start, Utc.with_ymd_and_hms(2000, 1, 3, 0, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2000, 1, 10, 0, 0, 0).unwrap());

        let (start, _) = week_bounds(start);
        assert_eq!(start, Utc.with_ymd_and_hms(2000, 1, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn latest_upload_is_canonical() {
        let b = build("b1", "ci-qemu");
        let early = report("b1", day(0));
        let late = report("b1", day(1));
        let assets = [late.clone(), early.clone()];

        let canon = canonical_by_bucket(assets.iter(), |_| Some(&b));
        assert_eq!(canon.len(), 1);
        assert_eq!(canon.values().next(), Some(&late.asset_id));
    }

    #[test]
    fn equal_timestamps_break_on_asset_id() {
        let b = build("b1", "ci-qemu");
        let mut first = report("b1", day(3));
        let mut second = report("b1", day(3));
        first.asset_id = AssetId("0001".to_string());
        second.asset_id = AssetId("0002".to_string());

        let canon = canonical_by_bucket([&second, &first], |_| Some(&b));
        assert_eq!(canon.values().next(), Some(&second.asset_id));
        assert!(supersedes(&second, &first));
    }

    #[test]
    fn managers_do_not_share_buckets() {
        let qemu = build("b1", "ci-qemu");
        let gce = build("b2", "ci-gce");
        let a = report("b1", day(3));
        let b = report("b2", day(4));

        let canon = canonical_by_bucket([&a, &b], |asset| {
            if asset.build_id == qemu.build_id {
                Some(&qemu)
            } else {
                Some(&gce)
            }
        });
        assert_eq!(canon.len(), 2);
    }

    #[test]
    fn superseded_report_expires_after_embargo() {
        let cfg = RetentionConfig::default();
        let old = report("b1", day(0));
        let canonical = AssetId("zzz".to_string());

        assert_eq!(
            evaluate(&old, Some(&canonical), day(13), &cfg),
            Liveness::SupersessionEmbargo
        );
        assert_eq!(evaluate(&old, Some(&canonical), day(14), &cfg), Liveness::Expired);
        assert_eq!(
            evaluate(&old, Some(&old.asset_id), day(400), &cfg),
            Liveness::Canonical
        );
        assert_eq!(evaluate(&old, None, day(400), &cfg), Liveness::Canonical);
    }
}
