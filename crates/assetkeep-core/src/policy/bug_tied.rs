//! Bug-tied retention for kernel and disk images.

use assetkeep_state::{AssetRecord, BugRecord};
use chrono::{DateTime, Utc};

use super::Liveness;
use crate::config::RetentionConfig;

pub fn evaluate(
    asset: &AssetRecord,
    bugs: &[BugRecord],
    now: DateTime<Utc>,
    cfg: &RetentionConfig,
) -> Liveness {
    if now - asset.created_at < cfg.fresh_asset_grace() {
        return Liveness::Fresh;
    }
    if bugs.iter().any(|bug| !bug.status.is_closed()) {
        return Liveness::OpenBug;
    }
    let embargo = cfg.closed_bug_embargo();
    if bugs
        .iter()
        .any(|bug| now - bug.status_changed_at < embargo)
    {
        return Liveness::ClosingEmbargo;
    }
    Liveness::Expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetkeep_state::{AssetType, BugStatus, BuildId, NewAsset};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    fn disk(created_at: DateTime<Utc>) -> AssetRecord {
        AssetRecord::from_new(NewAsset {
            build_id: BuildId::new("b1"),
            asset_type: AssetType::BootableDisk,
            download_url: "http://x/disk.raw".to_string(),
            created_at,
        })
    }

    fn bug(status: BugStatus, at: DateTime<Utc>) -> BugRecord {
        BugRecord {
            status,
            ..BugRecord::open("bug1", "upstream", "KASAN: use-after-free", at)
        }
    }

    fn strict() -> RetentionConfig {
        RetentionConfig {
            fresh_asset_grace_days: 0,
            ..RetentionConfig::default()
        }
    }

    #[test]
    fn fresh_asset_kept_without_bugs() {
        let asset = disk(t0());
        let cfg = RetentionConfig::default();
        assert_eq!(evaluate(&asset, &[], t0() + Duration::days(13), &cfg), Liveness::Fresh);
        assert_eq!(evaluate(&asset, &[], t0() + Duration::days(14), &cfg), Liveness::Expired);
    }

    #[test]
    fn open_bug_keeps_asset_forever() {
        let asset = disk(t0());
        let bugs = [bug(BugStatus::Open, t0())];
        let verdict = evaluate(&asset, &bugs, t0() + Duration::days(400), &strict());
        assert_eq!(verdict, Liveness::OpenBug);
    }

    #[test]
    fn closed_bug_embargo_is_half_open() {
        let asset = disk(t0());
        let closed_at = t0() + Duration::days(5);
        let bugs = [bug(BugStatus::Fixed, closed_at)];
        let cfg = strict();

        assert_eq!(evaluate(&asset, &bugs, closed_at, &cfg), Liveness::ClosingEmbargo);
        assert_eq!(
            evaluate(&asset, &bugs, closed_at + Duration::days(30) - Duration::seconds(1), &cfg),
            Liveness::ClosingEmbargo
        );
        assert_eq!(
            evaluate(&asset, &bugs, closed_at + Duration::days(30), &cfg),
            Liveness::Expired
        );
    }

    #[test]
    fn any_live_bug_keeps_asset() {
        let asset = disk(t0());
        let bugs = [
            bug(BugStatus::Invalid, t0()),
            bug(BugStatus::Dup, t0() + Duration::days(50)),
        ];
        let now = t0() + Duration::days(60);
        assert_eq!(evaluate(&asset, &bugs, now, &strict()), Liveness::ClosingEmbargo);
    }

    #[test]
    fn no_bugs_past_grace_is_expired() {
        let asset = disk(t0());
        assert_eq!(evaluate(&asset, &[], t0(), &strict()), Liveness::Expired);
    }
}
