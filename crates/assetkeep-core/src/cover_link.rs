//! Latest coverage report per build manager.
//!
//! Display only. Whether the linked report is still needed is a separate
//! question answered by the aggregator.

use std::sync::Arc;

use assetkeep_state::{AssetFilter, AssetRecord, AssetType, BuildFilter, EntityStore};
use tokio::task::JoinSet;

use crate::domain::{AssetError, Result};
use crate::policy::per_week::supersedes;

pub struct CoverLinkProjection<S: ?Sized> {
    store: Arc<S>,
}

impl<S> CoverLinkProjection<S>
where
    S: EntityStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Most recently uploaded coverage report among the manager's builds.
    ///
    /// Deprecated reports are included. Only the manager's own builds are
    /// scanned, one query per build.
    pub async fn latest_report(
        &self,
        namespace: &str,
        manager: &str,
    ) -> Result<Option<AssetRecord>> {
        let builds = self
            .store
            .list_builds(&BuildFilter::manager(namespace, manager))
            .await?;

        let mut join_set = JoinSet::new();
        for build in builds {
            let store = Arc::clone(&self.store);
            join_set.spawn(async move {
                let filter = AssetFilter::default()
                    .with_build(build.build_id)
                    .with_type(AssetType::HtmlCoverageReport);
                store.scan_assets(&filter).await
            });
        }

        let mut latest: Option<AssetRecord> = None;
        while let Some(joined) = join_set.join_next().await {
            let reports = joined
                .map_err(|e| AssetError::Unavailable(format!("report scan join error: {e}")))??;
            for report in reports {
                latest = match latest {
                    Some(best) if !supersedes(&report, &best) => Some(best),
                    _ => Some(report),
                };
            }
        }
        Ok(latest)
    }

    /// Download locator of [`Self::latest_report`].
    pub async fn cover_link(&self, namespace: &str, manager: &str) -> Result<Option<String>> {
        Ok(self
            .latest_report(namespace, manager)
            .await?
            .map(|a| a.download_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assetkeep_state::fakes::MemoryEntityStore;
    use assetkeep_state::{AssetStore, BuildId, BuildRecord, BuildStore, NewAsset};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    async fn report(store: &MemoryEntityStore, build: &str, url: &str, at: DateTime<Utc>) {
        store
            .create_asset(NewAsset {
                build_id: BuildId::new(build),
                asset_type: AssetType::HtmlCoverageReport,
                download_url: url.to_string(),
                created_at: at,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn latest_wins_across_the_managers_builds() {
        let store = Arc::new(MemoryEntityStore::new());
        for (id, ns, manager) in [
            ("b1", "upstream", "ci-qemu"),
            ("b2", "upstream", "ci-qemu"),
            ("b3", "upstream", "ci-gce"),
            ("b4", "android", "ci-qemu"),
        ] {
            store
                .put_build(BuildRecord::new(id, ns, manager, t0()))
                .await
                .unwrap();
        }
        report(&store, "b1", "http://x/b1-old.html", t0()).await;
        report(&store, "b2", "http://x/b2.html", t0() + Duration::hours(1)).await;
        report(&store, "b1", "http://x/b1-new.html", t0() + Duration::hours(2)).await;
        // Newer, but owned by other managers.
        report(&store, "b3", "http://x/gce.html", t0() + Duration::days(1)).await;
        report(&store, "b4", "http://x/android.html", t0() + Duration::days(1)).await;

        let projection = CoverLinkProjection::new(store);
        assert_eq!(
            projection.cover_link("upstream", "ci-qemu").await.unwrap(),
            Some("http://x/b1-new.html".to_string())
        );
        assert_eq!(
            projection.cover_link("android", "ci-qemu").await.unwrap(),
            Some("http://x/android.html".to_string())
        );
        assert_eq!(projection.cover_link("upstream", "ci-arm").await.unwrap(), None);
    }

    #[tokio::test]
    async fn equal_timestamps_pick_the_greater_id() {
        let store = Arc::new(MemoryEntityStore::new());
        for id in ["b1", "b2"] {
            store
                .put_build(BuildRecord::new(id, "upstream", "ci-qemu", t0()))
                .await
                .unwrap();
        }
        report(&store, "b1", "http://x/first.html", t0()).await;
        report(&store, "b2", "http://x/second.html", t0()).await;
        let greater = store
            .scan_assets(&AssetFilter::default())
            .await
            .unwrap()
            .into_iter()
            .max_by(|a, b| a.asset_id.cmp(&b.asset_id))
            .unwrap();

        let projection = CoverLinkProjection::new(store);
        let latest = projection
            .latest_report("upstream", "ci-qemu")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.asset_id, greater.asset_id);
    }
}
