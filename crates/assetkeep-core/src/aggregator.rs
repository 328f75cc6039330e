//! Needed-set aggregation.
//!
//! [`NeededSetAggregator`] scans live assets, joins each with its owning
//! build, the bugs referencing that build and its week bucket, and runs the
//! liveness policy over the lot. It never writes.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use assetkeep_state::{
    AssetFilter, AssetId, AssetRecord, BugRecord, BuildFilter, BuildId, BuildRecord, EntityStore,
    StorageError,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;

use crate::config::RetentionConfig;
use crate::domain::{AssetError, Result};
use crate::policy::{self, canonical_by_bucket, AssetContext, Liveness, RetentionPolicy};

/// Verdict for a single asset.
#[derive(Debug, Clone, Serialize)]
pub struct AssetVerdict {
    pub asset: AssetRecord,
    pub liveness: Liveness,
}

impl AssetVerdict {
    pub fn is_needed(&self) -> bool {
        self.liveness.is_needed()
    }
}

/// Result of one aggregation pass at a fixed time.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub evaluated_at: DateTime<Utc>,
    pub verdicts: Vec<AssetVerdict>,
    /// Live assets whose build record is missing. They cannot be evaluated
    /// and are kept.
    pub orphaned: Vec<AssetRecord>,
}

impl Evaluation {
    /// Deduplicated locators of every needed asset, sorted.
    pub fn needed_locators(&self) -> BTreeSet<String> {
        self.verdicts
            .iter()
            .filter(|v| v.is_needed())
            .map(|v| &v.asset)
            .chain(self.orphaned.iter())
            .map(|a| a.download_url.clone())
            .collect()
    }

    /// Assets that no rule keeps any more.
    pub fn not_needed(&self) -> impl Iterator<Item = &AssetRecord> + '_ {
        self.verdicts
            .iter()
            .filter(|v| !v.is_needed())
            .map(|v| &v.asset)
    }
}

/// Applies the liveness policy across the entity store.
pub struct NeededSetAggregator<S: ?Sized> {
    store: Arc<S>,
    config: RetentionConfig,
}

impl<S> NeededSetAggregator<S>
where
    S: EntityStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Evaluate every live asset, optionally restricted to one namespace.
    pub async fn evaluate(&self, namespace: Option<&str>, now: DateTime<Utc>) -> Result<Evaluation> {
        let filter = BuildFilter {
            namespace: namespace.map(str::to_string),
            manager: None,
        };
        let builds: HashMap<BuildId, BuildRecord> = self
            .store
            .list_builds(&filter)
            .await?
            .into_iter()
            .map(|b| (b.build_id.clone(), b))
            .collect();

        let mut assets = Vec::new();
        let mut orphaned = Vec::new();
        for asset in self.store.scan_assets(&AssetFilter::live()).await? {
            if builds.contains_key(&asset.build_id) {
                assets.push(asset);
            } else if namespace.is_none() {
                tracing::warn!(
                    asset_id = %asset.asset_id,
                    build_id = %asset.build_id,
                    "asset references a missing build; keeping it"
                );
                orphaned.push(asset);
            }
        }

        let bug_tied_builds: HashSet<BuildId> = assets
            .iter()
            .filter(|a| RetentionPolicy::for_type(a.asset_type) == RetentionPolicy::BugTied)
            .map(|a| a.build_id.clone())
            .collect();
        let bugs = self.fetch_bugs(bug_tied_builds).await?;

        let canonicals = canonical_by_bucket(
            assets
                .iter()
                .filter(|a| RetentionPolicy::for_type(a.asset_type) == RetentionPolicy::PerWeekDedup),
            |a| builds.get(&a.build_id),
        );

        let mut verdicts = Vec::with_capacity(assets.len());
        for asset in assets {
            // Every remaining asset has its build in the map.
            let Some(build) = builds.get(&asset.build_id) else {
                continue;
            };
            let bucket = policy::WeekBucket::of(&asset, build);
            let ctx = AssetContext {
                build,
                bugs: bugs.get(&asset.build_id).map(Vec::as_slice).unwrap_or(&[]),
                bucket_canonical: canonicals.get(&bucket),
            };
            let liveness = policy::evaluate(&asset, &ctx, now, &self.config);
            verdicts.push(AssetVerdict { asset, liveness });
        }

        Ok(Evaluation {
            evaluated_at: now,
            verdicts,
            orphaned,
        })
    }

    /// Re-read and re-evaluate a single asset from current state.
    ///
    /// Returns `None` if the asset is already deprecated or its build is
    /// missing.
    pub async fn evaluate_one(
        &self,
        asset_id: &AssetId,
        now: DateTime<Utc>,
    ) -> Result<Option<AssetVerdict>> {
        let asset = self.store.get_asset(asset_id).await?;
        if asset.deprecated {
            return Ok(None);
        }
        let build = match self.store.get_build(&asset.build_id).await {
            Ok(build) => build,
            Err(StorageError::BuildNotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let liveness = match RetentionPolicy::for_type(asset.asset_type) {
            RetentionPolicy::BugTied => {
                let bugs = self.store.bugs_for_build(&asset.build_id).await?;
                let ctx = AssetContext {
                    build: &build,
                    bugs: &bugs,
                    bucket_canonical: None,
                };
                policy::evaluate(&asset, &ctx, now, &self.config)
            }
            RetentionPolicy::PerWeekDedup => {
                let canonical = self.bucket_canonical(&asset, &build).await?;
                let ctx = AssetContext {
                    build: &build,
                    bugs: &[],
                    bucket_canonical: canonical.as_ref(),
                };
                policy::evaluate(&asset, &ctx, now, &self.config)
            }
        };
        Ok(Some(AssetVerdict { asset, liveness }))
    }

    /// Canonical asset of the bucket `asset` falls in, from a range scan of
    /// its calendar week.
    async fn bucket_canonical(
        &self,
        asset: &AssetRecord,
        build: &BuildRecord,
    ) -> Result<Option<AssetId>> {
        let (from, until) = policy::per_week::week_bounds(asset.created_at);
        let neighbours = self
            .store
            .scan_assets(
                &AssetFilter::live()
                    .with_type(asset.asset_type)
                    .created_between(from, until),
            )
            .await?;
        let peers: HashMap<BuildId, BuildRecord> = self
            .store
            .list_builds(&BuildFilter::manager(&build.namespace, &build.manager))
            .await?
            .into_iter()
            .map(|b| (b.build_id.clone(), b))
            .collect();

        let bucket = policy::WeekBucket::of(asset, build);
        Ok(canonical_by_bucket(neighbours.iter(), |a| peers.get(&a.build_id)).remove(&bucket))
    }

    /// Fetch bugs for each build concurrently.
    async fn fetch_bugs(
        &self,
        build_ids: HashSet<BuildId>,
    ) -> Result<HashMap<BuildId, Vec<BugRecord>>> {
        let mut join_set = JoinSet::new();
        for build_id in build_ids {
            let store = Arc::clone(&self.store);
            join_set.spawn(async move {
                let bugs = store.bugs_for_build(&build_id).await?;
                Ok::<(BuildId, Vec<BugRecord>), StorageError>((build_id, bugs))
            });
        }

        let mut by_build = HashMap::new();
        while let Some(joined) = join_set.join_next().await {
            let (build_id, bugs) = joined
                .map_err(|e| AssetError::Unavailable(format!("bug fetch task join error: {e}")))??;
            by_build.insert(build_id, bugs);
        }
        Ok(by_build)
    }
}
