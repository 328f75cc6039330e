//! Deprecation job.
//!
//! Re-evaluates every live asset at the current time and flips the
//! deprecated flag on the ones no rule keeps. Writes are per-asset
//! compare-and-set, so overlapping runs converge on the same end state.

use std::sync::Arc;

use assetkeep_state::{AssetId, EntityStore, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::NeededSetAggregator;
use crate::clock::Clock;
use crate::config::RetentionConfig;
use crate::domain::{AssetError, Result};
use crate::obs;

/// Upper bound on write attempts for one asset within one run.
pub const MAX_DEPRECATION_ATTEMPTS: u32 = 3;

/// Outcome of one deprecation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationReport {
    /// Live assets evaluated.
    pub evaluated: u64,
    /// Assets this run flipped to deprecated.
    pub deprecated: u64,
    /// Not-needed assets found already deprecated by a concurrent run.
    pub already_deprecated: u64,
    /// Conditional writes that lost a race and were re-evaluated.
    pub conflicts_retried: u64,
}

enum WriteOutcome {
    Deprecated,
    AlreadyDeprecated,
    /// Re-evaluation found the asset needed after all.
    Kept,
    /// Still conflicting after the last attempt.
    GaveUp,
}

pub struct DeprecationJob<S: ?Sized> {
    store: Arc<S>,
    aggregator: NeededSetAggregator<S>,
    clock: Arc<dyn Clock>,
}

impl<S> DeprecationJob<S>
where
    S: EntityStore + ?Sized + 'static,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: RetentionConfig) -> Self {
        Self {
            aggregator: NeededSetAggregator::new(Arc::clone(&store), config),
            store,
            clock,
        }
    }

    /// Run one pass at `clock.now()`.
    ///
    /// An unreachable store aborts the run; whatever was committed stays
    /// committed and the next run picks up from there.
    pub async fn run(&self) -> Result<DeprecationReport> {
        let now = self.clock.now();
        obs::emit_deprecation_started(now);

        match self.run_at(now).await {
            Ok(report) => {
                obs::emit_deprecation_finished(&report);
                Ok(report)
            }
            Err(e) => {
                obs::emit_deprecation_failed(&e);
                Err(e)
            }
        }
    }

    async fn run_at(&self, now: DateTime<Utc>) -> Result<DeprecationReport> {
        let evaluation = self.aggregator.evaluate(None, now).await?;
        let mut report = DeprecationReport {
            evaluated: evaluation.verdicts.len() as u64,
            ..DeprecationReport::default()
        };

        for asset in evaluation.not_needed() {
            match self.deprecate(&asset.asset_id, now, &mut report).await? {
                WriteOutcome::Deprecated => {
                    report.deprecated += 1;
                    obs::emit_asset_deprecated(
                        asset.asset_id.as_str(),
                        asset.asset_type.as_str(),
                        &asset.download_url,
                    );
                }
                WriteOutcome::AlreadyDeprecated => report.already_deprecated += 1,
                WriteOutcome::Kept => {}
                WriteOutcome::GaveUp => {
                    tracing::warn!(
                        asset_id = %asset.asset_id,
                        attempts = MAX_DEPRECATION_ATTEMPTS,
                        "deprecation still conflicting; leaving it for the next run"
                    );
                }
            }
        }
        Ok(report)
    }

    async fn deprecate(
        &self,
        asset_id: &AssetId,
        now: DateTime<Utc>,
        report: &mut DeprecationReport,
    ) -> Result<WriteOutcome> {
        for attempt in 1..=MAX_DEPRECATION_ATTEMPTS {
            match self.store.mark_deprecated(asset_id, now).await {
                Ok(true) => return Ok(WriteOutcome::Deprecated),
                Ok(false) => return Ok(WriteOutcome::AlreadyDeprecated),
                Err(StorageError::Conflict { .. }) => {
                    report.conflicts_retried += 1;
                    obs::emit_conflict_retry(asset_id.as_str(), attempt);
                    if attempt == MAX_DEPRECATION_ATTEMPTS {
                        break;
                    }
                    match self.aggregator.evaluate_one(asset_id, now).await? {
                        None => return Ok(WriteOutcome::AlreadyDeprecated),
                        Some(verdict) if verdict.is_needed() => return Ok(WriteOutcome::Kept),
                        Some(_) => {}
                    }
                }
                Err(StorageError::AssetNotFound { .. }) => {
                    tracing::warn!(asset_id = %asset_id, "asset vanished before deprecation");
                    return Ok(WriteOutcome::Kept);
                }
                Err(e) => return Err(AssetError::from(e)),
            }
        }
        Ok(WriteOutcome::GaveUp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use assetkeep_state::fakes::{InjectedFault, MemoryEntityStore};
    use assetkeep_state::{AssetStore, AssetType, BuildId, BuildRecord, BuildStore, NewAsset};
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    async fn seeded() -> (Arc<MemoryEntityStore>, ManualClock) {
        let store = Arc::new(MemoryEntityStore::new());
        store
            .put_build(BuildRecord::new("b1", "upstream", "ci-qemu", t0()))
            .await
            .unwrap();
        store
            .create_asset(NewAsset {
                build_id: BuildId::new("b1"),
                asset_type: AssetType::KernelObject,
                download_url: "http://x/vmlinux".to_string(),
                created_at: t0(),
            })
            .await
            .unwrap();
        (store, ManualClock::new(t0()))
    }

    #[tokio::test]
    async fn nothing_to_do_while_fresh() {
        let (store, clock) = seeded().await;
        let job = DeprecationJob::new(store, Arc::new(clock), RetentionConfig::default());
        let report = job.run().await.unwrap();
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.deprecated, 0);
    }

    #[tokio::test]
    async fn conflict_is_retried_then_committed() {
        let (store, clock) = seeded().await;
        clock.advance(Duration::days(15));
        store.fail_next_deprecations([InjectedFault::Conflict]);

        let job = DeprecationJob::new(
            Arc::clone(&store),
            Arc::new(clock),
            RetentionConfig::default(),
        );
        let report = job.run().await.unwrap();
        assert_eq!(report.conflicts_retried, 1);
        assert_eq!(report.deprecated, 1);
        assert_eq!(store.deprecation_writes(), 1);
    }

    #[tokio::test]
    async fn persistent_conflict_is_not_surfaced() {
        let (store, clock) = seeded().await;
        clock.advance(Duration::days(15));
        store.fail_next_deprecations([InjectedFault::Conflict; 3]);

        let job = DeprecationJob::new(
            Arc::clone(&store),
            Arc::new(clock),
            RetentionConfig::default(),
        );
        let report = job.run().await.unwrap();
        assert_eq!(report.conflicts_retried, u64::from(MAX_DEPRECATION_ATTEMPTS));
        assert_eq!(report.deprecated, 0);

        // Next run finishes the job.
        let report = job.run().await.unwrap();
        assert_eq!(report.deprecated, 1);
    }

    #[tokio::test]
    async fn unavailable_aborts_the_run() {
        let (store, clock) = seeded().await;
        clock.advance(Duration::days(15));
        store.fail_next_deprecations([InjectedFault::Unavailable]);

        let job = DeprecationJob::new(
            Arc::clone(&store),
            Arc::new(clock),
            RetentionConfig::default(),
        );
        let err = job.run().await.unwrap_err();
        assert!(matches!(err, AssetError::Unavailable(_)));
        assert_eq!(store.deprecation_writes(), 0);
    }
}
