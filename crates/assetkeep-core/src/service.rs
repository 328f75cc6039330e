//! `AssetKeeper`: the four external operations over one entity store.

use std::collections::BTreeSet;
use std::sync::Arc;

use assetkeep_state::{AssetRecord, BuildId, EntityStore};

use crate::aggregator::{Evaluation, NeededSetAggregator};
use crate::clock::{Clock, SystemClock};
use crate::config::RetentionConfig;
use crate::cover_link::CoverLinkProjection;
use crate::deprecation::{DeprecationJob, DeprecationReport};
use crate::domain::{AssetUpload, Result};
use crate::ingestion::AssetIngestor;
use crate::obs;

/// Service facade shared by the HTTP routes and the CLI.
///
/// Cheap to clone; clones share the store and the clock.
pub struct AssetKeeper<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: RetentionConfig,
}

impl<S: ?Sized> Clone for AssetKeeper<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config,
        }
    }
}

impl<S> AssetKeeper<S>
where
    S: EntityStore + ?Sized + 'static,
{
    /// Wall-clock service.
    pub fn new(store: Arc<S>, config: RetentionConfig) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>, config: RetentionConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub async fn ingest(
        &self,
        build_id: &BuildId,
        uploads: &[AssetUpload],
    ) -> Result<Vec<AssetRecord>> {
        AssetIngestor::new(Arc::clone(&self.store), Arc::clone(&self.clock))
            .ingest(build_id, uploads)
            .await
    }

    /// Full evaluation at the current time, without side effects.
    pub async fn evaluate(&self, namespace: Option<&str>) -> Result<Evaluation> {
        NeededSetAggregator::new(Arc::clone(&self.store), self.config)
            .evaluate(namespace, self.clock.now())
            .await
    }

    /// Locators that must not be reclaimed, sorted and deduplicated.
    pub async fn list_needed(&self, namespace: Option<&str>) -> Result<BTreeSet<String>> {
        let evaluation = self.evaluate(namespace).await?;
        let needed = evaluation.needed_locators();
        obs::emit_needed_listed(namespace, evaluation.verdicts.len(), needed.len());
        Ok(needed)
    }

    pub async fn run_deprecation(&self) -> Result<DeprecationReport> {
        DeprecationJob::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.config,
        )
        .run()
        .await
    }

    pub async fn cover_link(&self, namespace: &str, manager: &str) -> Result<Option<String>> {
        CoverLinkProjection::new(Arc::clone(&self.store))
            .cover_link(namespace, manager)
            .await
    }
}
