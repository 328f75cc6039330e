//! Asset ingestion.

use std::sync::Arc;

use assetkeep_state::{AssetRecord, BuildId, EntityStore, NewAsset};

use crate::clock::Clock;
use crate::domain::upload::validate_batch;
use crate::domain::{AssetError, AssetUpload, Result};
use crate::obs;

/// Attaches uploaded assets to existing builds.
pub struct AssetIngestor<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S> AssetIngestor<S>
where
    S: EntityStore + ?Sized,
{
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Create one new asset per upload, all stamped with the same `now`.
    ///
    /// The whole batch is validated before anything is written. A removed
    /// build is reported as not found.
    pub async fn ingest(
        &self,
        build_id: &BuildId,
        uploads: &[AssetUpload],
    ) -> Result<Vec<AssetRecord>> {
        let uploads = validate_batch(uploads)?;

        let build = self.store.get_build(build_id).await?;
        if !build.accepts_assets() {
            return Err(AssetError::NotFound(format!(
                "build {build_id} was removed"
            )));
        }

        let now = self.clock.now();
        let mut created = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let asset = self
                .store
                .create_asset(NewAsset {
                    build_id: build_id.clone(),
                    asset_type: upload.asset_type,
                    download_url: upload.download_url,
                    created_at: now,
                })
                .await?;
            obs::emit_asset_ingested(
                build_id.as_str(),
                asset.asset_id.as_str(),
                asset.asset_type.as_str(),
            );
            created.push(asset);
        }
        Ok(created)
    }
}
