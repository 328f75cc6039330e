//! HTTP routes.
//!
//! - `POST /api/builds/:build_id/assets`: attach uploads to a build
//! - `GET /api/needed_assets`: locators external storage must keep
//! - `GET /deprecate_assets`: run the deprecation job (called by the scheduler)
//! - `GET /api/cover_link`: latest coverage report of a manager
//! - `GET /health`: liveness probe

use assetkeep_core::{AssetKeeper, AssetUpload, DeprecationReport};
use assetkeep_state::{BuildId, EntityStore};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::error::ApiError;

pub type Keeper = AssetKeeper<dyn EntityStore>;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub assets: Vec<AssetUpload>,
}

#[derive(Debug, Deserialize)]
pub struct NeededQuery {
    pub namespace: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NeededAssetsResponse {
    pub download_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CoverLinkQuery {
    pub namespace: String,
    pub manager: String,
}

#[derive(Debug, Serialize)]
pub struct CoverLinkResponse {
    pub cover_link: Option<String>,
}

pub fn router(keeper: Keeper) -> Router {
    Router::new()
        .route("/api/builds/:build_id/assets", post(ingest_assets))
        .route("/api/needed_assets", get(needed_assets))
        .route("/api/cover_link", get(cover_link))
        .route("/deprecate_assets", get(deprecate_assets))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(keeper)
}

async fn ingest_assets(
    State(keeper): State<Keeper>,
    Path(build_id): Path<String>,
    Json(req): Json<IngestRequest>,
) -> Result<StatusCode, ApiError> {
    keeper.ingest(&BuildId::new(build_id), &req.assets).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn needed_assets(
    State(keeper): State<Keeper>,
    Query(query): Query<NeededQuery>,
) -> Result<Json<NeededAssetsResponse>, ApiError> {
    let needed = keeper.list_needed(query.namespace.as_deref()).await?;
    Ok(Json(NeededAssetsResponse {
        download_urls: needed.into_iter().collect(),
    }))
}

async fn deprecate_assets(
    State(keeper): State<Keeper>,
) -> Result<Json<DeprecationReport>, ApiError> {
    Ok(Json(keeper.run_deprecation().await?))
}

async fn cover_link(
    State(keeper): State<Keeper>,
    Query(query): Query<CoverLinkQuery>,
) -> Result<Json<CoverLinkResponse>, ApiError> {
    let cover_link = keeper.cover_link(&query.namespace, &query.manager).await?;
    Ok(Json(CoverLinkResponse { cover_link }))
}

async fn health() -> &'static str {
    "ok"
}
