//! SurrealDB-backed entity store
//!
//! Uses the row types in `schema` for persistence, converting to/from
//! `storage_traits` types at the boundary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use surrealdb::engine::any::Any;
use surrealdb::error::Db;
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::handle;
use crate::schema::{invalid_row, AssetRow, BugIdRow, BugRow, BuildRow, CrashRow};
use crate::storage_traits::*;

/// SurrealDB-backed implementation of [`BuildStore`], [`AssetStore`] and
/// [`BugLedger`].
#[derive(Clone)]
pub struct SurrealEntityStore {
    db: Surreal<Any>,
}

/// Reads and unconditional writes: a failure of any kind, transaction
/// conflicts included, means the backend is not usable right now.
fn backend_error(err: surrealdb::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

/// The conditional deprecation write is the only place a lost race is
/// reported as `Conflict`.
fn deprecation_error(asset_id: &AssetId, err: surrealdb::Error) -> StorageError {
    if is_tx_conflict(&err) {
        StorageError::Conflict {
            entity: "asset".to_string(),
            key: asset_id.0.clone(),
        }
    } else {
        backend_error(err)
    }
}

fn is_tx_conflict(err: &surrealdb::Error) -> bool {
    matches!(err, surrealdb::Error::Db(Db::TxRetryable))
}

fn is_unique_violation(err: &surrealdb::Error) -> bool {
    matches!(err, surrealdb::Error::Db(Db::IndexExists { .. }))
}

impl SurrealEntityStore {
    /// Wrap an already connected and migrated client.
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect(&handle::StoreLocation::Memory).await?;
        info!("SurrealEntityStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Create from environment variables.
    ///
    /// Uses the env-var chain of [`handle::StoreLocation::from_env`].
    pub async fn from_env() -> crate::Result<Self> {
        let db = handle::connect_from_env().await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_build_row(&self, build_id: &BuildId) -> StorageResult<Option<BuildRow>> {
        let mut res = self
            .db
            .query("SELECT * FROM builds WHERE build_id = $bid")
            .bind(("bid", build_id.0.clone()))
            .await
            .map_err(backend_error)?;

        let rows: Vec<BuildRow> = res.take(0).map_err(|e| invalid_row("builds", e))?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_asset_row(&self, asset_id: &str) -> StorageResult<Option<AssetRow>> {
        let aid = asset_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM assets WHERE asset_id = $aid")
            .bind(("aid", aid))
            .await
            .map_err(backend_error)?;

        let rows: Vec<AssetRow> = res.take(0).map_err(|e| invalid_row("assets", e))?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_bug_row(&self, bug_id: &str) -> StorageResult<Option<BugRow>> {
        let bid = bug_id.to_string();
        let mut res = self
            .db
            .query("SELECT * FROM bugs WHERE bug_id = $bid")
            .bind(("bid", bid))
            .await
            .map_err(backend_error)?;

        let rows: Vec<BugRow> = res.take(0).map_err(|e| invalid_row("bugs", e))?;
        Ok(rows.into_iter().next())
    }
}

#[async_trait]
impl BuildStore for SurrealEntityStore {
    async fn put_build(&self, build: BuildRecord) -> StorageResult<()> {
        let build_id = build.build_id.clone();
        if self.fetch_build_row(&build_id).await?.is_some() {
            return Err(StorageError::DuplicateBuild {
                build_id: build_id.0,
            });
        }

        debug!(build_id = %build_id, "creating build");
        let created: surrealdb::Result<Option<BuildRow>> = self
            .db
            .create("builds")
            .content(BuildRow::from(build))
            .await;
        match created {
            Ok(_) => Ok(()),
            // A concurrent put won between the check and the create; the
            // unique index on build_id rejected this one.
            Err(err) if is_unique_violation(&err) => Err(StorageError::DuplicateBuild {
                build_id: build_id.0,
            }),
            Err(err) => match self.fetch_build_row(&build_id).await? {
                Some(_) => Err(StorageError::DuplicateBuild {
                    build_id: build_id.0,
                }),
                None => Err(backend_error(err)),
            },
        }
    }

    async fn get_build(&self, build_id: &BuildId) -> StorageResult<BuildRecord> {
        self.fetch_build_row(build_id)
            .await?
            .map(BuildRecord::from)
            .ok_or_else(|| StorageError::BuildNotFound {
                build_id: build_id.0.clone(),
            })
    }

    async fn list_builds(&self, filter: &BuildFilter) -> StorageResult<Vec<BuildRecord>> {
        let mut clauses = Vec::new();
        if filter.namespace.is_some() {
            clauses.push("namespace = $ns");
        }
        if filter.manager.is_some() {
            clauses.push("manager = $manager");
        }
        let sql = format!(
            "SELECT * FROM builds{} ORDER BY created_at ASC, build_id ASC",
            where_clause(&clauses)
        );

        let mut query = self.db.query(sql);
        if let Some(ns) = &filter.namespace {
            query = query.bind(("ns", ns.clone()));
        }
        if let Some(manager) = &filter.manager {
            query = query.bind(("manager", manager.clone()));
        }
        let mut res = query.await.map_err(backend_error)?;

        let rows: Vec<BuildRow> = res.take(0).map_err(|e| invalid_row("builds", e))?;
        Ok(rows.into_iter().map(BuildRecord::from).collect())
    }
}

#[async_trait]
impl AssetStore for SurrealEntityStore {
    async fn create_asset(&self, asset: NewAsset) -> StorageResult<AssetRecord> {
        let record = AssetRecord::from_new(asset);
        debug!(asset_id = %record.asset_id, build_id = %record.build_id, "creating asset");

        let created: Option<AssetRow> = self
            .db
            .create("assets")
            .content(AssetRow::from(record.clone()))
            .await
            .map_err(backend_error)?;

        created
            .ok_or_else(|| StorageError::Backend("failed to create asset record".to_string()))?
            .into_record()
    }

    async fn get_asset(&self, asset_id: &AssetId) -> StorageResult<AssetRecord> {
        self.fetch_asset_row(asset_id.as_str())
            .await?
            .ok_or_else(|| StorageError::AssetNotFound {
                asset_id: asset_id.0.clone(),
            })?
            .into_record()
    }

    async fn scan_assets(&self, filter: &AssetFilter) -> StorageResult<Vec<AssetRecord>> {
        let mut clauses = Vec::new();
        if filter.build_id.is_some() {
            clauses.push("build_id = $build_id");
        }
        if filter.asset_type.is_some() {
            clauses.push("asset_type = $asset_type");
        }
        if filter.deprecated.is_some() {
            clauses.push("deprecated = $deprecated");
        }
        if filter.created_from.is_some() {
            clauses.push("created_at >= $created_from");
        }
        if filter.created_until.is_some() {
            clauses.push("created_at < $created_until");
        }
        let sql = format!(
            "SELECT * FROM assets{} ORDER BY created_at ASC, asset_id ASC",
            where_clause(&clauses)
        );

        let mut query = self.db.query(sql);
        if let Some(build_id) = &filter.build_id {
            query = query.bind(("build_id", build_id.0.clone()));
        }
        if let Some(asset_type) = filter.asset_type {
            query = query.bind(("asset_type", asset_type.as_str().to_string()));
        }
        if let Some(deprecated) = filter.deprecated {
            query = query.bind(("deprecated", deprecated));
        }
        if let Some(from) = filter.created_from {
            query = query.bind(("created_from", SurrealDatetime::from(from)));
        }
        if let Some(until) = filter.created_until {
            query = query.bind(("created_until", SurrealDatetime::from(until)));
        }

        let mut res = query.await.map_err(backend_error)?;
        let rows: Vec<AssetRow> = res.take(0).map_err(|e| invalid_row("assets", e))?;
        rows.into_iter().map(AssetRow::into_record).collect()
    }

    async fn mark_deprecated(&self, asset_id: &AssetId, at: DateTime<Utc>) -> StorageResult<bool> {
        let aid = asset_id.0.clone();
        let mut res = self
            .db
            .query(
                "UPDATE assets SET deprecated = true, deprecated_at = $at \
                 WHERE asset_id = $aid AND deprecated = false RETURN AFTER",
            )
            .bind(("aid", aid))
            .bind(("at", SurrealDatetime::from(at)))
            .await
            .map_err(|e| deprecation_error(asset_id, e))?;

        let updated: Vec<AssetRow> = res
            .take(0)
            .map_err(|e| deprecation_error(asset_id, e))?;
        if !updated.is_empty() {
            return Ok(true);
        }

        // Nothing matched: either already deprecated or missing.
        match self.fetch_asset_row(asset_id.as_str()).await? {
            Some(row) if row.deprecated => Ok(false),
            Some(_) => Err(StorageError::Conflict {
                entity: "asset".to_string(),
                key: asset_id.0.clone(),
            }),
            None => Err(StorageError::AssetNotFound {
                asset_id: asset_id.0.clone(),
            }),
        }
    }
}

#[async_trait]
impl BugLedger for SurrealEntityStore {
    async fn record_crash(&self, crash: CrashRecord) -> StorageResult<()> {
        let crash_id = crash.crash_id.clone();
        let _created: Option<CrashRow> = self
            .db
            .create("crashes")
            .content(CrashRow::from(crash))
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn put_bug(&self, bug: BugRecord) -> StorageResult<()> {
        let bug_id = bug.bug_id.clone();
        let row = BugRow::from(bug);

        if self.fetch_bug_row(&bug_id).await?.is_some() {
            self.db
                .query("UPDATE bugs CONTENT $row WHERE bug_id = $bid")
                .bind(("row", row))
                .bind(("bid", bug_id.clone()))
                .await
                .map_err(backend_error)?;
        } else {
            let _created: Option<BugRow> = self
                .db
                .create("bugs")
                .content(row)
                .await
                .map_err(backend_error)?;
        }
        Ok(())
    }

    async fn bugs_for_build(&self, build_id: &BuildId) -> StorageResult<Vec<BugRecord>> {
        let bid = build_id.0.clone();
        let mut res = self
            .db
            .query("SELECT bug_id FROM crashes WHERE build_id = $bid")
            .bind(("bid", bid))
            .await
            .map_err(backend_error)?;
        let crash_rows: Vec<BugIdRow> = res.take(0).map_err(|e| invalid_row("crashes", e))?;

        let mut bug_ids: Vec<String> = crash_rows.into_iter().map(String::from).collect();
        bug_ids.sort_unstable();
        bug_ids.dedup();
        if bug_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut res = self
            .db
            .query("SELECT * FROM bugs WHERE bug_id IN $ids ORDER BY bug_id ASC")
            .bind(("ids", bug_ids))
            .await
            .map_err(backend_error)?;
        let rows: Vec<BugRow> = res.take(0).map_err(|e| invalid_row("bugs", e))?;
        rows.into_iter().map(BugRow::into_record).collect()
    }
}

fn where_clause(clauses: &[&str]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}
