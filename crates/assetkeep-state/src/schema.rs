//! Schema definitions for asset keeper SurrealDB tables
//!
//! Tables:
//! - builds: Uploaded builds (asset owners)
//! - assets: Stored artifacts with their deprecation flag
//! - crashes: Crash observations linking builds to bugs
//! - bugs: Bug status as seen by the retention engine
//!
//! Rows keep enums as plain strings and timestamps as SurrealDB datetimes;
//! conversion to the `storage_traits` types happens at the boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::storage_traits::{
    AssetId, AssetRecord, BugRecord, BuildId, BuildRecord, CrashRecord, StorageResult,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

/// Module for serializing optional chrono DateTime to SurrealDB datetime format
mod surreal_datetime_opt {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match date {
            Some(d) => {
                let sd = SurrealDatetime::from(*d);
                serde::Serialize::serialize(&Some(sd), serializer)
            }
            None => serde::Serialize::serialize(&None::<SurrealDatetime>, serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = Option::<SurrealDatetime>::deserialize(deserializer)?;
        Ok(sd.map(DateTime::from))
    }
}

/// Row in the `builds` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRow {
    pub build_id: String,
    pub namespace: String,
    pub manager: String,
    pub kernel_config_ref: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    pub removed: bool,
}

impl From<BuildRecord> for BuildRow {
    fn from(b: BuildRecord) -> Self {
        Self {
            build_id: b.build_id.0,
            namespace: b.namespace,
            manager: b.manager,
            kernel_config_ref: b.kernel_config_ref,
            created_at: b.created_at,
            removed: b.removed,
        }
    }
}

impl From<BuildRow> for BuildRecord {
    fn from(row: BuildRow) -> Self {
        Self {
            build_id: BuildId(row.build_id),
            namespace: row.namespace,
            manager: row.manager,
            kernel_config_ref: row.kernel_config_ref,
            created_at: row.created_at,
            removed: row.removed,
        }
    }
}

/// Row in the `assets` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRow {
    pub asset_id: String,
    pub build_id: String,
    pub asset_type: String,
    pub download_url: String,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    pub deprecated: bool,
    #[serde(with = "surreal_datetime_opt", default)]
    pub deprecated_at: Option<DateTime<Utc>>,
}

impl From<AssetRecord> for AssetRow {
    fn from(a: AssetRecord) -> Self {
        Self {
            asset_id: a.asset_id.0,
            build_id: a.build_id.0,
            asset_type: a.asset_type.as_str().to_string(),
            download_url: a.download_url,
            created_at: a.created_at,
            deprecated: a.deprecated,
            deprecated_at: a.deprecated_at,
        }
    }
}

impl AssetRow {
    pub fn into_record(self) -> StorageResult<AssetRecord> {
        Ok(AssetRecord {
            asset_id: AssetId(self.asset_id),
            build_id: BuildId(self.build_id),
            asset_type: self.asset_type.parse()?,
            download_url: self.download_url,
            created_at: self.created_at,
            deprecated: self.deprecated,
            deprecated_at: self.deprecated_at,
        })
    }
}

/// Row in the `crashes` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrashRow {
    pub crash_id: String,
    pub build_id: String,
    pub bug_id: String,
    pub log_ref: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub reported_at: DateTime<Utc>,
}

impl From<CrashRecord> for CrashRow {
    fn from(c: CrashRecord) -> Self {
        Self {
            crash_id: c.crash_id,
            build_id: c.build_id.0,
            bug_id: c.bug_id,
            log_ref: c.log_ref,
            reported_at: c.reported_at,
        }
    }
}

/// Row in the `bugs` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BugRow {
    pub bug_id: String,
    pub namespace: String,
    pub title: String,
    pub status: String,
    #[serde(with = "surreal_datetime")]
    pub status_changed_at: DateTime<Utc>,
}

impl From<BugRecord> for BugRow {
    fn from(b: BugRecord) -> Self {
        Self {
            bug_id: b.bug_id,
            namespace: b.namespace,
            title: b.title,
            status: b.status.as_str().to_string(),
            status_changed_at: b.status_changed_at,
        }
    }
}

impl BugRow {
    pub fn into_record(self) -> StorageResult<BugRecord> {
        Ok(BugRecord {
            bug_id: self.bug_id,
            namespace: self.namespace,
            title: self.title,
            status: self.status.parse()?,
            status_changed_at: self.status_changed_at,
        })
    }
}

/// Only used to pull `bug_id` out of crash rows.
#[derive(Debug, Deserialize)]
pub(crate) struct BugIdRow {
    pub bug_id: String,
}

impl From<BugIdRow> for String {
    fn from(row: BugIdRow) -> Self {
        row.bug_id
    }
}

pub(crate) fn invalid_row(table: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::InvalidRecord(format!("{table}: {err}"))
}
