//! SurrealDB schema migrations and initialization
//!
//! This module provides initialization functions to set up all tables
//! with the indexes the retention scans rely on.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all asset keeper tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing asset keeper SurrealDB schema");

    init_builds_table(db).await?;
    init_assets_table(db).await?;
    init_crashes_table(db).await?;
    init_bugs_table(db).await?;

    info!("Asset keeper schema initialization complete");
    Ok(())
}

/// Initialize `builds` table
///
/// Schema:
/// ```text
/// TABLE builds {
///   build_id:           STRING (unique)
///   namespace:          STRING (indexed with manager)
///   manager:            STRING
///   kernel_config_ref:  STRING?
///   created_at:         DATETIME
///   removed:            BOOL
/// }
/// ```
async fn init_builds_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing builds table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS builds SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_build_id ON TABLE builds COLUMNS build_id UNIQUE;

        -- Cover-link projection and bucket keys look builds up per manager
        DEFINE INDEX IF NOT EXISTS idx_namespace_manager ON TABLE builds COLUMNS namespace, manager;
    "#;

    db.query(sql).await?;
    info!("✓ builds table initialized");
    Ok(())
}

/// Initialize `assets` table
///
/// Schema:
/// ```text
/// TABLE assets {
///   asset_id:       STRING (unique)
///   build_id:       STRING (indexed)
///   asset_type:     STRING (kernel_object | kernel_image | bootable_disk |
///                           non_bootable_disk | html_coverage_report)
///   download_url:   STRING
///   created_at:     DATETIME (indexed)
///   deprecated:     BOOL (indexed)
///   deprecated_at:  DATETIME?
/// }
/// ```
///
/// Constraints:
/// - `deprecated` only transitions false → true (enforced via the
///   conditional UPDATE in `mark_deprecated`)
/// - rows are never deleted
async fn init_assets_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing assets table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS assets SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_asset_id ON TABLE assets COLUMNS asset_id UNIQUE;

        -- Per-build lookups (ingestion, bug-tied evaluation)
        DEFINE INDEX IF NOT EXISTS idx_asset_build ON TABLE assets COLUMNS build_id;

        -- Needed-set scans skip deprecated rows
        DEFINE INDEX IF NOT EXISTS idx_asset_deprecated ON TABLE assets COLUMNS deprecated;

        -- Week bucket lookups by type and creation range
        DEFINE INDEX IF NOT EXISTS idx_asset_type_created ON TABLE assets COLUMNS asset_type, created_at;
    "#;

    db.query(sql).await?;
    info!("✓ assets table initialized");
    Ok(())
}

/// Initialize `crashes` table
///
/// Schema:
/// ```text
/// TABLE crashes {
///   crash_id:     STRING (unique)
///   build_id:     STRING (indexed)
///   bug_id:       STRING
///   log_ref:      STRING?
///   reported_at:  DATETIME
/// }
/// ```
async fn init_crashes_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing crashes table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS crashes SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_crash_id ON TABLE crashes COLUMNS crash_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_crash_build ON TABLE crashes COLUMNS build_id;
    "#;

    db.query(sql).await?;
    info!("✓ crashes table initialized");
    Ok(())
}

/// Initialize `bugs` table
///
/// Schema:
/// ```text
/// TABLE bugs {
///   bug_id:             STRING (unique)
///   namespace:          STRING
///   title:              STRING
///   status:             STRING (open | fixed | invalid | dup)
///   status_changed_at:  DATETIME
/// }
/// ```
async fn init_bugs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing bugs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS bugs SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_bug_id ON TABLE bugs COLUMNS bug_id UNIQUE;
    "#;

    db.query(sql).await?;
    info!("✓ bugs table initialized");
    Ok(())
}
