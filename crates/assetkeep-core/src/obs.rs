//! Structured observability hooks for asset retention events.
//!
//! Every function emits one `tracing` event with an `event` field naming it,
//! so log pipelines can filter on e.g. `event=asset.deprecated`.
//!
//! Events are emitted at `info!` level unless noted. For JSON output, start
//! the daemon with `--json`.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::deprecation::DeprecationReport;

/// Emit event: a new asset was attached to a build.
pub fn emit_asset_ingested(build_id: &str, asset_id: &str, asset_type: &str) {
    info!(
        event = "asset.ingested",
        build_id = %build_id,
        asset_id = %asset_id,
        asset_type = %asset_type,
    );
}

/// Emit event: needed-set listed.
pub fn emit_needed_listed(namespace: Option<&str>, evaluated: usize, needed: usize) {
    info!(
        event = "needed.listed",
        namespace = namespace.unwrap_or("*"),
        evaluated = evaluated,
        needed = needed,
    );
}

/// Emit event: deprecation run started at the given evaluation time.
pub fn emit_deprecation_started(now: DateTime<Utc>) {
    info!(event = "deprecation.started", now = %now.to_rfc3339());
}

/// Emit event: one asset flipped to deprecated.
pub fn emit_asset_deprecated(asset_id: &str, asset_type: &str, download_url: &str) {
    info!(
        event = "asset.deprecated",
        asset_id = %asset_id,
        asset_type = %asset_type,
        download_url = %download_url,
    );
}

/// Emit event: a conditional deprecation write lost a race (warning level).
pub fn emit_conflict_retry(asset_id: &str, attempt: u32) {
    warn!(event = "deprecation.conflict_retry", asset_id = %asset_id, attempt = attempt);
}

pub fn emit_deprecation_finished(report: &DeprecationReport) {
    info!(
        event = "deprecation.finished",
        evaluated = report.evaluated,
        deprecated = report.deprecated,
        already_deprecated = report.already_deprecated,
        conflicts_retried = report.conflicts_retried,
    );
}

/// Emit event: deprecation run aborted (warning level).
pub fn emit_deprecation_failed(error: &dyn std::fmt::Display) {
    warn!(event = "deprecation.failed", error = %error);
}
