//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryEntityStore`, which satisfies `BuildStore`, `AssetStore`
//! and `BugLedger` without any external dependencies, plus fault injection
//! for the conditional deprecation write.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::storage_traits::*;

/// A failure to return from the next `mark_deprecated` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFault {
    /// Let this write through unchanged. Used to script faults further down
    /// a sequence of writes.
    Pass,
    /// Lose the compare-and-set race; nothing is written.
    Conflict,
    /// Backend unreachable; nothing is written.
    Unavailable,
}

#[derive(Debug, Default)]
struct Tables {
    builds: HashMap<BuildId, BuildRecord>,
    assets: HashMap<AssetId, AssetRecord>,
    crashes: Vec<CrashRecord>,
    bugs: HashMap<String, BugRecord>,
}

/// In-memory entity store backed by `HashMap`s behind one mutex.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    tables: Mutex<Tables>,
    faults: Mutex<VecDeque<InjectedFault>>,
    deprecation_writes: Mutex<u64>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue faults returned, in order, by the next `mark_deprecated` calls.
    pub fn fail_next_deprecations(&self, faults: impl IntoIterator<Item = InjectedFault>) {
        self.faults.lock().unwrap().extend(faults);
    }

    /// Number of `mark_deprecated` calls that actually flipped a flag.
    pub fn deprecation_writes(&self) -> u64 {
        *self.deprecation_writes.lock().unwrap()
    }

    /// Mark a build as removed. Test helper for the ingestion precondition.
    pub fn remove_build(&self, build_id: &BuildId) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        let build = tables
            .builds
            .get_mut(build_id)
            .ok_or_else(|| StorageError::BuildNotFound {
                build_id: build_id.0.clone(),
            })?;
        build.removed = true;
        Ok(())
    }
}

fn sort_assets(assets: &mut [AssetRecord]) {
    assets.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.asset_id.cmp(&b.asset_id))
    });
}

#[async_trait]
impl BuildStore for MemoryEntityStore {
    async fn put_build(&self, build: BuildRecord) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        if tables.builds.contains_key(&build.build_id) {
            return Err(StorageError::DuplicateBuild {
                build_id: build.build_id.0.clone(),
            });
        }
        tables.builds.insert(build.build_id.clone(), build);
        Ok(())
    }

    async fn get_build(&self, build_id: &BuildId) -> StorageResult<BuildRecord> {
        let tables = self.tables.lock().unwrap();
        tables
            .builds
            .get(build_id)
            .cloned()
            .ok_or_else(|| StorageError::BuildNotFound {
                build_id: build_id.0.clone(),
            })
    }

    async fn list_builds(&self, filter: &BuildFilter) -> StorageResult<Vec<BuildRecord>> {
        let tables = self.tables.lock().unwrap();
        let mut builds: Vec<BuildRecord> = tables
            .builds
            .values()
            .filter(|b| filter.matches(b))
            .cloned()
            .collect();
        builds.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.build_id.cmp(&b.build_id))
        });
        Ok(builds)
    }
}

#[async_trait]
impl AssetStore for MemoryEntityStore {
    async fn create_asset(&self, asset: NewAsset) -> StorageResult<AssetRecord> {
        let record = AssetRecord::from_new(asset);
        let mut tables = self.tables.lock().unwrap();
        tables
            .assets
            .insert(record.asset_id.clone(), record.clone());
        Ok(record)
    }

    async fn get_asset(&self, asset_id: &AssetId) -> StorageResult<AssetRecord> {
        let tables = self.tables.lock().unwrap();
        tables
            .assets
            .get(asset_id)
            .cloned()
            .ok_or_else(|| StorageError::AssetNotFound {
                asset_id: asset_id.0.clone(),
            })
    }

    async fn scan_assets(&self, filter: &AssetFilter) -> StorageResult<Vec<AssetRecord>> {
        let tables = self.tables.lock().unwrap();
        let mut assets: Vec<AssetRecord> = tables
            .assets
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        sort_assets(&mut assets);
        Ok(assets)
    }

    async fn mark_deprecated(&self, asset_id: &AssetId, at: DateTime<Utc>) -> StorageResult<bool> {
        match self.faults.lock().unwrap().pop_front() {
            None | Some(InjectedFault::Pass) => {}
            Some(InjectedFault::Conflict) => {
                return Err(StorageError::Conflict {
                    entity: "asset".to_string(),
                    key: asset_id.0.clone(),
                });
            }
            Some(InjectedFault::Unavailable) => {
                return Err(StorageError::Backend(
                    "injected: store unavailable".to_string(),
                ));
            }
        }

        let mut tables = self.tables.lock().unwrap();
        let asset = tables
            .assets
            .get_mut(asset_id)
            .ok_or_else(|| StorageError::AssetNotFound {
                asset_id: asset_id.0.clone(),
            })?;
        if asset.deprecated {
            return Ok(false);
        }
        asset.deprecated = true;
        asset.deprecated_at = Some(at);
        *self.deprecation_writes.lock().unwrap() += 1;
        Ok(true)
    }
}

#[async_trait]
impl BugLedger for MemoryEntityStore {
    async fn record_crash(&self, crash: CrashRecord) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.crashes.push(crash);
        Ok(())
    }

    async fn put_bug(&self, bug: BugRecord) -> StorageResult<()> {
        let mut tables = self.tables.lock().unwrap();
        tables.bugs.insert(bug.bug_id.clone(), bug);
        Ok(())
    }

    async fn bugs_for_build(&self, build_id: &BuildId) -> StorageResult<Vec<BugRecord>> {
        let tables = self.tables.lock().unwrap();
        let mut bug_ids: Vec<&str> = tables
            .crashes
            .iter()
            .filter(|c| c.build_id == *build_id)
            .map(|c| c.bug_id.as_str())
            .collect();
        bug_ids.sort_unstable();
        bug_ids.dedup();
        // Crashes may reference bugs that were never stored; skip those.
        Ok(bug_ids
            .into_iter()
            .filter_map(|id| tables.bugs.get(id).cloned())
            .collect())
    }
}
